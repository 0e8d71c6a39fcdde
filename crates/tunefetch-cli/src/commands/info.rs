use anyhow::Result;
use serde_json::json;
use std::path::Path;

use tunefetch_core::{config::Config, metadata::MetadataFetcher};

pub async fn run(url: &str, as_json: bool, config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;
    let fetcher = MetadataFetcher::new(config.yt_dlp_path()?, config.timeouts.metadata());

    let metadata = fetcher.fetch(url).await?;

    if as_json {
        let value = json!({
            "title": metadata.title,
            "thumbnailUrl": metadata.thumbnail_url,
            "duration": metadata.duration(),
            "durationSeconds": metadata.duration_seconds,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("Title:     {}", metadata.title);
        println!("Duration:  {}", metadata.duration());
        println!(
            "Thumbnail: {}",
            metadata.thumbnail_url.as_deref().unwrap_or("(none)")
        );
    }

    Ok(())
}
