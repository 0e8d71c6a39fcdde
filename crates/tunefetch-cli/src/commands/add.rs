use anyhow::Result;
use std::path::Path;
use tracing::info;

use super::fetch::{build_pipeline, ensure_success, execute};
use crate::args::FetchOptions;
use tunefetch_core::{
    config::Config,
    publish::{LocalStorage, Publisher},
};

pub async fn run(
    url: &str,
    collection: &str,
    options: &FetchOptions,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = Config::load(config_path)?;
    let pipeline = build_pipeline(&config, options)?;
    let request = pipeline.request(url, &options.bitrates)?;

    let result = execute(&pipeline, &request, options).await?;
    ensure_success(&result)?;

    info!("Publishing to {}", config.storage.directory.display());
    let publisher = Publisher::new(LocalStorage::from_config(&config.storage));
    let record = publisher
        .publish(result, request.source_url(), collection)
        .await?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
