use anyhow::{anyhow, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::args::FetchOptions;
use tunefetch_core::{
    config::Config, MediaRequest, Pipeline, PipelineResult, PipelineSettings, PipelineStage,
};

pub async fn run(url: &str, options: &FetchOptions, config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;
    let pipeline = build_pipeline(&config, options)?;
    let request = pipeline.request(url, &options.bitrates)?;

    let result = execute(&pipeline, &request, options).await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&result.to_response())?);
    } else if result.success {
        println!();
        if let Some(metadata) = &result.metadata {
            println!("{} ({})", metadata.title, metadata.duration());
        }
        for (bitrate, artifact) in &result.artifacts {
            println!("  {:>5}  {}", bitrate, artifact.output_path.display());
        }
    }

    ensure_success(&result)
}

pub(crate) fn build_pipeline(config: &Config, options: &FetchOptions) -> Result<Pipeline> {
    let mut settings = PipelineSettings::from_config(config)?;
    if let Some(output) = &options.output {
        settings.output_dir = output.clone();
    }
    Ok(Pipeline::new(settings))
}

/// Run one request with a progress bar on stderr.
pub(crate) async fn execute(
    pipeline: &Pipeline,
    request: &MediaRequest,
    options: &FetchOptions,
) -> Result<PipelineResult> {
    let (tx, mut rx) = mpsc::channel(32);

    let pb = if options.json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(100)
    };
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} [{elapsed_precise}] {bar:40.cyan/blue} {msg}",
        )?
        .progress_chars("=>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    let progress_handle = tokio::spawn(async move {
        while let Some(stage) = rx.recv().await {
            match stage {
                PipelineStage::FetchingMetadata => {
                    pb.set_position(5);
                    pb.set_message("Fetching metadata...");
                }
                PipelineStage::MetadataFetched { title, duration } => {
                    pb.set_position(10);
                    pb.set_message(format!("{} ({})", truncate(&title, 40), duration));
                }
                PipelineStage::Acquiring => {
                    pb.set_position(15);
                    pb.set_message("Downloading audio...");
                }
                PipelineStage::Acquired { .. } => {
                    pb.set_position(50);
                    pb.set_message("Decoding...");
                }
                PipelineStage::Transcoding {
                    bitrate,
                    index,
                    total,
                } => {
                    let done = index.saturating_sub(1) * 40 / total.max(1);
                    pb.set_position(50 + done as u64);
                    pb.set_message(format!("Encoding {} ({}/{})...", bitrate, index, total));
                }
                PipelineStage::Cleaning => {
                    pb.set_position(95);
                    pb.set_message("Cleaning up...");
                }
                PipelineStage::Complete { artifacts, elapsed } => {
                    pb.set_position(100);
                    pb.finish_with_message(format!(
                        "Done: {} file(s) ({:.1}s)",
                        artifacts,
                        elapsed.as_secs_f32()
                    ));
                }
                PipelineStage::Failed { stage, error } => {
                    pb.abandon_with_message(format!("Failed at {}: {}", stage, error));
                }
            }
        }
    });

    let result = match options.timeout {
        Some(secs) => {
            pipeline
                .run_with_timeout(request, Duration::from_secs(secs), Some(tx))
                .await
        }
        None => pipeline.run_with_progress(request, tx).await,
    };

    // Sender is gone, so the handler drains and exits
    progress_handle.await?;
    Ok(result)
}

pub(crate) fn ensure_success(result: &PipelineResult) -> Result<()> {
    if result.success {
        return Ok(());
    }
    let detail = result.error_detail.as_deref().unwrap_or("unknown error");
    match result.error_kind {
        Some(kind) => Err(anyhow!("{} ({})", detail, kind)),
        None => Err(anyhow!("{}", detail)),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 40), "short");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
        // Multi-byte titles are cut on character boundaries
        assert_eq!(truncate("ééééé", 4), "é...");
    }
}
