//! Decode once, encode once per requested bitrate

use crate::decoder::Decoder;
use crate::encoder::{Encoder, OUTPUT_EXTENSION};
use crate::error::TranscodeError;
use crate::model::{AssetStage, Bitrate, BitrateSet, TempAsset, TranscodeArtifact};
use crate::pipeline::PipelineStage;
use crate::tracker::TempAssetTracker;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Longest sanitized title kept in an output filename, in characters.
pub const MAX_TITLE_CHARS: usize = 100;

#[derive(Debug)]
pub struct TranscodeEngine {
    decoder: Decoder,
    encoder: Encoder,
}

impl TranscodeEngine {
    pub fn new(decoder: Decoder, encoder: Encoder) -> Self {
        Self { decoder, encoder }
    }

    /// Encode `raw` at every bitrate into `output_dir`.
    ///
    /// The decoded working copy and every output path are registered with the
    /// tracker before the tool that writes them starts, so whatever exists when
    /// an error surfaces can be released by the caller. Either every bitrate is
    /// produced or an error is returned.
    pub async fn transcode(
        &self,
        raw: &TempAsset,
        bitrates: &BitrateSet,
        title: &str,
        output_dir: &Path,
        tracker: &TempAssetTracker,
        progress: Option<&mpsc::Sender<PipelineStage>>,
    ) -> Result<BTreeMap<Bitrate, TranscodeArtifact>, TranscodeError> {
        let run = raw.owning_run;
        let decoded = raw.path.with_extension("wav");
        tracker.register(TempAsset::new(&decoded, run, AssetStage::Decoded));

        self.decoder
            .decode_to_wav(&raw.path, &decoded)
            .await
            .map_err(|source| TranscodeError::Decode {
                path: raw.path.clone(),
                source,
            })?;

        tokio::fs::create_dir_all(output_dir).await?;

        let total = bitrates.len();
        let mut artifacts = BTreeMap::new();
        for (index, bitrate) in bitrates.iter().enumerate() {
            if let Some(tx) = progress {
                let _ = tx
                    .send(PipelineStage::Transcoding {
                        bitrate: bitrate.to_string(),
                        index: index + 1,
                        total,
                    })
                    .await;
            }

            let output_path = output_dir.join(output_filename(title, bitrate));
            tracker.register(TempAsset::new(&output_path, run, AssetStage::Artifact));

            self.encoder
                .encode(&decoded, &output_path, bitrate)
                .await
                .map_err(|source| TranscodeError::Encode {
                    bitrate: bitrate.to_string(),
                    source,
                })?;

            debug!("[{}/{}] {} -> {}", index + 1, total, bitrate, output_path.display());
            artifacts.insert(
                bitrate.clone(),
                TranscodeArtifact {
                    bitrate: bitrate.clone(),
                    output_path,
                },
            );
        }

        info!("Transcoded \"{}\" to {} bitrate(s)", title, artifacts.len());
        Ok(artifacts)
    }
}

/// Replace characters that are unsafe in filenames and cap the length.
///
/// `< > : " / \ | ? *` and whitespace become `_`; the result is at most
/// [`MAX_TITLE_CHARS`] characters.
pub fn sanitize_filename(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            _ => c,
        })
        .take(MAX_TITLE_CHARS)
        .collect()
}

/// `<sanitized title>_<bitrate>.mp3`
pub fn output_filename(title: &str, bitrate: &Bitrate) -> String {
    format!(
        "{}_{}.{}",
        sanitize_filename(title),
        bitrate,
        OUTPUT_EXTENSION
    )
}
