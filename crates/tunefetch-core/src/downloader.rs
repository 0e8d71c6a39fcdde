//! Best-audio acquisition using yt-dlp

use crate::command::ToolCommand;
use crate::decoder::Decoder;
use crate::error::{AcquisitionError, ToolError};
use crate::model::{AssetStage, RunId, TempAsset};
use crate::tracker::TempAssetTracker;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Stem of every file yt-dlp writes into a run workspace.
const SOURCE_STEM: &str = "source";

/// Intermediate encoding yt-dlp extracts to, and its quality.
const INTERMEDIATE_FORMAT: &str = "mp3";
const INTERMEDIATE_QUALITY: &str = "192K";

#[derive(Debug)]
pub struct MediaAcquirer {
    yt_dlp_path: PathBuf,
    timeout: Duration,
    prober: Decoder,
}

impl MediaAcquirer {
    pub fn new(yt_dlp_path: PathBuf, timeout: Duration, prober: Decoder) -> Self {
        Self {
            yt_dlp_path,
            timeout,
            prober,
        }
    }

    /// Download the best audio of `url` into `workspace` and extract it to MP3.
    ///
    /// Every file the download leaves in the workspace is registered with the
    /// tracker before this returns, whether or not it succeeded.
    pub async fn acquire(
        &self,
        url: &str,
        workspace: &Path,
        run: RunId,
        tracker: &TempAssetTracker,
    ) -> Result<TempAsset, AcquisitionError> {
        info!("Downloading audio from: {}", url);

        let output_template = workspace.join(format!("{}.%(ext)s", SOURCE_STEM));
        let result = ToolCommand::new(&self.yt_dlp_path)
            .args([
                // Best audio-only stream, or the best combined stream to extract from
                "-f",
                "bestaudio/best",
                "--extract-audio",
                "--audio-format",
                INTERMEDIATE_FORMAT,
                "--audio-quality",
                INTERMEDIATE_QUALITY,
                "--no-playlist",
                "--no-warnings",
                "--no-progress",
                "--no-part",
            ])
            .arg("-o")
            .arg(&output_template)
            // Print the final path once post-processing has moved it into place
            .args(["--print", "after_move:filepath", "--no-simulate", "--", url])
            .timeout(self.timeout)
            .execute()
            .await;

        // Register before inspecting the outcome so partial files are released too.
        let produced = self.register_produced(workspace, run, tracker).await?;

        let output = result.map_err(|e| classify(e, url))?;
        let audio_path = locate_extracted(&output.stdout, &produced, workspace).await?;
        let asset = TempAsset::new(&audio_path, run, AssetStage::RawDownload);
        tracker.register(asset.clone());

        match self.prober.probe(&audio_path).await? {
            Some(info) => debug!(
                "Acquired {} ({}, {} Hz, {} ch)",
                audio_path.display(),
                info.codec,
                info.sample_rate,
                info.channels
            ),
            None => return Err(AcquisitionError::NoAudioStream),
        }

        Ok(asset)
    }

    async fn register_produced(
        &self,
        workspace: &Path,
        run: RunId,
        tracker: &TempAssetTracker,
    ) -> Result<Vec<PathBuf>, AcquisitionError> {
        let mut produced = Vec::new();
        let mut entries = tokio::fs::read_dir(workspace).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_ours = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(SOURCE_STEM));
            if is_ours && entry.file_type().await?.is_file() {
                tracker.register(TempAsset::new(&path, run, AssetStage::RawDownload));
                produced.push(path);
            }
        }
        Ok(produced)
    }
}

fn classify(err: ToolError, url: &str) -> AcquisitionError {
    let Some(stderr) = err.stderr() else {
        return AcquisitionError::Tool(err);
    };
    debug!("yt-dlp stderr: {}", stderr);

    if stderr.contains("Requested format is not available")
        || stderr.contains("does not contain any stream")
        || stderr.contains("no audio")
    {
        AcquisitionError::NoAudioStream
    } else if stderr.contains("Video unavailable") || stderr.contains("Private video") {
        AcquisitionError::Unavailable(url.to_string())
    } else {
        AcquisitionError::Tool(err)
    }
}

/// Pick the extracted file: the path yt-dlp printed, else any produced `.mp3`.
async fn locate_extracted(
    stdout: &str,
    produced: &[PathBuf],
    workspace: &Path,
) -> Result<PathBuf, AcquisitionError> {
    let printed = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(PathBuf::from)
        .filter(|p| produced.contains(p));

    let path = printed.or_else(|| {
        produced
            .iter()
            .find(|p| p.extension().is_some_and(|e| e == INTERMEDIATE_FORMAT))
            .cloned()
    });

    let Some(path) = path else {
        return Err(AcquisitionError::MissingOutput(workspace.to_path_buf()));
    };
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.len() > 0 => Ok(path),
        _ => Err(AcquisitionError::NoAudioStream),
    }
}
