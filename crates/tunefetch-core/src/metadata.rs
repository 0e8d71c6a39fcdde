//! Metadata resolution using yt-dlp, without downloading media

use crate::command::ToolCommand;
use crate::error::{MetadataError, ToolError};
use crate::model::MediaMetadata;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

const UNKNOWN_TITLE: &str = "Unknown";

#[derive(Debug)]
pub struct MetadataFetcher {
    yt_dlp_path: PathBuf,
    timeout: Duration,
}

/// The subset of yt-dlp's info JSON the pipeline reads.
#[derive(Debug, Deserialize)]
struct InfoJson {
    #[serde(default, rename = "_type")]
    kind: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

impl MetadataFetcher {
    pub fn new(yt_dlp_path: PathBuf, timeout: Duration) -> Self {
        Self {
            yt_dlp_path,
            timeout,
        }
    }

    pub async fn fetch(&self, url: &str) -> Result<MediaMetadata, MetadataError> {
        info!("Fetching metadata for: {}", url);

        let output = ToolCommand::new(&self.yt_dlp_path)
            .args([
                "--dump-single-json",
                "--skip-download",
                "--no-playlist",
                "--no-warnings",
                "--",
                url,
            ])
            .timeout(self.timeout)
            .execute()
            .await
            .map_err(|e| classify(e, url))?;

        let metadata = parse_info_json(&output.stdout)?;
        debug!(
            "Resolved \"{}\" ({}s)",
            metadata.title, metadata.duration_seconds
        );
        Ok(metadata)
    }
}

fn classify(err: ToolError, url: &str) -> MetadataError {
    let Some(stderr) = err.stderr() else {
        return MetadataError::Tool(err);
    };
    debug!("yt-dlp stderr: {}", stderr);

    if stderr.contains("Video unavailable") || stderr.contains("Private video") {
        MetadataError::Unavailable(url.to_string())
    } else if stderr.contains("is not a valid URL") || stderr.contains("Unsupported URL") {
        MetadataError::InvalidUrl(url.to_string())
    } else {
        MetadataError::Tool(err)
    }
}

fn parse_info_json(stdout: &str) -> Result<MediaMetadata, MetadataError> {
    let info: InfoJson =
        serde_json::from_str(stdout.trim()).map_err(|e| MetadataError::Parse(e.to_string()))?;

    if matches!(info.kind.as_deref(), Some("playlist" | "multi_video")) {
        return Err(MetadataError::Playlist(
            info.title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        ));
    }

    let title = info
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

    let duration_seconds = info
        .duration
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(|d| d as u64)
        .unwrap_or(0);

    Ok(MediaMetadata {
        title,
        thumbnail_url: info.thumbnail.filter(|t| !t.is_empty()),
        duration_seconds,
    })
}

/// Format seconds as `H:MM:SS`; hours are not capped.
pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{}:{:02}:{:02}", hours, minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0:00:00");
        assert_eq!(format_duration(125), "0:02:05");
        assert_eq!(format_duration(185), "0:03:05");
        assert_eq!(format_duration(3600), "1:00:00");
        assert_eq!(format_duration(90061), "25:01:01");
    }

    #[test]
    fn test_parse_info_json() {
        let json = r#"{
            "id": "abc123",
            "title": "Test Song",
            "thumbnail": "https://i.ytimg.com/vi/abc123/maxresdefault.jpg",
            "duration": 185.4,
            "ext": "webm"
        }"#;

        let meta = parse_info_json(json).unwrap();
        assert_eq!(meta.title, "Test Song");
        assert_eq!(
            meta.thumbnail_url.as_deref(),
            Some("https://i.ytimg.com/vi/abc123/maxresdefault.jpg")
        );
        assert_eq!(meta.duration_seconds, 185);
        assert_eq!(meta.duration(), "0:03:05");
    }

    #[test]
    fn test_missing_fields_fall_back() {
        let meta = parse_info_json(r#"{"id": "abc123"}"#).unwrap();
        assert_eq!(meta.title, "Unknown");
        assert_eq!(meta.thumbnail_url, None);
        assert_eq!(meta.duration_seconds, 0);

        let meta = parse_info_json(r#"{"title": "  ", "thumbnail": "", "duration": null}"#).unwrap();
        assert_eq!(meta.title, "Unknown");
        assert_eq!(meta.thumbnail_url, None);
    }

    #[test]
    fn test_rejects_playlists_and_garbage() {
        assert!(matches!(
            parse_info_json(r#"{"_type": "playlist", "title": "Mix"}"#),
            Err(MetadataError::Playlist(_))
        ));
        assert!(matches!(
            parse_info_json("<html>not json</html>"),
            Err(MetadataError::Parse(_))
        ));
    }

    #[test]
    fn test_classify_stderr() {
        let failed = |stderr: &str| ToolError::Failed {
            tool: "yt-dlp".into(),
            code: Some(1),
            stderr: stderr.into(),
        };

        assert!(matches!(
            classify(failed("ERROR: [youtube] x: Video unavailable"), "u"),
            MetadataError::Unavailable(_)
        ));
        assert!(matches!(
            classify(failed("ERROR: Unsupported URL: https://example.com"), "u"),
            MetadataError::InvalidUrl(_)
        ));
        assert!(matches!(
            classify(failed("ERROR: Unable to download webpage"), "u"),
            MetadataError::Tool(_)
        ));
    }
}
