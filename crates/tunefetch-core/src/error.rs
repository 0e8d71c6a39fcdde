//! Error types for tunefetch-core

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Metadata fetch failed: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("Transcode failed: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("Temp asset error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Run timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),
}

/// Coarse classification of a failed run, exposed to callers alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Metadata,
    Acquisition,
    Transcode,
    Resource,
    Config,
    Timeout,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation(_) => ErrorKind::Validation,
            PipelineError::Metadata(_) => ErrorKind::Metadata,
            PipelineError::Acquisition(_) => ErrorKind::Acquisition,
            PipelineError::Transcode(_) => ErrorKind::Transcode,
            PipelineError::Resource(_) => ErrorKind::Resource,
            PipelineError::Config(_) => ErrorKind::Config,
            PipelineError::Timeout(_) => ErrorKind::Timeout,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Metadata => write!(f, "metadata"),
            ErrorKind::Acquisition => write!(f, "acquisition"),
            ErrorKind::Transcode => write!(f, "transcode"),
            ErrorKind::Resource => write!(f, "resource"),
            ErrorKind::Config => write!(f, "config"),
            ErrorKind::Timeout => write!(f, "timeout"),
        }
    }
}

/// Failure of a single external tool invocation (yt-dlp, ffmpeg).
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} timed out after {} seconds", .timeout.as_secs())]
    Timeout { tool: String, timeout: Duration },

    #[error("{tool} exited with status {code:?}: {stderr}")]
    Failed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("IO error while running {tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

impl ToolError {
    /// Captured stderr of a tool that ran and failed.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ToolError::Failed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Source URL required")]
    MissingUrl,

    #[error("Unsupported URL: {0}")]
    UnsupportedUrl(String),

    #[error("At least one bitrate is required")]
    NoBitrates,

    #[error("Malformed bitrate: {0:?} (expected a value like \"128k\")")]
    MalformedBitrate(String),

    #[error("Bitrate {0} is not allowed")]
    BitrateNotAllowed(String),
}

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("{0}")]
    Tool(#[from] ToolError),

    #[error("Invalid or unsupported URL: {0}")]
    InvalidUrl(String),

    #[error("Video unavailable or private: {0}")]
    Unavailable(String),

    #[error("Playlists are not supported: {0}")]
    Playlist(String),

    #[error("Failed to parse metadata: {0}")]
    Parse(String),
}

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("{0}")]
    Tool(#[from] ToolError),

    #[error("No audio stream available")]
    NoAudioStream,

    #[error("Video unavailable or private: {0}")]
    Unavailable(String),

    #[error("Extracted audio not found in {0}")]
    MissingOutput(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("Decoding {} failed: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: ToolError,
    },

    #[error("Encoding {bitrate} failed: {source}")]
    Encode {
        bitrate: String,
        #[source]
        source: ToolError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Failed to create {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove {} temp asset(s), first: {}", .paths.len(), first_path(.paths))]
    Cleanup { paths: Vec<PathBuf> },
}

fn first_path(paths: &[PathBuf]) -> String {
    paths
        .first()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    LoadError(String),

    #[error("Invalid config value: {0}")]
    InvalidValue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Run {0} did not succeed; nothing to publish")]
    RunFailed(String),

    #[error("No artifact could be uploaded")]
    NothingUploaded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
