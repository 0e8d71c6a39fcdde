//! tunefetch-core: fetch the best audio of a video URL and transcode it to fixed bitrates

pub mod command;
pub mod config;
pub mod decoder;
pub mod downloader;
pub mod encoder;
pub mod error;
pub mod metadata;
pub mod model;
pub mod pipeline;
pub mod publish;
pub mod tracker;
pub mod transcode;

pub use config::Config;
pub use error::{ErrorKind, PipelineError, Result};
pub use model::{
    Bitrate, BitrateSet, MediaMetadata, MediaRequest, PipelineResponse, PipelineResult, RunId,
};
pub use pipeline::{Pipeline, PipelineSettings, PipelineStage};
