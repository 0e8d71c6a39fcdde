//! Hand finished artifacts to storage and build the catalog record

use crate::config::StorageConfig;
use crate::error::PublishError;
use crate::model::{Bitrate, PipelineResult};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Artist recorded for every published song.
pub const DEFAULT_ARTIST: &str = "YouTube";

/// Destination for finished audio files.
pub trait StorageUploader: Sync {
    /// Store `local_path` as `filename`; returns its public URL, or `None` on failure.
    fn upload(
        &self,
        local_path: &Path,
        filename: &str,
        collection_id: &str,
        bitrate: &Bitrate,
    ) -> impl Future<Output = Option<String>> + Send;
}

/// Uploader backed by a local directory laid out as `<collection>/<bitrate>/<file>`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl LocalStorage {
    pub fn new(root: PathBuf, public_base_url: Option<String>) -> Self {
        Self {
            root,
            public_base_url,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.directory.clone(), config.public_base_url.clone())
    }

    fn public_url(&self, relative: &str, stored: &Path) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), relative),
            None => stored.display().to_string(),
        }
    }

    async fn store(&self, local_path: &Path, relative: &str) -> std::io::Result<PathBuf> {
        let dest = self.root.join(relative);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local_path, &dest).await?;
        Ok(dest)
    }
}

impl StorageUploader for LocalStorage {
    fn upload(
        &self,
        local_path: &Path,
        filename: &str,
        collection_id: &str,
        bitrate: &Bitrate,
    ) -> impl Future<Output = Option<String>> + Send {
        let relative = format!("{}/{}/{}", collection_id, bitrate, filename);
        async move {
            match self.store(local_path, &relative).await {
                Ok(stored) => Some(self.public_url(&relative, &stored)),
                Err(e) => {
                    warn!("Error uploading {}: {}", local_path.display(), e);
                    None
                }
            }
        }
    }
}

/// Flat record in the shape the song catalog stores.
#[derive(Debug, Clone, Serialize)]
pub struct SongRecord {
    pub title: String,
    pub artist: String,
    pub duration: String,
    pub thumbnail_url: Option<String>,
    pub folder_id: String,
    pub youtube_url: String,
    pub created_at: DateTime<Utc>,
    /// `audio_url_<kbps>kbps` → public URL
    #[serde(flatten)]
    pub audio_urls: BTreeMap<String, String>,
}

/// Column name holding the URL of the `bitrate` rendition.
pub fn audio_url_field(bitrate: &Bitrate) -> String {
    format!("audio_url_{}kbps", bitrate.kbps())
}

#[derive(Debug)]
pub struct Publisher<U> {
    uploader: U,
}

impl<U: StorageUploader> Publisher<U> {
    pub fn new(uploader: U) -> Self {
        Self { uploader }
    }

    /// Upload every artifact of a successful run and build its record.
    ///
    /// Each local file is deleted as soon as its upload returns, whether the
    /// upload worked or not; the run's output directory goes with them.
    pub async fn publish(
        &self,
        result: PipelineResult,
        source_url: &str,
        collection_id: &str,
    ) -> Result<SongRecord, PublishError> {
        let metadata = match (result.success, result.metadata) {
            (true, Some(metadata)) => metadata,
            _ => return Err(PublishError::RunFailed(result.run_id.to_string())),
        };

        info!("Publishing \"{}\" to {}", metadata.title, collection_id);

        let uploads = result.artifacts.values().map(move |artifact| async move {
            let path = &artifact.output_path;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let url = self
                .uploader
                .upload(path, &filename, collection_id, &artifact.bitrate)
                .await;

            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!("Failed to delete {}: {}", path.display(), e);
            }
            (artifact.bitrate.clone(), url)
        });

        let mut audio_urls = BTreeMap::new();
        for (bitrate, url) in join_all(uploads).await {
            match url {
                Some(url) => {
                    debug!("{} -> {}", bitrate, url);
                    audio_urls.insert(audio_url_field(&bitrate), url);
                }
                None => warn!("Upload of {} failed, leaving it out of the record", bitrate),
            }
        }

        if let Some(dir) = result
            .artifacts
            .values()
            .next()
            .and_then(|a| a.output_path.parent())
        {
            if let Err(e) = tokio::fs::remove_dir(dir).await {
                debug!("Left {} in place: {}", dir.display(), e);
            }
        }

        if audio_urls.is_empty() && !result.artifacts.is_empty() {
            return Err(PublishError::NothingUploaded);
        }

        Ok(SongRecord {
            duration: metadata.duration(),
            title: metadata.title,
            artist: DEFAULT_ARTIST.to_string(),
            thumbnail_url: metadata.thumbnail_url,
            folder_id: collection_id.to_string(),
            youtube_url: source_url.to_string(),
            created_at: Utc::now(),
            audio_urls,
        })
    }
}
