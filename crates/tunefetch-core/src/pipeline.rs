//! Pipeline orchestration: metadata, acquisition, transcode, cleanup

use crate::config::Config;
use crate::decoder::Decoder;
use crate::downloader::MediaAcquirer;
use crate::encoder::Encoder;
use crate::error::{ConfigError, MetadataError, PipelineError, ResourceError, ValidationError};
use crate::metadata::MetadataFetcher;
use crate::model::{
    Bitrate, BitrateSet, MediaMetadata, MediaRequest, PipelineResult, RunId, TranscodeArtifact,
};
use crate::tracker::TempAssetTracker;
use crate::transcode::TranscodeEngine;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn, Instrument};

/// Static settings shared by every run of a [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub yt_dlp_path: PathBuf,
    pub ffmpeg_path: PathBuf,
    /// Each run writes its artifacts to `<output_dir>/<run id>/`
    pub output_dir: PathBuf,
    /// Each run gets a fresh workspace directory under this one
    pub temp_dir: PathBuf,
    pub allowed_bitrates: BitrateSet,
    pub default_bitrates: BitrateSet,
    pub metadata_timeout: Duration,
    pub download_timeout: Duration,
    pub transcode_timeout: Duration,
}

impl PipelineSettings {
    /// Resolve tool paths and bitrate sets from a loaded configuration
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            yt_dlp_path: config.yt_dlp_path()?,
            ffmpeg_path: config.ffmpeg_path()?,
            output_dir: config.output.directory.clone(),
            temp_dir: config.temp_dir(),
            allowed_bitrates: config.allowed_bitrates()?,
            default_bitrates: config.default_bitrates()?,
            metadata_timeout: config.timeouts.metadata(),
            download_timeout: config.timeouts.download(),
            transcode_timeout: config.timeouts.transcode(),
        })
    }
}

/// Position of a run in `Start → MetadataFetched → Acquired → Transcoded → Cleaned → Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Start,
    MetadataFetched,
    Acquired,
    Transcoded,
    Cleaned,
    Done,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Start => write!(f, "start"),
            RunState::MetadataFetched => write!(f, "metadata-fetched"),
            RunState::Acquired => write!(f, "acquired"),
            RunState::Transcoded => write!(f, "transcoded"),
            RunState::Cleaned => write!(f, "cleaned"),
            RunState::Done => write!(f, "done"),
        }
    }
}

/// Pipeline progress stages
#[derive(Debug, Clone)]
pub enum PipelineStage {
    FetchingMetadata,
    MetadataFetched { title: String, duration: String },
    Acquiring,
    Acquired { path: PathBuf },
    Transcoding { bitrate: String, index: usize, total: usize },
    Cleaning,
    Complete { artifacts: usize, elapsed: Duration },
    /// `stage` names the last state reached, or `timeout`
    Failed { stage: String, error: String },
}

/// Mutable state of a single run.
struct RunContext<'a> {
    id: RunId,
    state: RunState,
    /// Owned by the caller so it outlives an abandoned run
    metadata: &'a OnceLock<MediaMetadata>,
    progress: Option<&'a mpsc::Sender<PipelineStage>>,
}

impl RunContext<'_> {
    async fn emit(&self, stage: PipelineStage) {
        if let Some(tx) = self.progress {
            let _ = tx.send(stage).await;
        }
    }

    fn advance(&mut self, next: RunState) {
        debug!("Run {}: {} -> {}", self.id, self.state, next);
        self.state = next;
    }
}

/// The acquisition and transcode pipeline.
///
/// Holds only static settings and the temp asset registry, so one instance can
/// serve many concurrent runs. Progress senders passed to the `run_*` methods
/// must be drained by the caller.
#[derive(Debug)]
pub struct Pipeline {
    settings: PipelineSettings,
    fetcher: MetadataFetcher,
    acquirer: MediaAcquirer,
    engine: TranscodeEngine,
    tracker: TempAssetTracker,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings) -> Self {
        let decoder = Decoder::new(settings.ffmpeg_path.clone(), settings.transcode_timeout);
        let prober = Decoder::new(settings.ffmpeg_path.clone(), settings.metadata_timeout);
        let encoder = Encoder::new(settings.ffmpeg_path.clone(), settings.transcode_timeout);

        Self {
            fetcher: MetadataFetcher::new(settings.yt_dlp_path.clone(), settings.metadata_timeout),
            acquirer: MediaAcquirer::new(
                settings.yt_dlp_path.clone(),
                settings.download_timeout,
                prober,
            ),
            engine: TranscodeEngine::new(decoder, encoder),
            tracker: TempAssetTracker::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn tracker(&self) -> &TempAssetTracker {
        &self.tracker
    }

    /// Validate a request against this pipeline's allowed bitrates.
    ///
    /// An empty bitrate list selects the configured defaults.
    pub fn request<S: AsRef<str>>(
        &self,
        source_url: &str,
        bitrates: &[S],
    ) -> Result<MediaRequest, ValidationError> {
        if bitrates.is_empty() {
            let defaults: Vec<&str> = self
                .settings
                .default_bitrates
                .iter()
                .map(Bitrate::as_str)
                .collect();
            MediaRequest::new(source_url, &defaults, &self.settings.allowed_bitrates)
        } else {
            MediaRequest::new(source_url, bitrates, &self.settings.allowed_bitrates)
        }
    }

    /// Metadata only; nothing is downloaded and nothing needs cleaning up.
    pub async fn fetch_metadata(&self, source_url: &str) -> Result<MediaMetadata, MetadataError> {
        self.fetcher.fetch(source_url).await
    }

    pub async fn run(&self, request: &MediaRequest) -> PipelineResult {
        let metadata = OnceLock::new();
        self.run_inner(request, RunId::new(), None, &metadata).await
    }

    pub async fn run_with_progress(
        &self,
        request: &MediaRequest,
        progress: mpsc::Sender<PipelineStage>,
    ) -> PipelineResult {
        let metadata = OnceLock::new();
        self.run_inner(request, RunId::new(), Some(&progress), &metadata)
            .await
    }

    /// Run with an overall deadline.
    ///
    /// When the deadline passes the run is dropped: running tools are killed,
    /// every registered asset is deleted, and a failed result is returned.
    /// Metadata fetched before the deadline is kept in that result.
    pub async fn run_with_timeout(
        &self,
        request: &MediaRequest,
        limit: Duration,
        progress: Option<mpsc::Sender<PipelineStage>>,
    ) -> PipelineResult {
        let run = RunId::new();
        let metadata = OnceLock::new();
        let attempt = self.run_inner(request, run, progress.as_ref(), &metadata);
        let outcome = tokio::time::timeout(limit, attempt).await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!("Run {} abandoned after {:?}", run, limit);
                remove_dir_if_empty(&self.run_output_dir(run));
                let error = PipelineError::Timeout(limit);
                if let Some(tx) = &progress {
                    let _ = tx.try_send(PipelineStage::Failed {
                        stage: "timeout".to_string(),
                        error: error.to_string(),
                    });
                }
                failed_result(run, metadata.get().cloned(), &error)
            }
        }
    }

    fn run_output_dir(&self, run: RunId) -> PathBuf {
        self.settings.output_dir.join(run.to_string())
    }

    async fn run_inner(
        &self,
        request: &MediaRequest,
        run: RunId,
        progress: Option<&mpsc::Sender<PipelineStage>>,
        metadata: &OnceLock<MediaMetadata>,
    ) -> PipelineResult {
        let span = info_span!("run", run_id = %run);
        self.execute(request, run, progress, metadata)
            .instrument(span)
            .await
    }

    async fn execute(
        &self,
        request: &MediaRequest,
        run: RunId,
        progress: Option<&mpsc::Sender<PipelineStage>>,
        metadata: &OnceLock<MediaMetadata>,
    ) -> PipelineResult {
        let start_time = Instant::now();
        info!("Starting pipeline for: {}", request.source_url());

        // Released on drop if this future is abandoned before the hand-off
        let scope = self.tracker.scope(run);
        let mut ctx = RunContext {
            id: run,
            state: RunState::Start,
            metadata,
            progress,
        };
        let output_dir = self.run_output_dir(run);

        let outcome = match self.create_workspace(run) {
            Ok(workspace) => {
                let outcome = self.stages(request, &mut ctx, workspace.path(), &output_dir).await;
                ctx.emit(PipelineStage::Cleaning).await;
                self.release(run, outcome, workspace)
            }
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(artifacts) => {
                ctx.advance(RunState::Cleaned);
                let elapsed = start_time.elapsed();
                info!(
                    "Pipeline complete: {} artifact(s) ({:.1}s)",
                    artifacts.len(),
                    elapsed.as_secs_f32()
                );
                // Last await of a successful run; artifacts are still tracked here
                ctx.emit(PipelineStage::Complete {
                    artifacts: artifacts.len(),
                    elapsed,
                })
                .await;

                // No await from here on
                let handed_over = self.tracker.commit_artifacts(run);
                scope.finish();
                debug!("Handed {} artifact(s) to the caller", handed_over.len());
                ctx.advance(RunState::Done);

                PipelineResult {
                    run_id: run,
                    success: true,
                    metadata: metadata.get().cloned(),
                    artifacts,
                    error_kind: None,
                    error_detail: None,
                }
            }
            Err(error) => {
                warn!("Run failed after {}: {}", ctx.state, error);
                remove_dir_if_empty(&output_dir);
                ctx.emit(PipelineStage::Failed {
                    stage: ctx.state.to_string(),
                    error: error.to_string(),
                })
                .await;
                scope.finish();
                ctx.advance(RunState::Done);
                failed_result(run, metadata.get().cloned(), &error)
            }
        }
    }

    fn create_workspace(&self, run: RunId) -> Result<TempDir, ResourceError> {
        let root = &self.settings.temp_dir;
        std::fs::create_dir_all(root).map_err(|source| ResourceError::Create {
            path: root.clone(),
            source,
        })?;

        tempfile::Builder::new()
            .prefix(&format!("tunefetch-{}-", run))
            .tempdir_in(root)
            .map_err(|source| ResourceError::Create {
                path: root.clone(),
                source,
            })
    }

    async fn stages(
        &self,
        request: &MediaRequest,
        ctx: &mut RunContext<'_>,
        workspace: &Path,
        output_dir: &Path,
    ) -> Result<BTreeMap<Bitrate, TranscodeArtifact>, PipelineError> {
        debug!("Workspace: {}", workspace.display());

        // 1. Metadata
        ctx.emit(PipelineStage::FetchingMetadata).await;
        let metadata = self.fetcher.fetch(request.source_url()).await?;
        ctx.emit(PipelineStage::MetadataFetched {
            title: metadata.title.clone(),
            duration: metadata.duration(),
        })
        .await;
        let title = metadata.title.clone();
        let _ = ctx.metadata.set(metadata);
        ctx.advance(RunState::MetadataFetched);

        // 2. Acquire
        ctx.emit(PipelineStage::Acquiring).await;
        let raw = self
            .acquirer
            .acquire(request.source_url(), workspace, ctx.id, &self.tracker)
            .await?;
        ctx.emit(PipelineStage::Acquired {
            path: raw.path.clone(),
        })
        .await;
        ctx.advance(RunState::Acquired);

        // 3. Transcode
        let artifacts = self
            .engine
            .transcode(
                &raw,
                request.bitrates(),
                &title,
                output_dir,
                &self.tracker,
                ctx.progress,
            )
            .await?;
        ctx.advance(RunState::Transcoded);

        Ok(artifacts)
    }

    /// Release temp assets; on any failure release the artifacts too.
    ///
    /// Artifacts of a successful run stay tracked until they are committed.
    fn release(
        &self,
        run: RunId,
        outcome: Result<BTreeMap<Bitrate, TranscodeArtifact>, PipelineError>,
        workspace: TempDir,
    ) -> Result<BTreeMap<Bitrate, TranscodeArtifact>, PipelineError> {
        let released = match &outcome {
            Ok(_) => self.tracker.release_temporaries(run),
            Err(_) => self.tracker.release_all(run),
        };
        let workspace_path = workspace.path().to_path_buf();
        let closed = workspace.close().map_err(|e| {
            warn!("Failed to remove workspace {}: {}", workspace_path.display(), e);
            ResourceError::Cleanup {
                paths: vec![workspace_path],
            }
        });

        match (outcome, released.and(closed)) {
            (Ok(artifacts), Ok(())) => Ok(artifacts),
            (Ok(_), Err(cleanup)) => {
                // All or nothing: a run that cannot clean up does not deliver
                if let Err(e) = self.tracker.release_all(run) {
                    warn!("Failed to discard artifacts: {}", e);
                }
                Err(cleanup.into())
            }
            (Err(error), cleanup) => {
                if let Err(e) = cleanup {
                    warn!("Cleanup after failure incomplete: {}", e);
                }
                Err(error)
            }
        }
    }
}

fn failed_result(
    run: RunId,
    metadata: Option<MediaMetadata>,
    error: &PipelineError,
) -> PipelineResult {
    PipelineResult {
        run_id: run,
        success: false,
        metadata,
        artifacts: BTreeMap::new(),
        error_kind: Some(error.kind()),
        error_detail: Some(error.to_string()),
    }
}

fn remove_dir_if_empty(dir: &Path) {
    // Only succeeds for an empty directory, which is all a failed run may leave.
    if let Err(e) = std::fs::remove_dir(dir) {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!("Left {} in place: {}", dir.display(), e);
        }
    }
}
