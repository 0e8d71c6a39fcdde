//! Bookkeeping for files a run creates, and their removal on every exit path

use crate::error::ResourceError;
use crate::model::{AssetStage, RunId, TempAsset};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Registry of temp assets, keyed by the run that owns them.
///
/// Runs never see each other's entries; sharing one tracker between concurrent
/// runs is safe as long as each uses its own [`RunId`].
#[derive(Debug, Default)]
pub struct TempAssetTracker {
    assets: Mutex<HashMap<RunId, Vec<TempAsset>>>,
}

impl TempAssetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RunId, Vec<TempAsset>>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.assets.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, asset: TempAsset) {
        debug!(
            "Tracking {:?} asset {} for run {}",
            asset.stage,
            asset.path.display(),
            asset.owning_run
        );

        let mut assets = self.lock();
        let entries = assets.entry(asset.owning_run).or_default();
        if !entries.iter().any(|a| a.path == asset.path) {
            entries.push(asset);
        }
    }

    /// Assets currently tracked for `run`, in registration order.
    pub fn tracked(&self, run: RunId) -> Vec<TempAsset> {
        self.lock().get(&run).cloned().unwrap_or_default()
    }

    /// Delete every asset of `run`, artifacts included, and forget the run.
    pub fn release_all(&self, run: RunId) -> Result<usize, ResourceError> {
        let assets = self.lock().remove(&run).unwrap_or_default();
        remove_assets(assets)
    }

    /// Delete the raw and decoded assets of `run`, keeping artifacts tracked.
    pub fn release_temporaries(&self, run: RunId) -> Result<usize, ResourceError> {
        let doomed = {
            let mut assets = self.lock();
            match assets.get_mut(&run) {
                Some(entries) => {
                    let (artifacts, temporaries): (Vec<_>, Vec<_>) = entries
                        .drain(..)
                        .partition(|a| a.stage == AssetStage::Artifact);
                    *entries = artifacts;
                    temporaries
                }
                None => Vec::new(),
            }
        };
        remove_assets(doomed)
    }

    /// Hand the artifacts of `run` to the caller; they are no longer cleaned up.
    pub fn commit_artifacts(&self, run: RunId) -> Vec<TempAsset> {
        let mut assets = self.lock();
        let Some(entries) = assets.remove(&run) else {
            return Vec::new();
        };

        let (artifacts, rest): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .partition(|a| a.stage == AssetStage::Artifact);
        if !rest.is_empty() {
            assets.insert(run, rest);
        }
        artifacts
    }

    /// Guard that releases everything `run` registered unless it is finished first.
    pub fn scope(&self, run: RunId) -> RunScope<'_> {
        RunScope {
            tracker: self,
            run,
            finished: false,
        }
    }
}

fn remove_assets(assets: Vec<TempAsset>) -> Result<usize, ResourceError> {
    let mut removed = 0;
    let mut failed: Vec<PathBuf> = Vec::new();

    for asset in assets {
        match std::fs::remove_file(&asset.path) {
            Ok(()) => {
                debug!("Removed {}", asset.path.display());
                removed += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to remove {}: {}", asset.path.display(), e);
                failed.push(asset.path);
            }
        }
    }

    if failed.is_empty() {
        Ok(removed)
    } else {
        Err(ResourceError::Cleanup { paths: failed })
    }
}

/// Cleanup guard for one run.
///
/// Dropping an unfinished scope (an abandoned or panicking run) removes every
/// asset the run registered.
#[derive(Debug)]
pub struct RunScope<'a> {
    tracker: &'a TempAssetTracker,
    run: RunId,
    finished: bool,
}

impl RunScope<'_> {
    pub fn run_id(&self) -> RunId {
        self.run
    }

    pub fn tracker(&self) -> &TempAssetTracker {
        self.tracker
    }

    /// Mark the run as finished; the caller has already released what it owns.
    pub fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for RunScope<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        match self.tracker.release_all(self.run) {
            Ok(0) => {}
            Ok(n) => debug!("Released {} asset(s) of abandoned run {}", n, self.run),
            Err(e) => warn!("Cleanup of abandoned run {} incomplete: {}", self.run, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, b"data").unwrap();
        path
    }

    #[test]
    fn test_release_all_removes_every_stage() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TempAssetTracker::new();
        let run = RunId::new();

        let raw = touch(&dir, "source.mp3");
        let wav = touch(&dir, "source.wav");
        let out = touch(&dir, "Song_64k.mp3");
        tracker.register(TempAsset::new(&raw, run, AssetStage::RawDownload));
        tracker.register(TempAsset::new(&wav, run, AssetStage::Decoded));
        tracker.register(TempAsset::new(&out, run, AssetStage::Artifact));

        assert_eq!(tracker.release_all(run).unwrap(), 3);
        assert!(!raw.exists() && !wav.exists() && !out.exists());
        assert!(tracker.tracked(run).is_empty());
    }

    #[test]
    fn test_missing_files_are_not_errors() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TempAssetTracker::new();
        let run = RunId::new();

        tracker.register(TempAsset::new(
            dir.path().join("never-written.webm"),
            run,
            AssetStage::RawDownload,
        ));
        assert_eq!(tracker.release_all(run).unwrap(), 0);
    }

    #[test]
    fn test_duplicate_registration_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TempAssetTracker::new();
        let run = RunId::new();

        let raw = touch(&dir, "source.mp3");
        tracker.register(TempAsset::new(&raw, run, AssetStage::RawDownload));
        tracker.register(TempAsset::new(&raw, run, AssetStage::RawDownload));
        assert_eq!(tracker.tracked(run).len(), 1);
    }

    #[test]
    fn test_runs_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TempAssetTracker::new();
        let first = RunId::new();
        let second = RunId::new();

        let a = touch(&dir, "a.mp3");
        let b = touch(&dir, "b.mp3");
        tracker.register(TempAsset::new(&a, first, AssetStage::RawDownload));
        tracker.register(TempAsset::new(&b, second, AssetStage::RawDownload));

        tracker.release_all(first).unwrap();
        assert!(!a.exists());
        assert!(b.exists());
        assert_eq!(tracker.tracked(second).len(), 1);
    }

    #[test]
    fn test_success_path_keeps_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TempAssetTracker::new();
        let run = RunId::new();

        let raw = touch(&dir, "source.mp3");
        let out = touch(&dir, "Song_128k.mp3");
        tracker.register(TempAsset::new(&raw, run, AssetStage::RawDownload));
        tracker.register(TempAsset::new(&out, run, AssetStage::Artifact));

        assert_eq!(tracker.release_temporaries(run).unwrap(), 1);
        let committed = tracker.commit_artifacts(run);
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].path, out);

        // Nothing left to clean; the artifact now belongs to the caller.
        assert_eq!(tracker.release_all(run).unwrap(), 0);
        assert!(out.exists());
        assert!(!raw.exists());
    }

    #[test]
    fn test_dropped_scope_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TempAssetTracker::new();
        let run = RunId::new();
        let raw = touch(&dir, "source.mp3");

        {
            let scope = tracker.scope(run);
            scope
                .tracker()
                .register(TempAsset::new(&raw, scope.run_id(), AssetStage::RawDownload));
        }

        assert!(!raw.exists());
    }

    #[test]
    fn test_finished_scope_leaves_assets() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TempAssetTracker::new();
        let run = RunId::new();
        let out = touch(&dir, "Song_64k.mp3");

        let scope = tracker.scope(run);
        tracker.register(TempAsset::new(&out, run, AssetStage::Artifact));
        tracker.commit_artifacts(run);
        scope.finish();

        assert!(out.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_removal_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TempAssetTracker::new();
        let run = RunId::new();

        // A directory cannot be removed with remove_file.
        let sub = dir.path().join("not-a-file");
        fs::create_dir(&sub).unwrap();
        tracker.register(TempAsset::new(&sub, run, AssetStage::Decoded));

        match tracker.release_all(run) {
            Err(ResourceError::Cleanup { paths }) => assert_eq!(paths, vec![sub]),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
