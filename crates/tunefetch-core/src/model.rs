//! Request, asset and result types shared by the pipeline stages

use crate::error::{ErrorKind, ValidationError};
use crate::metadata::format_duration;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use uuid::Uuid;

/// Identifier of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl Serialize for RunId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Target encoded data rate, written as `<kbps>k` (e.g. `"128k"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bitrate {
    label: String,
    kbps: u32,
}

impl Bitrate {
    /// Parse a label by stripping the trailing `k` and reading the rest as kbps.
    pub fn parse(label: &str) -> Result<Self, ValidationError> {
        let label = label.trim();
        let kbps = label
            .strip_suffix('k')
            .and_then(|digits| digits.parse::<u32>().ok())
            .filter(|kbps| *kbps > 0)
            .ok_or_else(|| ValidationError::MalformedBitrate(label.to_string()))?;

        Ok(Self {
            label: label.to_string(),
            kbps,
        })
    }

    pub fn kbps(&self) -> u32 {
        self.kbps
    }

    pub fn as_str(&self) -> &str {
        &self.label
    }
}

impl Ord for Bitrate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.kbps
            .cmp(&other.kbps)
            .then_with(|| self.label.cmp(&other.label))
    }
}

impl PartialOrd for Bitrate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Bitrate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label)
    }
}

impl Serialize for Bitrate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label)
    }
}

/// Ordered, duplicate-free set of bitrates, iterated from lowest to highest.
pub type BitrateSet = BTreeSet<Bitrate>;

/// Parse a list of labels into a set, failing on the first malformed one.
pub fn parse_bitrates<S: AsRef<str>>(labels: &[S]) -> Result<BitrateSet, ValidationError> {
    labels.iter().map(|l| Bitrate::parse(l.as_ref())).collect()
}

/// Request body as received across a JSON boundary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody {
    pub source_url: String,
    #[serde(default)]
    pub bitrates: Vec<String>,
}

/// A validated pipeline request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    source_url: String,
    bitrates: BitrateSet,
}

impl MediaRequest {
    /// Validate a URL and bitrate labels against the allowed set.
    ///
    /// Duplicate labels collapse. An empty label list is an error; callers that
    /// want a default should substitute it before validating.
    pub fn new<S: AsRef<str>>(
        source_url: &str,
        bitrates: &[S],
        allowed: &BitrateSet,
    ) -> Result<Self, ValidationError> {
        let source_url = source_url.trim();
        if source_url.is_empty() {
            return Err(ValidationError::MissingUrl);
        }
        if !is_http_url(source_url) {
            return Err(ValidationError::UnsupportedUrl(source_url.to_string()));
        }
        if bitrates.is_empty() {
            return Err(ValidationError::NoBitrates);
        }

        let mut set = BitrateSet::new();
        for label in bitrates {
            let bitrate = Bitrate::parse(label.as_ref())?;
            if !allowed.contains(&bitrate) {
                return Err(ValidationError::BitrateNotAllowed(bitrate.to_string()));
            }
            set.insert(bitrate);
        }

        Ok(Self {
            source_url: source_url.to_string(),
            bitrates: set,
        })
    }

    /// Validate a deserialized request body, using `defaults` when it names no bitrates.
    pub fn from_body(
        body: &RequestBody,
        allowed: &BitrateSet,
        defaults: &BitrateSet,
    ) -> Result<Self, ValidationError> {
        if body.bitrates.is_empty() {
            let labels: Vec<&str> = defaults.iter().map(Bitrate::as_str).collect();
            Self::new(&body.source_url, &labels, allowed)
        } else {
            Self::new(&body.source_url, &body.bitrates, allowed)
        }
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn bitrates(&self) -> &BitrateSet {
        &self.bitrates
    }
}

fn is_http_url(url: &str) -> bool {
    ["http://", "https://"].iter().any(|scheme| {
        url.get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
            && url.len() > scheme.len()
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub duration_seconds: u64,
}

impl MediaMetadata {
    /// Duration rendered as `H:MM:SS`.
    pub fn duration(&self) -> String {
        format_duration(self.duration_seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetStage {
    /// Downloaded or extracted source audio.
    RawDownload,
    /// Decoded PCM working copy.
    Decoded,
    /// Finished output, owned by the run until it succeeds.
    Artifact,
}

/// A file created by a run and owned exclusively by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempAsset {
    pub path: PathBuf,
    pub owning_run: RunId,
    pub stage: AssetStage,
}

impl TempAsset {
    pub fn new(path: impl Into<PathBuf>, owning_run: RunId, stage: AssetStage) -> Self {
        Self {
            path: path.into(),
            owning_run,
            stage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeArtifact {
    pub bitrate: Bitrate,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub run_id: RunId,
    pub success: bool,
    pub metadata: Option<MediaMetadata>,
    pub artifacts: BTreeMap<Bitrate, TranscodeArtifact>,
    pub error_kind: Option<ErrorKind>,
    pub error_detail: Option<String>,
}

impl PipelineResult {
    /// JSON-shaped view for callers across a process or HTTP boundary.
    pub fn to_response(&self) -> PipelineResponse {
        PipelineResponse {
            success: self.success,
            title: self.metadata.as_ref().map(|m| m.title.clone()),
            thumbnail_url: self
                .metadata
                .as_ref()
                .and_then(|m| m.thumbnail_url.clone()),
            duration: self.metadata.as_ref().map(MediaMetadata::duration),
            audio_files: self
                .artifacts
                .iter()
                .map(|(bitrate, artifact)| {
                    (
                        bitrate.to_string(),
                        artifact.output_path.display().to_string(),
                    )
                })
                .collect(),
            error: self.error_detail.clone(),
            error_kind: self.error_kind,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResponse {
    pub success: bool,
    pub title: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration: Option<String>,
    pub audio_files: BTreeMap<String, String>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> BitrateSet {
        parse_bitrates(&["64k", "128k"]).unwrap()
    }

    #[test]
    fn test_bitrate_parse() {
        let b = Bitrate::parse("64k").unwrap();
        assert_eq!(b.kbps(), 64);
        assert_eq!(b.to_string(), "64k");

        assert_eq!(Bitrate::parse(" 128k ").unwrap().kbps(), 128);
        assert!(Bitrate::parse("128").is_err());
        assert!(Bitrate::parse("k").is_err());
        assert!(Bitrate::parse("0k").is_err());
        assert!(Bitrate::parse("fastk").is_err());
    }

    #[test]
    fn test_bitrates_order_by_rate() {
        let set = parse_bitrates(&["320k", "64k", "128k"]).unwrap();
        let labels: Vec<_> = set.iter().map(Bitrate::as_str).collect();
        assert_eq!(labels, ["64k", "128k", "320k"]);
    }

    #[test]
    fn test_request_collapses_duplicates() {
        let req = MediaRequest::new("https://valid/video", &["128k", "64k", "128k"], &allowed())
            .unwrap();
        assert_eq!(req.bitrates().len(), 2);
        assert_eq!(req.source_url(), "https://valid/video");
    }

    #[test]
    fn test_request_rejects_disallowed_bitrate() {
        let err = MediaRequest::new("https://valid/video", &["256k"], &allowed()).unwrap_err();
        assert_eq!(err, ValidationError::BitrateNotAllowed("256k".into()));
    }

    #[test]
    fn test_request_rejects_bad_input() {
        let none: [&str; 0] = [];
        assert_eq!(
            MediaRequest::new("https://valid/video", &none, &allowed()).unwrap_err(),
            ValidationError::NoBitrates
        );
        assert_eq!(
            MediaRequest::new("  ", &["64k"], &allowed()).unwrap_err(),
            ValidationError::MissingUrl
        );
        assert!(matches!(
            MediaRequest::new("ftp://host/file", &["64k"], &allowed()),
            Err(ValidationError::UnsupportedUrl(_))
        ));
        assert!(matches!(
            MediaRequest::new("https://valid/video", &["64"], &allowed()),
            Err(ValidationError::MalformedBitrate(_))
        ));
    }

    #[test]
    fn test_request_body_defaults() {
        let body: RequestBody =
            serde_json::from_str(r#"{"sourceUrl": "https://valid/video"}"#).unwrap();
        let defaults = parse_bitrates(&["64k"]).unwrap();
        let req = MediaRequest::from_body(&body, &allowed(), &defaults).unwrap();
        assert_eq!(req.bitrates(), &defaults);
    }

    #[test]
    fn test_failed_response_shape() {
        let result = PipelineResult {
            run_id: RunId::new(),
            success: false,
            metadata: None,
            artifacts: BTreeMap::new(),
            error_kind: Some(ErrorKind::Acquisition),
            error_detail: Some("No audio stream available".into()),
        };

        let json = serde_json::to_value(result.to_response()).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["audioFiles"], serde_json::json!({}));
        assert_eq!(json["title"], serde_json::Value::Null);
        assert_eq!(json["error"], "No audio stream available");
        assert_eq!(json["errorKind"], "acquisition");
    }

    #[test]
    fn test_successful_response_shape() {
        let bitrate = Bitrate::parse("64k").unwrap();
        let mut artifacts = BTreeMap::new();
        artifacts.insert(
            bitrate.clone(),
            TranscodeArtifact {
                bitrate,
                output_path: PathBuf::from("/out/Test_Song_64k.mp3"),
            },
        );
        let result = PipelineResult {
            run_id: RunId::new(),
            success: true,
            metadata: Some(MediaMetadata {
                title: "Test Song".into(),
                thumbnail_url: Some("https://img/thumb.jpg".into()),
                duration_seconds: 185,
            }),
            artifacts,
            error_kind: None,
            error_detail: None,
        };

        let json = serde_json::to_value(result.to_response()).unwrap();
        assert_eq!(json["duration"], "0:03:05");
        assert_eq!(json["thumbnailUrl"], "https://img/thumb.jpg");
        assert_eq!(json["audioFiles"]["64k"], "/out/Test_Song_64k.mp3");
        assert_eq!(json["error"], serde_json::Value::Null);
    }
}
