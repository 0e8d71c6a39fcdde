//! Configuration management for tunefetch

use crate::error::ConfigError;
use crate::model::{parse_bitrates, BitrateSet};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub paths: PathsConfig,
    pub output: OutputConfig,
    pub timeouts: TimeoutConfig,
    pub temp: TempConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Path to yt-dlp binary (auto-detected if not set)
    pub yt_dlp: Option<PathBuf>,
    /// Path to FFmpeg binary (auto-detected if not set)
    pub ffmpeg: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory that receives one subdirectory of artifacts per run
    pub directory: PathBuf,
    /// Bitrates a request may ask for
    pub allowed_bitrates: Vec<String>,
    /// Bitrates used when a request names none
    pub default_bitrates: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub metadata_secs: u64,
    pub download_secs: u64,
    /// Applies to each decode and each encode separately
    pub transcode_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempConfig {
    /// Custom temp directory (uses system temp if not set)
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of the local storage bucket used by `add`
    pub directory: PathBuf,
    /// Prefix of public URLs; file paths are reported when unset
    pub public_base_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig {
                yt_dlp: None,
                ffmpeg: None,
            },
            output: OutputConfig {
                directory: PathBuf::from("downloads"),
                allowed_bitrates: vec!["64k".to_string(), "128k".to_string()],
                default_bitrates: vec!["64k".to_string(), "128k".to_string()],
            },
            timeouts: TimeoutConfig {
                metadata_secs: 60,
                download_secs: 900,
                transcode_secs: 600,
            },
            temp: TempConfig { directory: None },
            storage: StorageConfig {
                directory: PathBuf::from("storage"),
                public_base_url: None,
            },
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Load from default config directory
        if let Some(default_config) = Self::default_path() {
            if default_config.exists() {
                figment = figment.merge(Toml::file(&default_config));
            }
        }

        // Load from specified config file
        if let Some(path) = config_file {
            if !path.exists() {
                return Err(ConfigError::LoadError(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment, e.g. TUNEFETCH_OUTPUT__DIRECTORY
        figment = figment.merge(Env::prefixed("TUNEFETCH_").split("__"));

        figment.extract().map_err(|e| ConfigError::LoadError(e.to_string()))
    }

    /// `<config dir>/tunefetch/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("tunefetch/config.toml"))
    }

    /// Render as TOML, the same shape `load` reads
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue(e.to_string()))
    }

    /// Get yt-dlp path, auto-detecting if not configured
    pub fn yt_dlp_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref path) = self.paths.yt_dlp {
            Ok(path.clone())
        } else {
            which::which("yt-dlp")
                .map_err(|_| ConfigError::InvalidValue("yt-dlp not found in PATH".to_string()))
        }
    }

    /// Get FFmpeg path, auto-detecting if not configured
    pub fn ffmpeg_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref path) = self.paths.ffmpeg {
            Ok(path.clone())
        } else {
            which::which("ffmpeg")
                .map_err(|_| ConfigError::InvalidValue("ffmpeg not found in PATH".to_string()))
        }
    }

    /// Get temp directory
    pub fn temp_dir(&self) -> PathBuf {
        self.temp.directory.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn allowed_bitrates(&self) -> Result<BitrateSet, ConfigError> {
        let set = parse_bitrates(&self.output.allowed_bitrates)
            .map_err(|e| ConfigError::InvalidValue(format!("output.allowed_bitrates: {e}")))?;
        if set.is_empty() {
            return Err(ConfigError::InvalidValue(
                "output.allowed_bitrates is empty".to_string(),
            ));
        }
        Ok(set)
    }

    /// Default bitrates, which must be a non-empty subset of the allowed ones
    pub fn default_bitrates(&self) -> Result<BitrateSet, ConfigError> {
        let allowed = self.allowed_bitrates()?;
        let set = parse_bitrates(&self.output.default_bitrates)
            .map_err(|e| ConfigError::InvalidValue(format!("output.default_bitrates: {e}")))?;
        if set.is_empty() {
            return Err(ConfigError::InvalidValue(
                "output.default_bitrates is empty".to_string(),
            ));
        }
        if let Some(stray) = set.iter().find(|b| !allowed.contains(*b)) {
            return Err(ConfigError::InvalidValue(format!(
                "default bitrate {stray} is not in output.allowed_bitrates"
            )));
        }
        Ok(set)
    }
}

impl TimeoutConfig {
    pub fn metadata(&self) -> Duration {
        Duration::from_secs(self.metadata_secs)
    }

    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download_secs)
    }

    pub fn transcode(&self) -> Duration {
        Duration::from_secs(self.transcode_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        let config = Config::default();
        let allowed = config.allowed_bitrates().unwrap();
        let defaults = config.default_bitrates().unwrap();
        assert_eq!(allowed.len(), 2);
        assert_eq!(defaults, allowed);
        assert_eq!(config.timeouts.metadata(), Duration::from_secs(60));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[paths]
ffmpeg = "/opt/ffmpeg/bin/ffmpeg"

[output]
directory = "/srv/audio"
allowed_bitrates = ["64k", "128k", "192k"]
default_bitrates = ["128k"]

[timeouts]
download_secs = 120
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.output.directory, PathBuf::from("/srv/audio"));
        assert_eq!(config.allowed_bitrates().unwrap().len(), 3);
        assert_eq!(config.default_bitrates().unwrap().len(), 1);
        assert_eq!(config.timeouts.download_secs, 120);
        // Untouched keys keep their defaults
        assert_eq!(config.timeouts.metadata_secs, 60);
        assert_eq!(
            config.ffmpeg_path().unwrap(),
            PathBuf::from("/opt/ffmpeg/bin/ffmpeg")
        );
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_default_outside_allowed_is_rejected() {
        let mut config = Config::default();
        config.output.default_bitrates = vec!["256k".to_string()];
        assert!(matches!(
            config.default_bitrates(),
            Err(ConfigError::InvalidValue(_))
        ));

        config.output.allowed_bitrates = vec!["fast".to_string()];
        assert!(config.allowed_bitrates().is_err());
    }

    #[test]
    fn test_round_trips_through_toml() {
        let rendered = Config::default().to_toml().unwrap();
        assert!(rendered.contains("[timeouts]"));
        assert!(rendered.contains("allowed_bitrates"));
    }
}
