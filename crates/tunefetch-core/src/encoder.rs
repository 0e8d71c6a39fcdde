//! MP3 encoder using FFmpeg

use crate::command::ToolCommand;
use crate::error::ToolError;
use crate::model::Bitrate;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Extension of every encoded artifact.
pub const OUTPUT_EXTENSION: &str = "mp3";

#[derive(Debug, Clone)]
pub struct Encoder {
    ffmpeg_path: PathBuf,
    timeout: Duration,
}

impl Encoder {
    pub fn new(ffmpeg_path: PathBuf, timeout: Duration) -> Self {
        Self {
            ffmpeg_path,
            timeout,
        }
    }

    /// Encode to constant-bitrate MP3 at `bitrate`
    pub async fn encode(
        &self,
        input: &Path,
        output: &Path,
        bitrate: &Bitrate,
    ) -> Result<(), ToolError> {
        info!("Encoding {} MP3", bitrate);

        ToolCommand::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            .arg("-i")
            .arg(input)
            .args(codec_args(bitrate))
            .arg("-y")
            .arg(output)
            .timeout(self.timeout)
            .execute()
            .await?;

        debug!("Encoded to: {}", output.display());
        Ok(())
    }
}

fn codec_args(bitrate: &Bitrate) -> Vec<String> {
    vec![
        "-vn".to_string(),
        "-c:a".to_string(),
        "libmp3lame".to_string(),
        // -b:a without VBR flags gives CBR with LAME
        "-b:a".to_string(),
        format!("{}k", bitrate.kbps()),
        "-f".to_string(),
        OUTPUT_EXTENSION.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_args_use_numeric_rate() {
        let args = codec_args(&Bitrate::parse("64k").unwrap());
        let pos = args.iter().position(|a| a == "-b:a").unwrap();
        assert_eq!(args[pos + 1], "64k");
        assert!(args.contains(&"libmp3lame".to_string()));
    }
}
