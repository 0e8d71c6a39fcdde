//! Audio probing and decoding using FFmpeg

use crate::command::ToolCommand;
use crate::error::ToolError;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct Decoder {
    ffmpeg_path: PathBuf,
    timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioInfo {
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u8,
    pub duration: f64,
}

impl Decoder {
    pub fn new(ffmpeg_path: PathBuf, timeout: Duration) -> Self {
        Self {
            ffmpeg_path,
            timeout,
        }
    }

    /// Decode audio to 48kHz 24-bit PCM WAV, the working copy every encode reads from
    pub async fn decode_to_wav(&self, input: &Path, output: &Path) -> Result<(), ToolError> {
        info!("Decoding {} to WAV", input.display());

        ToolCommand::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            .arg("-i")
            .arg(input)
            .args(["-vn", "-c:a", "pcm_s24le", "-ar", "48000", "-y"])
            .arg(output)
            .timeout(self.timeout)
            .execute()
            .await?;

        debug!("Decoded to: {}", output.display());
        Ok(())
    }

    /// Describe the first audio stream of `input`, or `None` if it has none.
    pub async fn probe(&self, input: &Path) -> Result<Option<AudioInfo>, ToolError> {
        // FFmpeg prints stream info to stderr; a null muxer run keeps the exit status meaningful.
        let output = ToolCommand::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-nostdin"])
            .arg("-i")
            .arg(input)
            .args(["-map", "0:a:0?", "-t", "0", "-f", "null", "-"])
            .timeout(self.timeout)
            .execute_unchecked()
            .await?;

        Ok(parse_audio_info(&output.stderr))
    }
}

fn audio_stream_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Stream #\d+:\d+[^:]*: Audio: ([A-Za-z0-9_]+)[^\n]*").ok())
        .as_ref()
}

fn sample_rate_re() -> Option<&'static Regex> {
    // Pattern like "48000 Hz" or "44100 Hz"
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+) Hz").ok()).as_ref()
}

fn duration_re() -> Option<&'static Regex> {
    // Pattern like "Duration: 00:03:45.12"
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Duration: (\d+):(\d+):(\d+)\.(\d+)").ok())
        .as_ref()
}

fn parse_audio_info(ffmpeg_output: &str) -> Option<AudioInfo> {
    let caps = audio_stream_re()?.captures(ffmpeg_output)?;
    let stream_line = caps.get(0)?.as_str();

    Some(AudioInfo {
        codec: caps.get(1)?.as_str().to_string(),
        sample_rate: parse_sample_rate(stream_line).unwrap_or(48000),
        channels: parse_channels(stream_line),
        duration: parse_duration(ffmpeg_output).unwrap_or(0.0),
    })
}

fn parse_sample_rate(stream_line: &str) -> Option<u32> {
    let caps = sample_rate_re()?.captures(stream_line)?;
    caps.get(1)?.as_str().parse().ok()
}

fn parse_channels(stream_line: &str) -> u8 {
    if stream_line.contains("5.1") {
        6
    } else if stream_line.contains("mono") {
        1
    } else {
        2
    }
}

fn parse_duration(ffmpeg_output: &str) -> Option<f64> {
    let caps = duration_re()?.captures(ffmpeg_output)?;

    let hours: f64 = caps.get(1)?.as_str().parse().ok()?;
    let minutes: f64 = caps.get(2)?.as_str().parse().ok()?;
    let seconds: f64 = caps.get(3)?.as_str().parse().ok()?;
    let centiseconds: f64 = caps.get(4)?.as_str().parse().ok()?;

    Some(hours * 3600.0 + minutes * 60.0 + seconds + centiseconds / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MP3_PROBE: &str = "\
Input #0, mp3, from 'source.mp3':
  Duration: 00:03:05.12, start: 0.025057, bitrate: 192 kb/s
  Stream #0:0: Audio: mp3, 44100 Hz, stereo, fltp, 192 kb/s
";

    const VIDEO_ONLY_PROBE: &str = "\
Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'source.mp4':
  Duration: 00:00:10.00, start: 0.000000, bitrate: 900 kb/s
  Stream #0:0[0x1](und): Video: h264 (High) (avc1 / 0x31637661), yuv420p, 1280x720
";

    #[test]
    fn test_parse_audio_stream() {
        let info = parse_audio_info(MP3_PROBE).unwrap();
        assert_eq!(info.codec, "mp3");
        assert_eq!(info.sample_rate, 44100);
        assert_eq!(info.channels, 2);
        assert!((info.duration - 185.12).abs() < 1e-6);
    }

    #[test]
    fn test_stream_with_language_tag() {
        let probe = "  Stream #0:1[0x2](eng): Audio: opus, 48000 Hz, mono, fltp (default)\n";
        let info = parse_audio_info(probe).unwrap();
        assert_eq!(info.codec, "opus");
        assert_eq!(info.sample_rate, 48000);
        assert_eq!(info.channels, 1);
        assert_eq!(info.duration, 0.0);
    }

    #[test]
    fn test_repeated_parses_agree() {
        // Cached patterns give the same answers on every call
        for _ in 0..3 {
            assert_eq!(parse_sample_rate("Audio: aac, 44100 Hz, stereo"), Some(44100));
            assert_eq!(parse_duration("  Duration: 01:00:00.50, start"), Some(3600.5));
        }
        assert_eq!(parse_sample_rate("Audio: aac, stereo"), None);
        assert_eq!(parse_duration("Duration: N/A"), None);
    }

    #[test]
    fn test_no_audio_stream() {
        assert_eq!(parse_audio_info(VIDEO_ONLY_PROBE), None);
        assert_eq!(parse_audio_info(""), None);
    }
}
