use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use which::which;

use tunefetch_core::config::Config;

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;

    println!("tunefetch dependency check\n");

    let mut all_ok = true;

    // Check yt-dlp
    print!("yt-dlp:  ");
    match resolve(config.paths.yt_dlp.as_ref(), "yt-dlp") {
        Some(path) => match Command::new(&path).arg("--version").output() {
            Ok(out) if out.status.success() => {
                let v = String::from_utf8_lossy(&out.stdout);
                println!("OK ({}, {})", v.trim(), path.display());
            }
            _ => {
                println!("FOUND but failed to get version ({})", path.display());
                all_ok = false;
            }
        },
        None => {
            println!("NOT FOUND");
            println!("         Install with: pip install yt-dlp");
            all_ok = false;
        }
    }

    // Check FFmpeg
    print!("ffmpeg:  ");
    match resolve(config.paths.ffmpeg.as_ref(), "ffmpeg") {
        Some(path) => match Command::new(&path).arg("-version").output() {
            Ok(out) if out.status.success() => {
                let first_line = String::from_utf8_lossy(&out.stdout)
                    .lines()
                    .next()
                    .unwrap_or("")
                    .to_string();
                // Extract just version number
                let version_part = first_line.split_whitespace().nth(2).unwrap_or("unknown");
                println!("OK ({}, {})", version_part, path.display());

                print!("  mp3:   ");
                if has_mp3_encoder(&path) {
                    println!("OK (libmp3lame)");
                } else {
                    println!("MISSING libmp3lame encoder");
                    all_ok = false;
                }
            }
            _ => {
                println!("FOUND but failed to get version ({})", path.display());
                all_ok = false;
            }
        },
        None => {
            println!("NOT FOUND");
            println!("         Install with your package manager, e.g. apt install ffmpeg");
            all_ok = false;
        }
    }

    println!();
    if all_ok {
        println!("All dependencies OK!");
        Ok(())
    } else {
        bail!("Some dependencies are missing. See above for installation instructions.")
    }
}

/// Configured path if it exists, else a PATH lookup
fn resolve(configured: Option<&PathBuf>, name: &str) -> Option<PathBuf> {
    match configured {
        Some(path) if path.exists() => Some(path.clone()),
        Some(_) => None,
        None => which(name).ok(),
    }
}

fn has_mp3_encoder(ffmpeg: &Path) -> bool {
    Command::new(ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .output()
        .map(|out| String::from_utf8_lossy(&out.stdout).contains("libmp3lame"))
        .unwrap_or(false)
}
