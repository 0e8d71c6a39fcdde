use anyhow::Result;
use std::path::Path;
use tunefetch_core::config::Config;

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;

    println!("tunefetch configuration\n");
    print!("{}", config.to_toml()?);

    println!("\nResolved:");
    match config.yt_dlp_path() {
        Ok(p) => println!("  yt-dlp = {}", p.display()),
        Err(_) => println!("  yt-dlp = (not found)"),
    }
    match config.ffmpeg_path() {
        Ok(p) => println!("  ffmpeg = {}", p.display()),
        Err(_) => println!("  ffmpeg = (not found)"),
    }
    println!("  temp   = {}", config.temp_dir().display());

    // Show config file locations
    println!("\nConfig file locations (in priority order):");
    println!("  1. Environment variables (TUNEFETCH_*, nested keys joined with __)");
    if let Some(p) = config_path {
        println!("  2. {} (specified)", p.display());
    }
    if let Some(p) = Config::default_path() {
        println!("  3. {}", p.display());
    }

    Ok(())
}
