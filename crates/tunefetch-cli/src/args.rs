use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tunefetch")]
#[command(author, version, about = "Fetch audio from video URLs and transcode it to fixed bitrates")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Video URL to process (shorthand for `fetch <URL>`)
    #[arg(value_name = "URL")]
    pub url: Option<String>,

    #[command(flatten)]
    pub options: FetchOptions,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download a URL and transcode it to every requested bitrate
    Fetch {
        /// Video URL
        url: String,

        #[command(flatten)]
        options: FetchOptions,
    },

    /// Show title, duration and thumbnail without downloading
    Info {
        /// Video URL
        url: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Fetch a URL, publish its files to storage and print the song record
    Add {
        /// Video URL
        url: String,

        /// Collection (folder) the song is filed under
        #[arg(short, long)]
        collection: String,

        #[command(flatten)]
        options: FetchOptions,
    },

    /// Check external tools
    Doctor,

    /// Show configuration
    Config,
}

#[derive(clap::Args, Clone, Default)]
pub struct FetchOptions {
    /// Target bitrate, e.g. 64k (repeatable; defaults come from config)
    #[arg(short, long = "bitrate", value_name = "BITRATE")]
    pub bitrates: Vec<String>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Abandon the run after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_bitrates() {
        let cli = Cli::parse_from([
            "tunefetch",
            "fetch",
            "https://valid/video",
            "-b",
            "64k",
            "--bitrate",
            "128k",
            "--json",
        ]);
        match cli.command {
            Some(Commands::Fetch { url, options }) => {
                assert_eq!(url, "https://valid/video");
                assert_eq!(options.bitrates, ["64k", "128k"]);
                assert!(options.json);
                assert!(options.timeout.is_none());
            }
            _ => panic!("expected fetch"),
        }
    }

    #[test]
    fn test_bare_url_shorthand() {
        let cli = Cli::parse_from(["tunefetch", "https://valid/video", "-o", "out", "-vv"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.url.as_deref(), Some("https://valid/video"));
        assert_eq!(cli.options.output, Some(PathBuf::from("out")));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_add_requires_collection() {
        assert!(Cli::try_parse_from(["tunefetch", "add", "https://valid/video"]).is_err());
        let cli = Cli::try_parse_from([
            "tunefetch",
            "add",
            "https://valid/video",
            "--collection",
            "folder-1",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Commands::Add { collection, .. }) if collection == "folder-1"));
    }
}
