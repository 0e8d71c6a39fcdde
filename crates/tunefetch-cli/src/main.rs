mod args;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use args::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let filter = match cli.verbose {
        0 => "tunefetch=info,tunefetch_core=info",
        1 => "tunefetch=debug,tunefetch_core=debug",
        2 => "tunefetch=trace,tunefetch_core=trace",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Some(Commands::Fetch { url, options }) => {
            commands::fetch::run(&url, &options, config_path).await
        }
        Some(Commands::Info { url, json }) => commands::info::run(&url, json, config_path).await,
        Some(Commands::Add {
            url,
            collection,
            options,
        }) => commands::add::run(&url, &collection, &options, config_path).await,
        Some(Commands::Doctor) => commands::doctor::run(config_path).await,
        Some(Commands::Config) => commands::config::run(config_path).await,
        None => {
            // If URL provided directly, treat as fetch command
            if let Some(url) = cli.url {
                commands::fetch::run(&url, &cli.options, config_path).await
            } else {
                use clap::CommandFactory;
                Cli::command().print_help()?;
                println!();
                Ok(())
            }
        }
    }
}
