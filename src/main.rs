//! npm-accel - Accelerator for npm
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use npm_accel::cli::{Cli, Commands};
use npm_accel::config::ConfigManager;
use npm_accel::error::AccelResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> AccelResult<()> {
    let cli = Cli::parse();

    // Initialize logging: -q = error, 0 = warn, 1 = info, 2+ = debug
    let filter = match (cli.global.quiet, cli.global.verbose) {
        (q, _) if q > 0 => EnvFilter::new("npm_accel=error"),
        (_, 0) => EnvFilter::new("npm_accel=warn"),
        (_, 1) => EnvFilter::new("npm_accel=info"),
        _ => EnvFilter::new("npm_accel=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config_manager = if let Some(ref path) = cli.global.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    debug!("Loading configuration from {}", config_manager.path().display());
    let config = config_manager.load().await?;

    // Dispatch to command
    match cli.command {
        Commands::Install(args) => {
            npm_accel::cli::commands::install(args, &cli.global, &config).await
        }
        Commands::Cache(args) => npm_accel::cli::commands::cache(args, &cli.global, &config).await,
    }
}
