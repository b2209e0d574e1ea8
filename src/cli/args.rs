//! CLI argument definitions using clap derive

use crate::config::{CACHE_DIR_ENV, CACHE_LIMIT_ENV, CONFIG_ENV};
use crate::installer::Installer;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// npm-accel - Accelerator for npm, the Node.js package manager
///
/// Builds `node_modules` from `package.json` as quickly as possible by
/// caching complete `node_modules` directories in tar archives, keyed by a
/// fingerprint of the dependencies and the Node.js and installer versions.
#[derive(Parser, Debug)]
#[command(name = "npm-accel")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Options shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Decrease verbosity (-q errors only)
    #[arg(short, long, global = true, action = ArgAction::Count, conflicts_with = "verbose")]
    pub quiet: u8,

    /// Configuration file path
    #[arg(long, global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Operate on a remote system, given by its SSH alias
    #[arg(short, long, global = true, value_name = "SSH_ALIAS")]
    pub remote_host: Option<String>,

    /// Directory where the npm-accel cache is stored
    #[arg(short = 'c', long, global = true, value_name = "DIR", env = CACHE_DIR_ENV)]
    pub cache_directory: Option<PathBuf>,

    /// Maximum number of archives to keep in the cache
    #[arg(short = 'l', long, global = true, value_name = "COUNT", env = CACHE_LIMIT_ENV)]
    pub cache_limit: Option<NonZeroUsize>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install the dependencies listed in package.json
    Install(InstallArgs),

    /// Inspect and manage the archive cache
    Cache(CacheArgs),
}

/// Arguments for the install command
#[derive(Parser, Debug, Clone, Default)]
pub struct InstallArgs {
    /// Project directory containing package.json (defaults to current directory)
    pub directory: Option<PathBuf>,

    /// Don't install modules listed in devDependencies
    #[arg(short, long)]
    pub production: bool,

    /// Installer to use: npm, yarn, pnpm or npm-cache
    #[arg(short, long, value_name = "NAME")]
    pub installer: Option<Installer>,

    /// Don't write to the cache (reading is still allowed)
    #[arg(short, long)]
    pub no_cache: bool,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached archives, least recently used first
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove the least recently used archives beyond the cache limit
    Clean,

    /// Remove every archive from the cache
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Output format for list command
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Plain text (fingerprints only)
    Plain,
}
