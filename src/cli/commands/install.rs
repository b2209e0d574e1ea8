//! Install command - populate node_modules, from the cache when possible

use crate::accel::{AccelSettings, Accelerator, InstallOutcome};
use crate::cli::args::InstallArgs;
use crate::cli::commands::cache_location;
use crate::cli::GlobalArgs;
use crate::config::{production_from_env, Config};
use crate::context::create_context;
use crate::error::{AccelError, AccelResult};
use console::style;
use std::env;
use std::path::PathBuf;

/// Execute the install command
pub async fn execute(args: InstallArgs, global: &GlobalArgs, config: &Config) -> AccelResult<()> {
    let context = create_context(global.remote_host.as_deref());
    let directory = match args.directory.clone() {
        Some(directory) => directory,
        None if context.is_local() => {
            env::current_dir().map_err(|e| AccelError::io("getting current directory", e))?
        }
        None => PathBuf::from("."),
    };

    let settings = settings(&args, global, config);
    let mut accelerator = Accelerator::with_context(context, settings);
    let outcome = accelerator.install(&directory).await?;

    if global.quiet == 0 {
        println!("{}", summary(&outcome));
    }
    Ok(())
}

/// Accelerator settings from flags, environment and config file
fn settings(args: &InstallArgs, global: &GlobalArgs, config: &Config) -> AccelSettings {
    let (cache_directory, cache_limit) = cache_location(global, config);
    AccelSettings {
        cache_directory,
        cache_limit,
        production: args.production || production_from_env(config.install.production),
        installer: args.installer.or(config.install.installer),
        read_from_cache: None,
        write_to_cache: args.no_cache.then_some(false),
    }
}

fn summary(outcome: &InstallOutcome) -> String {
    match outcome {
        InstallOutcome::NothingToDo => {
            format!("{} Nothing to do (no dependencies to install)", style("•").dim())
        }
        InstallOutcome::FromCache {
            fingerprint,
            dependencies,
        } => format!(
            "{} Installed {} from cache ({})",
            style("✓").green(),
            pluralize(*dependencies),
            style(fingerprint.as_str().get(..12).unwrap_or_default()).dim()
        ),
        InstallOutcome::Installed {
            installer,
            dependencies,
            cached,
            ..
        } => format!(
            "{} Installed {} using {}{}",
            style("✓").green(),
            pluralize(*dependencies),
            installer,
            if *cached { " (added to cache)" } else { "" }
        ),
    }
}

fn pluralize(count: usize) -> String {
    if count == 1 {
        "1 dependency".to_string()
    } else {
        format!("{} dependencies", count)
    }
}
