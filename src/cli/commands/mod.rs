//! CLI command implementations

pub mod cache;
pub mod install;

pub use cache::execute as cache;
pub use install::execute as install;

use crate::cli::GlobalArgs;
use crate::config::{default_cache_directory, Config, REMOTE_CACHE_DIRECTORY};
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Cache directory and limit after applying flags, environment and config
pub(crate) fn cache_location(global: &GlobalArgs, config: &Config) -> (PathBuf, NonZeroUsize) {
    let directory = global
        .cache_directory
        .clone()
        .or_else(|| config.cache.directory.clone())
        .unwrap_or_else(|| {
            if global.remote_host.is_some() {
                PathBuf::from(REMOTE_CACHE_DIRECTORY)
            } else {
                default_cache_directory()
            }
        });
    let limit = global.cache_limit.unwrap_or(config.cache.limit);
    (directory, limit)
}
