//! Configuration schema for npm-accel
//!
//! Configuration is stored at `~/.config/npm-accel/config.toml`:
//!
//! ```toml
//! [cache]
//! directory = "/srv/npm-accel"
//! limit = 20
//!
//! [install]
//! installer = "yarn"
//! production = false
//! ```

use crate::cache::DEFAULT_CACHE_LIMIT;
use crate::installer::Installer;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache settings
    pub cache: CacheConfig,

    /// Install defaults
    pub install: InstallConfig,
}

/// Cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory (platform default when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// Maximum number of archives to keep
    pub limit: NonZeroUsize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: None,
            limit: DEFAULT_CACHE_LIMIT,
        }
    }
}

/// Install defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Installer to use (yarn when found, npm otherwise, when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installer: Option<Installer>,

    /// Skip devDependencies (follows `NODE_ENV` when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production: Option<bool>,
}
