//! Configuration management for npm-accel
//!
//! Settings come from four layers, highest precedence first: command line
//! flags, environment variables, the config file, built-in defaults. The
//! command line and environment layers are merged by clap; this module
//! handles the file and the defaults.

pub mod schema;

pub use schema::Config;

use crate::error::{AccelError, AccelResult};
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Overrides the config file location
pub const CONFIG_ENV: &str = "NPM_ACCEL_CONFIG";

/// Overrides `[cache] directory`
pub const CACHE_DIR_ENV: &str = "NPM_ACCEL_CACHE_DIR";

/// Overrides `[cache] limit`
pub const CACHE_LIMIT_ENV: &str = "NPM_ACCEL_CACHE_LIMIT";

/// `production` selects production installs
pub const NODE_ENV: &str = "NODE_ENV";

/// System-wide cache directory used when running as root
const SYSTEM_CACHE_PARENT: &str = "/var/cache";

const APP_NAME: &str = "npm-accel";

/// Default cache directory on a remote host, relative to the login directory
pub const REMOTE_CACHE_DIRECTORY: &str = ".cache/npm-accel";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_NAME)
            .join("config.toml")
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> AccelResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> AccelResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| AccelError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| AccelError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> AccelResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            AccelError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> AccelResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AccelError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache directory used when neither flags, environment nor config set one
///
/// `/var/cache/npm-accel` for root when `/var/cache` is writable, the
/// per-user cache directory otherwise.
pub fn default_cache_directory() -> PathBuf {
    let system = Path::new(SYSTEM_CACHE_PARENT);
    if is_root() && is_writable(system) {
        return system.join(APP_NAME);
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join(APP_NAME)
}

/// Resolve the `production` setting below the command line layer
pub fn production_setting(node_env: Option<&str>, configured: Option<bool>) -> bool {
    match node_env {
        Some(value) => value == "production",
        None => configured.unwrap_or(false),
    }
}

/// [`production_setting`] with `NODE_ENV` read from the environment
pub fn production_from_env(configured: Option<bool>) -> bool {
    let node_env = std::env::var(NODE_ENV).ok();
    production_setting(node_env.as_deref(), configured)
}

fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

fn is_writable(path: &Path) -> bool {
    let Ok(path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: path is a valid NUL-terminated string for the duration of the call
    unsafe { libc::access(path.as_ptr(), libc::W_OK) == 0 }
}
