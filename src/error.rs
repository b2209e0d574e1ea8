//! Error types for npm-accel
//!
//! All modules use `AccelResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for npm-accel operations
pub type AccelResult<T> = Result<T, AccelError>;

/// All errors that can occur in npm-accel
#[derive(Error, Debug)]
pub enum AccelError {
    // Cache errors
    #[error("No cache entry for fingerprint {fingerprint}")]
    NotFound { fingerprint: String },

    #[error("Corrupt cache archive for {fingerprint}: {reason}")]
    CorruptArchive { fingerprint: String, reason: String },

    #[error("Failed to write cache archive for {fingerprint}")]
    ArchiveWriteError {
        fingerprint: String,
        #[source]
        source: Box<AccelError>,
    },

    #[error("Failed to write cache metadata for {fingerprint}")]
    MetadataWriteError {
        fingerprint: String,
        #[source]
        source: Box<AccelError>,
    },

    #[error("Invalid fingerprint {0:?}: expected 40 hexadecimal characters")]
    InvalidFingerprint(String),

    #[error("Archive codec {codec} cannot operate through the {context} context")]
    ArchiveCodecUnsupported {
        codec: &'static str,
        context: &'static str,
    },

    // Installer errors
    #[error("Invalid installer name {name:?}! (the supported installers are {supported})")]
    UnknownInstaller { name: String, supported: String },

    #[error("Installer {installer} failed with exit code {code}")]
    InstallerFailed { installer: String, code: i32 },

    #[error("Missing Node.js interpreter! (expected to find 'nodejs' or 'node')")]
    MissingNodeInterpreter,

    // Manifest errors
    #[error("Missing package.json file! ({0})")]
    MissingPackageFile(PathBuf),

    #[error("Invalid package.json at {path}: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AccelError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Whether the error means "the cache could not help", so the caller
    /// should regenerate the directory from scratch
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::CorruptArchive { .. })
    }

    /// Whether the underlying IO error is a "not found" condition
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Io { source, .. } | Self::CommandFailed { source, .. } => {
                source.kind() == std::io::ErrorKind::NotFound
            }
            Self::NotFound { .. } => true,
            _ => false,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::MissingNodeInterpreter => Some("Install Node.js and make sure it is on $PATH"),
            Self::MissingPackageFile(_) => {
                Some("Run npm-accel inside a project directory or pass the directory explicitly")
            }
            Self::UnknownInstaller { .. } => Some("Use one of: npm, yarn, pnpm, npm-cache"),
            Self::CorruptArchive { .. } => Some("Run: npm-accel cache clear"),
            _ => None,
        }
    }
}
