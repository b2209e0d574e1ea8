//! Execution contexts
//!
//! Every file operation and process invocation the cache and the installers
//! perform goes through an [`ExecutionContext`], so the same code can work on
//! the local machine or on a remote host reached over SSH.

mod local;
mod ssh;

pub use local::LocalContext;
pub use ssh::SshContext;

use crate::error::{AccelError, AccelResult};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Kind of a directory entry, as reported without following symlinks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Other,
}

/// A single directory entry (name only, never a full path)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A program invocation to run through a context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name or path
    pub program: String,
    /// Arguments passed to the program
    pub args: Vec<String>,
    /// Working directory (context default when unset)
    pub directory: Option<PathBuf>,
    /// Capture stdout/stderr instead of passing them through to the terminal
    pub capture: bool,
}

impl Invocation {
    /// Create an invocation that captures its output
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            directory: None,
            capture: true,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Let the program write straight to the terminal
    pub fn inherit_output(mut self) -> Self {
        self.capture = false;
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Result of running an [`Invocation`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    /// Captured stdout (empty when output was inherited)
    pub stdout: String,
    /// Captured stderr (empty when output was inherited)
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// File operations and process execution on some machine
///
/// Implementations:
/// - [`LocalContext`]: the machine npm-accel runs on
/// - [`SshContext`]: a remote host addressed by SSH alias
#[async_trait]
pub trait ExecutionContext: Send + Sync {
    /// Whether `path` is a regular file
    async fn is_file(&self, path: &Path) -> AccelResult<bool>;

    /// Whether `path` is a directory
    async fn is_directory(&self, path: &Path) -> AccelResult<bool>;

    /// Create a directory and all missing parents
    async fn create_dir_all(&self, path: &Path) -> AccelResult<()>;

    /// Remove a file or directory tree; absent paths are not an error
    async fn remove_all(&self, path: &Path) -> AccelResult<()>;

    /// Remove a single file, returning `false` if it did not exist
    async fn remove_file(&self, path: &Path) -> AccelResult<bool>;

    /// Read a whole file
    async fn read_file(&self, path: &Path) -> AccelResult<Vec<u8>>;

    /// Replace a whole file (not atomic, see [`crate::cache::atomic_write`])
    async fn write_file(&self, path: &Path, contents: &[u8]) -> AccelResult<()>;

    /// List the entries of a directory; a missing directory lists as empty
    async fn list_entries(&self, path: &Path) -> AccelResult<Vec<DirEntry>>;

    /// Rename `from` onto `to`, replacing `to` atomically when both live in
    /// the same directory
    async fn rename(&self, from: &Path, to: &Path) -> AccelResult<()>;

    /// Run a program
    async fn execute(&self, invocation: &Invocation) -> AccelResult<CommandOutput>;

    /// Locate a program on the context's search path
    async fn find_program(&self, name: &str) -> AccelResult<Option<PathBuf>>;

    /// Run a program that must succeed and return its trimmed stdout
    async fn capture(&self, invocation: &Invocation) -> AccelResult<String> {
        let output = self.execute(invocation).await?;
        if !output.success() {
            return Err(AccelError::command_exec(
                invocation.to_string(),
                output.stderr.trim(),
            ));
        }
        Ok(output.stdout.trim().to_string())
    }

    /// Run a program that must succeed
    async fn run_checked(&self, invocation: &Invocation) -> AccelResult<()> {
        self.capture(invocation).await.map(|_| ())
    }

    /// Whether paths seen by this context are paths on this machine
    fn is_local(&self) -> bool;

    /// Human-readable context name for logs
    fn name(&self) -> &'static str;
}

/// Context for the local machine, or for `remote_host` over SSH
pub fn create_context(remote_host: Option<&str>) -> Arc<dyn ExecutionContext> {
    match remote_host {
        Some(alias) => {
            debug!("Operating on remote host {}", alias);
            Arc::new(SshContext::new(alias))
        }
        None => Arc::new(LocalContext::new()),
    }
}
