//! Local execution context
//!
//! Implements the ExecutionContext trait with `tokio::fs` and
//! `tokio::process` on the machine npm-accel runs on.

use crate::context::{CommandOutput, DirEntry, EntryKind, ExecutionContext, Invocation};
use crate::error::{AccelError, AccelResult};
use async_trait::async_trait;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs;
use tokio::process::Command;
use tracing::debug;

/// Execution context for the local machine
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalContext;

impl LocalContext {
    /// Create a new local context
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecutionContext for LocalContext {
    async fn is_file(&self, path: &Path) -> AccelResult<bool> {
        match fs::metadata(path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AccelError::io(format!("inspecting {}", path.display()), e)),
        }
    }

    async fn is_directory(&self, path: &Path) -> AccelResult<bool> {
        match fs::metadata(path).await {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AccelError::io(format!("inspecting {}", path.display()), e)),
        }
    }

    async fn create_dir_all(&self, path: &Path) -> AccelResult<()> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| AccelError::io(format!("creating directory {}", path.display()), e))
    }

    async fn remove_all(&self, path: &Path) -> AccelResult<()> {
        let metadata = match fs::symlink_metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(AccelError::io(format!("inspecting {}", path.display()), e)),
        };

        let result = if metadata.is_dir() {
            fs::remove_dir_all(path).await
        } else {
            fs::remove_file(path).await
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AccelError::io(format!("removing {}", path.display()), e)),
        }
    }

    async fn remove_file(&self, path: &Path) -> AccelResult<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AccelError::io(format!("removing {}", path.display()), e)),
        }
    }

    async fn read_file(&self, path: &Path) -> AccelResult<Vec<u8>> {
        fs::read(path)
            .await
            .map_err(|e| AccelError::io(format!("reading {}", path.display()), e))
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> AccelResult<()> {
        fs::write(path, contents)
            .await
            .map_err(|e| AccelError::io(format!("writing {}", path.display()), e))
    }

    async fn list_entries(&self, path: &Path) -> AccelResult<Vec<DirEntry>> {
        let mut reader = match fs::read_dir(path).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AccelError::io(format!("listing {}", path.display()), e)),
        };

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| AccelError::io(format!("listing {}", path.display()), e))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                debug!("Skipping non UTF-8 entry in {}", path.display());
                continue;
            };
            let kind = match entry.file_type().await {
                Ok(t) if t.is_file() => EntryKind::File,
                Ok(t) if t.is_dir() => EntryKind::Directory,
                Ok(_) => EntryKind::Other,
                // Entry vanished between readdir and stat
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(AccelError::io(format!("inspecting {}", name), e));
                }
            };
            entries.push(DirEntry::new(name, kind));
        }

        Ok(entries)
    }

    async fn rename(&self, from: &Path, to: &Path) -> AccelResult<()> {
        fs::rename(from, to).await.map_err(|e| {
            AccelError::io(
                format!("renaming {} to {}", from.display(), to.display()),
                e,
            )
        })
    }

    async fn execute(&self, invocation: &Invocation) -> AccelResult<CommandOutput> {
        debug!("Executing: {}", invocation);

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        if let Some(ref dir) = invocation.directory {
            cmd.current_dir(dir);
        }

        if invocation.capture {
            let output = cmd
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .await
                .map_err(|e| AccelError::command_failed(invocation.to_string(), e))?;

            Ok(CommandOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        } else {
            let status = cmd
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .await
                .map_err(|e| AccelError::command_failed(invocation.to_string(), e))?;

            Ok(CommandOutput {
                code: status.code(),
                ..Default::default()
            })
        }
    }

    async fn find_program(&self, name: &str) -> AccelResult<Option<PathBuf>> {
        let search_path = std::env::var_os("PATH");
        let program = name.to_string();
        let found = tokio::task::spawn_blocking(move || search(&program, search_path))
            .await
            .map_err(|e| AccelError::Internal(format!("searching for {} panicked: {}", name, e)))?;

        if let Some(path) = &found {
            debug!("Found {}: {}", name, path.display());
        }
        Ok(found)
    }

    fn is_local(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Executable `name` on `search_path`
fn search(name: &str, search_path: Option<OsString>) -> Option<PathBuf> {
    let cwd = std::env::current_dir().unwrap_or_default();
    which::which_in(name, search_path, cwd).ok()
}
