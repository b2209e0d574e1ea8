//! Remote execution context over SSH
//!
//! Every operation becomes a small POSIX shell snippet run through
//! `ssh <alias> <script>`. Paths and arguments are quoted with `shlex`.

use crate::context::{CommandOutput, DirEntry, EntryKind, ExecutionContext, Invocation};
use crate::error::{AccelError, AccelResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Execution context for a host reachable by SSH alias
#[derive(Debug, Clone)]
pub struct SshContext {
    alias: String,
}

impl SshContext {
    /// Create a context for the given SSH alias (as in `~/.ssh/config`)
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
        }
    }

    /// The SSH alias this context talks to
    pub fn alias(&self) -> &str {
        &self.alias
    }

    fn ssh_command(&self, script: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(["-o", "BatchMode=yes"]).arg(&self.alias).arg(script);
        cmd
    }

    /// Run a script and collect its raw output
    async fn ssh(&self, script: &str, stdin: Option<&[u8]>) -> AccelResult<std::process::Output> {
        debug!("Executing on {}: {}", self.alias, script);

        let mut cmd = self.ssh_command(script);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let label = format!("ssh {} {}", self.alias, script);
        let mut child = cmd
            .spawn()
            .map_err(|e| AccelError::command_failed(label.clone(), e))?;

        if let Some(bytes) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(bytes)
                    .await
                    .map_err(|e| AccelError::io(format!("streaming input to {}", label), e))?;
                // Dropping the pipe sends EOF
                drop(pipe);
            }
        }

        child
            .wait_with_output()
            .await
            .map_err(|e| AccelError::command_failed(label, e))
    }

    /// Run a script that must succeed
    async fn ssh_checked(&self, script: &str, stdin: Option<&[u8]>) -> AccelResult<Vec<u8>> {
        let output = self.ssh(script, stdin).await?;
        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(AccelError::command_exec(
                format!("ssh {} {}", self.alias, script),
                String::from_utf8_lossy(&output.stderr).trim(),
            ))
        }
    }

    /// Run a test-style script, mapping exit status to a boolean
    async fn ssh_test(&self, script: &str) -> AccelResult<bool> {
        Ok(self.ssh(script, None).await?.status.success())
    }
}

fn quote(value: &str) -> AccelResult<String> {
    shlex::try_quote(value)
        .map(|quoted| quoted.into_owned())
        .map_err(|e| AccelError::Internal(format!("cannot quote {:?} for the shell: {}", value, e)))
}

fn quote_path(path: &Path) -> AccelResult<String> {
    quote(&path.to_string_lossy())
}

/// Build the remote shell script for an invocation
fn invocation_script(invocation: &Invocation) -> AccelResult<String> {
    let mut words = vec![quote(&invocation.program)?];
    for arg in &invocation.args {
        words.push(quote(arg)?);
    }
    let command = words.join(" ");
    match invocation.directory {
        Some(ref dir) => Ok(format!("cd {} && {}", quote_path(dir)?, command)),
        None => Ok(command),
    }
}

/// Parse `find -printf '%y %f\n'` output
fn parse_listing(stdout: &str) -> Vec<DirEntry> {
    stdout
        .lines()
        .filter_map(|line| {
            let (kind, name) = line.split_once(' ')?;
            let kind = match kind {
                "f" => EntryKind::File,
                "d" => EntryKind::Directory,
                _ => EntryKind::Other,
            };
            Some(DirEntry::new(name, kind))
        })
        .collect()
}

#[async_trait]
impl ExecutionContext for SshContext {
    async fn is_file(&self, path: &Path) -> AccelResult<bool> {
        self.ssh_test(&format!("test -f {}", quote_path(path)?)).await
    }

    async fn is_directory(&self, path: &Path) -> AccelResult<bool> {
        self.ssh_test(&format!("test -d {}", quote_path(path)?)).await
    }

    async fn create_dir_all(&self, path: &Path) -> AccelResult<()> {
        self.ssh_checked(&format!("mkdir -p {}", quote_path(path)?), None)
            .await
            .map(|_| ())
    }

    async fn remove_all(&self, path: &Path) -> AccelResult<()> {
        self.ssh_checked(&format!("rm -rf {}", quote_path(path)?), None)
            .await
            .map(|_| ())
    }

    async fn remove_file(&self, path: &Path) -> AccelResult<bool> {
        let p = quote_path(path)?;
        let script = format!(
            "if [ -e {p} ] || [ -L {p} ]; then rm -f {p} && echo removed; fi",
            p = p
        );
        let stdout = self.ssh_checked(&script, None).await?;
        Ok(String::from_utf8_lossy(&stdout).trim() == "removed")
    }

    async fn read_file(&self, path: &Path) -> AccelResult<Vec<u8>> {
        self.ssh_checked(&format!("cat {}", quote_path(path)?), None)
            .await
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> AccelResult<()> {
        self.ssh_checked(&format!("cat > {}", quote_path(path)?), Some(contents))
            .await
            .map(|_| ())
    }

    async fn list_entries(&self, path: &Path) -> AccelResult<Vec<DirEntry>> {
        let p = quote_path(path)?;
        let script = format!(
            "if [ -d {p} ]; then find {p} -mindepth 1 -maxdepth 1 -printf '%y %f\\n'; fi",
            p = p
        );
        let stdout = self.ssh_checked(&script, None).await?;
        Ok(parse_listing(&String::from_utf8_lossy(&stdout)))
    }

    async fn rename(&self, from: &Path, to: &Path) -> AccelResult<()> {
        let script = format!("mv -f {} {}", quote_path(from)?, quote_path(to)?);
        self.ssh_checked(&script, None).await.map(|_| ())
    }

    async fn execute(&self, invocation: &Invocation) -> AccelResult<CommandOutput> {
        let script = invocation_script(invocation)?;

        if invocation.capture {
            let output = self.ssh(&script, None).await?;
            return Ok(CommandOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        debug!("Executing interactively on {}: {}", self.alias, script);
        let status = self
            .ssh_command(&script)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| AccelError::command_failed(format!("ssh {} {}", self.alias, script), e))?;

        Ok(CommandOutput {
            code: status.code(),
            ..Default::default()
        })
    }

    async fn find_program(&self, name: &str) -> AccelResult<Option<PathBuf>> {
        let output = self
            .ssh(&format!("command -v {}", quote(name)?), None)
            .await?;
        let found = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() && !found.is_empty() {
            Ok(Some(PathBuf::from(found)))
        } else {
            Ok(None)
        }
    }

    fn is_local(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "ssh"
    }
}
