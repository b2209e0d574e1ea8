//! Archive codecs
//!
//! Pack a directory tree into a single tar file and unpack it again.
//!
//! | Codec | Works through | Notes |
//! |-------|---------------|-------|
//! | [`NativeTar`] | local context only | in-process, `tar` crate |
//! | [`TarCommand`] | any context | runs the `tar` program |

use crate::context::{ExecutionContext, Invocation};
use crate::error::{AccelError, AccelResult};
use async_trait::async_trait;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Packs directories into archive files and back
#[async_trait]
pub trait ArchiveCodec: Send + Sync {
    /// Pack the contents of `source` into the file `archive`
    async fn pack(
        &self,
        context: &dyn ExecutionContext,
        source: &Path,
        archive: &Path,
    ) -> AccelResult<()>;

    /// Unpack `archive` into the existing directory `destination`
    async fn unpack(
        &self,
        context: &dyn ExecutionContext,
        archive: &Path,
        destination: &Path,
    ) -> AccelResult<()>;

    /// Codec name for logs
    fn name(&self) -> &'static str;
}

/// Pick the codec that suits a context
pub fn codec_for(context: &dyn ExecutionContext) -> Box<dyn ArchiveCodec> {
    if context.is_local() {
        Box::new(NativeTar)
    } else {
        Box::new(TarCommand)
    }
}

/// In-process tar codec
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeTar;

impl NativeTar {
    fn require_local(&self, context: &dyn ExecutionContext) -> AccelResult<()> {
        if context.is_local() {
            Ok(())
        } else {
            Err(AccelError::ArchiveCodecUnsupported {
                codec: self.name(),
                context: context.name(),
            })
        }
    }

    fn pack_blocking(source: &Path, archive: &Path) -> std::io::Result<()> {
        let file = File::create(archive)?;
        let mut builder = tar::Builder::new(file);
        builder.follow_symlinks(false);
        builder.append_dir_all(".", source)?;
        let file = builder.into_inner()?;
        file.sync_all()
    }

    fn unpack_blocking(archive: &Path, destination: &Path) -> std::io::Result<()> {
        let file = File::open(archive)?;
        let mut archive = tar::Archive::new(file);
        archive.set_preserve_permissions(true);
        archive.set_overwrite(true);
        archive.unpack(destination)
    }
}

async fn run_blocking<F>(label: String, job: F) -> AccelResult<()>
where
    F: FnOnce() -> std::io::Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| AccelError::Internal(format!("{} panicked: {}", label, e)))?
        .map_err(|e| AccelError::io(label, e))
}

#[async_trait]
impl ArchiveCodec for NativeTar {
    async fn pack(
        &self,
        context: &dyn ExecutionContext,
        source: &Path,
        archive: &Path,
    ) -> AccelResult<()> {
        self.require_local(context)?;
        debug!("Packing {} into {}", source.display(), archive.display());

        let (source, archive): (PathBuf, PathBuf) = (source.into(), archive.into());
        let label = format!("packing {}", source.display());
        run_blocking(label, move || Self::pack_blocking(&source, &archive)).await
    }

    async fn unpack(
        &self,
        context: &dyn ExecutionContext,
        archive: &Path,
        destination: &Path,
    ) -> AccelResult<()> {
        self.require_local(context)?;
        debug!("Unpacking {} into {}", archive.display(), destination.display());

        let (archive, destination): (PathBuf, PathBuf) = (archive.into(), destination.into());
        let label = format!("unpacking {}", archive.display());
        run_blocking(label, move || Self::unpack_blocking(&archive, &destination)).await
    }

    fn name(&self) -> &'static str {
        "native-tar"
    }
}

/// Codec that runs the `tar` program through the context
#[derive(Debug, Clone, Copy, Default)]
pub struct TarCommand;

impl TarCommand {
    fn pack_invocation(source: &Path, archive: &Path) -> Invocation {
        Invocation::new("tar").args([
            "-cf".to_string(),
            archive.display().to_string(),
            "-C".to_string(),
            source.display().to_string(),
            ".".to_string(),
        ])
    }

    fn unpack_invocation(archive: &Path, destination: &Path) -> Invocation {
        Invocation::new("tar").args([
            "-xf".to_string(),
            archive.display().to_string(),
            "-C".to_string(),
            destination.display().to_string(),
        ])
    }
}

#[async_trait]
impl ArchiveCodec for TarCommand {
    async fn pack(
        &self,
        context: &dyn ExecutionContext,
        source: &Path,
        archive: &Path,
    ) -> AccelResult<()> {
        context
            .run_checked(&Self::pack_invocation(source, archive))
            .await
    }

    async fn unpack(
        &self,
        context: &dyn ExecutionContext,
        archive: &Path,
        destination: &Path,
    ) -> AccelResult<()> {
        context
            .run_checked(&Self::unpack_invocation(archive, destination))
            .await
    }

    fn name(&self) -> &'static str {
        "tar-command"
    }
}
