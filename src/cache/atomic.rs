//! Atomic file replacement
//!
//! Content is written to a uniquely named temporary file next to the target
//! and then renamed onto it. Readers of the target see either the old or the
//! new content, never a partial write.

use crate::context::ExecutionContext;
use crate::error::{AccelError, AccelResult};
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Temporary path in the same directory as `target`
///
/// Format: `<file name>-<uuid>`. The random suffix keeps concurrent writers
/// of the same target apart, and the result never matches the archive
/// discovery pattern.
pub fn temporary_path(target: &Path) -> AccelResult<PathBuf> {
    let file_name = target.file_name().ok_or_else(|| {
        AccelError::Internal(format!("{} has no file name", target.display()))
    })?;
    let mut name = file_name.to_os_string();
    name.push(format!("-{}", Uuid::new_v4().simple()));
    Ok(target.with_file_name(name))
}

/// Replace `target` atomically with whatever `write` puts in the temporary
/// file it is handed
///
/// On success the temporary file is renamed onto `target`. If `write` or the
/// rename fails the temporary file is removed and `target` is untouched.
pub async fn atomic_write<F, Fut>(
    context: &dyn ExecutionContext,
    target: &Path,
    write: F,
) -> AccelResult<()>
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = AccelResult<()>>,
{
    let temporary = temporary_path(target)?;
    debug!("Writing {} via {}", target.display(), temporary.display());

    let result = match write(temporary.clone()).await {
        Ok(()) => context.rename(&temporary, target).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        if let Err(cleanup) = context.remove_file(&temporary).await {
            warn!(
                "Failed to remove temporary file {}: {}",
                temporary.display(),
                cleanup
            );
        }
        return Err(e);
    }

    Ok(())
}
