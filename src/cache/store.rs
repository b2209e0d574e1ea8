//! Content-addressed archive store
//!
//! Maps fingerprints to tar archives in a flat cache directory. Archives are
//! only ever replaced through [`atomic_write`], so concurrent readers never
//! observe a partially written archive.

use crate::cache::archive::ArchiveCodec;
use crate::cache::atomic::atomic_write;
use crate::cache::fingerprint::{Fingerprint, FINGERPRINT_LEN, METADATA_EXTENSION};
use crate::cache::metadata::{CacheMetadata, MetadataStore};
use crate::clock::Clock;
use crate::context::{EntryKind, ExecutionContext};
use crate::error::{AccelError, AccelResult};
use regex::Regex;
use serde_json::Map;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

/// Directory entry names recognised as cache archives, in any case
static ARCHIVE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{40}\.tar$").expect("archive pattern is a valid regex")
});

/// Whether a directory entry name is a cache archive
pub fn is_archive_name(name: &str) -> bool {
    ARCHIVE_PATTERN.is_match(name)
}

/// An archive found in the cache directory
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    /// Archive file name as found on disk
    pub archive_name: String,
}

impl CacheEntry {
    /// Entry under the name [`CacheStore::store`] writes
    pub fn canonical(fingerprint: &Fingerprint) -> Self {
        Self {
            archive_name: fingerprint.archive_name(),
            fingerprint: fingerprint.clone(),
        }
    }

    /// Name of the sibling metadata record, keeping the archive's stem
    pub fn metadata_name(&self) -> String {
        let stem = self
            .archive_name
            .get(..FINGERPRINT_LEN)
            .unwrap_or(self.fingerprint.as_str());
        format!("{}.{}", stem, METADATA_EXTENSION)
    }
}

/// Fingerprint-addressed archive store in one cache directory
#[derive(Clone)]
pub struct CacheStore {
    root: PathBuf,
    context: Arc<dyn ExecutionContext>,
    codec: Arc<dyn ArchiveCodec>,
    metadata: MetadataStore,
}

impl CacheStore {
    /// Create a store rooted at `root`; the directory is created lazily on
    /// the first store
    pub fn new(
        root: impl Into<PathBuf>,
        context: Arc<dyn ExecutionContext>,
        codec: Arc<dyn ArchiveCodec>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let root = root.into();
        let metadata = MetadataStore::new(root.clone(), context.clone(), clock);
        Self {
            root,
            context,
            codec,
            metadata,
        }
    }

    /// The cache directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Metadata records of this store
    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// Context used for all I/O
    pub fn context(&self) -> &dyn ExecutionContext {
        &*self.context
    }

    /// Path of the archive for `fingerprint`
    pub fn archive_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(fingerprint.archive_name())
    }

    /// Whether an archive exists for `fingerprint`
    pub async fn exists(&self, fingerprint: &Fingerprint) -> AccelResult<bool> {
        self.context.is_file(&self.archive_path(fingerprint)).await
    }

    /// Unpack the archive for `fingerprint` into `destination`
    ///
    /// `destination` is emptied first. Returns [`AccelError::NotFound`]
    /// without touching `destination` when there is no archive, and
    /// [`AccelError::CorruptArchive`] when unpacking fails; in the latter case
    /// `destination` holds an unknown subset of the archive.
    pub async fn retrieve(&self, fingerprint: &Fingerprint, destination: &Path) -> AccelResult<()> {
        let archive = self.archive_path(fingerprint);
        if !self.exists(fingerprint).await? {
            return Err(AccelError::NotFound {
                fingerprint: fingerprint.to_string(),
            });
        }

        info!("Installing from cache ({})", archive.display());
        clear_directory(&*self.context, destination).await?;

        self.codec
            .unpack(&*self.context, &archive, destination)
            .await
            .map_err(|e| AccelError::CorruptArchive {
                fingerprint: fingerprint.to_string(),
                reason: e.to_string(),
            })?;

        if let Err(e) = self.metadata.touch(fingerprint, Map::new()).await {
            warn!("Retrieved {} but could not record the access: {}", fingerprint, e);
        }
        Ok(())
    }

    /// Pack `source` into the archive for `fingerprint`
    ///
    /// The archive is written under a temporary name and renamed into place,
    /// so a failed pack leaves the cache as it was. If the metadata record
    /// cannot be written afterwards the renamed archive stays: it may be the
    /// one a concurrent store put there, and an entry without metadata is
    /// still valid.
    pub async fn store(&self, fingerprint: &Fingerprint, source: &Path) -> AccelResult<()> {
        let archive = self.archive_path(fingerprint);
        info!("Adding to cache ({})", archive.display());

        let archive_error = |e: AccelError| AccelError::ArchiveWriteError {
            fingerprint: fingerprint.to_string(),
            source: Box::new(e),
        };

        self.context
            .create_dir_all(&self.root)
            .await
            .map_err(archive_error)?;

        let context = &*self.context;
        let codec = &*self.codec;
        atomic_write(context, &archive, |temporary| async move {
            codec.pack(context, source, &temporary).await
        })
        .await
        .map_err(archive_error)?;

        self.metadata.touch(fingerprint, Map::new()).await?;
        Ok(())
    }

    /// Archives currently in the cache directory
    ///
    /// Each call rescans the directory. Only regular files named
    /// `<40 hex chars>.tar` (in any case) are reported.
    pub async fn entries(&self) -> AccelResult<impl Iterator<Item = CacheEntry>> {
        let entries = self.context.list_entries(&self.root).await?;
        Ok(entries.into_iter().filter_map(|entry| {
            if entry.kind != EntryKind::File || !is_archive_name(&entry.name) {
                return None;
            }
            let fingerprint = entry.name.get(..FINGERPRINT_LEN)?.parse().ok()?;
            Some(CacheEntry {
                fingerprint,
                archive_name: entry.name,
            })
        }))
    }

    /// Fingerprints of all archives currently in the cache directory
    pub async fn list_entries(&self) -> AccelResult<impl Iterator<Item = Fingerprint>> {
        Ok(self.entries().await?.map(|entry| entry.fingerprint))
    }

    /// Metadata record of an archive found by [`entries`](Self::entries)
    pub async fn entry_metadata(&self, entry: &CacheEntry) -> CacheMetadata {
        self.metadata
            .read_path(&self.root.join(entry.metadata_name()))
            .await
    }

    /// Delete the archive and metadata of `fingerprint`
    ///
    /// Files that are already gone count as removed. Returns whether the
    /// archive existed.
    pub async fn remove(&self, fingerprint: &Fingerprint) -> AccelResult<bool> {
        self.remove_entry(&CacheEntry::canonical(fingerprint)).await
    }

    /// Delete an archive under its on-disk name, and its metadata record
    pub async fn remove_entry(&self, entry: &CacheEntry) -> AccelResult<bool> {
        let archive = self.root.join(&entry.archive_name);
        debug!("Removing archive from cache: {}", archive.display());
        let existed = self.context.remove_file(&archive).await?;
        self.context
            .remove_file(&self.root.join(entry.metadata_name()))
            .await?;
        Ok(existed)
    }

    /// Delete every entry, returning the number of archives removed
    pub async fn clear(&self) -> AccelResult<usize> {
        let mut removed = 0;
        for entry in self.entries().await? {
            if self.remove_entry(&entry).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Make sure `directory` exists and is empty
pub async fn clear_directory(context: &dyn ExecutionContext, directory: &Path) -> AccelResult<()> {
    if context.is_directory(directory).await? {
        debug!("Clearing directory contents ({})", directory.display());
        context.remove_all(directory).await?;
    } else {
        debug!("Creating directory ({})", directory.display());
    }
    context.create_dir_all(directory).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::archive::NativeTar;
    use crate::clock::ManualClock;
    use crate::context::LocalContext;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn fp(c: char) -> Fingerprint {
        c.to_string().repeat(40).parse().unwrap()
    }

    fn new_store(root: &Path) -> (CacheStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = CacheStore::new(
            root,
            Arc::new(LocalContext::new()),
            Arc::new(NativeTar),
            clock.clone(),
        );
        (store, clock)
    }

    fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
        for (name, content) in files {
            let path = root.join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
    }

    fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
        walkdir::WalkDir::new(root)
            .into_iter()
            .map(|e| e.unwrap())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let rel = e.path().strip_prefix(root).unwrap().to_string_lossy().into_owned();
                (rel, std::fs::read(e.path()).unwrap())
            })
            .collect()
    }

    #[test]
    fn archive_pattern() {
        assert!(is_archive_name(&format!("{}.tar", "a".repeat(40))));
        assert!(is_archive_name(&format!("{}.TAR", "A".repeat(40))));
        assert!(!is_archive_name(&format!("{}.json", "a".repeat(40))));
        assert!(!is_archive_name(&format!("{}.tar", "a".repeat(39))));
        assert!(!is_archive_name(&format!("{}.tar-0badc0de", "a".repeat(40))));
        assert!(!is_archive_name(&format!("x{}.tar", "a".repeat(40))));
    }

    #[tokio::test]
    async fn store_then_retrieve_round_trips() {
        let temp = TempDir::new().unwrap();
        let (store, _clock) = new_store(&temp.path().join("cache"));
        let source = temp.path().join("project/node_modules");
        write_tree(
            &source,
            &[
                ("left-pad/index.js", b"module.exports = pad;\n"),
                ("left-pad/package.json", br#"{"version":"1.0.0"}"#),
                ("@scope/pkg/deep/nested/file.bin", &[0, 1, 2, 255]),
            ],
        );

        store.store(&fp('a'), &source).await.unwrap();
        assert!(store.exists(&fp('a')).await.unwrap());

        let dest = temp.path().join("other/node_modules");
        store.retrieve(&fp('a'), &dest).await.unwrap();
        assert_eq!(snapshot(&source), snapshot(&dest));
    }

    #[tokio::test]
    async fn retrieve_replaces_existing_contents() {
        let temp = TempDir::new().unwrap();
        let (store, _clock) = new_store(&temp.path().join("cache"));
        let source = temp.path().join("src");
        write_tree(&source, &[("a.js", b"a")]);
        store.store(&fp('a'), &source).await.unwrap();

        let dest = temp.path().join("dest");
        write_tree(&dest, &[("stale.js", b"old")]);
        store.retrieve(&fp('a'), &dest).await.unwrap();

        assert_eq!(snapshot(&dest), snapshot(&source));
    }

    #[tokio::test]
    async fn retrieve_miss_is_not_destructive() {
        let temp = TempDir::new().unwrap();
        let (store, _clock) = new_store(&temp.path().join("cache"));
        let dest = temp.path().join("dest");
        write_tree(&dest, &[("keep.js", b"keep")]);

        let err = store.retrieve(&fp('b'), &dest).await.unwrap_err();

        assert!(matches!(err, AccelError::NotFound { .. }));
        assert_eq!(std::fs::read(dest.join("keep.js")).unwrap(), b"keep");
        assert!(!store.exists(&fp('b')).await.unwrap());
        assert!(!store.metadata().path(&fp('b')).exists());
        assert_eq!(store.list_entries().await.unwrap().count(), 0);
    }

    #[tokio::test]
    async fn retrieve_corrupt_archive_reports_corruption() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("cache");
        let (store, _clock) = new_store(&root);
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(store.archive_path(&fp('c')), vec![b'x'; 2048]).unwrap();

        let err = store
            .retrieve(&fp('c'), &temp.path().join("dest"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccelError::CorruptArchive { .. }));
        assert!(err.is_cache_miss());
    }

    #[tokio::test]
    async fn store_and_retrieve_update_metadata() {
        let temp = TempDir::new().unwrap();
        let (store, clock) = new_store(&temp.path().join("cache"));
        let source = temp.path().join("src");
        write_tree(&source, &[("a.js", b"a")]);

        store.store(&fp('a'), &source).await.unwrap();
        clock.advance(60);
        store.retrieve(&fp('a'), &temp.path().join("dest")).await.unwrap();

        let record = store.metadata().read(&fp('a')).await;
        assert_eq!(record.date_created, Some(1_000));
        assert_eq!(record.last_accessed, Some(1_060));
        assert_eq!(record.cache_hits, 2);
    }

    #[tokio::test]
    async fn entry_without_metadata_is_still_retrievable() {
        let temp = TempDir::new().unwrap();
        let (store, _clock) = new_store(&temp.path().join("cache"));
        let source = temp.path().join("src");
        write_tree(&source, &[("a.js", b"a")]);
        store.store(&fp('a'), &source).await.unwrap();
        std::fs::remove_file(store.metadata().path(&fp('a'))).unwrap();

        store.retrieve(&fp('a'), &temp.path().join("dest")).await.unwrap();
        assert_eq!(store.metadata().read(&fp('a')).await.cache_hits, 1);
    }

    #[tokio::test]
    async fn failed_store_leaves_no_trace() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("cache");
        let (store, _clock) = new_store(&root);

        let err = store
            .store(&fp('a'), &temp.path().join("does-not-exist"))
            .await
            .unwrap_err();

        assert!(matches!(err, AccelError::ArchiveWriteError { .. }));
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn list_entries_ignores_unrelated_files() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("cache");
        let (store, _clock) = new_store(&root);
        let source = temp.path().join("src");
        write_tree(&source, &[("a.js", b"a")]);
        store.store(&fp('a'), &source).await.unwrap();
        store.store(&fp('b'), &source).await.unwrap();

        std::fs::write(root.join("README"), b"hi").unwrap();
        std::fs::write(root.join(format!("{}.tar-1234", "c".repeat(40))), b"").unwrap();
        std::fs::create_dir(root.join(format!("{}.tar", "d".repeat(40)))).unwrap();
        std::fs::write(root.join(format!("{}.TAR", "E".repeat(40))), b"").unwrap();

        let mut listed: Vec<String> = store
            .list_entries()
            .await
            .unwrap()
            .map(|f| f.to_string())
            .collect();
        listed.sort();
        assert_eq!(listed, vec!["a".repeat(40), "b".repeat(40), "e".repeat(40)]);
    }

    #[tokio::test]
    async fn list_entries_of_missing_root_is_empty() {
        let temp = TempDir::new().unwrap();
        let (store, _clock) = new_store(&temp.path().join("never-created"));
        assert_eq!(store.list_entries().await.unwrap().count(), 0);
    }

    #[tokio::test]
    async fn remove_tolerates_missing_files() {
        let temp = TempDir::new().unwrap();
        let (store, _clock) = new_store(&temp.path().join("cache"));
        let source = temp.path().join("src");
        write_tree(&source, &[("a.js", b"a")]);
        store.store(&fp('a'), &source).await.unwrap();

        assert!(store.remove(&fp('a')).await.unwrap());
        assert!(!store.remove(&fp('a')).await.unwrap());
        assert!(!store.metadata().path(&fp('a')).exists());
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let temp = TempDir::new().unwrap();
        let (store, _clock) = new_store(&temp.path().join("cache"));
        let source = temp.path().join("src");
        write_tree(&source, &[("a.js", b"a")]);
        for c in ['a', 'b', 'c'] {
            store.store(&fp(c), &source).await.unwrap();
        }

        assert_eq!(store.clear().await.unwrap(), 3);
        assert_eq!(store.list_entries().await.unwrap().count(), 0);
    }

    #[tokio::test]
    async fn failed_metadata_write_keeps_existing_archive() {
        let temp = TempDir::new().unwrap();
        let (store, _clock) = new_store(&temp.path().join("cache"));
        let source = temp.path().join("src");
        write_tree(&source, &[("a.js", b"a")]);
        store.store(&fp('c'), &source).await.unwrap();

        let record = store.metadata().path(&fp('c'));
        std::fs::remove_file(&record).unwrap();
        std::fs::create_dir_all(record.join("blocker")).unwrap();

        let err = store.store(&fp('c'), &source).await.unwrap_err();
        assert!(matches!(err, AccelError::MetadataWriteError { .. }));
        assert!(store.exists(&fp('c')).await.unwrap());

        let dest = temp.path().join("dest");
        store.retrieve(&fp('c'), &dest).await.unwrap();
        assert_eq!(snapshot(&dest), snapshot(&source));
    }

    #[tokio::test]
    async fn entries_keep_on_disk_names() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("cache");
        let (store, _clock) = new_store(&root);
        std::fs::create_dir_all(&root).unwrap();
        let upper = "A".repeat(40);
        std::fs::write(root.join(format!("{upper}.TAR")), b"").unwrap();
        std::fs::write(root.join(format!("{upper}.json")), br#"{"last-accessed": 9}"#).unwrap();

        let entries: Vec<CacheEntry> = store.entries().await.unwrap().collect();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.fingerprint, fp('a'));
        assert_eq!(entry.archive_name, format!("{upper}.TAR"));
        assert_eq!(store.entry_metadata(entry).await.last_accessed, Some(9));

        assert!(store.remove_entry(entry).await.unwrap());
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn clear_removes_uppercase_archives() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("cache");
        let (store, _clock) = new_store(&root);
        let source = temp.path().join("src");
        write_tree(&source, &[("a.js", b"a")]);
        store.store(&fp('b'), &source).await.unwrap();
        std::fs::write(root.join(format!("{}.TAR", "C".repeat(40))), b"").unwrap();

        assert_eq!(store.clear().await.unwrap(), 2);
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    }
}
