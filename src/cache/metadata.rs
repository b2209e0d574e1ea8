//! Per-entry cache metadata
//!
//! Each archive `<fingerprint>.tar` has a sibling `<fingerprint>.json`:
//!
//! ```json
//! {"date-created": 1700000000, "last-accessed": 1700000100, "cache-hits": 3}
//! ```
//!
//! Metadata is advisory. A missing or unreadable record reads as the default
//! record and never fails a cache operation.

use crate::cache::atomic::atomic_write;
use crate::cache::fingerprint::Fingerprint;
use crate::clock::Clock;
use crate::context::ExecutionContext;
use crate::error::{AccelError, AccelResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Metadata record keys
pub mod keys {
    /// Unix time the entry was first stored
    pub const DATE_CREATED: &str = "date-created";
    /// Unix time of the latest store or retrieval
    pub const LAST_ACCESSED: &str = "last-accessed";
    /// Number of stores and retrievals
    pub const CACHE_HITS: &str = "cache-hits";
}

/// Typed view of a metadata record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    #[serde(rename = "date-created", default, skip_serializing_if = "Option::is_none")]
    pub date_created: Option<i64>,

    #[serde(rename = "last-accessed", default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<i64>,

    #[serde(rename = "cache-hits", default)]
    pub cache_hits: u64,

    /// Any other keys found in the record
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CacheMetadata {
    /// Last access time, 0 when unknown
    pub fn last_accessed_or_zero(&self) -> i64 {
        self.last_accessed.unwrap_or(0)
    }
}

/// Reads and updates metadata records in a cache directory
#[derive(Clone)]
pub struct MetadataStore {
    root: PathBuf,
    context: Arc<dyn ExecutionContext>,
    clock: Arc<dyn Clock>,
}

impl MetadataStore {
    pub fn new(
        root: impl Into<PathBuf>,
        context: Arc<dyn ExecutionContext>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            root: root.into(),
            context,
            clock,
        }
    }

    /// Path of the metadata record for `fingerprint`
    pub fn path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(fingerprint.metadata_name())
    }

    /// Load the record for `fingerprint`, falling back to defaults
    pub async fn read(&self, fingerprint: &Fingerprint) -> CacheMetadata {
        self.read_path(&self.path(fingerprint)).await
    }

    /// Load the record stored at `path`, falling back to defaults
    pub async fn read_path(&self, path: &Path) -> CacheMetadata {
        let raw = self.read_raw(path).await;
        match serde_json::from_value(Value::Object(raw)) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Ignoring corrupt cache metadata {}: {}", path.display(), e);
                CacheMetadata::default()
            }
        }
    }

    /// Record a store or an access of `fingerprint`
    ///
    /// Merges `overrides` into the current record, sets `date-created` if it
    /// is missing, stamps `last-accessed` with the current time and bumps
    /// `cache-hits`. The record is replaced atomically.
    pub async fn touch(
        &self,
        fingerprint: &Fingerprint,
        overrides: Map<String, Value>,
    ) -> AccelResult<CacheMetadata> {
        let path = self.path(fingerprint);
        let mut record = self.read_raw(&path).await;
        debug!(
            "{} metadata file ({})",
            if record.is_empty() { "Creating" } else { "Updating" },
            path.display()
        );

        record.extend(overrides);
        let now = self.clock.now();
        if !record.contains_key(keys::DATE_CREATED) {
            record.insert(keys::DATE_CREATED.to_string(), Value::from(now));
        }
        record.insert(keys::LAST_ACCESSED.to_string(), Value::from(now));
        let hits = record
            .get(keys::CACHE_HITS)
            .and_then(Value::as_u64)
            .unwrap_or(0);
        record.insert(keys::CACHE_HITS.to_string(), Value::from(hits.saturating_add(1)));

        let document = Value::Object(record);
        let bytes = serde_json::to_vec(&document)?;
        let context = &*self.context;
        atomic_write(context, &path, |temporary| async move {
            context.write_file(&temporary, &bytes).await
        })
        .await
        .map_err(|e| AccelError::MetadataWriteError {
            fingerprint: fingerprint.to_string(),
            source: Box::new(e),
        })?;

        Ok(serde_json::from_value(document).unwrap_or_default())
    }

    /// Raw JSON object of a record; empty when missing or corrupt
    async fn read_raw(&self, path: &Path) -> Map<String, Value> {
        match self.context.is_file(path).await {
            Ok(true) => {}
            Ok(false) => return Map::new(),
            Err(e) => {
                warn!("Cannot inspect cache metadata {}: {}", path.display(), e);
                return Map::new();
            }
        }

        let bytes = match self.context.read_file(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cannot read cache metadata {}: {}", path.display(), e);
                return Map::new();
            }
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                warn!(
                    "Ignoring cache metadata {}: expected an object, found {}",
                    path.display(),
                    other
                );
                Map::new()
            }
            Err(e) => {
                warn!("Ignoring corrupt cache metadata {}: {}", path.display(), e);
                Map::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::context::LocalContext;
    use serde_json::json;
    use tempfile::TempDir;

    fn fp(c: char) -> Fingerprint {
        c.to_string().repeat(40).parse().unwrap()
    }

    fn store(dir: &Path, clock: Arc<ManualClock>) -> MetadataStore {
        MetadataStore::new(dir, Arc::new(LocalContext::new()), clock)
    }

    #[tokio::test]
    async fn missing_record_reads_as_default() {
        let temp = TempDir::new().unwrap();
        let metadata = store(temp.path(), Arc::new(ManualClock::new(0)));
        assert_eq!(metadata.read(&fp('a')).await, CacheMetadata::default());
    }

    #[tokio::test]
    async fn corrupt_record_reads_as_default() {
        let temp = TempDir::new().unwrap();
        let metadata = store(temp.path(), Arc::new(ManualClock::new(0)));

        for garbage in [&b"{not json"[..], b"[1, 2, 3]", br#"{"last-accessed": "yesterday"}"#] {
            std::fs::write(metadata.path(&fp('a')), garbage).unwrap();
            assert_eq!(metadata.read(&fp('a')).await, CacheMetadata::default());
        }
    }

    #[tokio::test]
    async fn first_touch_creates_record() {
        let temp = TempDir::new().unwrap();
        let metadata = store(temp.path(), Arc::new(ManualClock::new(100)));

        let record = metadata.touch(&fp('a'), Map::new()).await.unwrap();

        assert_eq!(record.date_created, Some(100));
        assert_eq!(record.last_accessed, Some(100));
        assert_eq!(record.cache_hits, 1);

        let on_disk: Value =
            serde_json::from_slice(&std::fs::read(metadata.path(&fp('a'))).unwrap()).unwrap();
        assert_eq!(
            on_disk,
            json!({"date-created": 100, "last-accessed": 100, "cache-hits": 1})
        );
    }

    #[tokio::test]
    async fn later_touch_keeps_creation_time() {
        let temp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(100));
        let metadata = store(temp.path(), clock.clone());

        metadata.touch(&fp('a'), Map::new()).await.unwrap();
        clock.set(250);
        metadata.touch(&fp('a'), Map::new()).await.unwrap();

        let record = metadata.read(&fp('a')).await;
        assert_eq!(record.date_created, Some(100));
        assert_eq!(record.last_accessed, Some(250));
        assert_eq!(record.cache_hits, 2);
    }

    #[tokio::test]
    async fn overrides_are_merged_and_preserved() {
        let temp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(5));
        let metadata = store(temp.path(), clock.clone());

        let mut overrides = Map::new();
        overrides.insert("installer".to_string(), json!("yarn"));
        metadata.touch(&fp('b'), overrides).await.unwrap();
        clock.advance(1);
        metadata.touch(&fp('b'), Map::new()).await.unwrap();

        let record = metadata.read(&fp('b')).await;
        assert_eq!(record.extra.get("installer"), Some(&json!("yarn")));
        assert_eq!(record.cache_hits, 2);
    }

    #[tokio::test]
    async fn overridden_creation_time_wins() {
        let temp = TempDir::new().unwrap();
        let metadata = store(temp.path(), Arc::new(ManualClock::new(500)));

        let mut overrides = Map::new();
        overrides.insert(keys::DATE_CREATED.to_string(), json!(42));
        let record = metadata.touch(&fp('c'), overrides).await.unwrap();

        assert_eq!(record.date_created, Some(42));
        assert_eq!(record.last_accessed, Some(500));
    }

    #[tokio::test]
    async fn touch_recovers_from_corrupt_record() {
        let temp = TempDir::new().unwrap();
        let metadata = store(temp.path(), Arc::new(ManualClock::new(7)));
        std::fs::write(metadata.path(&fp('d')), b"\x00\x01garbage").unwrap();

        let record = metadata.touch(&fp('d'), Map::new()).await.unwrap();
        assert_eq!(record.cache_hits, 1);
        assert_eq!(record.date_created, Some(7));
    }

    #[tokio::test]
    async fn hit_count_saturates() {
        let temp = TempDir::new().unwrap();
        let metadata = store(temp.path(), Arc::new(ManualClock::new(3)));
        std::fs::write(
            metadata.path(&fp('f')),
            format!(r#"{{"cache-hits": {}}}"#, u64::MAX),
        )
        .unwrap();

        let record = metadata.touch(&fp('f'), Map::new()).await.unwrap();
        assert_eq!(record.cache_hits, u64::MAX);
    }

    #[tokio::test]
    async fn touch_into_missing_directory_fails_with_metadata_error() {
        let temp = TempDir::new().unwrap();
        let metadata = store(&temp.path().join("absent"), Arc::new(ManualClock::new(1)));

        let err = metadata.touch(&fp('e'), Map::new()).await.unwrap_err();
        assert!(matches!(err, AccelError::MetadataWriteError { .. }));
    }
}
