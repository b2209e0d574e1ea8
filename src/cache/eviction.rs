//! Least-recently-used eviction
//!
//! Keeps the number of cache entries at or below a limit by deleting the
//! entries with the oldest `last-accessed` time. Ties are broken by
//! fingerprint so the outcome does not depend on directory order.

use crate::cache::fingerprint::Fingerprint;
use crate::cache::store::{CacheEntry, CacheStore};
use crate::error::AccelResult;
use std::num::NonZeroUsize;
use tracing::{debug, info, warn};

/// Default maximum number of archives kept in the cache
pub const DEFAULT_CACHE_LIMIT: NonZeroUsize = match NonZeroUsize::new(20) {
    Some(limit) => limit,
    None => unreachable!(),
};

/// Outcome of one eviction pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Entries found before eviction
    pub examined: usize,
    /// Entries deleted (including ones another process deleted first)
    pub removed: Vec<Fingerprint>,
    /// Entries that could not be deleted
    pub failed: Vec<Fingerprint>,
}

impl EvictionReport {
    /// Entries left in the cache
    pub fn retained(&self) -> usize {
        self.examined - self.removed.len()
    }
}

/// Trims a [`CacheStore`] to a maximum entry count
pub struct EvictionPolicy<'a> {
    store: &'a CacheStore,
}

impl<'a> EvictionPolicy<'a> {
    pub fn new(store: &'a CacheStore) -> Self {
        Self { store }
    }

    /// Entries ordered oldest first by `(last-accessed, fingerprint)`
    pub async fn ranked_entries(&self) -> AccelResult<Vec<(i64, CacheEntry)>> {
        let mut entries = Vec::new();
        for entry in self.store.entries().await? {
            let last_accessed = self
                .store
                .entry_metadata(&entry)
                .await
                .last_accessed_or_zero();
            entries.push((last_accessed, entry));
        }
        entries.sort();
        Ok(entries)
    }

    /// Delete the oldest entries beyond `limit`
    ///
    /// A failure to delete one entry is logged and recorded in the report;
    /// the remaining deletions still run.
    pub async fn enforce(&self, limit: NonZeroUsize) -> AccelResult<EvictionReport> {
        let entries = self.ranked_entries().await?;
        let excess = entries.len().saturating_sub(limit.get());
        let mut report = EvictionReport {
            examined: entries.len(),
            ..Default::default()
        };

        if excess == 0 {
            debug!(
                "Cache holds {} of at most {} archives, nothing to evict",
                entries.len(),
                limit
            );
            return Ok(report);
        }

        for (last_accessed, entry) in entries.into_iter().take(excess) {
            debug!(archive = %entry.archive_name, last_accessed, "Evicting cache entry");
            match self.store.remove_entry(&entry).await {
                Ok(_) => report.removed.push(entry.fingerprint),
                Err(e) => {
                    warn!("Failed to evict {}: {}", entry.archive_name, e);
                    report.failed.push(entry.fingerprint);
                }
            }
        }

        info!(
            "Removed {} archive(s) from cache ({} kept)",
            report.removed.len(),
            report.retained()
        );
        Ok(report)
    }
}
