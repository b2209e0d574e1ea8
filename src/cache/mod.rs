//! Content-addressed cache of installed `node_modules` trees
//!
//! Each entry is a tar archive keyed by a [`Fingerprint`] of the dependency
//! set and toolchain versions, plus a small JSON metadata record next to it.
//!
//! # Layout
//!
//! ```text
//! <cache directory>/
//!   <fingerprint>.tar    packed node_modules
//!   <fingerprint>.json   {"date-created", "last-accessed", "cache-hits"}
//! ```
//!
//! # Concurrency
//!
//! There is no locking. Archives and metadata are only replaced with an
//! atomic rename, so readers see either the old file or the new one.
//! Deleting an entry that another process already deleted is not an error.

pub mod archive;
pub mod atomic;
pub mod eviction;
pub mod fingerprint;
pub mod metadata;
pub mod store;

pub use archive::{codec_for, ArchiveCodec, NativeTar, TarCommand};
pub use atomic::atomic_write;
pub use eviction::{EvictionPolicy, EvictionReport, DEFAULT_CACHE_LIMIT};
pub use fingerprint::Fingerprint;
pub use metadata::{CacheMetadata, MetadataStore};
pub use store::{clear_directory, CacheEntry, CacheStore};
