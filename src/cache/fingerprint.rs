//! Dependency fingerprints used as cache keys
//!
//! A fingerprint is the SHA1 digest of the sorted dependency set followed by
//! the toolchain version strings. Same dependencies + same toolchain = same
//! cache entry.

use crate::error::AccelError;
use serde_json::Value;
use sha1::{Digest, Sha1};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Length of a fingerprint in hex characters
pub const FINGERPRINT_LEN: usize = 40;

/// File extension of cache archives
pub const ARCHIVE_EXTENSION: &str = "tar";

/// File extension of cache metadata records
pub const METADATA_EXTENSION: &str = "json";

/// A 40 character hexadecimal cache key, always lowercase
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a dependency set and toolchain versions
    ///
    /// Dependencies are sorted by name first, so iteration order of the
    /// input does not matter. Toolchain versions are hashed in the order
    /// given; callers must keep that order fixed.
    pub fn compute<I, K, V, T>(dependencies: I, toolchain: &[T]) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
        T: AsRef<str>,
    {
        let mut pairs: Vec<(String, String)> = dependencies
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
            .collect();
        pairs.sort();

        let canonical = Value::from(
            pairs
                .iter()
                .map(|(name, version)| Value::from(vec![name.as_str(), version.as_str()]))
                .collect::<Vec<_>>(),
        )
        .to_string();

        let mut hasher = Sha1::new();
        hasher.update(canonical.as_bytes());
        for version in toolchain {
            // Separator keeps ["ab", "c"] and ["a", "bc"] apart
            hasher.update([0u8]);
            hasher.update(version.as_ref().as_bytes());
        }

        let fingerprint = Self(hex::encode(hasher.finalize()));
        debug!(
            dependencies = pairs.len(),
            %fingerprint,
            "Computed cache key"
        );
        fingerprint
    }

    /// Whether `name` looks like a fingerprint (either case)
    pub fn is_valid(name: &str) -> bool {
        name.len() == FINGERPRINT_LEN && name.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// The fingerprint as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the archive file for this fingerprint
    pub fn archive_name(&self) -> String {
        format!("{}.{}", self.0, ARCHIVE_EXTENSION)
    }

    /// Name of the metadata file for this fingerprint
    pub fn metadata_name(&self) -> String {
        format!("{}.{}", self.0, METADATA_EXTENSION)
    }
}

impl FromStr for Fingerprint {
    type Err = AccelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if Self::is_valid(s) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(AccelError::InvalidFingerprint(s.to_string()))
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
