//! Data structures for scan checkpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Current version of the checkpoint file format.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Metadata key recording the digest algorithm used for stored hashes.
pub const META_HASH_ALGORITHM: &str = "hash_algorithm";

/// Last-seen state of one processed path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    /// Size in bytes when processed.
    pub size: u64,
    /// Modification time (Unix seconds) when processed.
    pub modified: i64,
    /// Content digest, if the file was hashed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl FileMeta {
    /// Create metadata without a digest.
    #[must_use]
    pub fn new(size: u64, modified: i64) -> Self {
        Self {
            size,
            modified,
            hash: None,
        }
    }

    /// Attach a digest.
    #[must_use]
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    /// Whether a file with this size and mtime is unchanged since processing.
    #[must_use]
    pub fn matches(&self, size: u64, modified: i64) -> bool {
        self.size == size && self.modified == modified
    }
}

/// Persisted "already processed" state for one scan root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Scan root this checkpoint belongs to.
    pub scan_path: PathBuf,
    /// Processed paths and their last-seen metadata.
    pub processed_files: BTreeMap<PathBuf, FileMeta>,
    /// When the checkpoint was last written.
    pub timestamp: DateTime<Utc>,
    /// Free-form caller metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Checkpoint {
    /// Create a checkpoint stamped with the current time.
    #[must_use]
    pub fn new(
        scan_path: PathBuf,
        processed_files: BTreeMap<PathBuf, FileMeta>,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            scan_path,
            processed_files,
            timestamp: Utc::now(),
            metadata,
        }
    }

    /// Whether `path` has been processed.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.processed_files.contains_key(path)
    }

    /// Metadata recorded for `path`.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&FileMeta> {
        self.processed_files.get(path)
    }

    /// Digest algorithm recorded in the metadata, if any.
    #[must_use]
    pub fn hash_algorithm(&self) -> Option<&str> {
        self.metadata.get(META_HASH_ALGORITHM).and_then(|v| v.as_str())
    }

    /// Number of processed paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.processed_files.len()
    }

    /// Check if no paths have been processed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processed_files.is_empty()
    }
}
