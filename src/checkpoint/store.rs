//! Checkpoint persistence.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::data::{Checkpoint, FileMeta, CHECKPOINT_VERSION};
use super::CheckpointError;
use crate::fs_util::atomic_write;

/// Envelope written to disk, carrying an integrity checksum.
#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    /// SHA256 checksum of the compact serialized checkpoint.
    checksum: String,
    checkpoint: &'a Checkpoint,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    checksum: String,
    checkpoint: Checkpoint,
}

fn checksum_of(checkpoint: &Checkpoint) -> Result<String, serde_json::Error> {
    // MUST use compact serialization on both the write and verify side
    let json = serde_json::to_string(checkpoint)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Reads and writes one checkpoint file per scan root inside a directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the checkpoint files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Canonical form of a scan root, falling back to the path as given.
    fn canonical_root(root: &Path) -> PathBuf {
        fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf())
    }

    /// Checkpoint file used for `root`.
    #[must_use]
    pub fn path_for(&self, root: &Path) -> PathBuf {
        let canonical = Self::canonical_root(root);
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string_lossy().as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        self.dir.join(format!("checkpoint-{}.json", &digest[..16]))
    }

    fn write(&self, root: &Path, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let path = self.path_for(root);
        let envelope = EnvelopeRef {
            version: CHECKPOINT_VERSION,
            checksum: checksum_of(checkpoint)?,
            checkpoint,
        };
        let json = serde_json::to_string_pretty(&envelope)?;

        let io_err = |source: io::Error| CheckpointError::Io {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(io_err)?;
        atomic_write(&path, json.as_bytes()).map_err(io_err)?;
        log::debug!(
            "Saved checkpoint for {} ({} entries) to {}",
            checkpoint.scan_path.display(),
            checkpoint.len(),
            path.display()
        );
        Ok(())
    }

    /// Write a checkpoint for `root`, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint cannot be serialized or written.
    pub fn save(
        &self,
        root: &Path,
        processed: BTreeMap<PathBuf, FileMeta>,
        metadata: Option<BTreeMap<String, serde_json::Value>>,
    ) -> Result<Checkpoint, CheckpointError> {
        let checkpoint = Checkpoint::new(
            Self::canonical_root(root),
            processed,
            metadata.unwrap_or_default(),
        );
        self.write(root, &checkpoint)?;
        Ok(checkpoint)
    }

    /// Load the checkpoint for `root`.
    ///
    /// Missing, unreadable, corrupt, tampered or foreign files all yield
    /// `None`; anything other than "missing" is logged as a warning.
    #[must_use]
    pub fn load(&self, root: &Path) -> Option<Checkpoint> {
        let path = self.path_for(root);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("No checkpoint at {}", path.display());
                return None;
            }
            Err(e) => {
                log::warn!("Cannot read checkpoint {}: {}", path.display(), e);
                return None;
            }
        };

        let envelope: Envelope = match serde_json::from_slice(&content) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::warn!("Ignoring corrupt checkpoint {}: {}", path.display(), e);
                return None;
            }
        };

        if envelope.version != CHECKPOINT_VERSION {
            log::warn!(
                "Ignoring checkpoint {} with unsupported version {}",
                path.display(),
                envelope.version
            );
            return None;
        }

        match checksum_of(&envelope.checkpoint) {
            Ok(sum) if sum == envelope.checksum => {}
            _ => {
                log::warn!("Ignoring checkpoint {}: checksum mismatch", path.display());
                return None;
            }
        }

        let expected_root = Self::canonical_root(root);
        if envelope.checkpoint.scan_path != expected_root {
            log::warn!(
                "Ignoring checkpoint {}: recorded for {}, not {}",
                path.display(),
                envelope.checkpoint.scan_path.display(),
                expected_root.display()
            );
            return None;
        }

        Some(envelope.checkpoint)
    }

    /// Paths from `all_paths` not yet recorded in the checkpoint, in input order.
    ///
    /// Without a checkpoint every path is returned.
    #[must_use]
    pub fn remaining(&self, root: &Path, all_paths: &[PathBuf]) -> Vec<PathBuf> {
        match self.load(root) {
            Some(checkpoint) => all_paths
                .iter()
                .filter(|p| !checkpoint.contains(p))
                .cloned()
                .collect(),
            None => all_paths.to_vec(),
        }
    }

    /// Merge `new_entries` into the checkpoint for `root` and refresh its timestamp.
    ///
    /// New entries overwrite existing metadata for the same path. A
    /// checkpoint is created if none exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the merged checkpoint cannot be written.
    pub fn update(
        &self,
        root: &Path,
        new_entries: BTreeMap<PathBuf, FileMeta>,
    ) -> Result<Checkpoint, CheckpointError> {
        let mut checkpoint = self.load(root).unwrap_or_else(|| {
            Checkpoint::new(Self::canonical_root(root), BTreeMap::new(), BTreeMap::new())
        });
        checkpoint.processed_files.extend(new_entries);
        checkpoint.timestamp = Utc::now();
        self.write(root, &checkpoint)?;
        Ok(checkpoint)
    }

    /// Remove the checkpoint for `root`, reporting whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be removed.
    pub fn cleanup(&self, root: &Path) -> Result<bool, CheckpointError> {
        let path = self.path_for(root);
        match fs::remove_file(&path) {
            Ok(()) => {
                log::info!("Removed checkpoint {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(CheckpointError::Io { path, source }),
        }
    }
}
