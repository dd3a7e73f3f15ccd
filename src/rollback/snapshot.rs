//! Pre-mutation file snapshots.
//!
//! A snapshot lives in `<root>/<id>/`: a `manifest.json` describing every
//! protected path plus one byte copy per existing file under `files/`.
//! Paths that did not exist when the snapshot was taken are recorded too,
//! so a restore can remove files an operation created.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{ProtectedError, RollbackError};
use crate::fs_util::{atomic_copy, atomic_write, short_id};
use crate::scanner::{Hasher, DEFAULT_BUFFER_SIZE};

const MANIFEST: &str = "manifest.json";
const FILES_DIR: &str = "files";

/// One protected path inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub original_path: PathBuf,
    /// Location of the byte copy; `None` if the path did not exist
    pub backup_path: Option<PathBuf>,
    /// Digest of the content at snapshot time
    pub hash: Option<String>,
    pub size: u64,
    pub existed: bool,
}

/// Handle to a set of backup copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub files: Vec<SnapshotFile>,
}

impl Snapshot {
    /// Backup copy recorded for `path`, if it existed at snapshot time.
    #[must_use]
    pub fn backup_for(&self, path: &Path) -> Option<&Path> {
        self.files
            .iter()
            .find(|f| f.original_path == path)
            .and_then(|f| f.backup_path.as_deref())
    }

    /// Digest recorded for `path`.
    #[must_use]
    pub fn hash_for(&self, path: &Path) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.original_path == path)
            .and_then(|f| f.hash.as_deref())
    }

    /// Total bytes held in backup copies.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Creates, restores and prunes snapshots under one directory.
#[derive(Debug, Clone)]
pub struct SnapshotManager {
    root: PathBuf,
    hasher: Hasher,
}

impl SnapshotManager {
    /// Create a manager storing snapshots under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            hasher: Hasher::new(),
        }
    }

    /// Directory holding all snapshots.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn snapshot_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Copy every path in `paths` aside and record its digest.
    ///
    /// Paths that do not exist are recorded with `existed = false`. On
    /// failure the partial snapshot is removed.
    ///
    /// # Errors
    ///
    /// Returns [`RollbackError::NotAFile`] for directories and I/O errors for
    /// unreadable files or an unwritable snapshot directory.
    pub fn create_snapshot(&self, paths: &[PathBuf]) -> Result<Snapshot, RollbackError> {
        let id = short_id();
        let dir = self.snapshot_dir(&id);

        match self.write_snapshot(&id, &dir, paths) {
            Ok(snapshot) => {
                log::info!(
                    "Created snapshot {} ({} files, {} bytes)",
                    snapshot.id,
                    snapshot.files.len(),
                    snapshot.total_size()
                );
                Ok(snapshot)
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir_all(&dir) {
                    if cleanup.kind() != io::ErrorKind::NotFound {
                        log::warn!("Cannot remove partial snapshot {}: {}", dir.display(), cleanup);
                    }
                }
                Err(e)
            }
        }
    }

    fn write_snapshot(&self, id: &str, dir: &Path, paths: &[PathBuf]) -> Result<Snapshot, RollbackError> {
        let files_dir = dir.join(FILES_DIR);
        fs::create_dir_all(&files_dir).map_err(|e| RollbackError::io(&files_dir, e))?;

        let mut files = Vec::with_capacity(paths.len());
        for (n, path) in paths.iter().enumerate() {
            let metadata = match fs::metadata(path) {
                Ok(m) => m,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    log::trace!("Snapshot: {} does not exist yet", path.display());
                    files.push(SnapshotFile {
                        original_path: path.clone(),
                        backup_path: None,
                        hash: None,
                        size: 0,
                        existed: false,
                    });
                    continue;
                }
                Err(e) => return Err(RollbackError::io(path, e)),
            };
            if !metadata.is_file() {
                return Err(RollbackError::NotAFile(path.clone()));
            }

            let backup = files_dir.join(n.to_string());
            let size = fs::copy(path, &backup).map_err(|e| RollbackError::io(path, e))?;
            let hash = self.digest(&backup)?;
            log::trace!("Snapshot: {} -> {}", path.display(), backup.display());
            files.push(SnapshotFile {
                original_path: path.clone(),
                backup_path: Some(backup),
                hash: Some(hash),
                size,
                existed: true,
            });
        }

        let snapshot = Snapshot {
            id: id.to_string(),
            timestamp: Utc::now(),
            files,
        };
        let manifest = dir.join(MANIFEST);
        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| RollbackError::serialize(&manifest, e))?;
        atomic_write(&manifest, &json).map_err(|e| RollbackError::io(&manifest, e))?;
        Ok(snapshot)
    }

    fn digest(&self, path: &Path) -> Result<String, RollbackError> {
        self.hasher
            .hash_file(path, DEFAULT_BUFFER_SIZE)
            .map_err(|e| RollbackError::io(path, io::Error::other(e)))
    }

    /// Put every protected path back into its snapshot state.
    ///
    /// Existing files are overwritten from their verified backup copy; paths
    /// that did not exist are removed. All paths are attempted even if one
    /// fails; the first error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`RollbackError::BackupCorrupted`] when a backup copy no
    /// longer matches its recorded digest, or an I/O error.
    pub fn restore_snapshot(&self, snapshot: &Snapshot) -> Result<usize, RollbackError> {
        let mut restored = 0;
        let mut first_error = None;

        for file in &snapshot.files {
            match self.restore_file(file) {
                Ok(()) => restored += 1,
                Err(e) => {
                    log::warn!("Failed to restore {}: {}", file.original_path.display(), e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                log::info!("Restored {} paths from snapshot {}", restored, snapshot.id);
                Ok(restored)
            }
        }
    }

    fn restore_file(&self, file: &SnapshotFile) -> Result<(), RollbackError> {
        let target = &file.original_path;
        let Some(backup) = file.backup_path.as_deref().filter(|_| file.existed) else {
            return match fs::remove_file(target) {
                Ok(()) => {
                    log::debug!("Removed {} (absent before snapshot)", target.display());
                    Ok(())
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(RollbackError::io(target, e)),
            };
        };

        if let Some(expected) = &file.hash {
            let actual = self.digest(backup)?;
            if &actual != expected {
                return Err(RollbackError::BackupCorrupted {
                    path: target.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        atomic_copy(backup, target).map_err(|e| RollbackError::io(target, e))?;
        log::debug!("Restored {}", target.display());
        Ok(())
    }

    /// Load a snapshot manifest by id.
    ///
    /// # Errors
    ///
    /// Returns [`RollbackError::SnapshotNotFound`] if no such snapshot exists.
    pub fn load_snapshot(&self, id: &str) -> Result<Snapshot, RollbackError> {
        if !is_valid_id(id) {
            return Err(RollbackError::SnapshotNotFound(id.to_string()));
        }
        let manifest = self.snapshot_dir(id).join(MANIFEST);
        let content = fs::read(&manifest).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => RollbackError::SnapshotNotFound(id.to_string()),
            _ => RollbackError::io(&manifest, e),
        })?;
        serde_json::from_slice(&content).map_err(|e| RollbackError::serialize(&manifest, e))
    }

    /// All readable snapshots, newest first. Unreadable ones are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the snapshot directory exists but cannot be listed.
    pub fn list_snapshots(&self) -> Result<Vec<Snapshot>, RollbackError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RollbackError::io(&self.root, e)),
        };

        let mut snapshots = Vec::new();
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            match self.load_snapshot(&id) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => log::warn!("Skipping unreadable snapshot {}: {}", id, e),
            }
        }
        snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(snapshots)
    }

    /// Delete a snapshot and its backup copies.
    ///
    /// # Errors
    ///
    /// Returns [`RollbackError::SnapshotNotFound`] if no such snapshot exists.
    pub fn delete_snapshot(&self, id: &str) -> Result<(), RollbackError> {
        if !is_valid_id(id) {
            return Err(RollbackError::SnapshotNotFound(id.to_string()));
        }
        let dir = self.snapshot_dir(id);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                log::debug!("Deleted snapshot {}", id);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(RollbackError::SnapshotNotFound(id.to_string()))
            }
            Err(e) => Err(RollbackError::io(&dir, e)),
        }
    }

    /// Delete every snapshot older than `max_age`, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot directory cannot be listed.
    pub fn prune_older_than(&self, max_age: Duration) -> Result<usize, RollbackError> {
        let cutoff = Utc::now() - max_age;
        let mut removed = 0;
        for snapshot in self.list_snapshots()? {
            if snapshot.timestamp < cutoff {
                match self.delete_snapshot(&snapshot.id) {
                    Ok(()) => removed += 1,
                    Err(e) => log::warn!("Cannot prune snapshot {}: {}", snapshot.id, e),
                }
            }
        }
        if removed > 0 {
            log::info!("Pruned {} expired snapshots", removed);
        }
        Ok(removed)
    }

    /// Snapshot `paths`, run `op`, and restore the snapshot if `op` fails.
    ///
    /// On success the snapshot is returned alongside the value and kept. After
    /// a failure with a successful restore the snapshot is deleted and the
    /// original error is returned as [`ProtectedError::Operation`]. If the
    /// restore fails the snapshot is kept.
    ///
    /// # Errors
    ///
    /// See [`ProtectedError`].
    pub fn protect<T, E>(
        &self,
        paths: &[PathBuf],
        op: impl FnOnce(&Snapshot) -> Result<T, E>,
    ) -> Result<(T, Snapshot), ProtectedError<E>> {
        let snapshot = self.create_snapshot(paths).map_err(ProtectedError::Snapshot)?;

        match op(&snapshot) {
            Ok(value) => Ok((value, snapshot)),
            Err(error) => {
                log::warn!("Protected operation failed, restoring snapshot {}", snapshot.id);
                match self.restore_snapshot(&snapshot) {
                    Ok(_) => {
                        if let Err(e) = self.delete_snapshot(&snapshot.id) {
                            log::warn!("Cannot delete snapshot {}: {}", snapshot.id, e);
                        }
                        Err(ProtectedError::Operation(error))
                    }
                    Err(restore) => {
                        log::error!(
                            "Restore failed; snapshot {} kept at {}",
                            snapshot.id,
                            self.snapshot_dir(&snapshot.id).display()
                        );
                        Err(ProtectedError::RestoreFailed {
                            error,
                            snapshot_id: snapshot.id,
                            restore,
                        })
                    }
                }
            }
        }
    }
}

/// Ids are generated tokens; anything else cannot name a snapshot or transaction.
pub(crate) fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
