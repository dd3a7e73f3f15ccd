//! Executing planned actions inside a protected transaction.
//!
//! Every batch runs through [`RollbackManager::execute_transaction`]: the
//! sources and destinations are snapshotted first, each file is checked
//! against its scan-time size and modification time, and each mutation is
//! journaled with its backup path as it happens. If any action fails the
//! snapshot is restored and the error of the failing action is returned.
//!
//! # Example
//!
//! ```no_run
//! use safedupe::actions::{execute, plan, ActionKind};
//! use safedupe::rollback::RollbackManager;
//! use std::path::Path;
//!
//! let entries = Vec::new();
//! let actions = plan(&entries, &ActionKind::Delete);
//! let mut manager = RollbackManager::new(Path::new("/tmp/safedupe"));
//! let report = execute(&actions, &mut manager).unwrap();
//! println!("{}", report.summary());
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use super::plan::{PlannedAction, PlannedKind};
use crate::fs_util::{atomic_copy, unix_seconds};
use crate::rollback::{Operation, OperationType, ProtectedError, RollbackManager, Snapshot, TransactionLog};

/// Error type for a single action.
#[derive(Debug, Error)]
pub enum ActionError {
    /// File was not found (may have been deleted or moved since the scan).
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// Permission denied when touching the file.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// File was modified since scan.
    #[error("file modified since scan: {0}")]
    Modified(PathBuf),

    /// A move or copy would overwrite an existing file.
    #[error("destination already exists: {0}")]
    DestinationExists(PathBuf),

    /// The journal refused the operation record.
    #[error("cannot journal operation on {path}: {message}")]
    Journal { path: PathBuf, message: String },

    /// General I/O error.
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ActionError {
    /// Get the path associated with this error.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(p)
            | Self::PermissionDenied(p)
            | Self::Modified(p)
            | Self::DestinationExists(p)
            | Self::Journal { path: p, .. }
            | Self::Io { path: p, .. } => p,
        }
    }

    fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}

/// Outcome of a successful batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActionReport {
    /// Transaction that journaled the batch; `None` for an empty plan
    pub transaction_id: Option<String>,
    pub deleted: usize,
    pub moved: usize,
    pub copied: usize,
    /// Bytes no longer occupied at the source paths (deletes and moves)
    pub bytes_freed: u64,
}

impl ActionReport {
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.deleted + self.moved + self.copied
    }

    /// Human-readable summary of the batch.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.deleted > 0 {
            parts.push(format!("deleted {}", self.deleted));
        }
        if self.moved > 0 {
            parts.push(format!("moved {}", self.moved));
        }
        if self.copied > 0 {
            parts.push(format!("copied {}", self.copied));
        }
        if parts.is_empty() {
            return "No actions performed".to_string();
        }
        let mut summary = format!("{} file(s)", parts.join(", "));
        if self.bytes_freed > 0 {
            summary.push_str(&format!(", freed {}", bytesize::ByteSize::b(self.bytes_freed)));
        }
        summary
    }
}

/// Scan-time state of a file, checked before acting on it.
#[derive(Debug, Clone, Copy)]
struct ScanState {
    size: u64,
    modified: i64,
}

impl ScanState {
    fn of(action: &PlannedAction) -> Self {
        Self {
            size: action.size,
            modified: action.modified,
        }
    }

    fn verify(self, path: &Path) -> Result<(), ActionError> {
        let metadata = fs::metadata(path).map_err(|e| ActionError::from_io(path, e))?;
        if !metadata.is_file() {
            return Err(ActionError::NotFound(path.to_path_buf()));
        }

        let modified = metadata.modified().map(unix_seconds).ok();
        if let Some(current) = modified {
            if current != self.modified {
                log::warn!("File modified since scan: {} (mtime changed)", path.display());
                return Err(ActionError::Modified(path.to_path_buf()));
            }
        }

        if metadata.len() != self.size {
            log::warn!(
                "File modified since scan: {} (size changed from {} to {})",
                path.display(),
                self.size,
                metadata.len()
            );
            return Err(ActionError::Modified(path.to_path_buf()));
        }
        Ok(())
    }
}

fn journal(log: &mut TransactionLog, operation: Operation) -> Result<(), ActionError> {
    let path = operation.path.clone();
    log.log_operation(operation).map_err(|e| ActionError::Journal {
        path,
        message: e.to_string(),
    })
}

fn ensure_vacant(dest: &Path) -> Result<(), ActionError> {
    if fs::symlink_metadata(dest).is_ok() {
        return Err(ActionError::DestinationExists(dest.to_path_buf()));
    }
    Ok(())
}

fn move_file(from: &Path, to: &Path) -> Result<(), ActionError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| ActionError::from_io(parent, e))?;
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) => {
            // Rename fails across filesystems; fall back to copy + remove
            log::debug!("Rename {} failed ({}), copying instead", from.display(), e);
            atomic_copy(from, to).map_err(|e| ActionError::from_io(to, e))?;
            fs::remove_file(from).map_err(|e| ActionError::from_io(from, e))
        }
    }
}

/// Apply one action and journal it.
fn apply_one(
    action: &PlannedAction,
    log: &mut TransactionLog,
    snapshot: &Snapshot,
    report: &mut ActionReport,
) -> Result<(), ActionError> {
    let source = action.source.as_path();
    ScanState::of(action).verify(source)?;

    let mut operation = match &action.kind {
        PlannedKind::Delete => {
            fs::remove_file(source).map_err(|e| ActionError::from_io(source, e))?;
            log::info!("Deleted {} ({} bytes)", source.display(), action.size);
            report.deleted += 1;
            report.bytes_freed += action.size;
            Operation::new(OperationType::Delete, source)
        }
        PlannedKind::Move { to } => {
            ensure_vacant(to)?;
            move_file(source, to)?;
            log::info!("Moved {} -> {}", source.display(), to.display());
            report.moved += 1;
            report.bytes_freed += action.size;
            Operation::new(OperationType::Move, source).with_new_path(to)
        }
        PlannedKind::Copy { to } => {
            ensure_vacant(to)?;
            atomic_copy(source, to).map_err(|e| ActionError::from_io(to, e))?;
            log::info!("Copied {} -> {}", source.display(), to.display());
            report.copied += 1;
            Operation::new(OperationType::Copy, source).with_new_path(to)
        }
    };

    operation = operation.with_hash(&action.hash);
    if let Some(backup) = snapshot.backup_for(source) {
        operation = operation.with_backup(backup);
    }
    journal(log, operation)
}

/// Execute a plan as one protected transaction.
///
/// An empty plan does nothing and opens no transaction.
///
/// # Errors
///
/// [`ProtectedError::Operation`] carries the error of the first failing
/// action after every affected path has been restored. Snapshot and journal
/// failures surface as the other [`ProtectedError`] variants.
pub fn execute(
    plan: &[PlannedAction],
    manager: &mut RollbackManager,
) -> Result<ActionReport, ProtectedError<ActionError>> {
    if plan.is_empty() {
        log::info!("Nothing to do");
        return Ok(ActionReport::default());
    }

    let paths: Vec<PathBuf> = plan.iter().flat_map(PlannedAction::affected_paths).collect();
    log::debug!("Executing {} action(s) over {} path(s)", plan.len(), paths.len());

    let (mut report, transaction_id) = manager.execute_transaction(&paths, |log, snapshot| {
        let mut report = ActionReport::default();
        for action in plan {
            if let Err(e) = apply_one(action, log, snapshot, &mut report) {
                log::warn!("Action on {} failed: {}", action.source.display(), e);
                return Err(e);
            }
        }
        Ok(report)
    })?;

    report.transaction_id = Some(transaction_id);
    log::info!("{}", report.summary());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{plan, ActionKind};
    use crate::duplicates::{detect_duplicates, HashedEntry};
    use crate::rollback::{RetentionPolicy, TransactionStatus};
    use crate::scanner::FileEntry;
    use tempfile::TempDir;

    struct Fixture {
        _data: TempDir,
        work: TempDir,
        manager: RollbackManager,
    }

    fn fixture() -> Fixture {
        let data = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let manager = RollbackManager::new(data.path()).with_retention(RetentionPolicy::default());
        Fixture {
            _data: data,
            work,
            manager,
        }
    }

    fn scanned(root: &Path, rel: &str, content: &str) -> HashedEntry {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        let meta = fs::symlink_metadata(&path).unwrap();
        let entry = FileEntry::from_metadata(&path, root, &meta, None);
        let hash = blake3::hash(content.as_bytes()).to_hex().to_string();
        HashedEntry::new(entry, hash, "blake3")
    }

    fn duplicates(root: &Path) -> Vec<HashedEntry> {
        let mut entries = vec![
            scanned(root, "original.txt", "duplicate content\n"),
            scanned(root, "dup1.txt", "duplicate content\n"),
            scanned(root, "sub/dup2.txt", "duplicate content\n"),
            scanned(root, "unique.txt", "unique content\n"),
        ];
        detect_duplicates(&mut entries);
        entries
    }

    #[test]
    fn test_action_error_path_and_display() {
        let path = PathBuf::from("/test/file.txt");
        let err = ActionError::Modified(path.clone());
        assert_eq!(err.path(), path.as_path());
        assert!(err.to_string().contains("modified"));
        assert!(ActionError::DestinationExists(path).to_string().contains("exists"));
    }

    #[test]
    fn test_report_summary() {
        assert_eq!(ActionReport::default().summary(), "No actions performed");
        let report = ActionReport {
            deleted: 2,
            bytes_freed: 2048,
            ..ActionReport::default()
        };
        assert!(report.summary().starts_with("deleted 2 file(s)"));
        assert_eq!(report.total_count(), 2);
    }

    #[test]
    fn test_empty_plan_opens_no_transaction() {
        let mut fx = fixture();
        let report = execute(&[], &mut fx.manager).unwrap();
        assert!(report.transaction_id.is_none());
        assert!(fx.manager.list_transactions().unwrap().is_empty());
    }

    #[test]
    fn test_delete_then_rollback() {
        let mut fx = fixture();
        let root = fx.work.path().to_path_buf();
        let entries = duplicates(&root);

        let actions = plan(&entries, &ActionKind::Delete);
        let report = execute(&actions, &mut fx.manager).unwrap();
        assert_eq!(report.deleted, 2);
        assert_eq!(report.bytes_freed, 36);
        assert!(root.join("original.txt").exists());
        assert!(!root.join("dup1.txt").exists());
        assert!(!root.join("sub/dup2.txt").exists());

        let id = report.transaction_id.unwrap();
        let tx = fx.manager.log().load_transaction(&id).unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.operations.len(), 2);
        assert!(tx.operations.iter().all(|op| op.backup_path.is_some() && op.hash.is_some()));

        fx.manager.rollback_transaction(&id).unwrap();
        assert_eq!(fs::read_to_string(root.join("dup1.txt")).unwrap(), "duplicate content\n");
        assert_eq!(fs::read_to_string(root.join("sub/dup2.txt")).unwrap(), "duplicate content\n");
    }

    #[test]
    fn test_move_and_copy() {
        let mut fx = fixture();
        let root = fx.work.path().join("scan");
        let target = fx.work.path().join("target");
        let entries = duplicates(&root);

        let copies = plan(&entries, &ActionKind::Copy { target_dir: target.clone() });
        let report = execute(&copies, &mut fx.manager).unwrap();
        assert_eq!(report.copied, 2);
        assert_eq!(report.bytes_freed, 0);
        assert!(root.join("dup1.txt").exists());
        assert!(target.join("sub/dup2.txt").exists());

        let moved_to = fx.work.path().join("moved");
        let moves = plan(&entries, &ActionKind::Move { target_dir: moved_to.clone() });
        let report = execute(&moves, &mut fx.manager).unwrap();
        assert_eq!(report.moved, 2);
        assert!(!root.join("dup1.txt").exists());
        assert_eq!(fs::read_to_string(moved_to.join("dup1.txt")).unwrap(), "duplicate content\n");

        fx.manager
            .rollback_transaction(report.transaction_id.as_deref().unwrap())
            .unwrap();
        assert!(root.join("dup1.txt").exists());
        assert!(!moved_to.join("dup1.txt").exists());
    }

    #[test]
    fn test_modified_file_aborts_whole_batch() {
        let mut fx = fixture();
        let root = fx.work.path().to_path_buf();
        let entries = duplicates(&root);
        let actions = plan(&entries, &ActionKind::Delete);

        // Second target changes after the scan
        fs::write(root.join("sub/dup2.txt"), "edited after the scan, longer").unwrap();

        let err = execute(&actions, &mut fx.manager).unwrap_err();
        assert!(matches!(err, ProtectedError::Operation(ActionError::Modified(_))));

        // First delete was restored
        assert_eq!(fs::read_to_string(root.join("dup1.txt")).unwrap(), "duplicate content\n");
        assert_eq!(
            fs::read_to_string(root.join("sub/dup2.txt")).unwrap(),
            "edited after the scan, longer"
        );
        let txs = fx.manager.list_transactions().unwrap();
        assert_eq!(txs[0].status, TransactionStatus::RolledBack);
    }

    #[test]
    fn test_existing_destination_is_rejected_and_kept() {
        let mut fx = fixture();
        let root = fx.work.path().join("scan");
        let target = fx.work.path().join("target");
        let entries = duplicates(&root);
        fs::create_dir_all(target.join("sub")).unwrap();
        fs::write(target.join("sub/dup2.txt"), "already here").unwrap();

        let actions = plan(&entries, &ActionKind::Move { target_dir: target.clone() });
        let err = execute(&actions, &mut fx.manager).unwrap_err();
        assert!(matches!(err, ProtectedError::Operation(ActionError::DestinationExists(_))));

        assert!(root.join("dup1.txt").exists());
        assert!(!target.join("dup1.txt").exists());
        assert_eq!(fs::read_to_string(target.join("sub/dup2.txt")).unwrap(), "already here");
    }
}
