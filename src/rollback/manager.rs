//! Orchestration of snapshots and the transaction journal.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::snapshot::{Snapshot, SnapshotManager};
use super::transaction::{RollbackReport, Transaction, TransactionLog};
use super::{ProtectedError, RollbackError};

/// Subdirectory of the data directory holding snapshots.
pub const SNAPSHOT_SUBDIR: &str = "snapshots";
/// Subdirectory of the data directory holding transaction records.
pub const TRANSACTION_SUBDIR: &str = "transactions";

/// What happens to a snapshot after its protected operation succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Delete the snapshot immediately.
    Delete,
    /// Keep snapshots for `hours`; older ones are pruned after each success.
    Retain { hours: u32 },
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::Retain { hours: 24 * 7 }
    }
}

/// Runs batches of mutations with all-or-nothing recoverability.
#[derive(Debug)]
pub struct RollbackManager {
    snapshots: SnapshotManager,
    log: TransactionLog,
    retention: RetentionPolicy,
}

impl RollbackManager {
    /// Create a manager storing snapshots and transactions under `data_dir`.
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self::with_parts(
            SnapshotManager::new(data_dir.join(SNAPSHOT_SUBDIR)),
            TransactionLog::new(data_dir.join(TRANSACTION_SUBDIR)),
        )
    }

    /// Create a manager from explicit components.
    #[must_use]
    pub fn with_parts(snapshots: SnapshotManager, log: TransactionLog) -> Self {
        Self {
            snapshots,
            log,
            retention: RetentionPolicy::default(),
        }
    }

    /// Set the snapshot retention policy.
    #[must_use]
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    #[must_use]
    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    #[must_use]
    pub fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    #[must_use]
    pub fn log(&self) -> &TransactionLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut TransactionLog {
        &mut self.log
    }

    /// Snapshot `paths`, run `op`, and restore every path if it fails.
    ///
    /// On success the snapshot is handled per the retention policy and
    /// `op`'s value is returned. On failure the original error comes back
    /// unchanged inside [`ProtectedError::Operation`].
    ///
    /// # Errors
    ///
    /// See [`ProtectedError`].
    pub fn execute_with_protection<T, E>(
        &mut self,
        paths: &[PathBuf],
        op: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, ProtectedError<E>> {
        let (value, snapshot) = self.snapshots.protect(paths, |_| op())?;
        self.retire(&snapshot);
        Ok(value)
    }

    /// Run `op` inside a journaled transaction protected by a snapshot.
    ///
    /// `op` receives the open [`TransactionLog`] to record each operation
    /// and the [`Snapshot`] to look up backup paths. The transaction is
    /// committed when `op` succeeds; when it fails the snapshot is
    /// restored and the transaction is marked `rolled_back`. If that
    /// restore fails too, the transaction stays `in_progress`.
    ///
    /// Returns `op`'s value and the transaction id.
    ///
    /// # Errors
    ///
    /// See [`ProtectedError`].
    pub fn execute_transaction<T, E>(
        &mut self,
        paths: &[PathBuf],
        op: impl FnOnce(&mut TransactionLog, &Snapshot) -> Result<T, E>,
    ) -> Result<(T, String), ProtectedError<E>> {
        let transaction_id = self.log.begin().map_err(ProtectedError::Journal)?;

        let Self { snapshots, log, .. } = self;
        let outcome = snapshots.protect(paths, |snapshot| op(log, snapshot));

        match outcome {
            Ok((value, snapshot)) => {
                self.log.commit().map_err(ProtectedError::Journal)?;
                self.retire(&snapshot);
                Ok((value, transaction_id))
            }
            Err(e @ ProtectedError::RestoreFailed { .. }) => {
                self.log.release();
                log::error!(
                    "Transaction {} left in_progress; its effects were not reverted",
                    transaction_id
                );
                Err(e)
            }
            Err(e) => {
                if let Err(abort) = self.log.abort() {
                    log::warn!("Cannot mark transaction {} rolled back: {}", transaction_id, abort);
                }
                Err(e)
            }
        }
    }

    /// Apply the retention policy to a snapshot whose operation succeeded.
    fn retire(&self, snapshot: &Snapshot) {
        match self.retention {
            RetentionPolicy::Delete => {
                if let Err(e) = self.snapshots.delete_snapshot(&snapshot.id) {
                    log::warn!("Cannot delete snapshot {}: {}", snapshot.id, e);
                }
            }
            RetentionPolicy::Retain { hours } => {
                log::debug!("Keeping snapshot {} for {} hours", snapshot.id, hours);
                if let Err(e) = self.prune_snapshots() {
                    log::warn!("Cannot prune snapshots: {}", e);
                }
            }
        }
    }

    /// Delete snapshots that have outlived the retention policy.
    ///
    /// Under [`RetentionPolicy::Delete`] every remaining snapshot is expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot directory cannot be listed.
    pub fn prune_snapshots(&self) -> Result<usize, RollbackError> {
        let max_age = match self.retention {
            RetentionPolicy::Delete => chrono::Duration::zero(),
            RetentionPolicy::Retain { hours } => chrono::Duration::hours(i64::from(hours)),
        };
        self.snapshots.prune_older_than(max_age)
    }

    /// Revert a committed or interrupted transaction.
    ///
    /// # Errors
    ///
    /// See [`TransactionLog::rollback_transaction`].
    pub fn rollback_transaction(&mut self, id: &str) -> Result<RollbackReport, RollbackError> {
        self.log.rollback_transaction(id)
    }

    /// Snapshots, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot directory cannot be listed.
    pub fn list_snapshots(&self) -> Result<Vec<Snapshot>, RollbackError> {
        self.snapshots.list_snapshots()
    }

    /// Transactions, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction directory cannot be listed.
    pub fn list_transactions(&self) -> Result<Vec<Transaction>, RollbackError> {
        self.log.list_transactions()
    }

    /// Delete one snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RollbackError::SnapshotNotFound`] for unknown ids.
    pub fn delete_snapshot(&self, id: &str) -> Result<(), RollbackError> {
        self.snapshots.delete_snapshot(id)
    }
}
