//! Durable journal of operations performed in one protected batch.
//!
//! Each transaction is one JSON file, `<dir>/<transaction_id>.json`,
//! rewritten after `begin` and after every logged operation so that a crash
//! mid-batch still leaves a replayable record.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::snapshot::is_valid_id;
use super::RollbackError;
use crate::fs_util::{atomic_copy, atomic_write, short_id};

/// Kind of mutation an [`Operation`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Delete,
    Modify,
    Move,
    Copy,
    Restore,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Delete => "delete",
            Self::Modify => "modify",
            Self::Move => "move",
            Self::Copy => "copy",
            Self::Restore => "restore",
        };
        f.write_str(name)
    }
}

/// One logged mutation. Immutable once logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub operation_type: OperationType,
    /// Path the operation acted on
    pub path: PathBuf,
    /// Content digest of `path` before the operation
    #[serde(default)]
    pub hash: Option<String>,
    /// Backup copy of `path` taken before the operation
    #[serde(default)]
    pub backup_path: Option<PathBuf>,
    /// Destination of a move or copy
    #[serde(default)]
    pub new_path: Option<PathBuf>,
}

impl Operation {
    /// Create an operation with no optional fields set.
    #[must_use]
    pub fn new(operation_type: OperationType, path: impl Into<PathBuf>) -> Self {
        Self {
            operation_type,
            path: path.into(),
            hash: None,
            backup_path: None,
            new_path: None,
        }
    }

    #[must_use]
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    #[must_use]
    pub fn with_backup(mut self, backup: impl Into<PathBuf>) -> Self {
        self.backup_path = Some(backup.into());
        self
    }

    #[must_use]
    pub fn with_new_path(mut self, new_path: impl Into<PathBuf>) -> Self {
        self.new_path = Some(new_path.into());
        self
    }
}

/// Lifecycle state of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    InProgress,
    Completed,
    RolledBack,
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::RolledBack => "rolled_back",
        };
        f.pad(name)
    }
}

/// An ordered batch of operations with a commit/rollback lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub timestamp: DateTime<Utc>,
    pub operations: Vec<Operation>,
    pub status: TransactionStatus,
}

/// What [`TransactionLog::rollback_transaction`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    /// Paths written back from a backup copy or moved back
    pub restored: usize,
    /// Move/copy destinations removed
    pub removed: usize,
    /// Operations that could not be reverted (no backup left)
    pub skipped: usize,
}

/// Journal of transactions stored in one directory.
///
/// At most one transaction is current per instance.
#[derive(Debug)]
pub struct TransactionLog {
    dir: PathBuf,
    current: Option<Transaction>,
}

impl TransactionLog {
    /// Create a log storing transaction records in `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current: None,
        }
    }

    /// Directory holding the transaction records.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn persist(&self, transaction: &Transaction) -> Result<(), RollbackError> {
        fs::create_dir_all(&self.dir).map_err(|e| RollbackError::io(&self.dir, e))?;
        let path = self.record_path(&transaction.transaction_id);
        let json =
            serde_json::to_vec_pretty(transaction).map_err(|e| RollbackError::serialize(&path, e))?;
        atomic_write(&path, &json).map_err(|e| RollbackError::io(&path, e))
    }

    /// Id of the open transaction, if any.
    #[must_use]
    pub fn current_id(&self) -> Option<&str> {
        self.current.as_ref().map(|t| t.transaction_id.as_str())
    }

    /// The open transaction, if any.
    #[must_use]
    pub fn current(&self) -> Option<&Transaction> {
        self.current.as_ref()
    }

    /// Open a new transaction and persist it as `in_progress`.
    ///
    /// # Errors
    ///
    /// Returns [`RollbackError::TransactionInProgress`] if one is already open.
    pub fn begin(&mut self) -> Result<String, RollbackError> {
        if let Some(open) = &self.current {
            return Err(RollbackError::TransactionInProgress(open.transaction_id.clone()));
        }
        let transaction = Transaction {
            transaction_id: short_id(),
            timestamp: Utc::now(),
            operations: Vec::new(),
            status: TransactionStatus::InProgress,
        };
        self.persist(&transaction)?;
        let id = transaction.transaction_id.clone();
        log::info!("Began transaction {}", id);
        self.current = Some(transaction);
        Ok(id)
    }

    /// Append an operation to the open transaction and persist it.
    ///
    /// # Errors
    ///
    /// Returns [`RollbackError::NoActiveTransaction`] if none is open.
    pub fn log_operation(&mut self, operation: Operation) -> Result<(), RollbackError> {
        let transaction = self.current.as_mut().ok_or(RollbackError::NoActiveTransaction)?;
        log::debug!(
            "Transaction {}: {} {}",
            transaction.transaction_id,
            operation.operation_type,
            operation.path.display()
        );
        transaction.operations.push(operation);
        let snapshot = transaction.clone();
        self.persist(&snapshot)
    }

    fn finish(&mut self, status: TransactionStatus) -> Result<String, RollbackError> {
        let mut transaction = self.current.take().ok_or(RollbackError::NoActiveTransaction)?;
        transaction.status = status;
        if let Err(e) = self.persist(&transaction) {
            // Keep it open so the caller can retry
            transaction.status = TransactionStatus::InProgress;
            self.current = Some(transaction);
            return Err(e);
        }
        log::info!("Transaction {} {}", transaction.transaction_id, status);
        Ok(transaction.transaction_id)
    }

    /// Mark the open transaction completed and clear it.
    ///
    /// # Errors
    ///
    /// Returns [`RollbackError::NoActiveTransaction`] if none is open.
    pub fn commit(&mut self) -> Result<String, RollbackError> {
        self.finish(TransactionStatus::Completed)
    }

    /// Mark the open transaction rolled back without replaying it.
    ///
    /// Used when its effects were already reverted by other means.
    ///
    /// # Errors
    ///
    /// Returns [`RollbackError::NoActiveTransaction`] if none is open.
    pub fn abort(&mut self) -> Result<String, RollbackError> {
        self.finish(TransactionStatus::RolledBack)
    }

    /// Close the open transaction without changing its persisted status.
    ///
    /// Used when its effects could not be reverted, so the journal keeps
    /// it `in_progress` for a later [`rollback_transaction`](Self::rollback_transaction).
    pub fn release(&mut self) -> Option<String> {
        self.current.take().map(|t| t.transaction_id)
    }

    /// Load a persisted transaction.
    ///
    /// # Errors
    ///
    /// Returns [`RollbackError::TransactionNotFound`] for unknown ids.
    pub fn load_transaction(&self, id: &str) -> Result<Transaction, RollbackError> {
        if !is_valid_id(id) {
            return Err(RollbackError::TransactionNotFound(id.to_string()));
        }
        let path = self.record_path(id);
        let content = fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => RollbackError::TransactionNotFound(id.to_string()),
            _ => RollbackError::io(&path, e),
        })?;
        serde_json::from_slice(&content).map_err(|e| RollbackError::serialize(&path, e))
    }

    /// All readable transactions, newest first. Unreadable records are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the directory exists but cannot be listed.
    pub fn list_transactions(&self) -> Result<Vec<Transaction>, RollbackError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RollbackError::io(&self.dir, e)),
        };

        let mut transactions = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            match self.load_transaction(&id) {
                Ok(transaction) => transactions.push(transaction),
                Err(e) => log::warn!("Skipping unreadable transaction {}: {}", id, e),
            }
        }
        transactions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(transactions)
    }

    /// Revert a persisted transaction by replaying its operations in reverse.
    ///
    /// Every operation whose backup copy still exists is restored to its
    /// path. Moves are also undone without a backup when the destination is
    /// still in place, and copy destinations are removed. Once every
    /// operation has been attempted without error the record is marked
    /// `rolled_back`. Running it again re-applies the same restores.
    ///
    /// # Errors
    ///
    /// Returns [`RollbackError::TransactionNotFound`] for unknown ids and
    /// the first restore failure otherwise (the status is then left as is).
    pub fn rollback_transaction(&mut self, id: &str) -> Result<RollbackReport, RollbackError> {
        let mut transaction = match &self.current {
            Some(open) if open.transaction_id == id => open.clone(),
            _ => self.load_transaction(id)?,
        };
        log::info!(
            "Rolling back transaction {} ({} operations)",
            id,
            transaction.operations.len()
        );

        let mut report = RollbackReport::default();
        let mut first_error = None;
        for operation in transaction.operations.iter().rev() {
            if let Err(e) = revert(operation, &mut report) {
                log::warn!(
                    "Cannot revert {} of {}: {}",
                    operation.operation_type,
                    operation.path.display(),
                    e
                );
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        transaction.status = TransactionStatus::RolledBack;
        self.persist(&transaction)?;
        if self.current_id() == Some(id) {
            self.current = None;
        }
        log::info!(
            "Transaction {} rolled back: {} restored, {} removed, {} skipped",
            id,
            report.restored,
            report.removed,
            report.skipped
        );
        Ok(report)
    }
}

fn remove_if_exists(path: &Path) -> Result<bool, RollbackError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(RollbackError::io(path, e)),
    }
}

fn restore_backup(operation: &Operation) -> Result<bool, RollbackError> {
    match operation.backup_path.as_deref() {
        Some(backup) if backup.is_file() => {
            atomic_copy(backup, &operation.path).map_err(|e| RollbackError::io(&operation.path, e))?;
            log::debug!("Restored {} from {}", operation.path.display(), backup.display());
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn revert(operation: &Operation, report: &mut RollbackReport) -> Result<(), RollbackError> {
    match operation.operation_type {
        OperationType::Delete | OperationType::Modify | OperationType::Restore => {
            if restore_backup(operation)? {
                report.restored += 1;
            } else {
                log::warn!("No backup left for {}", operation.path.display());
                report.skipped += 1;
            }
        }
        OperationType::Move => {
            let Some(new_path) = operation.new_path.as_deref() else {
                report.skipped += 1;
                return Ok(());
            };
            if operation.path.exists() {
                // Source already back in place; only the destination remains
                if remove_if_exists(new_path)? {
                    report.removed += 1;
                }
            } else if restore_backup(operation)? {
                report.restored += 1;
                if remove_if_exists(new_path)? {
                    report.removed += 1;
                }
            } else if new_path.is_file() {
                atomic_copy(new_path, &operation.path)
                    .map_err(|e| RollbackError::io(&operation.path, e))?;
                remove_if_exists(new_path)?;
                report.restored += 1;
                report.removed += 1;
            } else {
                report.skipped += 1;
            }
        }
        OperationType::Copy => {
            let removed = match operation.new_path.as_deref() {
                Some(new_path) if operation.path.exists() => remove_if_exists(new_path)?,
                _ => false,
            };
            if removed {
                report.removed += 1;
            } else {
                report.skipped += 1;
            }
        }
    }
    Ok(())
}
