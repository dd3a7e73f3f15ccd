//! Snapshot and transaction layer protecting destructive operations.
//!
//! No file is deleted, moved over or modified without a byte-for-byte copy
//! taken first. A batch of mutations runs inside a transaction whose
//! operations are journaled to disk as they happen, so a failed batch is
//! reverted immediately and a completed one can still be undone later.
//!
//! # Architecture
//!
//! * [`snapshot`]: [`SnapshotManager`] copies files aside and restores them.
//! * [`transaction`]: [`TransactionLog`] journals operations and replays
//!   them in reverse on rollback.
//! * [`manager`]: [`RollbackManager`] ties both together and applies the
//!   snapshot [`RetentionPolicy`].
//!
//! # Transaction states
//!
//! ```text
//! in_progress ──commit──▶ completed ──rollback──▶ rolled_back
//!      │                                              ▲
//!      └─────────────────abort / rollback─────────────┘
//! ```

pub mod manager;
pub mod snapshot;
pub mod transaction;

pub use manager::{RetentionPolicy, RollbackManager};
pub use snapshot::{Snapshot, SnapshotFile, SnapshotManager};
pub use transaction::{
    Operation, OperationType, RollbackReport, Transaction, TransactionLog, TransactionStatus,
};

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Errors raised by the snapshot and transaction stores.
#[derive(thiserror::Error, Debug)]
pub enum RollbackError {
    /// An operation was logged or committed with no open transaction.
    #[error("No transaction in progress")]
    NoActiveTransaction,

    /// `begin` was called while another transaction is open.
    #[error("Transaction {0} is already in progress")]
    TransactionInProgress(String),

    /// No transaction record exists for the id.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// No snapshot exists for the id.
    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// A backup copy no longer matches the digest recorded at snapshot time.
    #[error("Backup for {path} is corrupted (expected {expected}, found {actual})")]
    BackupCorrupted {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// A directory or special file was named where a regular file is required.
    #[error("Not a regular file: {0}")]
    NotAFile(PathBuf),

    /// An I/O error occurred.
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A manifest or transaction record could not be (de)serialized.
    #[error("Invalid record {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl RollbackError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn serialize(path: &Path, source: serde_json::Error) -> Self {
        Self::Serialize {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Outcome of a protected operation that did not succeed.
///
/// `E` is the error type of the protected operation. It only needs
/// `Debug + Display`, so `anyhow::Error` works as well as any
/// `std::error::Error`.
#[derive(Debug)]
pub enum ProtectedError<E> {
    /// The operation failed and every protected path was restored.
    Operation(E),

    /// The operation failed and restoring the snapshot failed too.
    /// The snapshot is kept so the state can be recovered by hand.
    RestoreFailed {
        error: E,
        snapshot_id: String,
        restore: RollbackError,
    },

    /// The snapshot could not be taken; the operation never ran.
    Snapshot(RollbackError),

    /// The transaction journal could not be written.
    Journal(RollbackError),
}

impl<E> ProtectedError<E> {
    /// The operation's own error, if the operation ran and failed.
    #[must_use]
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::Operation(e) | Self::RestoreFailed { error: e, .. } => Some(e),
            Self::Snapshot(_) | Self::Journal(_) => None,
        }
    }

    /// Consume into the operation's own error, if any.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::Operation(e) | Self::RestoreFailed { error: e, .. } => Some(e),
            Self::Snapshot(_) | Self::Journal(_) => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for ProtectedError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation(e) => write!(f, "{e} (changes were rolled back)"),
            Self::RestoreFailed {
                error,
                snapshot_id,
                restore,
            } => write!(
                f,
                "{error}; restoring snapshot {snapshot_id} also failed: {restore}"
            ),
            Self::Snapshot(e) => write!(f, "Could not snapshot files before the operation: {e}"),
            Self::Journal(e) => write!(f, "Transaction journal error: {e}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for ProtectedError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Operation(_) => None,
            Self::RestoreFailed { restore, .. } => Some(restore),
            Self::Snapshot(e) | Self::Journal(e) => Some(e),
        }
    }
}
