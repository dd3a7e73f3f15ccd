//! Checkpoint module for resumable and incremental scans.
//!
//! A checkpoint records which paths under a scan root have already been
//! hashed, together with the size and modification time seen at that point.
//! An interrupted scan can pick up where it stopped and an unchanged file is
//! never hashed twice.
//!
//! # Features
//!
//! * **One file per root**: the file name is derived from the canonical root path.
//! * **Integrity**: each checkpoint is wrapped in an envelope with a SHA256 checksum.
//! * **Forgiving loads**: a corrupt, truncated or foreign file is treated as
//!   "no checkpoint" and logged, never returned as an error.
//! * **Atomic writes**: readers never observe a half-written checkpoint.
//!
//! # Architecture
//!
//! * [`data`]: Serializable checkpoint model.
//! * [`store`]: Saving, loading, merging and removing checkpoint files.

pub mod data;
pub mod store;

pub use data::{Checkpoint, FileMeta, CHECKPOINT_VERSION};
pub use store::CheckpointStore;

use std::path::PathBuf;

/// Errors raised when writing or removing checkpoints.
///
/// Reading never fails; see [`CheckpointStore::load`].
#[derive(thiserror::Error, Debug)]
pub enum CheckpointError {
    /// The checkpoint could not be serialized.
    #[error("Failed to serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),

    /// An I/O error occurred while writing or removing the checkpoint.
    #[error("Checkpoint I/O error for {path}: {source}")]
    Io {
        /// Checkpoint file path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}
