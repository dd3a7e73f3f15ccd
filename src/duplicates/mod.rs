//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Hashing scanned entries, including archive members ([`processor`])
//! - Grouping entries by content digest and selecting originals ([`groups`])
//! - Resuming interrupted scans from a checkpoint

pub mod groups;
pub mod processor;

pub use groups::{
    detect_duplicates, group_by_digest, select_original, DuplicateGroup, DuplicateSummary,
    HashedEntry,
};
pub use processor::{HashProgress, ProcessStats, Processor, CHECKPOINT_BATCH};
