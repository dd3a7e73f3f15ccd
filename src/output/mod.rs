//! Output formatters for scan results and stored history.
//!
//! - [`json`]: machine-readable output for scripting
//! - [`text`]: human-readable report with sizes via `bytesize`
//!
//! Both render the same [`ScanSummary`].

pub mod json;
pub mod text;

pub use json::{JsonOutput, JsonOutputError};
pub use text::TextOutput;

use std::time::Duration;

use serde::Serialize;

use crate::duplicates::{DuplicateGroup, HashedEntry, ProcessStats};
use crate::scanner::WalkStats;

/// Totals for one scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanSummary {
    /// Hashed entries, archive members included
    pub total_files: usize,
    pub archive_members: usize,
    pub total_size: u64,
    pub duplicate_groups: usize,
    /// Entries marked as duplicates (originals excluded)
    pub duplicate_files: usize,
    pub reclaimable_space: u64,
    /// Entries hashed in this run
    pub hashed: usize,
    /// Entries whose hash came from a checkpoint
    pub reused: usize,
    /// Entries that could not be hashed
    pub failed: usize,
    /// Paths the walker could not read
    pub walk_errors: u64,
    pub hash_algorithm: String,
    pub duration_ms: u64,
}

impl ScanSummary {
    /// Build the summary from a finished run.
    #[must_use]
    pub fn from_run(
        entries: &[HashedEntry],
        groups: &[DuplicateGroup],
        walk: WalkStats,
        process: ProcessStats,
        algorithm: &str,
        duration: Duration,
    ) -> Self {
        Self {
            total_files: entries.len(),
            archive_members: entries.iter().filter(|e| e.entry.is_archive_content).count(),
            total_size: entries.iter().map(HashedEntry::size).sum(),
            duplicate_groups: groups.len(),
            duplicate_files: entries.iter().filter(|e| e.is_duplicate).count(),
            reclaimable_space: groups.iter().map(DuplicateGroup::wasted_space).sum(),
            hashed: process.hashed,
            reused: process.reused,
            failed: process.failed,
            walk_errors: walk.error_count,
            hash_algorithm: algorithm.to_string(),
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Files that could not be read or hashed.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failed as u64 + self.walk_errors
    }
}
