//! Persistent record of hashed files and their duplicate links.
//!
//! The [`Repository`] trait is the seam between the scan pipeline and
//! whatever store keeps the results; [`SqliteRepository`] is the bundled
//! SQLite implementation. Records are keyed by path and carry a numeric id
//! that duplicates reference through `duplicate_of`.
//!
//! # Example
//!
//! ```no_run
//! use safedupe::store::{persist_entries, Repository, SqliteRepository};
//!
//! let mut repo = SqliteRepository::open_in_memory().unwrap();
//! let entries = Vec::new();
//! persist_entries(&mut repo, &entries).unwrap();
//! assert!(repo.duplicates().unwrap().is_empty());
//! ```

pub mod sqlite;

pub use sqlite::SqliteRepository;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::duplicates::{select_original, HashedEntry};

/// Errors raised by a [`Repository`].
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The underlying SQLite call failed.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// No record exists for the path.
    #[error("No stored record for {0}")]
    NotFound(PathBuf),
}

/// Result type for repository operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// One persisted file record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    pub id: i64,
    pub path: PathBuf,
    pub size: u64,
    pub modified: i64,
    pub hash: String,
    pub hash_algorithm: String,
    pub is_archive_content: bool,
    pub archive_source: Option<PathBuf>,
    /// Id of the original this record duplicates
    pub duplicate_of: Option<i64>,
}

impl StoredFile {
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        self.duplicate_of.is_some()
    }
}

/// Store for hashed entries, keyed by path.
pub trait Repository {
    /// Insert or replace the record for `entry.path`, clearing any previous
    /// duplicate link. Returns the record id, stable across updates.
    fn upsert(&mut self, entry: &HashedEntry) -> StoreResult<i64>;

    /// Id of the record stored for `path`.
    fn get_id(&self, path: &Path) -> StoreResult<Option<i64>>;

    /// Link the record for `path` to the original with id `original_id`.
    fn mark_duplicate(&mut self, path: &Path, original_id: i64) -> StoreResult<()>;

    /// Records with digest `hash`, in insertion order.
    fn find_by_digest(&self, hash: &str) -> StoreResult<Vec<StoredFile>>;

    /// Records of exactly `size` bytes, in insertion order.
    fn find_by_size(&self, size: u64) -> StoreResult<Vec<StoredFile>>;

    /// Every record linked to an original.
    fn duplicates(&self) -> StoreResult<Vec<StoredFile>>;

    /// Start a batch of writes. Implementations may group them atomically.
    fn begin_batch(&mut self) -> StoreResult<()> {
        Ok(())
    }

    /// Finish a batch started with [`Repository::begin_batch`].
    fn commit_batch(&mut self) -> StoreResult<()> {
        Ok(())
    }

    /// Discard a batch started with [`Repository::begin_batch`].
    fn rollback_batch(&mut self) -> StoreResult<()> {
        Ok(())
    }
}

/// Counters from [`persist_entries`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistStats {
    pub stored: usize,
    pub linked: usize,
}

/// Store every entry, then translate `duplicate_of` paths into record ids.
///
/// # Errors
///
/// Returns the first repository error. A `duplicate_of` path that was not
/// part of `entries` and is not already stored yields [`StoreError::NotFound`].
pub fn persist_entries<R: Repository + ?Sized>(
    repo: &mut R,
    entries: &[HashedEntry],
) -> StoreResult<PersistStats> {
    repo.begin_batch()?;
    match link_entries(repo, entries) {
        Ok(stats) => {
            repo.commit_batch()?;
            log::debug!("Persisted {} entries, {} duplicate links", stats.stored, stats.linked);
            Ok(stats)
        }
        Err(e) => {
            if let Err(rollback) = repo.rollback_batch() {
                log::warn!("Cannot discard partial batch: {}", rollback);
            }
            Err(e)
        }
    }
}

fn link_entries<R: Repository + ?Sized>(repo: &mut R, entries: &[HashedEntry]) -> StoreResult<PersistStats> {
    let mut stats = PersistStats::default();
    let mut ids: HashMap<&Path, i64> = HashMap::with_capacity(entries.len());
    for entry in entries {
        let id = repo.upsert(entry)?;
        ids.insert(entry.path(), id);
        stats.stored += 1;
    }

    for entry in entries.iter().filter(|e| e.is_duplicate) {
        let Some(original) = entry.duplicate_of.as_deref() else {
            continue;
        };
        let original_id = match ids.get(original) {
            Some(&id) => id,
            None => repo
                .get_id(original)?
                .ok_or_else(|| StoreError::NotFound(original.to_path_buf()))?,
        };
        repo.mark_duplicate(entry.path(), original_id)?;
        stats.linked += 1;
    }
    Ok(stats)
}

/// Re-resolve one digest group inside the store.
///
/// Uses the same largest-first, earliest-on-ties rule as the scan pipeline
/// (insertion order stands in for encounter order). Records already linked
/// keep their link. Returns the id of the original, or `None` if fewer than
/// two records share the digest.
///
/// # Errors
///
/// Returns the first repository error.
pub fn resolve_digest<R: Repository + ?Sized>(repo: &mut R, hash: &str) -> StoreResult<Option<i64>> {
    let records = repo.find_by_digest(hash)?;
    if records.len() < 2 {
        return Ok(None);
    }

    let original_id = match records.iter().find_map(|r| r.duplicate_of) {
        Some(id) if records.iter().any(|r| r.id == id) => id,
        _ => {
            let candidates: Vec<&StoredFile> =
                records.iter().filter(|r| !r.is_duplicate()).collect();
            match select_original(&candidates, |r| r.size) {
                Some(i) => candidates[i].id,
                None => return Ok(None),
            }
        }
    };

    for record in records.iter().filter(|r| r.id != original_id && !r.is_duplicate()) {
        repo.mark_duplicate(&record.path, original_id)?;
    }
    Ok(Some(original_id))
}
