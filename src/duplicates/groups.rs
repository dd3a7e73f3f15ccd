//! Duplicate grouping and original selection.
//!
//! # Overview
//!
//! Duplicate detection groups [`HashedEntry`] values by content digest. In
//! every group with two or more members one entry is the *original* and the
//! rest are marked as duplicates of it.
//!
//! ## Original selection
//!
//! The original is the largest member. Ties keep encounter (walk) order, so
//! the earliest of the largest members wins. [`select_original`] is the only
//! implementation of this rule; the repository and the action planner call it
//! rather than carrying their own.
//!
//! # Example
//!
//! ```
//! use safedupe::duplicates::{detect_duplicates, HashedEntry};
//! use safedupe::scanner::FileEntry;
//! use std::path::PathBuf;
//!
//! let mut entries = vec![
//!     HashedEntry::new(FileEntry::new(PathBuf::from("/a.txt"), 10, 0), "abc", "blake3"),
//!     HashedEntry::new(FileEntry::new(PathBuf::from("/b.txt"), 10, 0), "abc", "blake3"),
//!     HashedEntry::new(FileEntry::new(PathBuf::from("/c.txt"), 20, 0), "def", "blake3"),
//! ];
//!
//! let summary = detect_duplicates(&mut entries);
//! assert_eq!(summary.groups, 1);
//! assert!(!entries[0].is_duplicate);
//! assert_eq!(entries[1].duplicate_of, Some(PathBuf::from("/a.txt")));
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::scanner::FileEntry;

/// A scanned entry with its content digest attached.
///
/// `is_duplicate` and `duplicate_of` are the only fields that change after
/// creation, and only once, during duplicate resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashedEntry {
    #[serde(flatten)]
    pub entry: FileEntry,
    /// Hex content digest
    pub hash: String,
    /// Name of the algorithm that produced `hash`
    pub hash_algorithm: String,
    /// Whether this entry was resolved as a duplicate
    pub is_duplicate: bool,
    /// Path of the original this entry duplicates
    pub duplicate_of: Option<PathBuf>,
}

impl HashedEntry {
    /// Attach a digest to a scanned entry.
    #[must_use]
    pub fn new(entry: FileEntry, hash: impl Into<String>, algorithm: impl Into<String>) -> Self {
        Self {
            entry,
            hash: hash.into(),
            hash_algorithm: algorithm.into(),
            is_duplicate: false,
            duplicate_of: None,
        }
    }

    /// Absolute path of the underlying entry.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.entry.path
    }

    /// Size of the underlying entry.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.entry.size
    }
}

/// Members sharing one content digest, original first.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    /// Shared content digest
    pub hash: String,
    /// Members ordered largest first (stable on encounter order)
    pub files: Vec<HashedEntry>,
}

impl DuplicateGroup {
    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if this group is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// The member kept as original.
    ///
    /// If the group was already resolved this is the entry the duplicates
    /// point at, otherwise the first member.
    #[must_use]
    pub fn original(&self) -> Option<&HashedEntry> {
        let resolved = self
            .files
            .iter()
            .find_map(|f| f.duplicate_of.as_deref())
            .and_then(|target| self.files.iter().find(|f| f.path() == target));
        resolved.or_else(|| self.files.first())
    }

    /// Every member except the original.
    pub fn duplicates(&self) -> impl Iterator<Item = &HashedEntry> {
        let original = self.original().map(|o| o.path().to_path_buf());
        self.files
            .iter()
            .filter(move |f| Some(f.path()) != original.as_deref())
    }

    /// Bytes reclaimable by removing every duplicate.
    #[must_use]
    pub fn wasted_space(&self) -> u64 {
        self.duplicates().map(HashedEntry::size).sum()
    }

    /// Paths of all members.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path().to_path_buf()).collect()
    }
}

/// Outcome of one [`detect_duplicates`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DuplicateSummary {
    /// Digest groups with two or more members
    pub groups: usize,
    /// Entries marked duplicate (including ones resolved by earlier passes)
    pub duplicates: usize,
    /// Entries marked duplicate by this pass
    pub newly_marked: usize,
    /// Total size of all duplicate entries
    pub wasted_bytes: u64,
}

/// Index of the original among `items`: the largest, earliest on ties.
///
/// Equivalent to taking the head of a stable descending sort by size.
pub fn select_original<T>(items: &[T], size_of: impl Fn(&T) -> u64) -> Option<usize> {
    let mut best: Option<(usize, u64)> = None;
    for (i, item) in items.iter().enumerate() {
        let size = size_of(item);
        match best {
            Some((_, best_size)) if size <= best_size => {}
            _ => best = Some((i, size)),
        }
    }
    best.map(|(i, _)| i)
}

/// Indices of entries grouped by digest, groups in first-occurrence order.
///
/// A path listed more than once only counts the first time; a file is never
/// its own duplicate.
fn digest_groups(entries: &[HashedEntry]) -> Vec<Vec<usize>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut seen: HashSet<&Path> = HashSet::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        if !seen.insert(entry.path()) {
            log::debug!("Ignoring repeated entry {}", entry.path().display());
            continue;
        }
        match index.get(entry.hash.as_str()) {
            Some(&g) => groups[g].push(i),
            None => {
                index.insert(entry.hash.as_str(), groups.len());
                groups.push(vec![i]);
            }
        }
    }
    groups
}

/// Resolve duplicates in place.
///
/// For every digest shared by two or more entries, the original is chosen
/// with [`select_original`] and every other member gets `is_duplicate = true`
/// and `duplicate_of = Some(original path)`. Symlinks are only chosen as the
/// original when the group holds nothing else.
///
/// The pass is idempotent: entries already marked are never touched, and a
/// group that was resolved before keeps its original even if a larger
/// member has since joined it.
pub fn detect_duplicates(entries: &mut [HashedEntry]) -> DuplicateSummary {
    let mut summary = DuplicateSummary::default();

    for members in digest_groups(entries) {
        if members.len() < 2 {
            continue;
        }
        summary.groups += 1;

        let Some(original) = resolved_original(entries, &members).or_else(|| {
            let unmarked: Vec<usize> = members
                .iter()
                .copied()
                .filter(|&i| !entries[i].is_duplicate)
                .collect();
            let real: Vec<usize> = unmarked
                .iter()
                .copied()
                .filter(|&i| !entries[i].entry.is_symlink)
                .collect();
            let candidates = if real.is_empty() { unmarked } else { real };
            select_original(&candidates, |&i| entries[i].size()).map(|pos| candidates[pos])
        }) else {
            // Every member was already marked against an original outside this set
            summary.duplicates += members.len();
            summary.wasted_bytes += members.iter().map(|&i| entries[i].size()).sum::<u64>();
            continue;
        };

        let original_path = entries[original].path().to_path_buf();
        log::debug!(
            "Duplicate group {} ({} members), original {}",
            short_hash(&entries[original].hash),
            members.len(),
            original_path.display()
        );

        for &i in &members {
            if i == original {
                continue;
            }
            let entry = &mut entries[i];
            if !entry.is_duplicate {
                entry.is_duplicate = true;
                entry.duplicate_of = Some(original_path.clone());
                summary.newly_marked += 1;
                log::trace!("{} duplicates {}", entry.path().display(), original_path.display());
            }
            summary.duplicates += 1;
            summary.wasted_bytes += entry.size();
        }
    }

    log::info!(
        "Duplicate detection: {} groups, {} duplicates ({} new)",
        summary.groups,
        summary.duplicates,
        summary.newly_marked
    );
    summary
}

/// The original chosen by an earlier pass, if it is part of `members`.
fn resolved_original(entries: &[HashedEntry], members: &[usize]) -> Option<usize> {
    let target = members
        .iter()
        .find_map(|&i| entries[i].duplicate_of.as_deref())?;
    members
        .iter()
        .copied()
        .find(|&i| !entries[i].is_duplicate && entries[i].path() == target)
}

/// Group entries by digest for presentation.
///
/// Only digests with two or more members are returned, in first-occurrence
/// order. Members are sorted largest first, stable on encounter order.
#[must_use]
pub fn group_by_digest(entries: &[HashedEntry]) -> Vec<DuplicateGroup> {
    digest_groups(entries)
        .into_iter()
        .filter(|members| members.len() > 1)
        .map(|members| {
            let mut files: Vec<HashedEntry> = members.iter().map(|&i| entries[i].clone()).collect();
            files.sort_by(|a, b| b.size().cmp(&a.size()));
            DuplicateGroup {
                hash: files[0].hash.clone(),
                files,
            }
        })
        .collect()
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
