//! Directory walker implementation using walkdir.
//!
//! # Overview
//!
//! This module provides the [`Walker`] struct for traversing a directory
//! tree and collecting [`FileEntry`] metadata for duplicate detection.
//! Traversal is single-threaded and depth-first, with children sorted by
//! file name so repeated walks produce the same order.
//!
//! # Features
//!
//! - Symbolic links are recorded but never followed into directories
//! - Archives are expanded into virtual member entries via [`ArchiveExpander`]
//! - Gitignore-style pattern matching via the `ignore` crate
//! - Caller-supplied inclusion predicate
//! - Throttled progress reporting (at most once per [`WalkerConfig::progress_interval`])
//! - Per-entry failures are counted and logged, never fatal
//!
//! # Example
//!
//! ```no_run
//! use safedupe::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let mut walker = Walker::new(WalkerConfig::default());
//! let only_text = |entry: &safedupe::scanner::FileEntry| entry.extension == "txt";
//! let files = walker
//!     .walk(Path::new("/home/user/Documents"), Some(&only_text), None)
//!     .unwrap();
//! println!("Found {} text files", files.len());
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use walkdir::WalkDir;

use super::archive::{ArchiveExpander, StandardArchiveExpander};
use super::{FileEntry, ScanError, WalkerConfig};

/// Inclusion predicate: return `false` to drop an entry.
pub type EntryFilter<'a> = &'a dyn Fn(&FileEntry) -> bool;

/// Throughput snapshot delivered to walk progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkProgress {
    pub files_processed: u64,
    pub dirs_processed: u64,
    pub errors: u64,
    pub elapsed: Duration,
    pub files_per_sec: f64,
}

/// Running counters for the current (or last) walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub file_count: u64,
    pub dir_count: u64,
    pub error_count: u64,
}

/// Throttles progress reports to one per interval.
struct ProgressThrottle<'a> {
    callback: Option<&'a mut dyn FnMut(&WalkProgress)>,
    interval: Duration,
    started: Instant,
    last_report: Instant,
}

impl<'a> ProgressThrottle<'a> {
    fn new(callback: Option<&'a mut dyn FnMut(&WalkProgress)>, interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            callback,
            interval,
            started: now,
            last_report: now,
        }
    }

    fn tick(&mut self, stats: &WalkStats) {
        let Some(callback) = self.callback.as_mut() else {
            return;
        };
        let now = Instant::now();
        if now.duration_since(self.last_report) < self.interval {
            return;
        }
        self.last_report = now;

        let elapsed = now.duration_since(self.started);
        let secs = elapsed.as_secs_f64();
        let files_per_sec = if secs > 0.0 {
            stats.file_count as f64 / secs
        } else {
            0.0
        };
        callback(&WalkProgress {
            files_processed: stats.file_count,
            dirs_processed: stats.dir_count,
            errors: stats.error_count,
            elapsed,
            files_per_sec,
        });
    }
}

/// Directory walker for file discovery.
pub struct Walker {
    /// Walker configuration
    config: WalkerConfig,
    /// Archive capability used when `expand_archives` is set
    expander: Arc<dyn ArchiveExpander>,
    /// Counters for the current walk
    stats: WalkStats,
}

impl std::fmt::Debug for Walker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Walker")
            .field("config", &self.config)
            .field("expander", &"<archive expander>")
            .field("stats", &self.stats)
            .finish()
    }
}

impl Default for Walker {
    fn default() -> Self {
        Self::new(WalkerConfig::default())
    }
}

impl Walker {
    /// Create a walker using the standard archive expander.
    #[must_use]
    pub fn new(config: WalkerConfig) -> Self {
        Self::with_expander(config, Arc::new(StandardArchiveExpander::new()))
    }

    /// Create a walker using a custom archive expander.
    #[must_use]
    pub fn with_expander(config: WalkerConfig, expander: Arc<dyn ArchiveExpander>) -> Self {
        Self {
            config,
            expander,
            stats: WalkStats::default(),
        }
    }

    /// The archive expander shared with consumers that need to read members.
    #[must_use]
    pub fn expander(&self) -> Arc<dyn ArchiveExpander> {
        Arc::clone(&self.expander)
    }

    /// Walker configuration.
    #[must_use]
    pub fn config(&self) -> &WalkerConfig {
        &self.config
    }

    /// Counters of the current or most recent walk.
    #[must_use]
    pub fn statistics(&self) -> WalkStats {
        self.stats
    }

    /// Reset all counters to zero.
    pub fn reset(&mut self) {
        self.stats = WalkStats::default();
    }

    /// Walk one root, returning every included file and archive member.
    ///
    /// Counters are reset at the start of the call.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::NotFound`] / [`ScanError::NotADirectory`] when the
    /// root itself is unusable. Failures below the root are counted in
    /// [`WalkStats::error_count`] and logged instead.
    pub fn walk(
        &mut self,
        root: &Path,
        predicate: Option<EntryFilter<'_>>,
        on_progress: Option<&mut dyn FnMut(&WalkProgress)>,
    ) -> Result<Vec<FileEntry>, ScanError> {
        self.reset();
        let mut throttle = ProgressThrottle::new(on_progress, self.config.progress_interval);
        let mut entries = Vec::new();
        self.walk_root(root, predicate, &mut throttle, &mut entries)?;
        Ok(entries)
    }

    /// Walk several roots in order, accumulating counters across all of them.
    ///
    /// Repeated roots and roots nested inside another root are walked once,
    /// through the outermost root, so no file is reported twice.
    ///
    /// # Errors
    ///
    /// Fails on the first root that does not exist or is not a directory.
    pub fn walk_roots(
        &mut self,
        roots: &[PathBuf],
        predicate: Option<EntryFilter<'_>>,
        on_progress: Option<&mut dyn FnMut(&WalkProgress)>,
    ) -> Result<Vec<FileEntry>, ScanError> {
        self.reset();
        let mut throttle = ProgressThrottle::new(on_progress, self.config.progress_interval);
        let mut entries = Vec::new();
        for root in distinct_roots(roots) {
            self.walk_root(root, predicate, &mut throttle, &mut entries)?;
        }
        Ok(entries)
    }

    fn walk_root(
        &mut self,
        root: &Path,
        predicate: Option<EntryFilter<'_>>,
        throttle: &mut ProgressThrottle<'_>,
        out: &mut Vec<FileEntry>,
    ) -> Result<(), ScanError> {
        let root_meta = fs::metadata(root).map_err(|e| ScanError::from_io(root, e))?;
        if !root_meta.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }

        let gitignore = self.build_gitignore(root);
        log::debug!("Walking {}", root.display());

        let mut iter = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        while let Some(next) = iter.next() {
            let entry = match next {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
                    log::warn!("Walker error for {}: {}", path.display(), e);
                    self.stats.error_count += 1;
                    throttle.tick(&self.stats);
                    continue;
                }
            };

            // Skip the root directory itself
            if entry.depth() == 0 {
                continue;
            }

            let path = entry.path();
            let file_type = entry.file_type();

            if self.config.skip_hidden && is_hidden(path) {
                log::trace!("Skipping hidden: {}", path.display());
                if file_type.is_dir() {
                    iter.skip_current_dir();
                }
                continue;
            }

            if file_type.is_dir() {
                if should_ignore(root, path, true, gitignore.as_ref()) {
                    log::trace!("Ignoring directory: {}", path.display());
                    iter.skip_current_dir();
                    continue;
                }
                self.stats.dir_count += 1;
                throttle.tick(&self.stats);
                continue;
            }

            if should_ignore(root, path, false, gitignore.as_ref()) {
                log::trace!("Ignoring file: {}", path.display());
                continue;
            }

            if let Some(file) = self.stat_entry(root, path, file_type.is_symlink()) {
                self.include(file, predicate, out);
            }
            throttle.tick(&self.stats);
        }

        Ok(())
    }

    /// Stat one candidate; returns `None` (after counting) on failure or for
    /// symlinks that point at directories.
    fn stat_entry(&mut self, root: &Path, path: &Path, is_symlink: bool) -> Option<FileEntry> {
        let metadata = match fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) => {
                self.record_error(&ScanError::from_io(path, e));
                return None;
            }
        };

        if !is_symlink {
            if !metadata.is_file() {
                log::trace!("Skipping special file: {}", path.display());
                return None;
            }
            return Some(FileEntry::from_metadata(path, root, &metadata, None));
        }

        match fs::metadata(path) {
            Ok(target) if target.is_dir() => {
                log::trace!("Not following directory symlink: {}", path.display());
                None
            }
            Ok(target) => Some(FileEntry::from_metadata(path, root, &metadata, Some(&target))),
            Err(e) => {
                self.record_error(&ScanError::from_io(path, e));
                None
            }
        }
    }

    /// Apply the predicate, record the entry, then expand it if it is an archive.
    fn include(&mut self, mut file: FileEntry, predicate: Option<EntryFilter<'_>>, out: &mut Vec<FileEntry>) {
        if predicate.is_some_and(|keep| !keep(&file)) {
            log::trace!("Excluded by predicate: {}", file.path.display());
            return;
        }

        let members = if self.config.expand_archives && !file.is_symlink && self.expander.is_archive(&file.path) {
            match self.expander.list_contents(&file.path) {
                Ok(members) => {
                    file.is_archive = true;
                    members
                }
                Err(e) => {
                    log::warn!("Cannot expand archive {}: {}", file.path.display(), e);
                    self.stats.error_count += 1;
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        self.stats.file_count += 1;
        let archive_index = out.len();
        out.push(file);

        for member in &members {
            let entry = FileEntry::archive_member(&out[archive_index], member);
            if predicate.is_some_and(|keep| !keep(&entry)) {
                continue;
            }
            self.stats.file_count += 1;
            out.push(entry);
        }
    }

    fn record_error(&mut self, error: &ScanError) {
        match error {
            ScanError::NotFound(path) => {
                log::debug!("File not found (may have been deleted): {}", path.display());
            }
            other => log::warn!("{}", other),
        }
        self.stats.error_count += 1;
    }

    /// Build gitignore matcher from the configured patterns.
    fn build_gitignore(&self, root: &Path) -> Option<Gitignore> {
        if self.config.ignore_patterns.is_empty() {
            return None;
        }
        let mut builder = GitignoreBuilder::new(root);
        for pattern in &self.config.ignore_patterns {
            if let Err(e) = builder.add_line(None, pattern) {
                log::warn!("Invalid ignore pattern '{}': {}", pattern, e);
            }
        }
        match builder.build() {
            Ok(gitignore) if !gitignore.is_empty() => Some(gitignore),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Failed to build ignore patterns: {}", e);
                None
            }
        }
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with('.'))
}

/// Check if a path should be ignored based on configured patterns.
fn should_ignore(root: &Path, path: &Path, is_dir: bool, gitignore: Option<&Gitignore>) -> bool {
    let Some(gi) = gitignore else {
        return false;
    };
    // Gitignore matching expects paths relative to the root with forward slashes
    let relative_path = path.strip_prefix(root).unwrap_or(path);
    let path_str = relative_path.to_string_lossy();
    let normalized_path = if cfg!(windows) {
        path_str.replace('\\', "/")
    } else {
        path_str.into_owned()
    };
    gi.matched(normalized_path, is_dir).is_ignore()
}

/// `roots` without repeats and without roots nested inside another root.
///
/// Roots are compared by canonical path; one that cannot be resolved is kept
/// as given so walking it reports the error. Input order is preserved.
fn distinct_roots(roots: &[PathBuf]) -> Vec<&Path> {
    let resolved: Vec<PathBuf> = roots
        .iter()
        .map(|r| r.canonicalize().unwrap_or_else(|_| r.clone()))
        .collect();

    let mut kept = Vec::with_capacity(roots.len());
    for (i, root) in roots.iter().enumerate() {
        let canon = &resolved[i];
        let repeated = resolved[..i].contains(canon);
        let nested = resolved
            .iter()
            .any(|other| other != canon && canon.starts_with(other));
        if repeated || nested {
            log::info!("Skipping root {}: already covered by another root", root.display());
            continue;
        }
        kept.push(root.as_path());
    }
    kept
}
