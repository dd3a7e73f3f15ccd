//! Hashing pipeline: walk, hash every entry, resolve duplicates.
//!
//! # Overview
//!
//! The [`Processor`] wraps a [`Walker`] and a [`ContentHasher`]. Each
//! discovered entry is streamed through the hasher in fixed-size chunks;
//! archive members are streamed straight out of their archive through the
//! shared [`ArchiveExpander`]. A failure on one entry is logged and the entry
//! is dropped, the remaining entries are still processed.
//!
//! # Resumable scans
//!
//! [`Processor::process_resumable`] consults a [`CheckpointStore`]: entries
//! whose size and modification time match the checkpoint reuse the stored
//! digest, everything else is hashed and merged back into the checkpoint
//! every [`CHECKPOINT_BATCH`] entries.
//!
//! # Example
//!
//! ```no_run
//! use safedupe::duplicates::Processor;
//! use safedupe::scanner::WalkerConfig;
//! use std::path::Path;
//!
//! let mut processor = Processor::new(WalkerConfig::default());
//! let mut entries = processor.process(Path::new("."), None, None).unwrap();
//! let summary = processor.detect_duplicates(&mut entries);
//! println!("{} duplicates in {} groups", summary.duplicates, summary.groups);
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::groups::{self, DuplicateSummary, HashedEntry};
use crate::checkpoint::data::META_HASH_ALGORITHM;
use crate::checkpoint::{CheckpointStore, FileMeta};
use crate::progress::{ProgressCallback, PHASE_HASH, PHASE_WALK};
use crate::scanner::walker::EntryFilter;
use crate::scanner::{
    ArchiveError, ArchiveExpander, ContentHasher, FileEntry, HashError, Hasher, ScanError, StandardArchiveExpander,
    WalkProgress, WalkStats, Walker, WalkerConfig, DEFAULT_BUFFER_SIZE,
};

/// Number of newly hashed entries between two checkpoint updates.
pub const CHECKPOINT_BATCH: usize = 500;

/// Per-chunk hashing progress for one entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HashProgress<'a> {
    pub path: &'a Path,
    pub bytes_read: u64,
    pub total_bytes: u64,
    /// Percentage in `0.0..=100.0` (100 for empty entries)
    pub percent: f64,
}

impl<'a> HashProgress<'a> {
    fn new(path: &'a Path, bytes_read: u64, total_bytes: u64) -> Self {
        let percent = if total_bytes == 0 {
            100.0
        } else {
            (bytes_read as f64 / total_bytes as f64 * 100.0).min(100.0)
        };
        Self {
            path,
            bytes_read,
            total_bytes,
            percent,
        }
    }
}

/// Counters for the most recent processing call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessStats {
    /// Entries hashed during this call
    pub hashed: usize,
    /// Entries whose digest was taken from a checkpoint
    pub reused: usize,
    /// Entries dropped because hashing failed
    pub failed: usize,
    /// Bytes read while hashing
    pub bytes_hashed: u64,
}

/// Walks, hashes and resolves duplicates.
pub struct Processor {
    walker: Walker,
    hasher: Box<dyn ContentHasher>,
    expander: Arc<dyn ArchiveExpander>,
    buffer_size: usize,
    stats: ProcessStats,
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("walker", &self.walker)
            .field("algorithm", &self.hasher.algorithm())
            .field("buffer_size", &self.buffer_size)
            .field("stats", &self.stats)
            .finish()
    }
}

impl Processor {
    /// Create a processor using the default hasher and archive expander.
    #[must_use]
    pub fn new(config: WalkerConfig) -> Self {
        Self::with_components(
            config,
            Box::new(Hasher::new()),
            Arc::new(StandardArchiveExpander::new()),
        )
    }

    /// Create a processor from explicit capabilities.
    ///
    /// The expander is shared between the walker (listing) and the
    /// processor (reading members).
    #[must_use]
    pub fn with_components(
        config: WalkerConfig,
        hasher: Box<dyn ContentHasher>,
        expander: Arc<dyn ArchiveExpander>,
    ) -> Self {
        Self {
            walker: Walker::with_expander(config, Arc::clone(&expander)),
            hasher,
            expander,
            buffer_size: DEFAULT_BUFFER_SIZE,
            stats: ProcessStats::default(),
        }
    }

    /// Switch the digest algorithm for subsequent calls.
    ///
    /// Entries produced earlier keep their digest and algorithm name.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::UnknownAlgorithm`] for unsupported names.
    pub fn set_algorithm(&mut self, name: &str) -> Result<(), HashError> {
        self.hasher.set_algorithm(name)
    }

    /// Name of the active digest algorithm.
    #[must_use]
    pub fn algorithm(&self) -> &'static str {
        self.hasher.algorithm()
    }

    /// Names of every algorithm the hasher supports.
    #[must_use]
    pub fn available_algorithms(&self) -> Vec<&'static str> {
        self.hasher.available_algorithms()
    }

    /// Set the hashing read-buffer size. Zero falls back to the default.
    pub fn set_buffer_size(&mut self, size: usize) {
        self.buffer_size = if size == 0 { DEFAULT_BUFFER_SIZE } else { size };
    }

    /// Current hashing read-buffer size.
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Counters of the most recent walk.
    #[must_use]
    pub fn walk_statistics(&self) -> WalkStats {
        self.walker.statistics()
    }

    /// Counters of the most recent processing call.
    #[must_use]
    pub fn statistics(&self) -> ProcessStats {
        self.stats
    }

    /// Walk `root` and hash every discovered entry.
    ///
    /// # Errors
    ///
    /// Only call-level walk errors (missing root, root not a directory) are
    /// returned; per-entry failures are logged and the entry is dropped.
    pub fn process(
        &mut self,
        root: &Path,
        predicate: Option<EntryFilter<'_>>,
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<Vec<HashedEntry>, ScanError> {
        self.process_roots(&[root.to_path_buf()], predicate, progress)
    }

    /// Walk several roots and hash every discovered entry.
    ///
    /// # Errors
    ///
    /// Fails on the first root that does not exist or is not a directory.
    pub fn process_roots(
        &mut self,
        roots: &[PathBuf],
        predicate: Option<EntryFilter<'_>>,
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<Vec<HashedEntry>, ScanError> {
        let files = self.walk(roots, predicate, progress)?;
        self.stats = ProcessStats::default();
        Ok(self.hash_all(files, progress, |_, _| None, |_, _| {}))
    }

    /// Hash an explicit list of files without walking or archive expansion.
    ///
    /// Paths that are missing, unreadable or not regular files are logged
    /// and skipped.
    pub fn batch_process(
        &mut self,
        paths: &[PathBuf],
        progress: Option<&dyn ProgressCallback>,
    ) -> Vec<HashedEntry> {
        self.stats = ProcessStats::default();
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            match fs::metadata(path) {
                Ok(meta) if meta.is_file() => {
                    let root = path.parent().unwrap_or(path);
                    files.push(FileEntry::from_metadata(path, root, &meta, None));
                }
                Ok(_) => {
                    log::warn!("Skipping {}: not a regular file", path.display());
                    self.stats.failed += 1;
                }
                Err(e) => {
                    log::warn!("Skipping {}: {}", path.display(), HashError::from_io(path, e));
                    self.stats.failed += 1;
                }
            }
        }
        self.hash_all(files, progress, |_, _| None, |_, _| {})
    }

    /// Walk `root`, reusing digests from the checkpoint for unchanged files.
    ///
    /// Newly hashed entries are merged into the checkpoint every
    /// [`CHECKPOINT_BATCH`] entries and once more at the end. Checkpoint write
    /// failures are logged and do not stop the scan. A checkpoint recorded
    /// with a different algorithm is discarded.
    ///
    /// # Errors
    ///
    /// Same as [`Processor::process`].
    pub fn process_resumable(
        &mut self,
        root: &Path,
        checkpoints: &CheckpointStore,
        predicate: Option<EntryFilter<'_>>,
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<Vec<HashedEntry>, ScanError> {
        let files = self.walk(&[root.to_path_buf()], predicate, progress)?;
        self.stats = ProcessStats::default();

        let algorithm = self.hasher.algorithm();
        let previous = match checkpoints.load(root) {
            Some(cp) if cp.hash_algorithm() == Some(algorithm) => {
                log::info!("Resuming from checkpoint with {} entries", cp.len());
                cp.processed_files
            }
            stale => {
                if stale.is_some() {
                    log::info!("Discarding checkpoint recorded with a different algorithm");
                }
                let mut metadata = BTreeMap::new();
                metadata.insert(META_HASH_ALGORITHM.to_string(), serde_json::json!(algorithm));
                if let Err(e) = checkpoints.save(root, BTreeMap::new(), Some(metadata)) {
                    log::warn!("Cannot write checkpoint: {}", e);
                }
                BTreeMap::new()
            }
        };

        let mut pending: BTreeMap<PathBuf, FileMeta> = BTreeMap::new();
        let lookup = |entry: &FileEntry, stats: &mut ProcessStats| {
            let meta = previous.get(&entry.path)?;
            if !meta.matches(entry.size, entry.modified) {
                return None;
            }
            let hash = meta.hash.clone()?;
            stats.reused += 1;
            log::trace!("Reusing checkpoint digest for {}", entry.path.display());
            Some(hash)
        };
        let record = |entry: &FileEntry, hash: &str| {
            // Checkpoints are JSON; a path that is not UTF-8 cannot be a key.
            if entry.path.to_str().is_none() {
                log::warn!("Not checkpointing non-UTF-8 path {}", entry.path.display());
                return;
            }
            pending.insert(
                entry.path.clone(),
                FileMeta::new(entry.size, entry.modified).with_hash(hash),
            );
            if pending.len() >= CHECKPOINT_BATCH {
                flush_checkpoint(checkpoints, root, &mut pending);
            }
        };

        let entries = self.hash_all(files, progress, lookup, record);
        flush_checkpoint(checkpoints, root, &mut pending);
        Ok(entries)
    }

    /// Hash one named file.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::NotFound`] for a missing path,
    /// [`HashError::NotAFile`] for a directory, and other variants for read
    /// failures. An empty file yields the digest of zero bytes.
    pub fn hash_file(&self, path: &Path) -> Result<String, HashError> {
        let meta = fs::metadata(path).map_err(|e| HashError::from_io(path, e))?;
        if !meta.is_file() {
            return Err(HashError::NotAFile(path.to_path_buf()));
        }
        let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        self.hasher
            .hash_stream(&mut file, self.buffer_size, &mut |_| {})
            .map_err(|e| HashError::from_io(path, e))
    }

    /// Hash one scanned entry, streaming archive members out of their archive.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry or its archive cannot be read.
    pub fn hash_entry(
        &self,
        entry: &FileEntry,
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<String, HashError> {
        let total = entry.size;
        let mut on_chunk = |bytes_read: u64| {
            if let Some(cb) = progress {
                cb.on_hash_progress(&HashProgress::new(&entry.path, bytes_read, total));
            }
        };

        if let (Some(archive), Some(member), true) =
            (&entry.archive_source, &entry.archive_path, entry.is_archive_content)
        {
            let mut digest = None;
            self.expander.read_member(archive, member, &mut |reader| {
                digest = Some(self.hasher.hash_stream(reader, self.buffer_size, &mut on_chunk)?);
                Ok(())
            })?;
            return digest.ok_or_else(|| {
                HashError::Archive(ArchiveError::MemberNotFound {
                    archive: archive.clone(),
                    member: member.clone(),
                })
            });
        }

        if entry.is_dir {
            return Err(HashError::NotAFile(entry.path.clone()));
        }
        let mut file = File::open(&entry.path).map_err(|e| HashError::from_io(&entry.path, e))?;
        self.hasher
            .hash_stream(&mut file, self.buffer_size, &mut on_chunk)
            .map_err(|e| HashError::from_io(&entry.path, e))
    }

    /// Resolve duplicates in place using the largest-first policy.
    pub fn detect_duplicates(&self, entries: &mut [HashedEntry]) -> DuplicateSummary {
        groups::detect_duplicates(entries)
    }

    fn walk(
        &mut self,
        roots: &[PathBuf],
        predicate: Option<EntryFilter<'_>>,
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<Vec<FileEntry>, ScanError> {
        if let Some(cb) = progress {
            cb.on_phase_start(PHASE_WALK, 0);
        }
        let mut forward = |p: &WalkProgress| {
            if let Some(cb) = progress {
                cb.on_walk_progress(p);
            }
        };
        let result = self.walker.walk_roots(roots, predicate, Some(&mut forward));
        if let Some(cb) = progress {
            cb.on_phase_end(PHASE_WALK);
        }

        let files = result?;
        let stats = self.walker.statistics();
        log::info!(
            "Walk complete: {} files, {} directories, {} errors",
            stats.file_count,
            stats.dir_count,
            stats.error_count
        );
        Ok(files)
    }

    /// Hash every entry, consulting `lookup` for a known digest first and
    /// reporting freshly computed digests to `record`.
    fn hash_all(
        &mut self,
        files: Vec<FileEntry>,
        progress: Option<&dyn ProgressCallback>,
        mut lookup: impl FnMut(&FileEntry, &mut ProcessStats) -> Option<String>,
        mut record: impl FnMut(&FileEntry, &str),
    ) -> Vec<HashedEntry> {
        if let Some(cb) = progress {
            cb.on_phase_start(PHASE_HASH, files.len());
        }

        let algorithm = self.hasher.algorithm();
        let mut entries = Vec::with_capacity(files.len());
        for (i, file) in files.into_iter().enumerate() {
            let path = file.path.clone();
            if let Some(hash) = lookup(&file, &mut self.stats) {
                entries.push(HashedEntry::new(file, hash, algorithm));
            } else {
                match self.hash_entry(&file, progress) {
                    Ok(hash) => {
                        self.stats.hashed += 1;
                        self.stats.bytes_hashed += file.size;
                        record(&file, &hash);
                        entries.push(HashedEntry::new(file, hash, algorithm));
                    }
                    Err(e) => {
                        log::warn!("Failed to hash {}: {}", file.path.display(), e);
                        self.stats.failed += 1;
                    }
                }
            }
            if let Some(cb) = progress {
                cb.on_item_completed(i + 1, &path);
            }
        }

        if let Some(cb) = progress {
            cb.on_phase_end(PHASE_HASH);
        }
        log::info!(
            "Hashing complete: {} hashed, {} reused, {} failed",
            self.stats.hashed,
            self.stats.reused,
            self.stats.failed
        );
        entries
    }
}

fn flush_checkpoint(store: &CheckpointStore, root: &Path, pending: &mut BTreeMap<PathBuf, FileMeta>) {
    if pending.is_empty() {
        return;
    }
    let batch = std::mem::take(pending);
    let count = batch.len();
    match store.update(root, batch) {
        Ok(_) => log::debug!("Checkpointed {} entries", count),
        Err(e) => log::warn!("Cannot update checkpoint: {}", e),
    }
}
