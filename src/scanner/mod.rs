//! Scanner module for directory traversal and content hashing.
//!
//! This module provides functionality for:
//! - Deterministic depth-first directory walking using walkdir
//! - Archive expansion (members of zip/tar archives become virtual entries)
//! - Streaming content hashing (BLAKE3, SHA-256, SHA-512)
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal and file discovery
//! - [`archive`]: The [`ArchiveExpander`] capability and its default codecs
//! - [`hasher`]: The [`ContentHasher`] capability and the default [`Hasher`]
//!
//! # Example
//!
//! ```no_run
//! use safedupe::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let mut walker = Walker::new(WalkerConfig::default());
//! let files = walker.walk(Path::new("."), None, None).unwrap();
//! for file in &files {
//!     println!("{}: {} bytes", file.path.display(), file.size);
//! }
//! println!("{} errors", walker.statistics().error_count);
//! ```

pub mod archive;
pub mod hasher;
pub mod walker;

use std::fs::Metadata;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::fs_util::unix_seconds;

// Re-export main types
pub use archive::{ArchiveError, ArchiveExpander, ArchiveKind, ArchiveMember, StandardArchiveExpander};
pub use hasher::{ContentHasher, HashAlgorithm, Hasher, DEFAULT_BUFFER_SIZE};
pub use walker::{WalkProgress, WalkStats, Walker};

/// Metadata for one scanned unit: a real file or a member of an archive.
///
/// Entries are produced by the [`Walker`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Absolute path (for archive members: archive path joined with the member path)
    pub path: PathBuf,
    /// Path relative to the scan root
    pub relative_path: PathBuf,
    /// File name component
    pub name: String,
    /// Lowercased extension without the dot, empty if none
    pub extension: String,
    /// Size in bytes
    pub size: u64,
    /// Modification time in seconds since the Unix epoch
    pub modified: i64,
    /// Creation time in seconds since the Unix epoch (modification time if unavailable)
    pub created: i64,
    pub is_dir: bool,
    pub is_file: bool,
    pub is_symlink: bool,
    /// The file itself is an archive whose members were expanded
    pub is_archive: bool,
    /// The entry is a member inside an archive
    pub is_archive_content: bool,
    /// Archive containing this member (archive members only)
    pub archive_source: Option<PathBuf>,
    /// Path of this member inside its archive (archive members only)
    pub archive_path: Option<PathBuf>,
}

impl FileEntry {
    /// Create a plain file entry.
    ///
    /// The relative path defaults to the file name; use
    /// [`FileEntry::with_root`] to make it relative to a scan root.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the file
    /// * `size` - File size in bytes
    /// * `modified` - Modification time in Unix seconds
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: i64) -> Self {
        let name = file_name_of(&path);
        let extension = extension_of(&path);
        Self {
            relative_path: PathBuf::from(&name),
            path,
            name,
            extension,
            size,
            modified,
            created: modified,
            is_dir: false,
            is_file: true,
            is_symlink: false,
            is_archive: false,
            is_archive_content: false,
            archive_source: None,
            archive_path: None,
        }
    }

    /// Build an entry from filesystem metadata.
    ///
    /// `metadata` should come from `symlink_metadata` so that `is_symlink`
    /// reflects the link itself; `target` carries the resolved metadata of a
    /// symlinked file when available.
    #[must_use]
    pub fn from_metadata(path: &Path, root: &Path, metadata: &Metadata, target: Option<&Metadata>) -> Self {
        let is_symlink = metadata.file_type().is_symlink();
        let effective = target.unwrap_or(metadata);
        let modified = effective.modified().map(unix_seconds).unwrap_or(0);
        let created = effective.created().map(unix_seconds).unwrap_or(modified);

        let mut entry = Self::new(path.to_path_buf(), effective.len(), modified);
        entry.with_root(root);
        entry.created = created;
        entry.is_dir = effective.is_dir();
        entry.is_file = effective.is_file();
        entry.is_symlink = is_symlink;
        entry
    }

    /// Build the virtual entry for a member of `archive`.
    #[must_use]
    pub fn archive_member(archive: &FileEntry, member: &ArchiveMember) -> Self {
        let path = archive.path.join(&member.relative_path);
        let mut entry = Self::new(path, member.size, member.modified);
        entry.relative_path = archive.relative_path.join(&member.relative_path);
        entry.created = member.created;
        entry.is_archive_content = true;
        entry.archive_source = Some(archive.path.clone());
        entry.archive_path = Some(member.relative_path.clone());
        entry
    }

    /// Recompute the relative path against a scan root.
    pub fn with_root(&mut self, root: &Path) -> &mut Self {
        if let Ok(relative) = self.path.strip_prefix(root) {
            if !relative.as_os_str().is_empty() {
                self.relative_path = relative.to_path_buf();
            }
        }
        self
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Configuration for directory walking.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Expand archives into virtual member entries.
    pub expand_archives: bool,

    /// Skip hidden files and directories (names starting with `.`).
    pub skip_hidden: bool,

    /// Glob patterns to ignore (gitignore-style), relative to the scan root.
    pub ignore_patterns: Vec<String>,

    /// Minimum interval between two progress reports.
    pub progress_interval: std::time::Duration,
}

/// Default minimum interval between walk progress reports.
pub const PROGRESS_INTERVAL: std::time::Duration = std::time::Duration::from_millis(100);

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            expand_archives: true,
            skip_hidden: false,
            ignore_patterns: Vec::new(),
            progress_interval: PROGRESS_INTERVAL,
        }
    }
}

impl WalkerConfig {
    /// Enable or disable archive expansion.
    #[must_use]
    pub fn with_expand_archives(mut self, expand: bool) -> Self {
        self.expand_archives = expand;
        self
    }

    /// Set the gitignore-style ignore patterns.
    #[must_use]
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Skip hidden files and directories.
    #[must_use]
    pub fn with_skip_hidden(mut self, skip: bool) -> Self {
        self.skip_hidden = skip;
        self
    }
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    /// Classify an I/O error for `path`.
    #[must_use]
    pub fn from_io(path: &Path, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// A directory (or other non-regular file) was given where a file was expected.
    #[error("Not a regular file: {0}")]
    NotAFile(PathBuf),

    /// The requested algorithm is not supported.
    #[error("Unknown hash algorithm '{0}'")]
    UnknownAlgorithm(String),

    /// The archive member could not be opened.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl HashError {
    /// Classify an I/O error for `path`.
    #[must_use]
    pub fn from_io(path: &Path, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}
