//! Streaming content hasher.
//!
//! # Overview
//! This module provides the [`ContentHasher`] capability and the default
//! [`Hasher`] implementation. Content is read in fixed-size chunks so
//! memory use stays flat regardless of file size, and a callback observes
//! every chunk for progress reporting.
//!
//! BLAKE3 is the default algorithm. SHA-256 and SHA-512 are available for
//! interoperability with external tooling.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

use super::HashError;

/// Default read buffer size for hashing (64 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Supported content digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Blake3,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// All supported algorithms, default first.
    pub const ALL: [HashAlgorithm; 3] = [Self::Blake3, Self::Sha256, Self::Sha512];

    /// Canonical lowercase name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Blake3 => "blake3",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Length of the hex digest produced by this algorithm.
    #[must_use]
    pub fn hex_len(self) -> usize {
        match self {
            Self::Blake3 | Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "blake3" => Ok(Self::Blake3),
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            _ => Err(HashError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Capability: turn a byte stream into a hex digest.
pub trait ContentHasher: Send + Sync {
    /// Hash everything `reader` yields, reading `chunk_size` bytes at a time.
    ///
    /// `on_chunk` receives the cumulative number of bytes read after each chunk.
    fn hash_stream(
        &self,
        reader: &mut dyn Read,
        chunk_size: usize,
        on_chunk: &mut dyn FnMut(u64),
    ) -> io::Result<String>;

    /// Switch to the algorithm called `name`.
    fn set_algorithm(&mut self, name: &str) -> Result<(), HashError>;

    /// Name of the active algorithm.
    fn algorithm(&self) -> &'static str;

    /// Names of all algorithms this hasher can use.
    fn available_algorithms(&self) -> Vec<&'static str>;
}

/// Incremental digest state for one hashing run.
enum DigestState {
    Blake3(Box<blake3::Hasher>),
    Sha256(Sha256),
    Sha512(Sha512),
}

impl DigestState {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => Self::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Blake3(h) => {
                h.update(data);
            }
            Self::Sha256(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Blake3(h) => h.finalize().to_hex().to_string(),
            Self::Sha256(h) => format!("{:x}", h.finalize()),
            Self::Sha512(h) => format!("{:x}", h.finalize()),
        }
    }
}

/// Default streaming hasher.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hasher {
    algorithm: HashAlgorithm,
}

impl Hasher {
    /// Create a hasher using BLAKE3.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hasher using the given algorithm.
    #[must_use]
    pub fn with_algorithm(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    /// The active algorithm.
    #[must_use]
    pub fn kind(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Hash an in-memory buffer.
    #[must_use]
    pub fn hash_bytes(&self, data: &[u8]) -> String {
        let mut state = DigestState::new(self.algorithm);
        state.update(data);
        state.finalize_hex()
    }

    /// Hash a file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::NotFound`] for missing files and
    /// [`HashError::NotAFile`] for directories.
    pub fn hash_file(&self, path: &Path, chunk_size: usize) -> Result<String, HashError> {
        let metadata = std::fs::metadata(path).map_err(|e| HashError::from_io(path, e))?;
        if !metadata.is_file() {
            return Err(HashError::NotAFile(path.to_path_buf()));
        }
        let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        self.hash_stream(&mut file, chunk_size, &mut |_| {})
            .map_err(|e| HashError::from_io(path, e))
    }
}

impl ContentHasher for Hasher {
    fn hash_stream(
        &self,
        reader: &mut dyn Read,
        chunk_size: usize,
        on_chunk: &mut dyn FnMut(u64),
    ) -> io::Result<String> {
        let mut state = DigestState::new(self.algorithm);
        let mut buffer = vec![0u8; chunk_size.max(1)];
        let mut total: u64 = 0;

        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            state.update(&buffer[..n]);
            total += n as u64;
            on_chunk(total);
        }

        Ok(state.finalize_hex())
    }

    fn set_algorithm(&mut self, name: &str) -> Result<(), HashError> {
        self.algorithm = name.parse()?;
        log::debug!("Hash algorithm set to {}", self.algorithm);
        Ok(())
    }

    fn algorithm(&self) -> &'static str {
        self.algorithm.name()
    }

    fn available_algorithms(&self) -> Vec<&'static str> {
        HashAlgorithm::ALL.iter().map(|a| a.name()).collect()
    }
}
