//! Application configuration.
//!
//! Settings are layered with figment, later layers winning:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. TOML file: `<config_dir>/config.toml`, or the path given with `--config`
//! 3. `SAFEDUPE_*` environment variables (`SAFEDUPE_HASH_ALGORITHM=sha256`)
//!
//! ```toml
//! hash_algorithm = "blake3"
//! buffer_size = 65536
//! expand_archives = true
//! ignore_patterns = ["*.tmp", "node_modules/"]
//! snapshot_retention = { retain = { hours = 48 } }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::rollback::RetentionPolicy;
use crate::scanner::{HashAlgorithm, WalkerConfig, DEFAULT_BUFFER_SIZE};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "SAFEDUPE_";
/// Name of the configuration file inside the config directory.
pub const CONFIG_FILE: &str = "config.toml";

const CHECKPOINT_SUBDIR: &str = "checkpoints";
const DATABASE_FILE: &str = "safedupe.db";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Content digest used for new hashes
    pub hash_algorithm: HashAlgorithm,
    /// Read buffer size in bytes; 0 selects the built-in default
    pub buffer_size: usize,
    /// List archive members and hash them as virtual files
    pub expand_archives: bool,
    /// Skip dot-files and dot-directories
    pub skip_hidden: bool,
    /// Gitignore-style patterns excluded from every scan
    pub ignore_patterns: Vec<String>,
    /// Root for checkpoints, snapshots, transactions and the database
    pub data_dir: PathBuf,
    /// What happens to a snapshot once its batch succeeds
    pub snapshot_retention: RetentionPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            expand_archives: true,
            skip_hidden: false,
            ignore_patterns: Vec::new(),
            data_dir: default_data_dir(),
            snapshot_retention: RetentionPolicy::default(),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "safedupe", "safedupe")
}

fn default_data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".safedupe"))
}

impl Config {
    /// Platform-specific path of the configuration file.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Figment with every layer in place; `path` overrides the default file.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(file) => {
                log::debug!("Reading configuration from {}", file.display());
                figment = figment.merge(Toml::file(file));
            }
            None => log::debug!("No configuration directory available"),
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load the layered configuration.
    ///
    /// A missing file is not an error; a malformed one is.
    ///
    /// # Errors
    ///
    /// Returns an error if a layer cannot be parsed into [`Config`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(explicit) = path {
            anyhow::ensure!(
                explicit.is_file(),
                "Configuration file not found: {}",
                explicit.display()
            );
        }
        Self::figment(path)
            .extract()
            .context("Invalid configuration")
    }

    /// Walker settings derived from this configuration.
    #[must_use]
    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig::default()
            .with_expand_archives(self.expand_archives)
            .with_skip_hidden(self.skip_hidden)
            .with_ignore_patterns(self.ignore_patterns.clone())
    }

    #[must_use]
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.data_dir.join(CHECKPOINT_SUBDIR)
    }

    #[must_use]
    pub fn snapshot_dir(&self) -> PathBuf {
        self.data_dir.join(crate::rollback::manager::SNAPSHOT_SUBDIR)
    }

    #[must_use]
    pub fn transaction_dir(&self) -> PathBuf {
        self.data_dir.join(crate::rollback::manager::TRANSACTION_SUBDIR)
    }

    /// Default location of the duplicate database.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}
