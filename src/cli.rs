//! Command-line interface definitions for safedupe.
//!
//! # Example
//!
//! ```bash
//! # Scan two directories, archives included, and print a text report
//! safedupe scan ~/Downloads ~/Backups
//!
//! # Resume an interrupted scan and emit JSON
//! safedupe scan ~/Photos --resume --output json
//!
//! # Move duplicates to a quarantine folder, then undo it
//! safedupe dedupe ~/Downloads --action move --target ~/quarantine --yes
//! safedupe rollback 3f2a9c1b7d4e
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::scanner::HashAlgorithm;

/// Archive-aware duplicate file finder with recoverable cleanup.
///
/// Every destructive action runs inside a journaled transaction backed by
/// snapshots, so a failed batch is reverted and a completed one can be
/// rolled back later.
#[derive(Debug, Parser)]
#[command(name = "safedupe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Report errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Configuration file (default: <config_dir>/safedupe/config.toml)
    #[arg(long, global = true, value_name = "PATH", env = "SAFEDUPE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Hash files under one or more roots and report duplicates
    Scan(ScanArgs),
    /// Scan, then delete, move or copy every duplicate in one transaction
    Dedupe(DedupeArgs),
    /// Revert a recorded transaction
    Rollback(RollbackArgs),
    /// List recorded transactions, newest first
    Transactions,
    /// List stored snapshots, newest first
    Snapshots(SnapshotsArgs),
    /// Manage scan checkpoints
    #[command(subcommand)]
    Checkpoint(CheckpointCommand),
}

/// Options shared by every command that scans.
#[derive(Debug, Args)]
pub struct ScanOptions {
    /// Directories to scan
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Reuse hashes from the checkpoint of a previous run
    #[arg(long)]
    pub resume: bool,

    /// Do not look inside archives
    #[arg(long)]
    pub no_archives: bool,

    /// Content digest algorithm (default from configuration)
    #[arg(long, value_enum, value_name = "NAME")]
    pub algorithm: Option<AlgorithmArg>,

    /// Gitignore-style patterns to exclude (can be specified multiple times)
    #[arg(short, long = "exclude", value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    #[command(flatten)]
    pub scan: ScanOptions,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Record results in a SQLite database (default: <data_dir>/safedupe.db with --db)
    #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = "")]
    pub db: Option<PathBuf>,
}

/// Arguments for the dedupe subcommand.
#[derive(Debug, Args)]
pub struct DedupeArgs {
    #[command(flatten)]
    pub scan: ScanOptions,

    /// What to do with each duplicate
    #[arg(long, value_enum)]
    pub action: ActionArg,

    /// Destination directory for move and copy
    #[arg(long, value_name = "DIR", required_if_eq_any = [("action", "move"), ("action", "copy")])]
    pub target: Option<PathBuf>,

    /// Apply without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Print the plan and exit without touching any file
    #[arg(long, conflicts_with = "yes")]
    pub dry_run: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the rollback subcommand.
#[derive(Debug, Args)]
pub struct RollbackArgs {
    /// Transaction id as printed by `dedupe` or `transactions`
    #[arg(value_name = "TX_ID")]
    pub transaction_id: String,
}

/// Arguments for the snapshots subcommand.
#[derive(Debug, Args)]
pub struct SnapshotsArgs {
    /// Delete snapshots older than the retention window
    #[arg(long)]
    pub prune: bool,
}

/// Checkpoint management.
#[derive(Debug, Subcommand)]
pub enum CheckpointCommand {
    /// Remove the checkpoint stored for a scan root
    Clear {
        #[arg(value_name = "ROOT")]
        root: PathBuf,
    },
}

/// Output format for scan results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable report
    #[default]
    Text,
    /// JSON for scripting
    Json,
}

/// Content digest choice on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AlgorithmArg {
    Blake3,
    Sha256,
    Sha512,
}

impl From<AlgorithmArg> for HashAlgorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Blake3 => Self::Blake3,
            AlgorithmArg::Sha256 => Self::Sha256,
            AlgorithmArg::Sha512 => Self::Sha512,
        }
    }
}

/// Action applied to duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ActionArg {
    Delete,
    Move,
    Copy,
}
