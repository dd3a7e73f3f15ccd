//! safedupe - archive-aware duplicate file finder with recoverable cleanup.
//!
//! Files are discovered by a deterministic walk that can look inside zip and
//! tar archives, hashed with a configurable digest, and grouped so that one
//! original per digest is kept. Destructive cleanup of the duplicates runs
//! through a snapshot-backed transaction journal: a failed batch is reverted
//! on the spot and a committed one can be rolled back later.
//!
//! # Layout
//!
//! - [`scanner`]: walking, archive expansion and content hashing
//! - [`duplicates`]: the hashing pipeline and duplicate resolution
//! - [`checkpoint`]: resumable scan state
//! - [`rollback`]: snapshots, transactions and protected execution
//! - [`store`]: persisted scan results
//! - [`actions`]: delete, move and copy plans over resolved duplicates

pub mod actions;
pub mod app;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod fs_util;
pub mod logging;
pub mod output;
pub mod progress;
pub mod rollback;
pub mod scanner;
pub mod store;

pub use app::run_app;
