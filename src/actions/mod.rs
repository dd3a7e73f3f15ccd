//! File actions on resolved duplicates.
//!
//! This module provides:
//! - Planning: [`plan`] turns duplicates into delete, move or copy actions
//! - Execution: [`execute`] applies a plan as one protected transaction
//!
//! # Safety
//!
//! Originals are never part of a plan, so at least one copy of every group
//! is always preserved. Archive members are skipped. Before each action the
//! file is checked against the size and modification time recorded at scan
//! time, and any failure restores every path the batch touched.
//!
//! ```no_run
//! use safedupe::actions::{execute, plan, ActionKind};
//! use safedupe::rollback::RollbackManager;
//! use std::path::{Path, PathBuf};
//!
//! let entries = Vec::new();
//! let actions = plan(&entries, &ActionKind::Move { target_dir: PathBuf::from("/quarantine") });
//! let mut manager = RollbackManager::new(Path::new("/tmp/safedupe"));
//! match execute(&actions, &mut manager) {
//!     Ok(report) => println!("{}", report.summary()),
//!     Err(e) => eprintln!("Batch reverted: {}", e),
//! }
//! ```

pub mod apply;
pub mod plan;

pub use apply::{execute, ActionError, ActionReport};
pub use plan::{plan, ActionKind, PlannedAction, PlannedKind};
