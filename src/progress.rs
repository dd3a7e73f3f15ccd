//! Progress reporting utilities using indicatif.
//!
//! This module provides the [`ProgressCallback`] trait through which the
//! [`Processor`](crate::duplicates::Processor) reports the walk and hashing
//! phases, and the [`Progress`] struct which renders those reports as
//! terminal progress bars.
//!
//! # Accessible Mode
//!
//! When accessible mode is enabled, progress reporting uses simplified output:
//! - No spinners or animations
//! - Plain ASCII bars without Unicode block characters
//! - Reduced tick frequency for screen reader compatibility

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::duplicates::HashProgress;
use crate::scanner::WalkProgress;

/// Name of the directory walking phase.
pub const PHASE_WALK: &str = "walking";
/// Name of the content hashing phase.
pub const PHASE_HASH: &str = "hashing";

/// Progress callback for the scan pipeline.
///
/// Implement this trait to receive progress updates while a
/// [`Processor`](crate::duplicates::Processor) walks and hashes a tree.
/// All methods except the phase boundaries have empty defaults.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase ([`PHASE_WALK`] or [`PHASE_HASH`])
    /// * `total` - Total number of items to process (0 if unknown)
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called with throttled throughput reports during the walk.
    fn on_walk_progress(&self, _progress: &WalkProgress) {}

    /// Called after every chunk read while hashing one entry.
    fn on_hash_progress(&self, _progress: &HashProgress<'_>) {}

    /// Called when an entry has been hashed.
    ///
    /// # Arguments
    ///
    /// * `current` - Number of entries finished so far (1-based)
    /// * `path` - Path of the finished entry
    fn on_item_completed(&self, _current: usize, _path: &Path) {}

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Progress reporter using indicatif.
///
/// Shows a spinner while walking and a bar while hashing.
pub struct Progress {
    multi: MultiProgress,
    walking: Mutex<Option<ProgressBar>>,
    hashing: Mutex<Option<ProgressBar>>,
    quiet: bool,
    accessible: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, no progress bars will be displayed.
    ///
    /// # Examples
    ///
    /// ```
    /// use safedupe::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self::with_accessible(quiet, false)
    }

    /// Create a new progress reporter with accessible mode.
    #[must_use]
    pub fn with_accessible(quiet: bool, accessible: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            walking: Mutex::new(None),
            hashing: Mutex::new(None),
            quiet,
            accessible,
        }
    }

    /// Check if accessible mode is enabled.
    #[must_use]
    pub fn is_accessible(&self) -> bool {
        self.accessible
    }

    /// Create a style for the walking phase (spinner).
    fn walking_style(&self) -> ProgressStyle {
        if self.accessible {
            // Accessible: No spinner animation, just text
            ProgressStyle::with_template("{msg} [{elapsed_precise}] {pos} files")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
        } else {
            ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} files")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        }
    }

    /// Create a style for the hashing phase (progress bar).
    fn hashing_style(&self) -> ProgressStyle {
        if self.accessible {
            // Accessible: ASCII progress bar, no Unicode
            ProgressStyle::with_template(
                "[{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-")
        } else {
            ProgressStyle::with_template(
                "[{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█>-")
        }
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }

        match phase {
            PHASE_WALK => {
                let pb = self.multi.add(ProgressBar::new_spinner());
                pb.set_style(self.walking_style());
                pb.set_message("Walking directory");
                // In accessible mode, use a slower tick rate
                let tick_rate = if self.accessible { 500 } else { 100 };
                pb.enable_steady_tick(Duration::from_millis(tick_rate));
                *lock(&self.walking) = Some(pb);
            }
            _ => {
                let pb = self.multi.add(ProgressBar::new(total as u64));
                pb.set_style(self.hashing_style());
                pb.set_message("Hashing");
                *lock(&self.hashing) = Some(pb);
            }
        }
    }

    fn on_walk_progress(&self, progress: &WalkProgress) {
        if self.quiet {
            return;
        }
        if let Some(ref pb) = *lock(&self.walking) {
            pb.set_position(progress.files_processed);
            pb.set_message(format!(
                "Walking ({:.0} files/s, {} errors)",
                progress.files_per_sec, progress.errors
            ));
        }
    }

    fn on_hash_progress(&self, progress: &HashProgress<'_>) {
        // Only large files are worth a per-chunk message
        if self.quiet || progress.total_bytes < 16 * 1024 * 1024 {
            return;
        }
        if let Some(ref pb) = *lock(&self.hashing) {
            pb.set_message(format!(
                "{} {:.0}%",
                truncate_path(&progress.path.to_string_lossy(), 30),
                progress.percent
            ));
        }
    }

    fn on_item_completed(&self, current: usize, path: &Path) {
        if self.quiet {
            return;
        }
        if let Some(ref pb) = *lock(&self.hashing) {
            pb.set_position(current as u64);
            pb.set_message(truncate_path(&path.to_string_lossy(), 30));
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }

        match phase {
            PHASE_WALK => {
                if let Some(pb) = lock(&self.walking).take() {
                    pb.finish_with_message("Walking complete");
                }
            }
            _ => {
                if let Some(pb) = lock(&self.hashing).take() {
                    pb.finish_with_message("Hashing complete");
                }
            }
        }
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.len() <= max_len {
        return path.to_string();
    }

    let file_name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    if file_name.len() >= max_len {
        let mut start = file_name.len() - max_len + 3;
        while !file_name.is_char_boundary(start) {
            start += 1;
        }
        return format!("...{}", &file_name[start..]);
    }

    format!(".../{}", file_name)
}
