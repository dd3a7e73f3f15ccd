//! JSON output formatter for scan results.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "duplicates": [
//!     {
//!       "hash": "af1349b9...",
//!       "size": 19,
//!       "original": "/data/original.txt",
//!       "duplicates": ["/data/dup1.txt", "/data/bundle.zip/inner.txt"]
//!     }
//!   ],
//!   "summary": {
//!     "total_files": 5,
//!     "duplicate_groups": 1,
//!     "duplicate_files": 2,
//!     "reclaimable_space": 38,
//!     "exit_code": 0,
//!     "exit_code_name": "SD000"
//!   }
//! }
//! ```

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use super::ScanSummary;
use crate::duplicates::DuplicateGroup;
use crate::error::ExitCode;

/// A single duplicate group in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonDuplicateGroup {
    pub hash: String,
    /// Size of the original in bytes
    pub size: u64,
    pub original: String,
    pub duplicates: Vec<String>,
}

impl JsonDuplicateGroup {
    #[must_use]
    pub fn from_duplicate_group(group: &DuplicateGroup) -> Self {
        let original = group.original();
        Self {
            hash: group.hash.clone(),
            size: original.map_or(0, |o| o.size()),
            original: original.map(|o| display_path(o.path())).unwrap_or_default(),
            duplicates: group.duplicates().map(|d| display_path(d.path())).collect(),
        }
    }
}

/// Summary statistics plus the exit code of the run.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    #[serde(flatten)]
    pub scan: ScanSummary,
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "SD000")
    pub exit_code_name: String,
}

/// Complete JSON output structure.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    pub duplicates: Vec<JsonDuplicateGroup>,
    pub summary: JsonSummary,
}

impl JsonOutput {
    /// Create the JSON document for a finished scan.
    ///
    /// ```
    /// use safedupe::error::ExitCode;
    /// use safedupe::output::{JsonOutput, ScanSummary};
    ///
    /// let output = JsonOutput::new(&[], &ScanSummary::default(), ExitCode::NoDuplicates);
    /// assert!(output.duplicates.is_empty());
    /// assert_eq!(output.summary.exit_code, 2);
    /// ```
    #[must_use]
    pub fn new(groups: &[DuplicateGroup], summary: &ScanSummary, exit_code: ExitCode) -> Self {
        Self {
            duplicates: groups.iter().map(JsonDuplicateGroup::from_duplicate_group).collect(),
            summary: JsonSummary {
                scan: summary.clone(),
                exit_code: exit_code.as_i32(),
                exit_code_name: exit_code.code_prefix().to_string(),
            },
        }
    }

    /// Serialize to compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write JSON followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        write_json(writer, self, pretty)
    }
}

/// Write any serializable value as JSON followed by a newline.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_json<W: Write, T: Serialize + ?Sized>(
    writer: &mut W,
    value: &T,
    pretty: bool,
) -> Result<(), JsonOutputError> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    writer.write_all(json.as_bytes())?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Absolute form of a path where possible.
///
/// Archive members have no real path and keep their virtual one.
fn display_path(path: &Path) -> String {
    match path.canonicalize() {
        Ok(canonical) => canonical.to_string_lossy().into_owned(),
        Err(_) => path.to_string_lossy().into_owned(),
    }
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}
