//! Human-readable reports.

use std::io::{self, Write};

use bytesize::ByteSize;

use super::ScanSummary;
use crate::duplicates::DuplicateGroup;
use crate::rollback::{Snapshot, Transaction};

/// Plain-text rendering of a scan.
#[derive(Debug)]
pub struct TextOutput<'a> {
    groups: &'a [DuplicateGroup],
    summary: &'a ScanSummary,
}

impl<'a> TextOutput<'a> {
    #[must_use]
    pub fn new(groups: &'a [DuplicateGroup], summary: &'a ScanSummary) -> Self {
        Self { groups, summary }
    }

    /// Write every group followed by the summary.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for (index, group) in self.groups.iter().enumerate() {
            let Some(original) = group.original() else {
                continue;
            };
            writeln!(
                writer,
                "Group {} ({} files, {} each, hash {})",
                index + 1,
                group.len(),
                ByteSize::b(original.size()),
                short_hash(&group.hash)
            )?;
            writeln!(writer, "  keep   {}", original.path().display())?;
            for duplicate in group.duplicates() {
                let marker = if duplicate.entry.is_archive_content { "member" } else { "dup" };
                writeln!(writer, "  {:<6} {}", marker, duplicate.path().display())?;
            }
            writeln!(writer)?;
        }
        write_summary(writer, self.summary)
    }
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

/// Write the scan totals.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_summary<W: Write>(writer: &mut W, summary: &ScanSummary) -> io::Result<()> {
    writeln!(
        writer,
        "Scanned {} files ({}), {} inside archives, using {}",
        summary.total_files,
        ByteSize::b(summary.total_size),
        summary.archive_members,
        summary.hash_algorithm
    )?;
    if summary.reused > 0 {
        writeln!(writer, "Reused {} hashes from checkpoint", summary.reused)?;
    }
    if summary.failures() > 0 {
        writeln!(writer, "Skipped {} unreadable entries", summary.failures())?;
    }
    if summary.duplicate_groups == 0 {
        writeln!(writer, "No duplicates found")
    } else {
        writeln!(
            writer,
            "Found {} duplicates in {} groups, {} reclaimable",
            summary.duplicate_files,
            summary.duplicate_groups,
            ByteSize::b(summary.reclaimable_space)
        )
    }
}

/// List transactions, one per line.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_transactions<W: Write>(writer: &mut W, transactions: &[Transaction]) -> io::Result<()> {
    if transactions.is_empty() {
        return writeln!(writer, "No transactions recorded");
    }
    for tx in transactions {
        writeln!(
            writer,
            "{}  {}  {:<12} {} operation(s)",
            tx.transaction_id,
            tx.timestamp.format("%Y-%m-%d %H:%M:%S"),
            tx.status,
            tx.operations.len()
        )?;
    }
    Ok(())
}

/// List snapshots, one per line.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_snapshots<W: Write>(writer: &mut W, snapshots: &[Snapshot]) -> io::Result<()> {
    if snapshots.is_empty() {
        return writeln!(writer, "No snapshots stored");
    }
    for snapshot in snapshots {
        writeln!(
            writer,
            "{}  {}  {} file(s), {}",
            snapshot.id,
            snapshot.timestamp.format("%Y-%m-%d %H:%M:%S"),
            snapshot.files.len(),
            ByteSize::b(snapshot.total_size())
        )?;
    }
    Ok(())
}
