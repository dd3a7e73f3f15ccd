//! Turning resolved duplicates into concrete actions.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::duplicates::HashedEntry;

/// What to do with each duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionKind {
    /// Remove the duplicate.
    Delete,
    /// Move the duplicate under `target_dir`, keeping its path relative to the scan root.
    Move { target_dir: PathBuf },
    /// Copy the duplicate under `target_dir`, keeping its path relative to the scan root.
    Copy { target_dir: PathBuf },
}

impl ActionKind {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Move { .. } => "move",
            Self::Copy { .. } => "copy",
        }
    }

    fn target_dir(&self) -> Option<&Path> {
        match self {
            Self::Delete => None,
            Self::Move { target_dir } | Self::Copy { target_dir } => Some(target_dir),
        }
    }
}

/// One duplicate scheduled for an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedAction {
    pub kind: PlannedKind,
    /// The duplicate being acted on
    pub source: PathBuf,
    /// The original it duplicates
    pub original: PathBuf,
    /// Content digest recorded at scan time
    pub hash: String,
    /// Size at scan time, checked before acting
    pub size: u64,
    /// Modification time at scan time (unix seconds), checked before acting
    pub modified: i64,
}

/// Resolved form of an [`ActionKind`] for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlannedKind {
    Delete,
    Move { to: PathBuf },
    Copy { to: PathBuf },
}

impl PlannedAction {
    /// Destination for move and copy actions.
    #[must_use]
    pub fn destination(&self) -> Option<&Path> {
        destination_of(&self.kind)
    }

    /// Every path this action may touch.
    #[must_use]
    pub fn affected_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.source.clone()];
        paths.extend(self.destination().map(Path::to_path_buf));
        paths
    }
}

/// Destination for `entry` inside `target_dir`.
///
/// Uses the path relative to the scan root; parent and root components are
/// dropped so the result never escapes `target_dir`.
fn destination_in(target_dir: &Path, entry: &HashedEntry) -> PathBuf {
    let relative = if entry.entry.relative_path.as_os_str().is_empty() {
        Path::new(&entry.entry.name)
    } else {
        entry.entry.relative_path.as_path()
    };

    let mut dest = target_dir.to_path_buf();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            dest.push(part);
        }
    }
    dest
}

fn destination_of(kind: &PlannedKind) -> Option<&Path> {
    match kind {
        PlannedKind::Delete => None,
        PlannedKind::Move { to } | PlannedKind::Copy { to } => Some(to),
    }
}

/// Whether both paths resolve to the same file on disk.
fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Build the action list for resolved duplicates.
///
/// Originals are never targeted, neither by path nor through a symlink that
/// resolves to them. Archive members are skipped because they are not
/// standalone files. Paths that are not valid UTF-8 are skipped because the
/// transaction journal cannot record them. Entries keep their input order.
#[must_use]
pub fn plan(entries: &[HashedEntry], kind: &ActionKind) -> Vec<PlannedAction> {
    let mut actions = Vec::new();

    for entry in entries {
        let Some(original) = entry.duplicate_of.as_ref().filter(|_| entry.is_duplicate) else {
            continue;
        };
        if entry.entry.is_archive_content {
            log::debug!("Skipping archive member {}", entry.path().display());
            continue;
        }
        if original == entry.path() || same_file(entry.path(), original) {
            log::warn!(
                "Skipping {}: it is the same file as its original {}",
                entry.path().display(),
                original.display()
            );
            continue;
        }

        let planned = match kind.target_dir() {
            None => PlannedKind::Delete,
            Some(dir) => {
                let to = destination_in(dir, entry);
                match kind {
                    ActionKind::Move { .. } => PlannedKind::Move { to },
                    _ => PlannedKind::Copy { to },
                }
            }
        };

        let journaled = [Some(entry.path()), Some(original.as_path()), destination_of(&planned)];
        if journaled.iter().flatten().any(|p| p.to_str().is_none()) {
            log::warn!("Skipping {}: path is not valid UTF-8", entry.path().display());
            continue;
        }

        actions.push(PlannedAction {
            kind: planned,
            source: entry.path().to_path_buf(),
            original: original.clone(),
            hash: entry.hash.clone(),
            size: entry.size(),
            modified: entry.entry.modified,
        });
    }

    log::debug!("Planned {} {} action(s)", actions.len(), kind.name());
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplicates::detect_duplicates;
    use crate::scanner::{ArchiveMember, FileEntry};

    fn entry(root: &str, rel: &str, size: u64, hash: &str) -> HashedEntry {
        let mut file = FileEntry::new(Path::new(root).join(rel), size, 10);
        file.with_root(Path::new(root));
        HashedEntry::new(file, hash, "blake3")
    }

    #[test]
    fn test_plan_skips_originals_and_uniques() {
        let mut entries = vec![
            entry("/r", "original.txt", 19, "a"),
            entry("/r", "dup1.txt", 19, "a"),
            entry("/r", "sub/dup2.txt", 19, "a"),
            entry("/r", "unique.txt", 16, "b"),
        ];
        detect_duplicates(&mut entries);

        let actions = plan(&entries, &ActionKind::Delete);
        let sources: Vec<_> = actions.iter().map(|a| a.source.clone()).collect();
        assert_eq!(sources, vec![PathBuf::from("/r/dup1.txt"), PathBuf::from("/r/sub/dup2.txt")]);
        assert!(actions.iter().all(|a| a.original == Path::new("/r/original.txt")));
        assert!(actions.iter().all(|a| a.kind == PlannedKind::Delete));
    }

    #[test]
    fn test_plan_move_keeps_relative_layout() {
        let mut entries = vec![entry("/r", "a.txt", 5, "h"), entry("/r", "deep/b.txt", 5, "h")];
        detect_duplicates(&mut entries);

        let actions = plan(&entries, &ActionKind::Move { target_dir: PathBuf::from("/quarantine") });
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].destination(), Some(Path::new("/quarantine/deep/b.txt")));
        assert_eq!(
            actions[0].affected_paths(),
            vec![PathBuf::from("/r/deep/b.txt"), PathBuf::from("/quarantine/deep/b.txt")]
        );
    }

    #[test]
    fn test_plan_skips_archive_members() {
        let archive = FileEntry::new(PathBuf::from("/r/bundle.zip"), 100, 10);
        let member = ArchiveMember {
            relative_path: PathBuf::from("inner.txt"),
            size: 5,
            modified: 10,
            created: 10,
        };
        let mut entries = vec![
            entry("/r", "a.txt", 5, "h"),
            HashedEntry::new(FileEntry::archive_member(&archive, &member), "h", "blake3"),
        ];
        detect_duplicates(&mut entries);
        assert!(entries[1].is_duplicate);

        assert!(plan(&entries, &ActionKind::Delete).is_empty());
    }

    #[test]
    fn test_plan_never_targets_entry_marked_against_itself() {
        let mut e = entry("/r", "sub/only.txt", 5, "h");
        e.is_duplicate = true;
        e.duplicate_of = Some(PathBuf::from("/r/sub/only.txt"));

        assert!(plan(&[e], &ActionKind::Delete).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_plan_skips_duplicate_resolving_to_its_original() {
        let dir = tempfile::TempDir::new().unwrap();
        let real = dir.path().join("z_real.txt");
        let link = dir.path().join("a_link.txt");
        std::fs::write(&real, "payload").unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let root = dir.path().to_str().unwrap();
        let mut linked = entry(root, "a_link.txt", 7, "h");
        linked.is_duplicate = true;
        linked.duplicate_of = Some(real.clone());
        let mut target = entry(root, "z_real.txt", 7, "h");
        target.is_duplicate = true;
        target.duplicate_of = Some(link);

        assert!(plan(&[linked, target], &ActionKind::Delete).is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_plan_skips_non_utf8_paths() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let bad = Path::new("/r").join(OsStr::from_bytes(b"bad\xff.txt"));
        let mut entries = vec![
            entry("/r", "a.txt", 5, "h"),
            HashedEntry::new(FileEntry::new(bad, 5, 10), "h", "blake3"),
            entry("/r", "b.txt", 5, "h"),
        ];
        detect_duplicates(&mut entries);
        assert!(entries[1].is_duplicate);

        let actions = plan(&entries, &ActionKind::Delete);
        let sources: Vec<_> = actions.iter().map(|a| a.source.clone()).collect();
        assert_eq!(sources, vec![PathBuf::from("/r/b.txt")]);
    }

    #[test]
    fn test_destination_never_escapes_target() {
        let mut e = entry("/r", "x.txt", 1, "h");
        e.entry.relative_path = PathBuf::from("../../etc/x.txt");
        assert_eq!(destination_in(Path::new("/t"), &e), PathBuf::from("/t/etc/x.txt"));
    }
}
