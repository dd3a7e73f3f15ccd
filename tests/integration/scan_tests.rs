use super::common::{duplicate_tree, write_file, write_zip, DUPLICATE, UNIQUE};
use safedupe::duplicates::{group_by_digest, Processor};
use safedupe::scanner::{Walker, WalkerConfig};
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_scan_empty_directory() {
    let dir = tempdir().unwrap();
    let mut processor = Processor::new(WalkerConfig::default());

    let mut entries = processor.process(dir.path(), None, None).unwrap();
    let summary = processor.detect_duplicates(&mut entries);

    assert!(entries.is_empty());
    assert_eq!(summary.groups, 0);
    assert_eq!(summary.duplicates, 0);
}

#[test]
fn test_scan_marks_two_of_three_identical_files() {
    let dir = tempdir().unwrap();
    duplicate_tree(dir.path());

    let mut walker = Walker::new(WalkerConfig::default());
    assert_eq!(walker.walk(dir.path(), None, None).unwrap().len(), 4);

    let mut processor = Processor::new(WalkerConfig::default());
    let mut entries = processor.process(dir.path(), None, None).unwrap();
    assert_eq!(entries.len(), 4);
    processor.detect_duplicates(&mut entries);

    let identical: Vec<_> = entries
        .iter()
        .filter(|e| fs::read_to_string(e.path()).unwrap() == DUPLICATE)
        .collect();
    assert_eq!(identical.len(), 3);
    assert_eq!(identical.iter().filter(|e| e.is_duplicate).count(), 2);

    let original: Vec<_> = identical.iter().filter(|e| !e.is_duplicate).collect();
    assert_eq!(original.len(), 1);
    let original_path = original[0].path().to_path_buf();
    assert!(identical
        .iter()
        .filter(|e| e.is_duplicate)
        .all(|e| e.duplicate_of.as_deref() == Some(original_path.as_path())));

    let unique = entries
        .iter()
        .find(|e| fs::read_to_string(e.path()).unwrap() == UNIQUE)
        .unwrap();
    assert!(!unique.is_duplicate);
    assert!(unique.duplicate_of.is_none());
}

#[test]
fn test_largest_member_is_original() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a_small.txt", "same");
    write_file(dir.path(), "b_small.txt", "same");

    let mut processor = Processor::new(WalkerConfig::default());
    let mut entries = processor.process(dir.path(), None, None).unwrap();
    processor.detect_duplicates(&mut entries);

    // Equal sizes: the first one encountered stays original
    let original = entries.iter().find(|e| !e.is_duplicate).unwrap();
    assert_eq!(original.path(), dir.path().join("a_small.txt"));
}

#[test]
fn test_archive_members_become_entries() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("bundle.zip");
    write_zip(
        &archive,
        &[("one.txt", "first"), ("two.txt", "second"), ("nested/three.txt", DUPLICATE)],
    );
    write_file(dir.path(), "loose.txt", DUPLICATE);

    let mut processor = Processor::new(WalkerConfig::default());
    let mut entries = processor.process(dir.path(), None, None).unwrap();

    // loose.txt + the archive itself + 3 members
    assert_eq!(entries.len(), 5);
    let members: Vec<_> = entries.iter().filter(|e| e.entry.is_archive_content).collect();
    assert_eq!(members.len(), 3);
    assert!(members
        .iter()
        .all(|m| m.entry.archive_source.as_deref() == Some(archive.as_path())));

    // A member can duplicate a loose file
    processor.detect_duplicates(&mut entries);
    let groups = group_by_digest(&entries);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 2);
    assert!(groups[0].files.iter().any(|f| f.entry.is_archive_content));
}

#[test]
fn test_archive_expansion_can_be_disabled() {
    let dir = tempdir().unwrap();
    write_zip(&dir.path().join("bundle.zip"), &[("one.txt", "first"), ("two.txt", "second")]);

    let config = WalkerConfig::default().with_expand_archives(false);
    let mut processor = Processor::new(config);
    let entries = processor.process(dir.path(), None, None).unwrap();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].entry.is_archive_content);
}

#[test]
fn test_duplicates_across_roots() {
    let a = tempdir().unwrap();
    let b = tempdir().unwrap();
    write_file(a.path(), "photo.jpg", "pixels");
    write_file(b.path(), "backup/photo.jpg", "pixels");

    let mut processor = Processor::new(WalkerConfig::default());
    let roots = vec![a.path().to_path_buf(), b.path().to_path_buf()];
    let mut entries = processor.process_roots(&roots, None, None).unwrap();
    let summary = processor.detect_duplicates(&mut entries);

    assert_eq!(summary.groups, 1);
    assert_eq!(summary.duplicates, 1);
    assert_eq!(entries[1].duplicate_of, Some(a.path().join("photo.jpg")));
}

#[test]
fn test_predicate_and_ignore_patterns() {
    let dir = tempdir().unwrap();
    duplicate_tree(dir.path());
    write_file(dir.path(), "scratch.tmp", DUPLICATE);

    let config = WalkerConfig::default().with_ignore_patterns(vec!["*.tmp".to_string()]);
    let mut processor = Processor::new(config);
    let not_in_sub = |e: &safedupe::scanner::FileEntry| !e.path.starts_with(dir.path().join("sub"));
    let entries = processor.process(dir.path(), Some(&not_in_sub), None).unwrap();

    let names: Vec<PathBuf> = entries.iter().map(|e| e.entry.relative_path.clone()).collect();
    assert_eq!(
        names,
        vec![
            PathBuf::from("dup1.txt"),
            PathBuf::from("original.txt"),
            PathBuf::from("unique.txt")
        ]
    );
}

#[test]
fn test_missing_root_is_an_error() {
    let dir = tempdir().unwrap();
    let mut processor = Processor::new(WalkerConfig::default());
    assert!(processor.process(&dir.path().join("absent"), None, None).is_err());
}
