use super::common::{duplicate_tree, write_zip, DUPLICATE};
use safedupe::duplicates::Processor;
use safedupe::scanner::WalkerConfig;
use safedupe::store::{persist_entries, Repository, SqliteRepository};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_scan_results_round_trip_through_database() {
    let root = tempdir().unwrap();
    let data = tempdir().unwrap();
    duplicate_tree(root.path());

    let mut processor = Processor::new(WalkerConfig::default());
    let mut entries = processor.process(root.path(), None, None).unwrap();
    processor.detect_duplicates(&mut entries);

    let db = data.path().join("nested/safedupe.db");
    {
        let mut repo = SqliteRepository::open(&db).unwrap();
        let stats = persist_entries(&mut repo, &entries).unwrap();
        assert_eq!(stats.stored, 4);
        assert_eq!(stats.linked, 2);
    }

    // Reopen to make sure the batch was committed
    let repo = SqliteRepository::open(&db).unwrap();
    assert_eq!(repo.count().unwrap(), 4);

    let dup_hash = entries.iter().find(|e| e.is_duplicate).unwrap().hash.clone();
    let group = repo.find_by_digest(&dup_hash).unwrap();
    assert_eq!(group.len(), 3);
    let original_id = group.iter().find(|r| !r.is_duplicate()).unwrap().id;
    assert!(group
        .iter()
        .filter(|r| r.is_duplicate())
        .all(|r| r.duplicate_of == Some(original_id)));
    assert_eq!(repo.duplicates().unwrap().len(), 2);
}

#[test]
fn test_rescan_updates_rows_in_place() {
    let root = tempdir().unwrap();
    duplicate_tree(root.path());
    let mut repo = SqliteRepository::open_in_memory().unwrap();

    let mut processor = Processor::new(WalkerConfig::default());
    let mut entries = processor.process(root.path(), None, None).unwrap();
    processor.detect_duplicates(&mut entries);
    persist_entries(&mut repo, &entries).unwrap();
    let before = repo.get_id(&root.path().join("dup1.txt")).unwrap();

    fs::write(root.path().join("dup1.txt"), "now different").unwrap();
    let mut entries = processor.process(root.path(), None, None).unwrap();
    processor.detect_duplicates(&mut entries);
    persist_entries(&mut repo, &entries).unwrap();

    assert_eq!(repo.get_id(&root.path().join("dup1.txt")).unwrap(), before);
    assert_eq!(repo.count().unwrap(), 4);
    // dup1 left the group; one of the two remaining copies is still linked
    let linked = repo.duplicates().unwrap();
    assert_eq!(linked.len(), 1);
    assert_ne!(linked[0].path, root.path().join("dup1.txt"));
}

#[test]
fn test_archive_members_are_stored_with_their_source() {
    let root = tempdir().unwrap();
    let archive = root.path().join("bundle.zip");
    write_zip(&archive, &[("inner.txt", DUPLICATE)]);
    fs::write(root.path().join("loose.txt"), DUPLICATE).unwrap();

    let mut processor = Processor::new(WalkerConfig::default());
    let mut entries = processor.process(root.path(), None, None).unwrap();
    processor.detect_duplicates(&mut entries);

    let mut repo = SqliteRepository::open_in_memory().unwrap();
    persist_entries(&mut repo, &entries).unwrap();

    let member = entries.iter().find(|e| e.entry.is_archive_content).unwrap();
    let stored = repo.find_by_digest(&member.hash).unwrap();
    let record = stored.iter().find(|r| r.is_archive_content).unwrap();
    assert_eq!(record.archive_source.as_deref(), Some(archive.as_path()));
}

#[test]
fn test_corrupt_database_file_fails_to_open() {
    let data = tempdir().unwrap();
    let db = data.path().join("safedupe.db");
    fs::write(&db, vec![0xAB; 4096]).unwrap();
    assert!(SqliteRepository::open(&db).is_err());
}
