use super::common::{duplicate_tree, write_file};
use safedupe::checkpoint::{CheckpointStore, FileMeta};
use safedupe::duplicates::Processor;
use safedupe::scanner::WalkerConfig;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tempfile::tempdir;

#[test]
fn test_checkpoint_round_trip() {
    let data = tempdir().unwrap();
    let root = tempdir().unwrap();
    let store = CheckpointStore::new(data.path());

    let a = root.path().join("a");
    let b = root.path().join("b");
    let c = root.path().join("c");
    let mut processed = BTreeMap::new();
    processed.insert(a.clone(), FileMeta::new(10, 100).with_hash("aa"));
    processed.insert(b.clone(), FileMeta::new(20, 200).with_hash("bb"));

    let saved = store.save(root.path(), processed, None).unwrap();
    let loaded = store.load(root.path()).unwrap();
    assert_eq!(loaded, saved);
    assert_eq!(loaded.get(&a).unwrap().hash.as_deref(), Some("aa"));

    assert_eq!(store.remaining(root.path(), &[a, b, c.clone()]), vec![c]);

    assert!(store.cleanup(root.path()).unwrap());
    assert!(store.load(root.path()).is_none());
    assert!(!store.cleanup(root.path()).unwrap());
}

#[test]
fn test_corrupt_checkpoint_is_absent_and_overwritten() {
    let data = tempdir().unwrap();
    let root = tempdir().unwrap();
    let store = CheckpointStore::new(data.path());

    let path = store.path_for(root.path());
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, b"\x00\x01 definitely not json").unwrap();
    assert!(store.load(root.path()).is_none());

    let mut processed = BTreeMap::new();
    processed.insert(root.path().join("x"), FileMeta::new(1, 1));
    store.save(root.path(), processed, None).unwrap();
    assert_eq!(store.load(root.path()).unwrap().len(), 1);
}

#[test]
fn test_resumed_scan_reuses_unchanged_hashes() {
    let data = tempdir().unwrap();
    let root = tempdir().unwrap();
    duplicate_tree(root.path());
    let store = CheckpointStore::new(data.path());

    let mut processor = Processor::new(WalkerConfig::default());
    let first = processor.process_resumable(root.path(), &store, None, None).unwrap();
    assert_eq!(processor.statistics().hashed, 4);
    assert_eq!(processor.statistics().reused, 0);
    assert_eq!(store.load(root.path()).unwrap().len(), 4);

    // Change one file's content and push its mtime forward
    let changed = write_file(root.path(), "unique.txt", "Unique content C, longer");
    let later = filetime::FileTime::from_system_time(SystemTime::now() + Duration::from_secs(120));
    filetime::set_file_mtime(&changed, later).unwrap();

    let second = processor.process_resumable(root.path(), &store, None, None).unwrap();
    assert_eq!(processor.statistics().reused, 3);
    assert_eq!(processor.statistics().hashed, 1);

    let digest_of = |entries: &[safedupe::duplicates::HashedEntry], rel: &str| {
        entries
            .iter()
            .find(|e| e.entry.relative_path == PathBuf::from(rel))
            .map(|e| e.hash.clone())
            .unwrap()
    };
    assert_eq!(digest_of(&first, "dup1.txt"), digest_of(&second, "dup1.txt"));
    assert_ne!(digest_of(&first, "unique.txt"), digest_of(&second, "unique.txt"));
}

#[test]
fn test_algorithm_change_discards_checkpoint() {
    let data = tempdir().unwrap();
    let root = tempdir().unwrap();
    duplicate_tree(root.path());
    let store = CheckpointStore::new(data.path());

    let mut processor = Processor::new(WalkerConfig::default());
    processor.process_resumable(root.path(), &store, None, None).unwrap();

    processor.set_algorithm("sha512").unwrap();
    let entries = processor.process_resumable(root.path(), &store, None, None).unwrap();
    assert_eq!(processor.statistics().reused, 0);
    assert!(entries.iter().all(|e| e.hash.len() == 128 && e.hash_algorithm == "sha512"));
    assert_eq!(store.load(root.path()).unwrap().hash_algorithm(), Some("sha512"));
}
