use super::common::{duplicate_tree, write_file, write_zip, DUPLICATE};
use safedupe::actions::{self, ActionKind, PlannedKind};
use safedupe::duplicates::Processor;
use safedupe::rollback::{RetentionPolicy, RollbackManager};
use safedupe::scanner::WalkerConfig;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_plan_never_touches_originals_or_archive_members() {
    let root = tempdir().unwrap();
    write_zip(&root.path().join("bundle.zip"), &[("inner.txt", DUPLICATE)]);
    write_file(root.path(), "big/loose.txt", DUPLICATE);

    let mut processor = Processor::new(WalkerConfig::default());
    let mut entries = processor.process(root.path(), None, None).unwrap();
    processor.detect_duplicates(&mut entries);

    // The only duplicate is either the member or the loose file; members are never planned
    let plan = actions::plan(&entries, &ActionKind::Delete);
    assert!(plan.len() <= 1);
    for action in &plan {
        assert!(!action.source.starts_with(root.path().join("bundle.zip")));
        assert!(entries
            .iter()
            .any(|e| !e.is_duplicate && e.path() == action.original));
    }
}

#[test]
fn test_copy_keeps_sources_and_mirrors_layout() {
    let data = tempdir().unwrap();
    let root = tempdir().unwrap();
    let target = tempdir().unwrap();
    duplicate_tree(root.path());

    let mut processor = Processor::new(WalkerConfig::default());
    let mut entries = processor.process(root.path(), None, None).unwrap();
    processor.detect_duplicates(&mut entries);
    let plan = actions::plan(&entries, &ActionKind::Copy { target_dir: target.path().to_path_buf() });
    assert_eq!(plan.len(), 2);

    let mut manager = RollbackManager::new(data.path()).with_retention(RetentionPolicy::Delete);
    let report = actions::execute(&plan, &mut manager).unwrap();
    assert_eq!(report.copied, 2);
    assert_eq!(report.bytes_freed, 0);

    for action in &plan {
        let PlannedKind::Copy { to } = &action.kind else {
            panic!("expected a copy");
        };
        assert!(to.starts_with(target.path()));
        assert_eq!(fs::read_to_string(&action.source).unwrap(), DUPLICATE);
        assert_eq!(fs::read_to_string(to).unwrap(), DUPLICATE);
    }

    let rollback = manager
        .rollback_transaction(report.transaction_id.as_deref().unwrap())
        .unwrap();
    assert_eq!(rollback.removed, 2);
    assert!(plan.iter().all(|a| !a.destination().unwrap().exists()));
    assert!(plan.iter().all(|a| a.source.exists()));
}

#[test]
fn test_empty_plan_opens_no_transaction() {
    let data = tempdir().unwrap();
    let root = tempdir().unwrap();
    write_file(root.path(), "only.txt", "alone");

    let mut processor = Processor::new(WalkerConfig::default());
    let mut entries = processor.process(root.path(), None, None).unwrap();
    processor.detect_duplicates(&mut entries);

    let plan = actions::plan(&entries, &ActionKind::Delete);
    assert!(plan.is_empty());

    let mut manager = RollbackManager::new(data.path());
    let report = actions::execute(&plan, &mut manager).unwrap();
    assert_eq!(report.total_count(), 0);
    assert!(report.transaction_id.is_none());
    assert!(manager.list_transactions().unwrap().is_empty());
}

#[test]
fn test_overlapping_roots_never_delete_the_only_copy() {
    let data = tempdir().unwrap();
    let root = tempdir().unwrap();
    let only = write_file(root.path(), "sub/only.txt", "alone");

    let mut processor = Processor::new(WalkerConfig::default());
    let mut entries = processor
        .process_roots(&[root.path().to_path_buf(), root.path().join("sub")], None, None)
        .unwrap();
    assert_eq!(entries.len(), 1);
    processor.detect_duplicates(&mut entries);

    let plan = actions::plan(&entries, &ActionKind::Delete);
    assert!(plan.is_empty());

    let mut manager = RollbackManager::new(data.path());
    actions::execute(&plan, &mut manager).unwrap();
    assert_eq!(fs::read_to_string(&only).unwrap(), "alone");
}

#[cfg(unix)]
#[test]
fn test_symlink_never_replaces_its_target_as_original() {
    let data = tempdir().unwrap();
    let root = tempdir().unwrap();
    let real = write_file(root.path(), "z_real.txt", DUPLICATE);
    let link = root.path().join("a_link.txt");
    std::os::unix::fs::symlink(&real, &link).unwrap();

    let mut processor = Processor::new(WalkerConfig::default());
    let mut entries = processor.process(root.path(), None, None).unwrap();
    processor.detect_duplicates(&mut entries);

    let plan = actions::plan(&entries, &ActionKind::Delete);
    assert!(plan.iter().all(|a| a.source != real));

    let mut manager = RollbackManager::new(data.path()).with_retention(RetentionPolicy::Delete);
    actions::execute(&plan, &mut manager).unwrap();
    assert_eq!(fs::read_to_string(&real).unwrap(), DUPLICATE);
}
