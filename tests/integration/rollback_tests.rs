use super::common::{duplicate_tree, write_file, DUPLICATE};
use safedupe::actions::{self, ActionError, ActionKind};
use safedupe::duplicates::Processor;
use safedupe::rollback::{
    Operation, OperationType, ProtectedError, RetentionPolicy, RollbackError, RollbackManager,
    TransactionStatus,
};
use safedupe::scanner::WalkerConfig;
use std::fs;
use std::io;
use tempfile::tempdir;

#[test]
fn test_protected_write_is_restored_and_error_propagates() {
    let data = tempdir().unwrap();
    let work = tempdir().unwrap();
    let f = write_file(work.path(), "f.txt", "original");
    let mut manager = RollbackManager::new(data.path());

    let result: Result<(), ProtectedError<io::Error>> = manager.execute_with_protection(&[f.clone()], || {
        fs::write(&f, "modified")?;
        Err(io::Error::other("raised after write"))
    });

    let err = result.unwrap_err().into_operation_error().unwrap();
    assert_eq!(err.to_string(), "raised after write");
    assert_eq!(fs::read_to_string(&f).unwrap(), "original");
}

#[test]
fn test_protected_create_is_removed() {
    let data = tempdir().unwrap();
    let work = tempdir().unwrap();
    let created = work.path().join("new.txt");
    let mut manager = RollbackManager::new(data.path());

    let result = manager.execute_with_protection(&[created.clone()], || {
        fs::write(&created, "stray").map_err(|e| e.to_string())?;
        Err::<(), _>("fail".to_string())
    });

    assert!(result.is_err());
    assert!(!created.exists());
}

#[test]
fn test_logging_without_open_transaction_fails() {
    let data = tempdir().unwrap();
    let mut manager = RollbackManager::new(data.path());
    let err = manager
        .log_mut()
        .log_operation(Operation::new(OperationType::Delete, "/x"))
        .unwrap_err();
    assert!(matches!(err, RollbackError::NoActiveTransaction));
    assert!(matches!(
        manager.rollback_transaction("nosuchid"),
        Err(RollbackError::TransactionNotFound(_))
    ));
}

#[test]
fn test_dedupe_delete_and_rollback_end_to_end() {
    let data = tempdir().unwrap();
    let root = tempdir().unwrap();
    duplicate_tree(root.path());

    let mut processor = Processor::new(WalkerConfig::default());
    let mut entries = processor.process(root.path(), None, None).unwrap();
    processor.detect_duplicates(&mut entries);

    let plan = actions::plan(&entries, &ActionKind::Delete);
    assert_eq!(plan.len(), 2);

    let mut manager = RollbackManager::new(data.path()).with_retention(RetentionPolicy::Retain { hours: 1 });
    let report = actions::execute(&plan, &mut manager).unwrap();
    assert_eq!(report.deleted, 2);

    let remaining: Vec<_> = ["original.txt", "dup1.txt", "sub/dup2.txt"]
        .iter()
        .filter(|rel| root.path().join(rel).exists())
        .collect();
    assert_eq!(remaining.len(), 1);
    assert!(root.path().join("unique.txt").exists());

    let id = report.transaction_id.unwrap();
    let transactions = manager.list_transactions().unwrap();
    assert_eq!(transactions[0].transaction_id, id);
    assert_eq!(transactions[0].status, TransactionStatus::Completed);
    assert_eq!(manager.list_snapshots().unwrap().len(), 1);

    let rollback = manager.rollback_transaction(&id).unwrap();
    assert_eq!(rollback.restored, 2);
    for rel in ["original.txt", "dup1.txt", "sub/dup2.txt"] {
        assert_eq!(fs::read_to_string(root.path().join(rel)).unwrap(), DUPLICATE);
    }
    assert_eq!(
        manager.list_transactions().unwrap()[0].status,
        TransactionStatus::RolledBack
    );
}

#[test]
fn test_failed_batch_leaves_tree_untouched() {
    let data = tempdir().unwrap();
    let root = tempdir().unwrap();
    duplicate_tree(root.path());

    let mut processor = Processor::new(WalkerConfig::default());
    let mut entries = processor.process(root.path(), None, None).unwrap();
    processor.detect_duplicates(&mut entries);
    let plan = actions::plan(&entries, &ActionKind::Delete);

    // The last planned file disappears between scan and execution
    fs::remove_file(&plan[1].source).unwrap();

    let mut manager = RollbackManager::new(data.path());
    let err = actions::execute(&plan, &mut manager).unwrap_err();
    assert!(matches!(err, ProtectedError::Operation(ActionError::NotFound(_))));

    assert_eq!(fs::read_to_string(&plan[0].source).unwrap(), DUPLICATE);
    assert!(!plan[1].source.exists());
    assert_eq!(
        manager.list_transactions().unwrap()[0].status,
        TransactionStatus::RolledBack
    );
}

#[test]
fn test_move_rollback_without_snapshot() {
    let data = tempdir().unwrap();
    let root = tempdir().unwrap();
    let target = tempdir().unwrap();
    duplicate_tree(root.path());

    let mut processor = Processor::new(WalkerConfig::default());
    let mut entries = processor.process(root.path(), None, None).unwrap();
    processor.detect_duplicates(&mut entries);
    let plan = actions::plan(&entries, &ActionKind::Move { target_dir: target.path().to_path_buf() });

    let mut manager = RollbackManager::new(data.path()).with_retention(RetentionPolicy::Delete);
    let report = actions::execute(&plan, &mut manager).unwrap();
    assert_eq!(report.moved, 2);
    assert!(manager.list_snapshots().unwrap().is_empty());

    manager
        .rollback_transaction(report.transaction_id.as_deref().unwrap())
        .unwrap();
    for action in &plan {
        assert_eq!(fs::read_to_string(&action.source).unwrap(), DUPLICATE);
        assert!(!action.destination().unwrap().exists());
    }
}
