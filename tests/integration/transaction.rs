use super::{patcher_in, snapshots_of};
use safe_patcher::{FailureKind, OperationRequest, SnapshotClass, TransactionState};
use std::fs;
use tempfile::TempDir;

#[test]
fn execute_in_then_rollback_restores_every_file() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("settings.ini");
    let readme = dir.path().join("README.txt");
    fs::write(&config, "[server]\nport = 8080\n").unwrap();
    fs::write(&readme, "Listens on 8080.\n").unwrap();
    let patcher = patcher_in(dir.path());

    let mut txn = patcher.transaction();
    txn.begin().unwrap();
    let first = patcher
        .execute_in(&mut txn, &OperationRequest::replace(&config, "8080", "9090"))
        .unwrap();
    let second = patcher
        .execute_in(&mut txn, &OperationRequest::replace(&readme, "8080", "9090"))
        .unwrap();
    assert!(first.is_success() && second.is_success());
    assert_eq!(txn.participants().len(), 2);

    let report = txn.rollback().unwrap();
    assert!(report.is_clean());
    assert_eq!(report.restored, vec![readme.clone(), config.clone()]);
    assert_eq!(fs::read_to_string(&config).unwrap(), "[server]\nport = 8080\n");
    assert_eq!(fs::read_to_string(&readme).unwrap(), "Listens on 8080.\n");
    assert_eq!(txn.state(), TransactionState::RolledBack);
}

#[test]
fn committed_transaction_can_still_roll_back() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("notes.txt");
    fs::write(&file, "draft\n").unwrap();
    let patcher = patcher_in(dir.path());

    let mut txn = patcher.transaction();
    txn.begin().unwrap();
    patcher
        .execute_in(&mut txn, &OperationRequest::replace(&file, "draft", "final"))
        .unwrap();
    txn.commit().unwrap();
    assert_eq!(fs::read_to_string(&file).unwrap(), "final\n");

    let report = txn.rollback().unwrap();
    assert_eq!(report.succeeded(), 1);
    assert_eq!(fs::read_to_string(&file).unwrap(), "draft\n");
}

#[test]
fn rollback_keeps_last_known_good_in_step() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("notes.txt");
    fs::write(&file, "draft\n").unwrap();
    let patcher = patcher_in(dir.path());

    let mut txn = patcher.transaction();
    txn.begin().unwrap();
    patcher
        .execute_in(&mut txn, &OperationRequest::replace(&file, "draft", "final"))
        .unwrap();
    let report = txn.rollback().unwrap();
    assert!(report.is_clean());
    assert_eq!(snapshots_of(&patcher, &file, SnapshotClass::Valid).len(), 1);

    // A later standard rollback must not resurrect the undone edit.
    patcher.backups().rollback(&file).unwrap();
    assert_eq!(fs::read_to_string(&file).unwrap(), "draft\n");
}

#[test]
fn execute_in_requires_active_transaction() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("notes.txt");
    fs::write(&file, "draft\n").unwrap();
    let patcher = patcher_in(dir.path());

    let mut txn = patcher.transaction();
    let result = patcher
        .execute_in(&mut txn, &OperationRequest::replace(&file, "draft", "final"))
        .unwrap();

    assert_eq!(result.failure_kind(), Some(FailureKind::Transaction));
    assert_eq!(fs::read_to_string(&file).unwrap(), "draft\n");
}

#[test]
fn same_file_added_twice_keeps_first_snapshot() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("notes.txt");
    fs::write(&file, "v1\n").unwrap();
    let patcher = patcher_in(dir.path());

    let mut txn = patcher.transaction();
    txn.begin().unwrap();
    patcher
        .execute_in(&mut txn, &OperationRequest::replace(&file, "v1", "v2"))
        .unwrap();
    patcher
        .execute_in(&mut txn, &OperationRequest::replace(&file, "v2", "v3"))
        .unwrap();
    assert_eq!(txn.participants().len(), 1);

    txn.rollback().unwrap();
    assert_eq!(fs::read_to_string(&file).unwrap(), "v1\n");
}

#[test]
fn finished_transaction_releases_snapshots_on_drop() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("notes.txt");
    fs::write(&file, "draft\n").unwrap();
    let patcher = patcher_in(dir.path());

    {
        let mut txn = patcher.transaction();
        txn.begin().unwrap();
        txn.add_file(&file).unwrap();
        assert_eq!(snapshots_of(&patcher, &file, SnapshotClass::Generic).len(), 1);
        txn.commit().unwrap();
    }

    assert!(snapshots_of(&patcher, &file, SnapshotClass::Generic).is_empty());
}

#[test]
fn active_transaction_keeps_snapshots_on_drop() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("notes.txt");
    fs::write(&file, "draft\n").unwrap();
    let patcher = patcher_in(dir.path());

    {
        let mut txn = patcher.transaction();
        txn.begin().unwrap();
        txn.add_file(&file).unwrap();
    }

    assert_eq!(snapshots_of(&patcher, &file, SnapshotClass::Generic).len(), 1);
}
