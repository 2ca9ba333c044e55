use super::{patcher_in, snapshots_of};
use proptest::prelude::*;
use safe_patcher::{BackupManager, ContentCache, OperationRequest, SnapshotClass, TransactionManager};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn exactly_one_valid_snapshot_after_successes(steps in 1usize..6) {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("counter.txt");
        fs::write(&file, "value 0\n").unwrap();
        let patcher = patcher_in(dir.path());

        for step in 0..steps {
            let request = OperationRequest::replace(
                &file,
                format!("value {step}"),
                format!("value {}", step + 1),
            );
            let result = patcher.execute(&request).unwrap();
            prop_assert!(result.is_success());
            prop_assert_eq!(snapshots_of(&patcher, &file, SnapshotClass::Valid).len(), 1);
            prop_assert!(snapshots_of(&patcher, &file, SnapshotClass::Temp).is_empty());
        }
        prop_assert_eq!(fs::read_to_string(&file).unwrap(), format!("value {steps}\n"));
    }

    #[test]
    fn rollback_is_idempotent(
        good in "[a-z ]{0,64}",
        bad in "[A-Z ]{1,64}",
    ) {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("data.txt");
        fs::write(&file, &good).unwrap();
        let backups = BackupManager::new(dir.path().join(".backups"));
        backups.confirm_valid(&file, "test").unwrap();

        fs::write(&file, &bad).unwrap();
        backups.rollback(&file).unwrap();
        let first = fs::read(&file).unwrap();
        backups.rollback(&file).unwrap();
        let second = fs::read(&file).unwrap();

        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first, good.into_bytes());
    }

    #[test]
    fn cache_never_returns_stale_payload(
        before in "[a-z]{1,32}",
        after in "[a-z]{1,32}",
    ) {
        prop_assume!(before != after);
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("cached.txt");
        fs::write(&file, &before).unwrap();
        let cache: ContentCache<String> = ContentCache::new(8, None, 1 << 20);

        cache.insert(&file, "len", &before, before.clone());
        prop_assert_eq!(cache.get(&file, "len"), Some(before.clone()));

        fs::write(&file, &after).unwrap();
        prop_assert_eq!(cache.get(&file, "len"), None);
    }

    #[test]
    fn transaction_rollback_is_atomic(
        originals in prop::collection::vec("[a-z\n]{0,48}", 1..5),
        new_files in 0usize..3,
    ) {
        let dir = TempDir::new().unwrap();
        let backups = Arc::new(BackupManager::new(dir.path().join(".backups")));
        let existing: Vec<_> = originals
            .iter()
            .enumerate()
            .map(|(i, content)| {
                let path = dir.path().join(format!("file{i}.txt"));
                fs::write(&path, content).unwrap();
                path
            })
            .collect();
        let created: Vec<_> = (0..new_files)
            .map(|i| dir.path().join(format!("new{i}.txt")))
            .collect();

        let mut txn = TransactionManager::new(backups);
        txn.begin().unwrap();
        for path in existing.iter().chain(created.iter()) {
            txn.add_file(path).unwrap();
        }
        // Partial application: every other participant is touched.
        for path in existing.iter().chain(created.iter()).step_by(2) {
            fs::write(path, "MUTATED").unwrap();
        }

        let report = txn.rollback().unwrap();
        prop_assert!(report.is_clean());
        prop_assert_eq!(report.succeeded(), existing.len() + created.len());
        for (path, content) in existing.iter().zip(&originals) {
            prop_assert_eq!(&fs::read_to_string(path).unwrap(), content);
        }
        for path in &created {
            prop_assert!(!path.exists());
        }
    }
}
