use super::{patcher_in, snapshots_of};
use safe_patcher::engine::EngineInput;
use safe_patcher::matcher::fuzzy::{FuzzyMatcher, FuzzyMode};
use safe_patcher::{
    Capability, CapabilitySet, Engine, FailureKind, MatchOptions, Matcher, OperationKind, OperationOptions,
    OperationRequest, OperationStatus, PatchError, SnapshotClass,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

#[test]
fn replace_promotes_valid_snapshot() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("greeting.txt");
    fs::write(&file, "Hello World\n").unwrap();
    let patcher = patcher_in(dir.path());

    let result = patcher
        .execute(&OperationRequest::replace(&file, "Hello World", "Hello API"))
        .unwrap();

    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.mutations_applied, 1);
    assert_eq!(fs::read_to_string(&file).unwrap(), "Hello API\n");
    assert_eq!(snapshots_of(&patcher, &file, SnapshotClass::Valid).len(), 1);
    assert!(snapshots_of(&patcher, &file, SnapshotClass::Temp).is_empty());
    assert!(result.metadata.contains_key("snapshot"));
}

#[test]
fn missing_pattern_leaves_file_alone() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("greeting.txt");
    fs::write(&file, "Hello World\n").unwrap();
    let patcher = patcher_in(dir.path());

    let result = patcher
        .execute(&OperationRequest::replace(&file, "Goodbye", "Hello API"))
        .unwrap();

    assert!(!result.is_success());
    assert_eq!(result.failure_kind(), Some(FailureKind::PatternNotFound));
    assert_eq!(fs::read_to_string(&file).unwrap(), "Hello World\n");
    assert!(patcher.backups().list(&file).unwrap().is_empty());
}

#[test]
fn corrupting_insert_is_rolled_back() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("service.py");
    let original = "def handler():\n    x = 1\n    return x\n";
    fs::write(&file, original).unwrap();
    let patcher = patcher_in(dir.path());

    let err = patcher
        .execute(&OperationRequest::insert_after(&file, "x = 1", "y = (x,"))
        .unwrap_err();

    match err {
        PatchError::StructuralIntegrity {
            rollback_succeeded, ..
        } => assert!(rollback_succeeded),
        other => panic!("expected structural integrity error, got {other}"),
    }
    assert_eq!(fs::read_to_string(&file).unwrap(), original);
}

#[test]
fn valid_insert_keeps_indentation() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("service.py");
    fs::write(&file, "def handler():\n    x = 1\n    return x\n").unwrap();
    let patcher = patcher_in(dir.path());

    let result = patcher
        .execute(&OperationRequest::insert_after(&file, "x = 1", "y = 2"))
        .unwrap();

    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(
        fs::read_to_string(&file).unwrap(),
        "def handler():\n    x = 1\n    y = 2\n    return x\n"
    );
}

#[test]
fn transaction_rollback_restores_and_removes() {
    let dir = TempDir::new().unwrap();
    let existing = dir.path().join("existing.txt");
    let created = dir.path().join("created.txt");
    fs::write(&existing, "original\n").unwrap();
    let patcher = patcher_in(dir.path());

    let mut txn = patcher.transaction();
    txn.begin().unwrap();
    txn.add_file(&existing).unwrap();
    txn.add_file(&created).unwrap();
    fs::write(&existing, "changed\n").unwrap();
    fs::write(&created, "new\n").unwrap();

    let report = txn.rollback().unwrap();

    assert!(report.is_clean(), "{:?}", report.failed);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(fs::read_to_string(&existing).unwrap(), "original\n");
    assert!(!created.exists());
}

#[test]
fn fuzzy_flexible_tolerates_double_space() {
    let text = "import os\n\nclass  User:\n    pass\n";
    let opts = MatchOptions::default();

    let flexible = FuzzyMatcher::new(0.8, FuzzyMode::Flexible);
    let found = flexible.find_all(text, "class User:", &opts).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].start_line, 3);
    let similarity = found[0].metadata["similarity"].as_f64().unwrap();
    assert!(similarity >= 0.8);

    let exact = FuzzyMatcher::new(0.8, FuzzyMode::Exact);
    assert!(exact.find_all(text, "class User:", &opts).unwrap().is_empty());
}

fn fuzzy() -> OperationOptions {
    OperationOptions {
        fuzzy: true,
        ..Default::default()
    }
}

#[test]
fn fuzzy_replace_of_substring_keeps_the_line() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("calc.py");
    fs::write(&file, "x = compute(a)\ny = 1\n").unwrap();
    let patcher = patcher_in(dir.path());

    let request = OperationRequest::replace(&file, "compute", "calc").with_options(fuzzy());
    let result = patcher.execute(&request).unwrap();

    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.matches.len(), 1);
    assert_eq!(result.matches[0].text, "compute");
    assert_eq!(fs::read_to_string(&file).unwrap(), "x = calc(a)\ny = 1\n");
}

#[test]
fn fuzzy_replace_leaves_merely_similar_lines() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("vars.py");
    fs::write(&file, "x = 1\ny = 1\nz = 1\n").unwrap();
    let patcher = patcher_in(dir.path());

    let request = OperationRequest::replace(&file, "x = 1", "x = 2").with_options(fuzzy());
    let result = patcher.execute(&request).unwrap();

    assert_eq!(result.mutations_applied, 1);
    assert_eq!(fs::read_to_string(&file).unwrap(), "x = 2\ny = 1\nz = 1\n");
}

#[test]
fn structural_request_without_language_is_not_supported() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("notes.txt");
    fs::write(&file, "alpha(1)\n").unwrap();
    let patcher = patcher_in(dir.path());

    let options = OperationOptions {
        structural: true,
        ..Default::default()
    };
    let request = OperationRequest::search(&file, "alpha($X)").with_options(options);
    let result = patcher.execute(&request).unwrap();

    assert_eq!(result.status, OperationStatus::NotSupported);
    assert_eq!(result.failure_kind(), Some(FailureKind::NotSupported));
    assert!(!result.is_success());
}

#[test]
fn structure_regression_is_partial_success() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("app.py");
    fs::write(&file, "def f():\n    return 1\n").unwrap();
    let patcher = patcher_in(dir.path());

    let result = patcher
        .execute(&OperationRequest::replace(&file, "return 1", "pass"))
        .unwrap();

    assert_eq!(result.status, OperationStatus::PartialSuccess);
    assert!(result.is_success());
    assert_eq!(result.mutations_applied, 1);
    assert!(result.metadata.contains_key("warnings"));
    assert_eq!(fs::read_to_string(&file).unwrap(), "def f():\n    pass\n");
    assert_eq!(snapshots_of(&patcher, &file, SnapshotClass::Valid).len(), 1);
}

#[test]
fn unsatisfiable_capabilities_fall_back_to_baseline() {
    let dir = TempDir::new().unwrap();
    let patcher = patcher_in(dir.path());
    let required = CapabilitySet::from([
        Capability::StructuralSearch,
        Capability::RegexSearch,
        Capability::BatchOperations,
    ]);

    let engine = patcher.registry().select(&required, None).unwrap();
    assert_eq!(engine.name(), "baseline");

    let options = OperationOptions::default();
    let input = EngineInput {
        path: Path::new("notes.txt"),
        content: "alpha\nbeta\nalpha\n",
        pattern: "alpha",
        options: &options,
        language: None,
    };
    let matches = engine.search(&input).unwrap();
    assert_eq!(matches.len(), 2);
}

#[test]
fn search_is_served_from_cache_until_file_changes() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("notes.txt");
    fs::write(&file, "todo: one\ntodo: two\n").unwrap();
    let patcher = patcher_in(dir.path());
    let request = OperationRequest::search(&file, "todo");

    assert_eq!(patcher.execute(&request).unwrap().matches.len(), 2);
    assert_eq!(patcher.execute(&request).unwrap().matches.len(), 2);
    assert_eq!(patcher.cache().stats().hits, 1);

    fs::write(&file, "todo: one\n").unwrap();
    assert_eq!(patcher.execute(&request).unwrap().matches.len(), 1);
    assert_eq!(patcher.cache().stats().stale_purges, 1);
}

#[test]
fn structural_replace_on_rust_source() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("lib.rs");
    fs::write(&file, "fn main() {\n    let a = old_call(1);\n}\n").unwrap();
    let patcher = patcher_in(dir.path());

    let options = OperationOptions {
        structural: true,
        ..Default::default()
    };
    let request = OperationRequest::new(OperationKind::Replace, &file, "old_call($ARG)")
        .with_content("new_call($ARG)")
        .with_options(options);
    let result = patcher.execute(&request).unwrap();

    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.metadata["engine"], "structural");
    assert!(fs::read_to_string(&file).unwrap().contains("new_call(1)"));
}

#[test]
fn batch_keeps_order_and_serializes_same_file() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    fs::write(&a, "one\n").unwrap();
    fs::write(&b, "alpha\n").unwrap();
    let patcher = patcher_in(dir.path());

    let results = patcher.execute_batch(&[
        OperationRequest::replace(&a, "one", "two"),
        OperationRequest::replace(&b, "alpha", "beta"),
        OperationRequest::replace(&a, "two", "three"),
        OperationRequest::search(&b, "missing"),
    ]);

    assert_eq!(results.len(), 4);
    assert!(results[0].as_ref().unwrap().is_success());
    assert!(results[1].as_ref().unwrap().is_success());
    assert!(results[2].as_ref().unwrap().is_success());
    assert_eq!(
        results[3].as_ref().unwrap().failure_kind(),
        Some(FailureKind::PatternNotFound)
    );
    assert_eq!(fs::read_to_string(&a).unwrap(), "three\n");
    assert_eq!(fs::read_to_string(&b).unwrap(), "beta\n");
}

#[test]
fn tree_search_skips_hidden_and_backups() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::create_dir_all(dir.path().join(".git")).unwrap();
    fs::write(dir.path().join("src/a.txt"), "needle\n").unwrap();
    fs::write(dir.path().join("src/b.txt"), "hay\n").unwrap();
    fs::write(dir.path().join(".git/config"), "needle\n").unwrap();
    let patcher = patcher_in(dir.path());

    // Leaves a VALID snapshot containing "needle" under .backups
    patcher
        .execute(&OperationRequest::replace(dir.path().join("src/b.txt"), "hay", "needle"))
        .unwrap();

    let found = patcher
        .search_tree(dir.path(), "needle", &OperationOptions::default())
        .unwrap();
    let paths: Vec<_> = found.iter().map(|(p, _)| p.strip_prefix(dir.path()).unwrap()).collect();
    assert_eq!(paths, vec![Path::new("src/a.txt"), Path::new("src/b.txt")]);
}
