//! Integration tests for the command-line interface

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Helper to create a workspace with one text file and one Python file
fn setup_test_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();

    fs::write(dir.path().join("greeting.txt"), "Hello World\n").unwrap();
    fs::write(
        dir.path().join("app.py"),
        r#"import os

def main():
    value = compute()
    return value
"#,
    )
    .unwrap();

    dir
}

/// Run the binary inside `workspace` with backups under `workspace/.backups`
fn run(workspace: &Path, args: &[&str]) -> Output {
    let backup_dir = workspace.join(".backups");
    Command::new(env!("CARGO_BIN_EXE_safe-patcher"))
        .current_dir(workspace)
        .env("NO_COLOR", "1")
        .env("CLICOLOR", "0")
        .env_remove("SAFE_PATCHER_CONFIG")
        .arg("--backup-dir")
        .arg(&backup_dir)
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn test_help_lists_commands() {
    let workspace = setup_test_workspace();
    let output = run(workspace.path(), &["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["search", "replace", "insert-after", "validate", "restore", "grep"] {
        assert!(stdout.contains(command), "missing {command} in help");
    }
}

#[test]
fn test_replace_modifies_file() {
    let workspace = setup_test_workspace();

    let output = run(workspace.path(), &["replace", "greeting.txt", "Hello World", "Hello API"]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1 replace applied"));
    assert_eq!(
        fs::read_to_string(workspace.path().join("greeting.txt")).unwrap(),
        "Hello API\n"
    );
}

#[test]
fn test_replace_with_diff() {
    let workspace = setup_test_workspace();

    let output = run(
        workspace.path(),
        &["replace", "greeting.txt", "World", "API", "--diff"],
    );

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("-Hello World"));
    assert!(stdout.contains("+Hello API"));
}

#[test]
fn test_missing_pattern_exits_nonzero() {
    let workspace = setup_test_workspace();

    let output = run(workspace.path(), &["replace", "greeting.txt", "Goodbye", "Hi"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("pattern not found"));
    assert_eq!(
        fs::read_to_string(workspace.path().join("greeting.txt")).unwrap(),
        "Hello World\n"
    );
}

#[test]
fn test_search_json_output() {
    let workspace = setup_test_workspace();

    let output = run(workspace.path(), &["search", "app.py", "value", "--json"]);

    assert!(output.status.success());
    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["status"], "success");
    assert_eq!(result["matches"].as_array().unwrap().len(), 2);
    assert_eq!(result["matches"][0]["start_line"], 4);
}

#[test]
fn test_insert_after_preserves_indentation() {
    let workspace = setup_test_workspace();

    let output = run(
        workspace.path(),
        &["insert-after", "app.py", "value = compute()", "log(value)"],
    );

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let content = fs::read_to_string(workspace.path().join("app.py")).unwrap();
    assert!(content.contains("    value = compute()\n    log(value)\n"));
}

#[test]
fn test_corrupting_edit_is_rejected() {
    let workspace = setup_test_workspace();
    let original = fs::read_to_string(workspace.path().join("app.py")).unwrap();

    let output = run(
        workspace.path(),
        &["insert-after", "app.py", "value = compute()", "broken = ["],
    );

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("structural integrity violated"));
    assert_eq!(fs::read_to_string(workspace.path().join("app.py")).unwrap(), original);
}

#[test]
fn test_validate_command() {
    let workspace = setup_test_workspace();
    fs::write(workspace.path().join("bad.py"), "def f(:\n    pass\n").unwrap();

    let good = run(workspace.path(), &["validate", "app.py"]);
    assert!(good.status.success());
    assert!(String::from_utf8_lossy(&good.stdout).contains("valid (python)"));

    let bad = run(workspace.path(), &["validate", "bad.py"]);
    assert!(!bad.status.success());
    assert!(String::from_utf8_lossy(&bad.stderr).contains("syntax error"));
}

#[test]
fn test_backups_and_restore() {
    let workspace = setup_test_workspace();
    let file = workspace.path().join("greeting.txt");

    let output = run(workspace.path(), &["replace", "greeting.txt", "World", "API"]);
    assert!(output.status.success());

    let listing = run(workspace.path(), &["backups", "greeting.txt"]);
    assert!(listing.status.success());
    assert!(String::from_utf8_lossy(&listing.stdout).contains("VALID"));

    // The confirmed-valid snapshot holds the last good state
    fs::write(&file, "clobbered\n").unwrap();
    let restore = run(workspace.path(), &["restore", "greeting.txt"]);
    assert!(restore.status.success(), "{}", String::from_utf8_lossy(&restore.stderr));
    assert_eq!(fs::read_to_string(&file).unwrap(), "Hello API\n");
}

#[test]
fn test_restore_without_snapshot_fails() {
    let workspace = setup_test_workspace();

    let output = run(workspace.path(), &["restore", "greeting.txt"]);

    assert!(!output.status.success());
}

#[test]
fn test_grep_walks_tree() {
    let workspace = setup_test_workspace();
    fs::create_dir(workspace.path().join("lib")).unwrap();
    fs::write(workspace.path().join("lib/util.py"), "def compute():\n    return 1\n").unwrap();

    let output = run(workspace.path(), &["grep", ".", "compute"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("app.py:4:"));
    assert!(stdout.contains("util.py:1:"));
}

#[test]
fn test_invalid_config_reported() {
    let workspace = setup_test_workspace();
    let config = workspace.path().join("custom.toml");
    fs::write(&config, "[cache]\ncapacity = 0\n").unwrap();

    let output = run(
        workspace.path(),
        &["--config", config.to_str().unwrap(), "search", "greeting.txt", "Hello"],
    );

    assert!(!output.status.success());
}
