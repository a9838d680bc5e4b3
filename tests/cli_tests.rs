// tests/cli_tests.rs
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_no_input_is_fatal() {
    let mut cmd = Command::cargo_bin("docflow").unwrap();
    cmd.arg("json")
        .write_stdin("")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Called without input"));
}

#[test]
fn test_missing_subcommand_shows_help() {
    let mut cmd = Command::cargo_bin("docflow").unwrap();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_inline_json_to_output_directory() {
    let out = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("docflow").unwrap();
    cmd.arg("json")
        .arg(r#"{"id": "doc-1", "name": "first", "drop": true}"#)
        .arg("--exclude")
        .arg("drop")
        .arg("-o")
        .arg(out.path())
        .arg("--quiet")
        .assert()
        .success();

    let written = fs::read_to_string(out.path().join("doc-1.json")).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(doc, serde_json::json!({"id": "doc-1", "name": "first"}));
}

#[test]
fn test_piped_csv_with_merge() {
    let out = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("docflow").unwrap();
    cmd.args(["--merge", r#"{"origin": "pipe"}"#, "--uuid", "-q", "csv", "-o"])
        .arg(out.path())
        .write_stdin("name,size\nalpha,1\nbeta,2\n")
        .assert()
        .success();

    let files: Vec<_> = fs::read_dir(out.path()).unwrap().collect();
    assert_eq!(files.len(), 2);
    for entry in files {
        let doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(entry.unwrap().path()).unwrap()).unwrap();
        assert_eq!(doc["origin"], "pipe");
        assert!(doc["id"].is_string());
    }
}

#[test]
fn test_bad_record_keeps_exit_code_zero() {
    let out = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("docflow").unwrap();
    cmd.args(["json", "--uuid-keys", "key", "--log-level", "error"])
        .arg("-o")
        .arg(out.path())
        .arg(r#"{"key": 1}"#)
        .arg(r#"{"other": 2}"#)
        .assert()
        .success()
        .stderr(predicate::str::contains("could not build id on key 'key'"));

    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 1);
}

#[test]
fn test_invalid_configuration_is_fatal() {
    let mut cmd = Command::cargo_bin("docflow").unwrap();
    cmd.args(["json", "--wrapper", "/no/such/wrapper.json", r#"{"a": 1}"#])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--wrapper"));
}
