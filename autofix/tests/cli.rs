//! CLI tests for the `autofix` binary.
//!
//! Only paths that never reach the network are exercised: a passing suite
//! needs no oracle call, and an undiagnosable failure restores before one.

use std::fs;
use std::path::Path;
use std::process::Command;

use autofix::exit_codes;
use autofix::io::config::{AutofixConfig, OracleConfig, TestsConfig, load_config, write_config};

const KEY_ENV: &str = "AUTOFIX_CLI_TEST_KEY";

fn write_fixture_config(root: &Path, test_script: &str) {
    fs::create_dir_all(root.join("project")).expect("mkdir project");
    fs::write(root.join("project").join("a.py"), "x = 1\n").expect("write a.py");
    let cfg = AutofixConfig {
        target_dir: "project".into(),
        backup_dir: "project_backup".into(),
        tests: TestsConfig {
            command: vec!["sh".to_string(), "-c".to_string(), test_script.to_string()],
            timeout_secs: 30,
            ..TestsConfig::default()
        },
        oracle: OracleConfig {
            api_key_env: KEY_ENV.to_string(),
            ..OracleConfig::default()
        },
        ..AutofixConfig::default()
    };
    write_config(&root.join("autofix.toml"), &cfg).expect("write config");
}

fn autofix(root: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_autofix"))
        .current_dir(root)
        .env(KEY_ENV, "test-key")
        .args(args)
        .output()
        .expect("spawn autofix")
}

#[test]
fn init_writes_default_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let out = autofix(temp.path(), &["init"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK));

    let cfg = load_config(&temp.path().join("autofix.toml")).expect("load");
    assert_eq!(cfg, AutofixConfig::default());
}

#[test]
fn fix_with_passing_suite_exits_ok() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_fixture_config(temp.path(), "exit 0");

    let out = autofix(temp.path(), &["fix"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&out.stdout).contains("outcome=passed"));
    assert!(temp.path().join("project_backup").join("a.py").is_file());
}

#[test]
fn fix_with_undiagnosable_failure_restores() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_fixture_config(temp.path(), "echo 'no tests ran' >&2; exit 5");

    let out = autofix(temp.path(), &["fix"]);
    assert_eq!(out.status.code(), Some(exit_codes::RESTORED));
    assert!(String::from_utf8_lossy(&out.stdout).contains("reason=diagnosis"));
    assert_eq!(
        fs::read_to_string(temp.path().join("project").join("a.py")).expect("read"),
        "x = 1\n"
    );
}

#[test]
fn fix_with_missing_target_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_fixture_config(temp.path(), "exit 0");

    let out = autofix(temp.path(), &["fix", "--target", "nowhere"]);
    assert_eq!(out.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&out.stderr).contains("create initial backup"));
}
