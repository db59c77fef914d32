#[path = "common/mod.rs"]
mod common;

use std::fs;

use assert_cmd::Command;
use common::{forkpool_bin, read_lines};
use predicates::boolean::PredicateBooleanExt;
use predicates::str::contains;
use tempfile::tempdir;

#[test]
fn check_prints_resolved_settings() {
    let temp = tempdir().expect("failed to create tempdir");
    let config_path = temp.path().join("forkpool.yaml");
    fs::write(
        &config_path,
        r#"workers: 4
mode: once
command: "sleep 1"
env:
  QUEUE: "default"
options:
  max_execution_time: 15
"#,
    )
    .expect("failed to write config");

    Command::new(forkpool_bin())
        .args(["check", "--config"])
        .arg(&config_path)
        .args(["--workers", "6"])
        .assert()
        .success()
        .stdout(contains("workers: 6"))
        .stdout(contains("mode: once"))
        .stdout(contains("command: sleep 1"))
        .stdout(contains("max_execution_time: 15"))
        .stdout(contains("shutdown_grace: 5"))
        .stdout(contains("env: QUEUE"));
}

#[test]
fn check_rejects_unset_environment_variable() {
    let temp = tempdir().expect("failed to create tempdir");
    let config_path = temp.path().join("forkpool.yaml");
    fs::write(
        &config_path,
        "command: \"true\"\nenv:\n  TOKEN: \"${FORKPOOL_INTEGRATION_UNSET}\"\n",
    )
    .expect("failed to write config");

    Command::new(forkpool_bin())
        .args(["check", "--config"])
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(contains("FORKPOOL_INTEGRATION_UNSET"));
}

#[test]
fn run_uses_config_file_and_env() {
    let temp = tempdir().expect("failed to create tempdir");
    let config_path = temp.path().join("forkpool.yaml");
    fs::write(
        &config_path,
        r#"workers: 2
mode: once
command: "echo $GREETING >> out; for i in 1; do echo $i >> loops; done"
env:
  GREETING: "hello"
options:
  max_execution_time: 0
"#,
    )
    .expect("failed to write config");

    Command::new(forkpool_bin())
        .current_dir(temp.path())
        .args(["run", "--config"])
        .arg(&config_path)
        .assert()
        .success();

    assert_eq!(read_lines(&temp.path().join("out")), vec!["hello", "hello"]);
    assert_eq!(read_lines(&temp.path().join("loops")), vec!["1", "1"]);
}

#[test]
fn rejects_unknown_mode() {
    Command::new(forkpool_bin())
        .args(["run", "--mode", "sometimes", "--command", "true"])
        .assert()
        .failure()
        .stderr(contains("invalid value").or(contains("sometimes")));
}
