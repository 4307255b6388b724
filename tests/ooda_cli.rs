use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const JOBS: &str = r#"jobs:
  - id: e2e
    name: End to end
    command: echo hi
    schedule: "* * * * *"
    capture: [stdout]
    retention:
      keep_last: 1
  - id: broken
    name: Broken
    command: exit 3
    schedule: "0 * * * *"
  - id: slow
    name: Slow
    command: sleep 5
    schedule: "0 0 * * *"
    timeout_seconds: 0.5
  - id: leaky
    name: Leaky
    command: echo token sk-abcdefghijklmnop1234
    schedule: "*/5 * * * *"
    capture: [stdout]
"#;

fn setup() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join(".waif")).unwrap();
    fs::write(dir.path().join(".waif/ooda-scheduler.yaml"), JOBS).unwrap();
    dir
}

fn waif(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("waif").unwrap();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("RUST_LOG", "warn")
        .env_remove("WAIF_CONFIG");
    cmd
}

fn read_lines(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn validate_reports_job_count() {
    let dir = setup();
    waif(dir.path())
        .args(["ooda", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("OK: 4 job(s)"));
}

#[test]
fn validate_rejects_duplicate_ids() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("dup.yaml");
    fs::write(
        &config,
        "jobs:\n  - id: a\n    name: A\n    command: 'true'\n    schedule: '* * * * *'\n  - id: a\n    name: B\n    command: 'true'\n    schedule: '* * * * *'\n",
    )
    .unwrap();

    waif(dir.path())
        .args(["ooda", "validate", "--config"])
        .arg(&config)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("jobs[1] (id:a).id"));
}

#[test]
fn run_job_twice_keeps_one_snapshot() {
    let dir = setup();
    let log = dir.path().join("e2e.jsonl");

    for _ in 0..2 {
        waif(dir.path())
            .args(["ooda", "run-job", "--job", "e2e", "--log"])
            .arg(&log)
            .assert()
            .success()
            .stdout(predicate::str::contains("e2e: success"));
    }

    let lines = read_lines(&log);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["job_id"], "e2e");
    assert_eq!(lines[0]["exit_code"], 0);
    assert_eq!(lines[0]["status"], "success");
    assert!(lines[0]["sanitized_output"].as_str().unwrap().contains("hi"));
}

#[test]
fn run_job_defaults_to_per_job_history() {
    let dir = setup();
    waif(dir.path())
        .args(["ooda", "run-job", "-j", "e2e"])
        .assert()
        .success();

    assert_eq!(read_lines(&dir.path().join("history/e2e.jsonl")).len(), 1);
}

#[test]
fn run_job_failure_exits_one() {
    let dir = setup();
    waif(dir.path())
        .args(["ooda", "run-job", "--job", "broken"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("broken: failure (exit_code=3"));
}

#[test]
fn run_job_timeout_exits_124() {
    let dir = setup();
    let log = dir.path().join("slow.jsonl");

    waif(dir.path())
        .args(["ooda", "run-job", "--job", "slow", "--log"])
        .arg(&log)
        .assert()
        .code(124)
        .stdout(predicate::str::contains("slow: timeout (exit_code=null"));

    let lines = read_lines(&log);
    assert_eq!(lines[0]["status"], "timeout");
    assert_eq!(lines[0]["timed_out"], true);
    assert!(lines[0]["exit_code"].is_null());
}

#[test]
fn run_job_unknown_id_exits_two() {
    let dir = setup();
    waif(dir.path())
        .args(["ooda", "run-job", "--job", "nope"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Unknown job id 'nope'"))
        .stderr(predicate::str::contains("e2e, broken, slow, leaky"));
}

#[test]
fn missing_config_exits_two() {
    let dir = TempDir::new().unwrap();
    waif(dir.path())
        .args(["ooda", "run-job", "--job", "e2e"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn config_env_var_is_honored() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("elsewhere.yaml");
    fs::write(&config, JOBS).unwrap();

    waif(dir.path())
        .env("WAIF_CONFIG", &config)
        .args(["ooda", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("elsewhere.yaml"));
}

#[test]
fn next_lists_fire_times() {
    let dir = setup();
    waif(dir.path())
        .args(["ooda", "next", "--job", "broken", "-n", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("broken (Broken) [0 * * * *]"))
        .stdout(predicate::str::contains("previous:"))
        .stdout(predicate::str::contains("next:").count(2));
}

#[test]
fn next_unknown_job_exits_two() {
    let dir = setup();
    waif(dir.path())
        .args(["ooda", "next", "--job", "nope"])
        .assert()
        .code(2);
}

#[test]
fn secrets_are_redacted_on_disk() {
    let dir = setup();
    let log_dir = dir.path().join("runs");

    waif(dir.path())
        .args(["ooda", "run-job", "--job", "leaky", "--redact-command", "--log-dir"])
        .arg(&log_dir)
        .assert()
        .success();

    let content = fs::read_to_string(log_dir.join("leaky.jsonl")).unwrap();
    assert!(content.contains("sk-[REDACTED]"));
    assert!(!content.contains("abcdefghijklmnop1234"));
    assert!(read_lines(&log_dir.join("leaky.jsonl"))[0].get("command").is_none());
}
