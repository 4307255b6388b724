use super::*;
use serde_json::Value;
use tempfile::TempDir;

fn job(id: &str) -> JobDefinition {
    JobDefinition::new(id, format!("{} job", id), "echo hi", "* * * * *")
}

fn result(exit_code: i32, stdout: &str) -> JobRunResult {
    JobRunResult {
        exit_code: Some(exit_code),
        timed_out: false,
        stdout: Some(stdout.to_string()),
        stderr: None,
        status: if exit_code == 0 {
            JobStatus::Success
        } else {
            JobStatus::Failure
        },
        duration_ms: 12,
        spawn_error: None,
    }
}

fn read_json_lines(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn test_append_writes_jsonl_line() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/dir/x.jsonl");

    append(&path, &job("x"), &result(0, "ok\n"), &SnapshotOptions::default());

    let lines = read_json_lines(&path);
    assert_eq!(lines.len(), 1);
    let line = &lines[0];
    assert_eq!(line["job_id"], "x");
    assert_eq!(line["name"], "x job");
    assert_eq!(line["command"], "echo hi");
    assert_eq!(line["exit_code"], 0);
    assert_eq!(line["status"], "success");
    assert_eq!(line["summary"], "ok");
    assert_eq!(line["sanitized_output"], "ok\n");
    assert_eq!(line["truncated"], false);
    assert_eq!(line["duration_ms"], 12);
    assert_eq!(line["timed_out"], false);
    assert_eq!(line["metadata_version"], 1);
    assert!(line["time"].as_str().unwrap().ends_with('Z'));
}

#[test]
fn test_append_keeps_existing_lines() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("x.jsonl");
    fs::write(&path, "{\"existing\":true}\n").unwrap();

    append(&path, &job("x"), &result(1, "bad"), &SnapshotOptions::default());

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("{\"existing\":true}\n"));
    assert_eq!(content.lines().count(), 2);
}

#[test]
fn test_redact_command_omits_command() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("x.jsonl");
    let options = SnapshotOptions::default().with_redact_command(true);

    append(&path, &job("x"), &result(0, "ok"), &options);

    let line = &read_json_lines(&path)[0];
    assert!(line.get("command").is_none());
}

#[test]
fn test_timeout_record() {
    let run = JobRunResult {
        exit_code: None,
        timed_out: true,
        stdout: None,
        stderr: None,
        status: JobStatus::Timeout,
        duration_ms: 1500,
        spawn_error: None,
    };
    let record = SnapshotRecord::build(&job("t"), &run, &SnapshotOptions::default(), Utc::now());

    assert_eq!(record.exit_code, None);
    assert_eq!(record.status, JobStatus::Timeout);
    assert!(record.timed_out);
    assert_eq!(record.summary, "");
    assert_eq!(record.sanitized_output, "");

    let json: Value = serde_json::to_value(&record).unwrap();
    assert!(json["exit_code"].is_null());
}

#[test]
fn test_output_is_redacted_by_default() {
    let run = result(0, "key sk-abcdefghijklmnop1234 done\n");
    let record = SnapshotRecord::build(&job("r"), &run, &SnapshotOptions::default(), Utc::now());

    assert!(record.sanitized_output.contains("sk-[REDACTED]"));
    assert!(!record.sanitized_output.contains("abcdefghijklmnop1234"));
    assert!(!record.summary.contains("abcdefghijklmnop1234"));
}

#[test]
fn test_redaction_disabled_keeps_text_but_caps_length() {
    let job = job("plain").with_redact(false);

    let record = SnapshotRecord::build(
        &job,
        &result(0, "sk-abcdefghijklmnop1234"),
        &SnapshotOptions::default(),
        Utc::now(),
    );
    assert_eq!(record.sanitized_output, "sk-abcdefghijklmnop1234");
    assert!(!record.truncated);

    let long = "x".repeat(1500);
    let record = SnapshotRecord::build(&job, &result(0, &long), &SnapshotOptions::default(), Utc::now());
    assert!(record.truncated);
    assert!(record.sanitized_output.ends_with("\n[TRUNCATED 500 chars]"));
}

#[test]
fn test_long_redacted_output_is_marked_truncated() {
    let long = "word ".repeat(300);
    let record = SnapshotRecord::build(&job("l"), &result(0, &long), &SnapshotOptions::default(), Utc::now());

    assert!(record.truncated);
    assert!(record.sanitized_output.ends_with("\n[TRUNCATED 500 chars]"));
}

#[test]
fn test_summary_is_first_line_capped() {
    let first = "y ".repeat(150);
    let run = result(0, &format!("{}\nsecond line", first));
    let record = SnapshotRecord::build(&job("s"), &run, &SnapshotOptions::default(), Utc::now());

    let expected: String = first.chars().take(200).collect();
    assert_eq!(record.summary, format!("{}...[TRUNCATED]", expected));
}

#[test]
fn test_combined_stdout_and_stderr() {
    let mut run = result(1, "out");
    run.stderr = Some("err".to_string());
    let record = SnapshotRecord::build(&job("c"), &run, &SnapshotOptions::default(), Utc::now());

    assert_eq!(record.sanitized_output, "out\nerr");
    assert_eq!(record.summary, "out");
}

#[test]
fn test_retention_keeps_most_recent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("y.jsonl");
    let job = job("y").with_keep_last(2);

    for i in 0..5 {
        record(&path, &job, &result(i, &format!("o{}", i)), &SnapshotOptions::default());
    }

    let lines = read_json_lines(&path);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["exit_code"], 3);
    assert_eq!(lines[1]["exit_code"], 4);
}

#[test]
fn test_retention_invariant() {
    for keep_last in 1..4usize {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("inv.jsonl");
        let job = job("inv").with_keep_last(keep_last as u32);
        let appends = keep_last + 3;

        for i in 0..appends {
            record(&path, &job, &result(i as i32, "x"), &SnapshotOptions::default());
        }

        let records = read_records(&path).unwrap();
        let codes: Vec<i32> = records.iter().filter_map(|r| r.exit_code).collect();
        let expected: Vec<i32> = ((appends - keep_last)..appends).map(|i| i as i32).collect();
        assert_eq!(codes, expected);
    }
}

#[test]
fn test_default_retention() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("d.jsonl");

    for i in 0..12 {
        record(&path, &job("d"), &result(i, "x"), &SnapshotOptions::default());
    }

    assert_eq!(read_json_lines(&path).len(), DEFAULT_KEEP_LAST);
}

#[test]
fn test_retention_drops_blank_lines() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("b.jsonl");
    fs::write(&path, "{\"a\":1}\n\n   \n{\"a\":2}\n{\"a\":3}\n").unwrap();

    enforce_retention(&path, 2);

    assert_eq!(fs::read_to_string(&path).unwrap(), "{\"a\":2}\n{\"a\":3}\n");
}

#[test]
fn test_retention_under_limit_leaves_file_alone() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("u.jsonl");
    fs::write(&path, "{\"a\":1}\n\n").unwrap();

    enforce_retention(&path, 5);

    assert_eq!(fs::read_to_string(&path).unwrap(), "{\"a\":1}\n\n");
}

#[test]
fn test_failures_are_swallowed() {
    let dir = TempDir::new().unwrap();

    // Missing file: nothing to trim.
    enforce_retention(&dir.path().join("missing.jsonl"), 3);

    // A directory where the log file should be.
    let blocked = dir.path().join("blocked.jsonl");
    fs::create_dir(&blocked).unwrap();
    record(&blocked, &job("z"), &result(0, "ok"), &SnapshotOptions::default());
    assert!(blocked.is_dir());

    // A file where the parent directory should be.
    let file_parent = dir.path().join("not-a-dir");
    fs::write(&file_parent, "").unwrap();
    append(
        &file_parent.join("z.jsonl"),
        &job("z"),
        &result(0, "ok"),
        &SnapshotOptions::default(),
    );
}

#[test]
fn test_try_append_reports_errors() {
    let dir = TempDir::new().unwrap();
    let file_parent = dir.path().join("file");
    fs::write(&file_parent, "").unwrap();

    let record = SnapshotRecord::build(&job("e"), &result(0, ""), &SnapshotOptions::default(), Utc::now());
    let err = try_append(&file_parent.join("e.jsonl"), &record).unwrap_err();
    assert!(matches!(err, SnapshotError::CreateDir { .. }));
}

#[test]
fn test_log_target_paths() {
    let per_job = LogTarget::default();
    assert_eq!(per_job.path_for("nightly"), PathBuf::from("history/nightly.jsonl"));

    let shared = LogTarget::Shared(PathBuf::from("/var/log/ooda.jsonl"));
    assert_eq!(shared.path_for("a"), PathBuf::from("/var/log/ooda.jsonl"));
    assert_eq!(shared.path_for("b"), PathBuf::from("/var/log/ooda.jsonl"));
}

#[test]
fn test_record_round_trips_through_reader() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rt.jsonl");
    record(&path, &job("rt"), &result(0, "hi"), &SnapshotOptions::default());

    let records = read_records(&path).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].job_id, "rt");
    assert_eq!(records[0].status, JobStatus::Success);
    assert_eq!(records[0].command.as_deref(), Some("echo hi"));
}

#[test]
fn test_redaction_growth_stays_within_output_limit() {
    // Each assignment grows from 14 to 16 chars once redacted.
    let output = "token=abcdefgh ".repeat(66);
    assert!(output.chars().count() < 1000);

    let record = SnapshotRecord::build(&job("g"), &result(0, &output), &SnapshotOptions::default(), Utc::now());

    assert!(record.truncated);
    assert!(!record.sanitized_output.contains("abcdefgh"));
    let (head, tail) = record
        .sanitized_output
        .rsplit_once("\n[TRUNCATED ")
        .unwrap();
    assert_eq!(head.chars().count(), 1000);
    assert!(head.starts_with("token=[REDACTED] "));
    assert!(tail.ends_with(" chars]"));
}

#[test]
fn test_secret_beyond_output_limit_is_not_cut_in_half() {
    // The key straddles the output limit.
    let output = format!("{}sk-abcdefghijklmnop1234", "word ".repeat(198));
    let record = SnapshotRecord::build(&job("h"), &result(0, &output), &SnapshotOptions::default(), Utc::now());

    assert!(record.truncated);
    assert!(!record.sanitized_output.contains("abcdefgh"));
}
