//! Run a job and record its snapshot.

use waif_config::JobDefinition;

use crate::exec::{JobRunResult, JobRunner};
use crate::registry::LogLockRegistry;
use crate::snapshot::{self, LogTarget, SnapshotOptions};

/// Runs jobs and records each outcome to its log target.
///
/// Clones share the same lock registry, so concurrent runs that write to
/// the same log file take turns.
#[derive(Clone, Default)]
pub struct JobRecorder {
    runner: JobRunner,
    target: LogTarget,
    options: SnapshotOptions,
    locks: LogLockRegistry,
}

impl JobRecorder {
    pub fn new(runner: JobRunner, target: LogTarget, options: SnapshotOptions) -> Self {
        Self {
            runner,
            target,
            options,
            locks: LogLockRegistry::new(),
        }
    }

    pub fn target(&self) -> &LogTarget {
        &self.target
    }

    /// Run `job` once, append its snapshot and apply retention.
    ///
    /// Logging failures are reported through tracing and never change the
    /// returned result.
    pub async fn run(&self, job: &JobDefinition) -> JobRunResult {
        let result = self.runner.run(job).await;

        let path = self.target.path_for(&job.id);
        let _guard = self.locks.acquire(&path).await;
        snapshot::record(&path, job, &result, &self.options);

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::JobStatus;
    use crate::snapshot::read_records;
    use tempfile::TempDir;
    use waif_config::CaptureStream;

    fn e2e_job() -> JobDefinition {
        JobDefinition::new("e2e", "End to end", "echo hi", "* * * * *")
            .with_capture([CaptureStream::Stdout])
            .with_keep_last(1)
    }

    #[tokio::test]
    async fn test_run_twice_keeps_one_line() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("e2e.jsonl");
        let recorder = JobRecorder::new(
            JobRunner::default(),
            LogTarget::Shared(log.clone()),
            SnapshotOptions::default(),
        );

        for _ in 0..2 {
            let result = recorder.run(&e2e_job()).await;
            assert_eq!(result.status, JobStatus::Success);
        }

        let records = read_records(&log).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].job_id, "e2e");
        assert_eq!(records[0].exit_code, Some(0));
        assert_eq!(records[0].status, JobStatus::Success);
        assert!(records[0].sanitized_output.contains("hi"));
    }

    #[tokio::test]
    async fn test_secret_output_is_redacted_on_disk() {
        let dir = TempDir::new().unwrap();
        let recorder = JobRecorder::new(
            JobRunner::default(),
            LogTarget::PerJob {
                dir: dir.path().join("history"),
            },
            SnapshotOptions::default(),
        );
        let job = JobDefinition::new("leaky", "Leaky", "echo token sk-abcdefghijklmnop1234", "* * * * *")
            .with_capture([CaptureStream::Stdout])
            .with_redact(true);

        recorder.run(&job).await;

        let path = dir.path().join("history/leaky.jsonl");
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("sk-[REDACTED]"));
        assert!(!content.contains("abcdefghijklmnop1234"));
    }

    #[tokio::test]
    async fn test_concurrent_runs_share_log() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("shared.jsonl");
        let recorder = JobRecorder::new(
            JobRunner::default(),
            LogTarget::Shared(log.clone()),
            SnapshotOptions::default(),
        );

        let mut handles = Vec::new();
        for i in 0..6 {
            let recorder = recorder.clone();
            handles.push(tokio::spawn(async move {
                let job = JobDefinition::new(format!("job{}", i), "Concurrent", "echo hi", "* * * * *")
                    .with_keep_last(4);
                recorder.run(&job).await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(read_records(&log).unwrap().len(), 4);
        assert!(recorder.locks.is_empty());
    }

    #[tokio::test]
    async fn test_unwritable_log_does_not_change_result() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();

        let recorder = JobRecorder::new(
            JobRunner::default(),
            LogTarget::PerJob { dir: blocker },
            SnapshotOptions::default(),
        );
        let job = JobDefinition::new("x", "x", "exit 2", "* * * * *");

        let result = recorder.run(&job).await;
        assert_eq!(result.exit_code, Some(2));
        assert_eq!(result.status, JobStatus::Failure);
    }
}
