//! Job execution engine.
//!
//! A run never returns an error: non-zero exits, timeouts and spawn
//! failures are all described by the returned [`JobRunResult`].

use std::fmt;
use std::process::Stdio;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tokio::time;
use tracing::{debug, info, warn};
use waif_config::{CaptureStream, JobDefinition};

use crate::capture::StreamCapture;
use crate::config::{shell, RunnerConfig};

/// Outcome class of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Success,
    Failure,
    Timeout,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Success => "success",
            JobStatus::Failure => "failure",
            JobStatus::Timeout => "timeout",
        }
    }

    fn derive(timed_out: bool, exit_code: Option<i32>) -> Self {
        match (timed_out, exit_code) {
            (true, _) => JobStatus::Timeout,
            (false, Some(0)) => JobStatus::Success,
            (false, _) => JobStatus::Failure,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running a job once.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRunResult {
    /// Exit code; `None` when the process was killed, died from a signal,
    /// or never started.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    /// Captured stdout, `None` when not captured.
    pub stdout: Option<String>,
    /// Captured stderr, `None` when not captured.
    pub stderr: Option<String>,
    pub status: JobStatus,
    pub duration_ms: u64,
    /// Why the process could not be started, if it could not.
    pub spawn_error: Option<String>,
}

impl JobRunResult {
    fn spawn_failed(error: String, started: Instant) -> Self {
        Self {
            exit_code: None,
            timed_out: false,
            stdout: None,
            stderr: None,
            status: JobStatus::Failure,
            duration_ms: elapsed_ms(started),
            spawn_error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Success
    }

    /// Captured stdout followed by captured stderr, skipping empty streams.
    pub fn combined_output(&self) -> String {
        [self.stdout.as_deref(), self.stderr.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Runs job commands.
#[derive(Debug, Clone, Default)]
pub struct JobRunner {
    config: RunnerConfig,
}

impl JobRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run `job` once and wait for it to finish or time out.
    pub async fn run(&self, job: &JobDefinition) -> JobRunResult {
        let started = Instant::now();
        let timeout = job.timeout().unwrap_or(self.config.default_timeout);

        let mut child = match self.command(job).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Failed to spawn job command");
                return JobRunResult::spawn_failed(e.to_string(), started);
            }
        };
        debug!(job_id = %job.id, pid = ?child.id(), "Job started");

        let limit = self.config.capture_limit;
        let stdout = child
            .stdout
            .take()
            .map(|out| StreamCapture::spawn(out, limit, "stdout"));
        let stderr = child
            .stderr
            .take()
            .map(|err| StreamCapture::spawn(err, limit, "stderr"));

        let (exit_code, timed_out) = match time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => (status.code(), false),
            Ok(Err(e)) => {
                warn!(job_id = %job.id, error = %e, "Failed to wait for job");
                (None, false)
            }
            Err(_) => {
                warn!(job_id = %job.id, timeout = ?timeout, "Job timed out, killing");
                self.kill(job, &mut child).await;
                (None, true)
            }
        };

        let grace = if timed_out {
            self.config.kill_grace
        } else {
            self.config.drain_timeout
        };
        let stdout = match stdout {
            Some(capture) => Some(capture.finish(grace).await),
            None => None,
        };
        let stderr = match stderr {
            Some(capture) => Some(capture.finish(grace).await),
            None => None,
        };

        let status = JobStatus::derive(timed_out, exit_code);
        let duration_ms = elapsed_ms(started);
        info!(
            job_id = %job.id,
            status = %status,
            exit_code = ?exit_code,
            duration_ms,
            "Job finished"
        );

        JobRunResult {
            exit_code,
            timed_out,
            stdout,
            stderr,
            status,
            duration_ms,
            spawn_error: None,
        }
    }

    fn command(&self, job: &JobDefinition) -> Command {
        let (shell, flag) = shell();
        let mut cmd = Command::new(shell);
        cmd.arg(flag)
            .arg(&job.command)
            .envs(&job.env)
            .stdin(Stdio::null())
            .stdout(stdio_for(job, CaptureStream::Stdout))
            .stderr(stdio_for(job, CaptureStream::Stderr))
            .kill_on_drop(true);

        if let Some(cwd) = &job.cwd {
            cmd.current_dir(cwd);
        }

        // Own process group, so a timeout can kill grandchildren as well.
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }

    /// Forcefully kill the job and give it `kill_grace` to be reaped.
    async fn kill(&self, job: &JobDefinition, child: &mut Child) {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                debug!(job_id = %job.id, error = %e, "Failed to kill process group");
            }
        }

        if let Err(e) = child.start_kill() {
            debug!(job_id = %job.id, error = %e, "Failed to kill job process");
        }

        if time::timeout(self.config.kill_grace, child.wait()).await.is_err() {
            warn!(
                job_id = %job.id,
                "Job process did not exit within {:?} of being killed",
                self.config.kill_grace
            );
        }
    }
}

/// Run `job` with the default engine configuration.
pub async fn run_job(job: &JobDefinition) -> JobRunResult {
    JobRunner::default().run(job).await
}

fn stdio_for(job: &JobDefinition, stream: CaptureStream) -> Stdio {
    if job.captures(stream) {
        Stdio::piped()
    } else {
        Stdio::null()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
