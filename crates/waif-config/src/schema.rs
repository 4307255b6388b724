//! Job configuration model.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration document: `{ jobs: [...] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobsConfig {
    pub jobs: Vec<JobDefinition>,
}

impl JobsConfig {
    /// Find a job by id.
    pub fn job(&self, id: &str) -> Option<&JobDefinition> {
        self.jobs.iter().find(|job| job.id == id)
    }

    /// Ids of all jobs, in configuration order.
    pub fn job_ids(&self) -> Vec<&str> {
        self.jobs.iter().map(|job| job.id.as_str()).collect()
    }
}

/// Output stream that a job may capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStream {
    Stdout,
    Stderr,
}

impl CaptureStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureStream::Stdout => "stdout",
            CaptureStream::Stderr => "stderr",
        }
    }
}

impl fmt::Display for CaptureStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot retention settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Retention {
    /// How many snapshot lines survive per log target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_last: Option<u32>,
}

/// A scheduled job as defined in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobDefinition {
    /// Unique job ID (`[A-Za-z0-9_-]+`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Shell command line.
    pub command: String,
    /// Cron expression (5 or 6 fields).
    pub schedule: String,
    /// Working directory override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Environment overrides merged over the parent environment.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Streams to capture; empty means none.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capture: Vec<CaptureStream>,
    /// Whether captured output is redacted before persistence (default: true).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redact: Option<bool>,
    /// Timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<f64>,
    /// Snapshot retention.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<Retention>,
}

impl JobDefinition {
    /// Create a new job definition.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        command: impl Into<String>,
        schedule: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            command: command.into(),
            schedule: schedule.into(),
            cwd: None,
            env: BTreeMap::new(),
            capture: Vec::new(),
            redact: None,
            timeout_seconds: None,
            retention: None,
        }
    }

    /// Set the working directory.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add an environment override.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the captured streams.
    pub fn with_capture(mut self, streams: impl IntoIterator<Item = CaptureStream>) -> Self {
        self.capture = streams.into_iter().collect();
        self
    }

    /// Set redaction.
    pub fn with_redact(mut self, redact: bool) -> Self {
        self.redact = Some(redact);
        self
    }

    /// Set the timeout in seconds.
    pub fn with_timeout_seconds(mut self, seconds: f64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Set `retention.keep_last`.
    pub fn with_keep_last(mut self, keep_last: u32) -> Self {
        self.retention = Some(Retention {
            keep_last: Some(keep_last),
        });
        self
    }

    /// Whether `stream` is captured.
    pub fn captures(&self, stream: CaptureStream) -> bool {
        self.capture.contains(&stream)
    }

    /// Whether captured text is redacted. Absent means yes.
    pub fn should_redact(&self) -> bool {
        self.redact.unwrap_or(true)
    }

    /// Configured timeout, if any. Non-finite or non-positive values are ignored.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    /// Configured `retention.keep_last`, if any.
    pub fn keep_last(&self) -> Option<usize> {
        self.retention
            .and_then(|r| r.keep_last)
            .map(|n| n as usize)
    }
}
