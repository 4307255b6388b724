//! Snapshot log writer.
//!
//! Every run appends one JSON object per line to a log file, after which
//! the file is trimmed to the job's `retention.keep_last` most recent lines.
//! Both steps are best effort: failures are logged and swallowed so a run's
//! result is never lost because its log line could not be written.
//!
//! The trim reads the whole file and atomically replaces it. A crash or a
//! second writer in another process can leave more than `keep_last` lines
//! behind; the next trim fixes that.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use waif_config::JobDefinition;

use crate::error::SnapshotError;
use crate::exec::{JobRunResult, JobStatus};
use crate::io::{append_line, atomic_write, ensure_parent};
use crate::redact::Redactor;
use crate::text::{clip, first_line, truncate_with_marker};

/// Snapshot format version.
pub const METADATA_VERSION: u32 = 1;

/// Default directory for per-job logs.
pub const DEFAULT_HISTORY_DIR: &str = "history";

/// Retention applied when a job sets none.
pub const DEFAULT_KEEP_LAST: usize = 10;

/// Where snapshot lines go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// One file per job: `<dir>/<job_id>.jsonl`.
    PerJob { dir: PathBuf },
    /// Every job appends to the same file.
    Shared(PathBuf),
}

impl Default for LogTarget {
    fn default() -> Self {
        LogTarget::PerJob {
            dir: PathBuf::from(DEFAULT_HISTORY_DIR),
        }
    }
}

impl LogTarget {
    /// Log file for `job_id`.
    pub fn path_for(&self, job_id: &str) -> PathBuf {
        match self {
            LogTarget::PerJob { dir } => dir.join(format!("{}.jsonl", job_id)),
            LogTarget::Shared(path) => path.clone(),
        }
    }
}

/// Snapshot writer options.
#[derive(Debug, Clone)]
pub struct SnapshotOptions {
    /// Leave the command out of the record.
    pub redact_command: bool,
    /// Cap on `sanitized_output`, in characters.
    pub output_limit: usize,
    /// Cap on `summary`, in characters.
    pub summary_limit: usize,
    /// Retention for jobs without `retention.keep_last`.
    pub default_keep_last: usize,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            redact_command: false,
            output_limit: 1000,
            summary_limit: 200,
            default_keep_last: DEFAULT_KEEP_LAST,
        }
    }
}

impl SnapshotOptions {
    pub fn with_redact_command(mut self, redact_command: bool) -> Self {
        self.redact_command = redact_command;
        self
    }

    /// Effective retention for `job`.
    pub fn keep_last_for(&self, job: &JobDefinition) -> usize {
        job.keep_last().unwrap_or(self.default_keep_last)
    }
}

/// One line of a snapshot log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// RFC 3339 UTC timestamp of the write.
    pub time: String,
    pub job_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub exit_code: Option<i32>,
    pub status: JobStatus,
    pub summary: String,
    pub sanitized_output: String,
    /// Whether `sanitized_output` was clipped.
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub timed_out: bool,
    pub metadata_version: u32,
}

impl SnapshotRecord {
    /// Build the record for one run.
    ///
    /// Output is redacted unless the job sets `redact: false`; either way the
    /// stored text is capped at `options.output_limit` characters plus the
    /// truncation marker.
    pub fn build(
        job: &JobDefinition,
        result: &JobRunResult,
        options: &SnapshotOptions,
        now: DateTime<Utc>,
    ) -> Self {
        let combined = result.combined_output();
        // Redact the whole text before capping: replacements can lengthen
        // it, and a cut must never split a secret out of a pattern's reach.
        let cleaned = if job.should_redact() {
            Redactor::new(usize::MAX).redact(&combined)
        } else {
            combined
        };
        let capped = truncate_with_marker(&cleaned, options.output_limit);
        let truncated = matches!(capped, Cow::Owned(_));
        let sanitized_output = capped.into_owned();
        let summary = clip(first_line(&sanitized_output), options.summary_limit).into_owned();

        Self {
            time: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            job_id: job.id.clone(),
            name: job.name.clone(),
            command: (!options.redact_command).then(|| job.command.clone()),
            exit_code: result.exit_code,
            status: result.status,
            summary,
            sanitized_output,
            truncated,
            duration_ms: result.duration_ms,
            timed_out: result.timed_out,
            metadata_version: METADATA_VERSION,
        }
    }
}

/// Append a snapshot of `result` to `path`. Failures are logged, not returned.
pub fn append(path: &Path, job: &JobDefinition, result: &JobRunResult, options: &SnapshotOptions) {
    let record = SnapshotRecord::build(job, result, options, Utc::now());
    if let Err(e) = try_append(path, &record) {
        warn!(job_id = %job.id, path = %path.display(), error = %e, "Failed to append snapshot");
    }
}

/// Trim `path` to its last `keep_last` lines. Failures are logged, not returned.
pub fn enforce_retention(path: &Path, keep_last: usize) {
    match try_enforce_retention(path, keep_last) {
        Ok(0) => {}
        Ok(removed) => debug!(path = %path.display(), removed, "Trimmed snapshot log"),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to enforce snapshot retention")
        }
    }
}

/// Append a snapshot, then apply the job's retention.
pub fn record(path: &Path, job: &JobDefinition, result: &JobRunResult, options: &SnapshotOptions) {
    append(path, job, result, options);
    enforce_retention(path, options.keep_last_for(job));
}

/// Read every record in a snapshot log, skipping blank lines.
pub fn read_records(path: &Path) -> Result<Vec<SnapshotRecord>, SnapshotError> {
    read_lines(path)?
        .iter()
        .map(|line| serde_json::from_str(line).map_err(SnapshotError::from))
        .collect()
}

fn try_append(path: &Path, record: &SnapshotRecord) -> Result<(), SnapshotError> {
    ensure_parent(path).map_err(|source| SnapshotError::CreateDir {
        path: path.parent().map(Path::to_path_buf).unwrap_or_default(),
        source,
    })?;

    let line = serde_json::to_string(record)?;
    append_line(path, &line).map_err(|source| SnapshotError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Returns the number of lines removed.
fn try_enforce_retention(path: &Path, keep_last: usize) -> Result<usize, SnapshotError> {
    if keep_last == 0 {
        return Ok(0);
    }

    let lines = read_lines(path)?;
    if lines.len() <= keep_last {
        return Ok(0);
    }

    let removed = lines.len() - keep_last;
    let mut out = String::new();
    for line in &lines[removed..] {
        out.push_str(line);
        out.push('\n');
    }

    atomic_write(path, out.as_bytes()).map_err(|source| SnapshotError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(removed)
}

fn read_lines(path: &Path) -> Result<Vec<String>, SnapshotError> {
    let content = fs::read_to_string(path).map_err(|source| SnapshotError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
