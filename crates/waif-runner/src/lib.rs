//! # waif runner
//!
//! Runs a job's command once and records the outcome:
//!
//! - [`JobRunner`] spawns the command through the shell, enforces the
//!   timeout and captures the selected streams.
//! - [`redact`] scrubs secret-shaped text from captured output.
//! - [`snapshot`] appends one JSON line per run to a log file and trims it
//!   to the job's retention.
//! - [`JobRecorder`] ties the three together for the scheduler and the CLI.

mod capture;
mod config;
mod error;
mod exec;
mod io;
mod pipeline;
mod registry;
mod text;

pub mod redact;
pub mod snapshot;

pub use config::RunnerConfig;
pub use error::SnapshotError;
pub use exec::{run_job, JobRunResult, JobRunner, JobStatus};
pub use pipeline::JobRecorder;
pub use redact::{redact, Redactor};
pub use registry::{LogGuard, LogLockRegistry};
pub use snapshot::{LogTarget, SnapshotOptions, SnapshotRecord};
