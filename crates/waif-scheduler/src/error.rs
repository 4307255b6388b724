//! Scheduler errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Scheduler has been disposed")]
    Disposed,

    #[error("Scheduler must be started from within a tokio runtime")]
    NoRuntime,
}
