//! # waif scheduler
//!
//! Tracks the next fire time of every job and, on a fixed tick, notifies
//! registered listeners of the jobs that are due. The scheduler never runs
//! jobs itself.

mod config;
mod error;
mod scheduler;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use scheduler::{ListenerResult, Scheduler, SchedulerState};
