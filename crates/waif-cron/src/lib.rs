//! # waif cron
//!
//! Pure fire-time computation over cron expressions.
//!
//! Both the standard 5-field form (`minute hour day month weekday`) and the
//! 6-field seconds form (`second minute hour day month weekday`) are accepted.
//! Nothing here holds state: the same `(schedule, from)` pair always yields
//! the same answer. Time zone handling is whatever the caller's
//! [`chrono::TimeZone`] provides.

mod clock;
mod error;

pub use clock::{next_fire_time, normalize, previous_fire_time, upcoming, CronSchedule};
pub use error::CronError;
