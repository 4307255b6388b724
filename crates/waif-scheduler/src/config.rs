//! Scheduler configuration.

use std::time::Duration;

/// Default tick interval.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often due jobs are checked.
    pub tick_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

impl SchedulerConfig {
    /// Set the tick interval. A zero interval falls back to the default.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = if interval.is_zero() {
            DEFAULT_TICK_INTERVAL
        } else {
            interval
        };
        self
    }
}
