//! Execution engine configuration.

use std::time::Duration;

/// Timeout applied when a job sets none.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-stream capture cap, in characters.
pub const DEFAULT_CAPTURE_LIMIT: usize = 100_000;

/// How long a killed process gets to be reaped before the engine gives up on it.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(200);

/// How long output readers may keep draining after the process exited.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Execution engine configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Timeout for jobs without `timeout_seconds`.
    pub default_timeout: Duration,
    /// Maximum characters kept per captured stream.
    pub capture_limit: usize,
    /// Grace period after a forced kill.
    pub kill_grace: Duration,
    /// Grace period for draining output after a normal exit.
    pub drain_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            capture_limit: DEFAULT_CAPTURE_LIMIT,
            kill_grace: DEFAULT_KILL_GRACE,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

impl RunnerConfig {
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_capture_limit(mut self, limit: usize) -> Self {
        self.capture_limit = limit;
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }
}

/// Shell and flag used to run command lines.
pub(crate) fn shell() -> (&'static str, &'static str) {
    if cfg!(target_os = "windows") {
        ("cmd", "/C")
    } else {
        ("sh", "-c")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.default_timeout, Duration::from_secs(60));
        assert_eq!(config.capture_limit, 100_000);
        assert_eq!(config.kill_grace, Duration::from_millis(200));
    }

    #[test]
    fn test_builder() {
        let config = RunnerConfig::default()
            .with_default_timeout(Duration::from_secs(5))
            .with_capture_limit(10)
            .with_kill_grace(Duration::from_millis(50));
        assert_eq!(config.default_timeout, Duration::from_secs(5));
        assert_eq!(config.capture_limit, 10);
        assert_eq!(config.kill_grace, Duration::from_millis(50));
    }
}
