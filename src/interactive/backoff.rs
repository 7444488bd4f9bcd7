//! Poll interval backoff.

use std::time::Duration;

/// Default delay between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Ceiling for the delay between polls
pub const MAX_POLL_INTERVAL: Duration = Duration::from_millis(2000);

const BACKOFF_FACTOR: f64 = 1.2;

/// Delay between polls of an idle command.
///
/// Each empty poll returns the current delay and then grows it by 20%
/// (rounded, at least 1 ms), up to the ceiling. A poll that produced output
/// resets the delay to the base.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
    current_ms: u64,
}

impl Backoff {
    pub fn new(base: Duration) -> Self {
        let base_ms = base.as_millis() as u64;
        Self {
            base_ms,
            max_ms: (MAX_POLL_INTERVAL.as_millis() as u64).max(base_ms),
            current_ms: base_ms,
        }
    }

    /// Override the ceiling; never lower than the base interval
    pub fn with_max(mut self, max: Duration) -> Self {
        self.max_ms = (max.as_millis() as u64).max(self.base_ms);
        self
    }

    /// Delay to sleep after a poll
    pub fn next_delay(&mut self, had_output: bool) -> Duration {
        if had_output {
            self.reset();
            return Duration::from_millis(self.base_ms);
        }

        let delay = self.current_ms;
        self.current_ms = grow(self.current_ms).min(self.max_ms);
        Duration::from_millis(delay)
    }

    /// Return to the base interval
    pub fn reset(&mut self) {
        self.current_ms = self.base_ms;
    }

    /// Delay the next empty poll would return
    pub fn current(&self) -> Duration {
        Duration::from_millis(self.current_ms)
    }
}

fn grow(ms: u64) -> u64 {
    ((ms as f64 * BACKOFF_FACTOR).round() as u64).max(ms + 1)
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}
