//! Connect retry schedule
//!
//! Linear backoff, capped: attempt `n` waits `n * step` up to `max_delay`.
//! Past `max_attempts` the schedule says stop.

use std::time::Duration;

/// Retry/backoff policy for establishing a backend connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of connect attempts, including the first one
    pub max_attempts: u32,
    /// Delay added per failed attempt
    pub step: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            step: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// Returns `None` once `attempt` reaches `max_attempts`: no further
    /// attempt should be made.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        Some(self.step.saturating_mul(attempt).min(self.max_delay))
    }
}
