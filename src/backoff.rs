//! Retry pacing for failed forks.
//!
//! The delay after `n` consecutive failures is `FIRST × 2^(n-1)`, clamped to
//! `MAX`. A successful fork resets the counter.
use std::time::{Duration, Instant};

/// Delay after the first failure.
pub const FIRST: Duration = Duration::from_secs(1);
/// Upper bound on the delay between attempts.
pub const MAX: Duration = Duration::from_secs(30);
/// Consecutive failures after which a one-shot batch stops retrying.
pub const ONE_SHOT_ATTEMPTS: u32 = 5;

#[derive(Debug, Default, Clone)]
pub struct SpawnBackoff {
    failures: u32,
    retry_at: Option<Instant>,
}

impl SpawnBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consecutive failures since the last successful fork.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Whether a fork may be attempted at `now`.
    pub fn ready(&self, now: Instant) -> bool {
        self.retry_at.is_none_or(|at| now >= at)
    }

    /// Records a failed fork and returns the delay before the next attempt.
    pub fn record_failure(&mut self, now: Instant) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let delay = Self::delay_for(self.failures);
        self.retry_at = Some(now + delay);
        delay
    }

    pub fn reset(&mut self) {
        self.failures = 0;
        self.retry_at = None;
    }

    /// Whether `limit` consecutive failures have been reached.
    pub fn exhausted(&self, limit: u32) -> bool {
        self.failures >= limit
    }

    fn delay_for(failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        FIRST.saturating_mul(1 << exponent).min(MAX)
    }
}
