//! Rebind backoff
//!
//! Tracks consecutive socket lifecycle failures for the outer receive loop.
//! The delay doubles with every failure and the loop gives up once the cap
//! is reached. Any successful receive resets the count.

use std::time::Duration;

/// Default backoff base (first retry delay)
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(333);

/// Default cap on consecutive failures
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Largest doubling applied to the base delay
const MAX_EXPONENT: u32 = 16;

/// Consecutive-failure counter with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryState {
    failures: u32,
    base: Duration,
    max_retries: u32,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_BASE, DEFAULT_MAX_RETRIES)
    }
}

impl RetryState {
    pub fn new(base: Duration, max_retries: u32) -> Self {
        Self {
            failures: 0,
            base,
            max_retries,
        }
    }

    /// Consecutive failures since the last reset
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failure
    ///
    /// Returns the delay to wait before the next attempt, or `None` once
    /// the failure cap has been reached.
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);

        if self.failures >= self.max_retries {
            return None;
        }

        Some(self.delay_for(self.failures))
    }

    /// Forget previous failures
    #[inline]
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_EXPONENT);
        self.base.saturating_mul(1 << exponent)
    }
}
