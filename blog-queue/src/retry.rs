//! Retry policy: failure classification, retry ceiling and backoff.
//!
//! The delay before retry `n` (1-based) is `base * multiplier^(n-1)`,
//! computed with saturating integer arithmetic. With the defaults this gives
//! 60s, 300s and 1500s for the three retries a job is allowed.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{ErrorClass, JobError};

/// Retry ceiling shared by every job that does not override it
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_delay_secs: u64,
    multiplier: u64,
    max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_secs: 60,
            multiplier: 5,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    pub fn new(base_delay_secs: u64, multiplier: u64, max_retries: u32) -> Self {
        Self {
            base_delay_secs,
            multiplier,
            max_retries,
        }
    }

    /// Policy with no delay between attempts
    pub fn immediate(max_retries: u32) -> Self {
        Self::new(0, 1, max_retries)
    }

    pub fn classify(&self, error: &JobError) -> ErrorClass {
        error.class()
    }

    pub fn should_retry(&self, error: &JobError) -> bool {
        self.classify(error) == ErrorClass::Transient
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn base_delay_secs(&self) -> u64 {
        self.base_delay_secs
    }

    pub fn multiplier(&self) -> u64 {
        self.multiplier
    }

    /// Delay before retry number `attempt` (1-based). Attempt 0 is treated as 1.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        let factor = self.multiplier.saturating_pow(exponent);
        Duration::from_secs(self.base_delay_secs.saturating_mul(factor))
    }

    /// Decide what happens after execution number `attempt` failed.
    ///
    /// Returns the time the job becomes due again, or `None` when the job
    /// must be failed permanently. `ceiling` is the job's own retry limit.
    pub fn next_retry_at(
        &self,
        error: &JobError,
        attempt: u32,
        ceiling: u32,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if !self.should_retry(error) || attempt > ceiling {
            return None;
        }
        let retry_at = chrono::Duration::from_std(self.retry_delay(attempt))
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Some(retry_at)
    }
}
