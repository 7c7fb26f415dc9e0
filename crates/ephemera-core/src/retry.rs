//! Cleanup retry and backoff policy

use chrono::{DateTime, Local};
use ephemera_config::EnvironmentRecord;
use ephemera_util::{checked_add, saturating_since};
use std::time::Duration;

/// Bounded, linearly backed-off cleanup retries.
///
/// After `n` recorded attempts the next one is due once `n * backoff_step`
/// has passed since the last attempt, and never after `max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_secs(5 * 60),
        }
    }
}

impl RetryPolicy {
    /// Minimum wait after `attempts` recorded attempts
    pub fn backoff_for(&self, attempts: u32) -> Duration {
        self.backoff_step.saturating_mul(attempts)
    }

    pub fn is_exhausted(&self, record: &EnvironmentRecord) -> bool {
        record.cleanup_attempts >= self.max_attempts
    }

    pub fn should_retry(&self, record: &EnvironmentRecord, now: DateTime<Local>) -> bool {
        if !record.is_expired(now) {
            return false;
        }
        if self.is_exhausted(record) {
            return false;
        }

        match &record.last_cleanup_attempt {
            Some(last) => saturating_since(&now, last) >= self.backoff_for(record.cleanup_attempts),
            None => true,
        }
    }

    /// When the next retry becomes due, if one is still possible.
    ///
    /// `None` for inactive records, for records with no attempt yet (the
    /// first attempt is not a retry), and once the budget is spent.
    pub fn next_retry_at(&self, record: &EnvironmentRecord) -> Option<DateTime<Local>> {
        if !record.is_active() || record.cleanup_attempts == 0 || self.is_exhausted(record) {
            return None;
        }
        let last = record.last_cleanup_attempt?;
        checked_add(&last, self.backoff_for(record.cleanup_attempts))
    }
}
