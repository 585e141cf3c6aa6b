//! Retry policy for graph nodes.
//!
//! The reference schedule retries a node three times with a fixed five
//! minute delay.

use crate::errors::StarflowError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of re-attempts after the first failure.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default delay between attempts (five minutes).
pub const DEFAULT_RETRY_DELAY_MS: u64 = 5 * 60 * 1000;

/// How often and how long to wait before re-running a failed node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Re-attempts after the first failure. `0` disables retries.
    pub retries: u32,
    /// Delay between attempts in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// No more retries, give up.
    GiveUp,
    /// Don't retry, the error is not retryable.
    NotRetryable,
}

impl RetryPolicy {
    /// Creates the default policy (3 retries, 5 minutes apart).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self::default().with_retries(0)
    }

    /// Sets the number of retries.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the delay between attempts.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Returns the delay between attempts.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Decides what to do after attempt number `attempt` (1-based) failed
    /// with `error`.
    #[must_use]
    pub fn decide(&self, error: &StarflowError, attempt: u32) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::NotRetryable;
        }
        if attempt > self.retries {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry(self.retry_delay())
    }

    /// Total attempts a node may make, including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{QualityCheckFailure, WarehouseError};
    use crate::warehouse::ScalarValue;

    fn transient() -> StarflowError {
        WarehouseError::new("connection reset").into()
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retries, 3);
        assert_eq!(policy.retry_delay(), Duration::from_secs(300));
        assert_eq!(policy.max_attempts(), 4);
    }

    #[test]
    fn test_decide_retries_then_gives_up() {
        let policy = RetryPolicy::new().with_retries(2);

        assert_eq!(policy.decide(&transient(), 1), RetryDecision::Retry(Duration::from_secs(300)));
        assert_eq!(policy.decide(&transient(), 2), RetryDecision::Retry(Duration::from_secs(300)));
        assert_eq!(policy.decide(&transient(), 3), RetryDecision::GiveUp);
    }

    #[test]
    fn test_quality_and_config_errors_are_not_retried() {
        let policy = RetryPolicy::new();
        let quality = StarflowError::from(QualityCheckFailure {
            index: 0,
            query: "SELECT COUNT(*) FROM songs WHERE song_id IS NULL".to_string(),
            expected: ScalarValue::Int(0),
            actual: Some(ScalarValue::Int(2)),
        });

        assert_eq!(policy.decide(&quality, 1), RetryDecision::NotRetryable);
        assert_eq!(policy.decide(&StarflowError::config("bad"), 1), RetryDecision::NotRetryable);
    }

    #[test]
    fn test_none_policy() {
        assert_eq!(RetryPolicy::none().decide(&transient(), 1), RetryDecision::GiveUp);
    }

    #[test]
    fn test_delay_is_fixed_across_attempts() {
        let policy = RetryPolicy::new()
            .with_retries(5)
            .with_retry_delay(Duration::from_millis(250));

        for attempt in 1..=5 {
            assert_eq!(policy.decide(&transient(), attempt), RetryDecision::Retry(Duration::from_millis(250)));
        }
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let parsed = serde_json::from_str::<RetryPolicy>(r#"{"retries": 1, "backoff": "exponential"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"retries": 1}"#).unwrap();
        assert_eq!(policy.retries, 1);
        assert_eq!(policy.retry_delay_ms, DEFAULT_RETRY_DELAY_MS);
    }
}
