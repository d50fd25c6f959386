//! Retry policy: bounded exponential backoff for transient failures
//!
//! Only transient failures are retried. A failure is transient when the
//! transport never produced a response (timeout, refused connection) or
//! the backend answered 5xx. Any 4xx is a verdict on the request itself
//! and is never retried.

use std::time::Duration;

/// Bounded exponential backoff schedule.
///
/// Delay before retry `attempt` (0-based) is `base * 2^attempt`, capped
/// at `cap`. With the defaults the schedule is 1s, 2s, 4s and would stay
/// at 8s if the retry bound allowed further attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base: Duration::from_secs(1),
            cap: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before the retry with the given 0-based attempt index.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u128.checked_shl(attempt).unwrap_or(u128::MAX);
        let millis = (self.base.as_millis().saturating_mul(factor)).min(self.cap.as_millis());
        Duration::from_millis(millis as u64)
    }

    /// Whether another retry is allowed after `attempt` retries already made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Whether a transport error (no response received) is worth retrying.
pub fn is_transient_transport(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// Whether an HTTP status is a retryable server failure.
pub fn is_transient_status(status: u16) -> bool {
    (500..=599).contains(&status)
}
