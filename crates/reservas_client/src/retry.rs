//! Backoff policy for transient transport failures.
//!
//! Only idempotent listing calls are retried, and only when the failure is a
//! transport error; a non-success HTTP status is an answer from the service
//! and is surfaced as-is. Signin and reservation calls are never retried.

use rand::Rng;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): exponential in the
    /// attempt with full jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let cap = self.base_delay * (1u32 << attempt.min(10));
        let jitter = rand::rng().random_range(0..(cap.as_millis() as u64).max(1));
        Duration::from_millis(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_stays_under_the_exponential_cap() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        };
        for attempt in 1..=3 {
            let cap = Duration::from_millis(100) * (1u32 << attempt);
            for _ in 0..50 {
                assert!(policy.backoff(attempt) < cap);
            }
        }
    }

    #[test]
    fn backoff_handles_zero_base_delay() {
        let policy = RetryPolicy {
            max_retries: 1,
            base_delay: Duration::ZERO,
        };
        assert_eq!(policy.backoff(1), Duration::ZERO);
    }

    #[test]
    fn large_attempt_does_not_overflow_the_shift() {
        let policy = RetryPolicy::default();
        let _ = policy.backoff(u32::MAX);
    }
}
