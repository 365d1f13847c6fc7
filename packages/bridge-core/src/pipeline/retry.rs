//! Retry policy for per-Transfer failures (§4.1). The minimum contract
//! is a flat delay; this implementation uses exponential-capped backoff,
//! the same mechanism the adapter-submission retry clock (§10.1) uses
//! at a different granularity.

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: i32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay_ms: u64) -> Self {
        Self {
            max_retries: max_retries as i32,
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_secs(3_600),
            multiplier: 2.0,
        }
    }

    pub fn delay_for_attempt(&self, attempt: i32) -> Duration {
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt.max(0));
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }

    pub fn next_retry_at(&self, attempt: i32, now: DateTime<Utc>) -> DateTime<Utc> {
        let delay = self.delay_for_attempt(attempt);
        now + ChronoDuration::from_std(delay).unwrap_or(ChronoDuration::seconds(60))
    }

    /// Once `retry_count >= max_retries`, stop attempting (§4.1).
    pub fn should_retry(&self, retry_count: i32) -> bool {
        retry_count < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let policy = RetryPolicy::new(5, 1_000);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
    }

    #[test]
    fn should_retry_respects_max() {
        let policy = RetryPolicy::new(3, 1_000);
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }
}
