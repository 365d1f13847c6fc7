//! Sliding-window rate limiting, mirrored between an in-memory map (for
//! speed) and the Store (so a restart preserves cooldowns, §5).

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::types::{Direction, RateLimitBucket};

pub struct RateLimiter {
    window: ChronoDuration,
    max_count: i32,
    cooldown: ChronoDuration,
    buckets: HashMap<(String, Direction), RateLimitBucket>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Blocked,
}

impl RateLimiter {
    pub fn new(window_ms: i64, max_count: i32, cooldown_ms: i64) -> Self {
        Self {
            window: ChronoDuration::milliseconds(window_ms),
            max_count,
            cooldown: ChronoDuration::milliseconds(cooldown_ms),
            buckets: HashMap::new(),
        }
    }

    pub fn load_bucket(&mut self, bucket: RateLimitBucket) {
        self.buckets
            .insert((bucket.principal.clone(), bucket.direction), bucket);
    }

    /// Checks and records one admission attempt, returning the updated
    /// bucket for mirroring to the Store (§5).
    pub fn check(&mut self, principal: &str, direction: Direction, now: DateTime<Utc>) -> (Admission, RateLimitBucket) {
        let key = (principal.to_lowercase(), direction);
        let bucket = self.buckets.entry(key.clone()).or_insert_with(|| RateLimitBucket {
            principal: principal.to_lowercase(),
            direction,
            count: 0,
            window_start: now,
            blocked_until: None,
        });

        if let Some(blocked_until) = bucket.blocked_until {
            if now < blocked_until {
                return (Admission::Blocked, bucket.clone());
            }
            // Cooldown elapsed: the next admission with count=0 succeeds (§8 property 6).
            bucket.count = 0;
            bucket.window_start = now;
            bucket.blocked_until = None;
        }

        if now - bucket.window_start >= self.window {
            bucket.count = 0;
            bucket.window_start = now;
        }

        bucket.count += 1;

        if bucket.count >= self.max_count {
            bucket.blocked_until = Some(now + self.cooldown);
            return (Admission::Blocked, bucket.clone());
        }

        (Admission::Allow, bucket.clone())
    }

    /// Removes buckets idle longer than the window with zero activity
    /// (§4.2 "buckets older than W with zero activity are garbage-collected").
    pub fn gc(&mut self, now: DateTime<Utc>) -> Vec<(String, Direction)> {
        let mut removed = Vec::new();
        self.buckets.retain(|key, bucket| {
            let stale = now - bucket.window_start >= self.window && bucket.count == 0;
            if stale {
                removed.push(key.clone());
            }
            !stale
        });
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn allows_under_the_limit() {
        let mut limiter = RateLimiter::new(3_600_000, 3, 900_000);
        let t = now();
        assert_eq!(limiter.check("0xabc", Direction::Deposit, t).0, Admission::Allow);
        assert_eq!(limiter.check("0xabc", Direction::Deposit, t).0, Admission::Allow);
    }

    #[test]
    fn blocks_once_the_count_reaches_max() {
        let mut limiter = RateLimiter::new(3_600_000, 2, 900_000);
        let t = now();
        assert_eq!(limiter.check("0xabc", Direction::Deposit, t).0, Admission::Allow);
        assert_eq!(limiter.check("0xabc", Direction::Deposit, t).0, Admission::Blocked);
        assert_eq!(limiter.check("0xabc", Direction::Deposit, t).0, Admission::Blocked);
    }

    #[test]
    fn next_admission_after_cooldown_succeeds_with_count_reset() {
        let mut limiter = RateLimiter::new(3_600_000, 1, 1_000);
        let t = now();
        assert_eq!(limiter.check("0xabc", Direction::Deposit, t).0, Admission::Blocked);

        let after_cooldown = t + ChronoDuration::milliseconds(1_001);
        let (admission, bucket) = limiter.check("0xabc", Direction::Deposit, after_cooldown);
        assert_eq!(admission, Admission::Allow);
        assert_eq!(bucket.count, 1);
    }

    #[test]
    fn different_principals_have_independent_buckets() {
        let mut limiter = RateLimiter::new(3_600_000, 1, 900_000);
        let t = now();
        assert_eq!(limiter.check("0xaaa", Direction::Deposit, t).0, Admission::Blocked);
        assert_eq!(limiter.check("0xbbb", Direction::Deposit, t).0, Admission::Blocked);
    }

    #[test]
    fn gc_removes_only_stale_zero_activity_buckets() {
        let mut limiter = RateLimiter::new(1_000, 5, 900_000);
        let t = now();
        limiter.check("0xabc", Direction::Deposit, t);
        let later = t + ChronoDuration::milliseconds(2_000);
        // window rolled over with activity -> count reset to 1, not stale.
        limiter.check("0xabc", Direction::Deposit, later);
        let removed = limiter.gc(later);
        assert!(removed.is_empty());
    }
}
