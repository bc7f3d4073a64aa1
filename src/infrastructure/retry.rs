//! Shared retry/backoff policy.
//!
//! One abstraction for the three I/O boundaries (page fetch, image fetch,
//! batch delivery): exponential backoff with jitter, capped. Components keep
//! their own retry loops (they classify errors differently) but the backoff
//! math lives here.

use std::time::Duration;

/// Exponential backoff parameters for one I/O boundary.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = max_retries + 1).
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Cap applied after jitter.
    pub max_delay: Duration,
    /// Uniform jitter added per attempt, `0..jitter`.
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration, jitter: Duration) -> Self {
        Self { max_retries, base_delay, max_delay, jitter }
    }

    /// Policy from millisecond tunables, the shape the config carries.
    pub fn from_millis(max_retries: u32, base_ms: u64, cap_ms: u64, jitter_ms: u64) -> Self {
        Self::new(
            max_retries,
            Duration::from_millis(base_ms),
            Duration::from_millis(cap_ms),
            Duration::from_millis(jitter_ms),
        )
    }

    /// Whether another attempt is allowed after `attempt` (0-based) failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Backoff before retrying 0-based `attempt`: `base * 2^attempt + jitter`,
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exp = base_ms.saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 { 0 } else { fastrand::u64(0..jitter_ms) };
        Duration::from_millis(exp.saturating_add(jitter).min(self.max_delay.as_millis() as u64))
    }

    /// Upper bound on the cumulative wait across all retries. Useful for
    /// asserting timeout budgets.
    pub fn max_total_delay(&self) -> Duration {
        self.max_delay * self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        // No jitter so delays are exact.
        RetryPolicy::from_millis(5, 1_000, 12_000, 0)
    }

    #[test]
    fn delays_double_until_cap() {
        let p = policy();
        assert_eq!(p.delay_for(0), Duration::from_millis(1_000));
        assert_eq!(p.delay_for(1), Duration::from_millis(2_000));
        assert_eq!(p.delay_for(2), Duration::from_millis(4_000));
        assert_eq!(p.delay_for(3), Duration::from_millis(8_000));
        // 16s exceeds the cap.
        assert_eq!(p.delay_for(4), Duration::from_millis(12_000));
        assert_eq!(p.delay_for(10), Duration::from_millis(12_000));
    }

    #[test]
    fn jitter_stays_within_bound() {
        let p = RetryPolicy::from_millis(3, 100, 12_000, 500);
        for attempt in 0..3 {
            for _ in 0..50 {
                let d = p.delay_for(attempt);
                let floor = Duration::from_millis(100 << attempt);
                assert!(d >= floor);
                assert!(d < floor + Duration::from_millis(500));
            }
        }
    }

    #[test]
    fn huge_attempt_does_not_overflow() {
        let p = policy();
        assert_eq!(p.delay_for(63), Duration::from_millis(12_000));
        assert_eq!(p.delay_for(64), Duration::from_millis(12_000));
    }

    #[test]
    fn retry_budget_is_respected() {
        let p = policy();
        assert!(p.should_retry(0));
        assert!(p.should_retry(4));
        assert!(!p.should_retry(5));
    }

    #[test]
    fn cumulative_wait_is_bounded() {
        let p = policy();
        let total: Duration = (0..p.max_retries).map(|a| p.delay_for(a)).sum();
        assert!(total <= p.max_total_delay());
    }
}
