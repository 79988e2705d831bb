//! Exponential backoff with full jitter.
//!
//! One policy serves both retry sites: delivery attempts (base 500 ms,
//! cap 10 s) and pull failures (base 1 s, cap 30 s). Full jitter draws the
//! actual delay uniformly from `0..=min(base * 2^(attempt-1), cap)`, which
//! spreads retries out instead of synchronizing them.

use std::time::Duration;

use rand::Rng;

/// An exponential backoff policy with an upper cap.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
}

impl BackoffPolicy {
    /// Create a policy from a base delay and a cap.
    pub const fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Policy for delivery retries: base 500 ms, cap 10 s.
    pub const fn delivery() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(10))
    }

    /// Policy for pull failures: base 1 s, cap 30 s.
    pub const fn pull() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }

    /// The capped exponential ceiling for a 1-based attempt number.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        // Clamp the exponent so the shift cannot overflow.
        let exponent = attempt.saturating_sub(1).min(20);
        let raw_ms = (self.base.as_millis() as u64).saturating_mul(1u64 << exponent);
        Duration::from_millis(raw_ms).min(self.cap)
    }

    /// A jittered delay for a 1-based attempt number.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling_ms = self.ceiling(attempt).as_millis() as u64;
        if ceiling_ms == 0 {
            return Duration::ZERO;
        }
        let jittered = rand::thread_rng().gen_range(0..=ceiling_ms);
        Duration::from_millis(jittered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_doubles_until_cap() {
        let policy = BackoffPolicy::new(Duration::from_millis(500), Duration::from_secs(10));
        assert_eq!(policy.ceiling(1), Duration::from_millis(500));
        assert_eq!(policy.ceiling(2), Duration::from_millis(1000));
        assert_eq!(policy.ceiling(3), Duration::from_millis(2000));
        assert_eq!(policy.ceiling(6), Duration::from_secs(10));
        assert_eq!(policy.ceiling(60), Duration::from_secs(10));
    }

    #[test]
    fn delay_never_exceeds_ceiling() {
        let policy = BackoffPolicy::pull();
        for attempt in 1..10 {
            let ceiling = policy.ceiling(attempt);
            for _ in 0..50 {
                assert!(policy.delay(attempt) <= ceiling);
            }
        }
    }

    #[test]
    fn zero_base_yields_zero_delay() {
        let policy = BackoffPolicy::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.delay(1), Duration::ZERO);
        assert_eq!(policy.delay(7), Duration::ZERO);
    }
}
