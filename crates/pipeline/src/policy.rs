//! Retry policy engine (exponential backoff, bounded attempt count).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff with a fixed retry budget.
///
/// `next_delay(n) = initial_interval * multiplier^(n - 1)`, where `n` is the
/// number of attempts made so far. The first attempt is not a retry, so a record
/// sees at most `max_retries + 1` attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_retries: u32,
    /// Optional ceiling for a single delay.
    pub max_interval: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(10),
            multiplier: 3.0,
            max_retries: 2,
            max_interval: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(initial_interval: Duration, multiplier: f64, max_retries: u32) -> Self {
        Self {
            initial_interval,
            multiplier,
            max_retries,
            max_interval: None,
        }
    }

    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }

    /// Delay to wait after attempt `attempt` (1-indexed) failed.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = attempt - 1;
        let delay = if self.multiplier >= 0.0
            && self.multiplier <= u32::MAX as f64
            && self.multiplier.fract() == 0.0
        {
            // Integral multipliers stay exact.
            (self.multiplier as u32)
                .checked_pow(exponent)
                .and_then(|factor| self.initial_interval.checked_mul(factor))
                .unwrap_or(Duration::MAX)
        } else {
            let factor = self.multiplier.max(0.0).powi(exponent.min(i32::MAX as u32) as i32);
            let nanos = self.initial_interval.as_nanos() as f64 * factor;
            if nanos.is_finite() && nanos < u64::MAX as f64 {
                Duration::from_nanos(nanos as u64)
            } else {
                Duration::MAX
            }
        };

        match self.max_interval {
            Some(ceiling) => delay.min(ceiling),
            None => delay,
        }
    }

    /// Whether another attempt is allowed after `attempt` attempts failed.
    pub fn has_retries_left(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }

    /// Upper bound on attempts per record (first attempt + retries).
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_schedule() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.next_delay(1), Duration::from_secs(10));
        assert_eq!(policy.next_delay(2), Duration::from_secs(30));
        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn retries_left_boundary() {
        let policy = RetryPolicy::default();

        assert!(policy.has_retries_left(1));
        assert!(policy.has_retries_left(2));
        assert!(!policy.has_retries_left(3));
        assert!(!policy.has_retries_left(4));
    }

    #[test]
    fn no_retry_policy_exhausts_after_first_attempt() {
        assert!(!RetryPolicy::no_retry().has_retries_left(1));
    }

    #[test]
    fn max_interval_caps_delay() {
        let policy = RetryPolicy::default().with_max_interval(Duration::from_secs(20));

        assert_eq!(policy.next_delay(1), Duration::from_secs(10));
        assert_eq!(policy.next_delay(2), Duration::from_secs(20));
        assert_eq!(policy.next_delay(9), Duration::from_secs(20));
    }

    #[test]
    fn fractional_multiplier() {
        let policy = RetryPolicy::new(Duration::from_millis(100), 1.5, 5);

        assert_eq!(policy.next_delay(1), Duration::from_millis(100));
        assert_eq!(policy.next_delay(2), Duration::from_millis(150));
        assert_eq!(policy.next_delay(3), Duration::from_millis(225));
    }

    #[test]
    fn multiplier_beyond_u32_range_is_not_truncated() {
        let policy = RetryPolicy::new(Duration::from_millis(1), 5e9, 2);

        assert_eq!(policy.next_delay(1), Duration::from_millis(1));
        assert_eq!(policy.next_delay(2), Duration::from_secs(5_000_000));
    }

    #[test]
    fn huge_attempts_saturate() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(200), Duration::MAX);
    }

    proptest! {
        #[test]
        fn delay_follows_geometric_formula(
            initial_ms in 1u64..60_000,
            multiplier in 1u32..5,
            max_retries in 1u32..6,
        ) {
            let policy = RetryPolicy::new(
                Duration::from_millis(initial_ms),
                multiplier as f64,
                max_retries,
            );

            for n in 1..=max_retries {
                let expected = Duration::from_millis(initial_ms) * multiplier.pow(n - 1);
                prop_assert_eq!(policy.next_delay(n), expected);
            }
        }

        #[test]
        fn retries_left_iff_within_budget(max_retries in 0u32..10, attempt in 1u32..20) {
            let policy = RetryPolicy { max_retries, ..Default::default() };
            prop_assert_eq!(policy.has_retries_left(attempt), attempt <= max_retries);
        }
    }
}
