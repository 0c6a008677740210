//! Reconnect backoff policy shared by all connectors

use std::time::{Duration, SystemTime};

/// Retry policy for connector reconnect attempts
///
/// Controls how many consecutive failures a connector tolerates and how
/// long it waits between attempts using exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum consecutive transient failures before the connector stops
    pub max_retries: u32,

    /// Maximum consecutive authentication failures before the connector stops
    pub max_auth_retries: u32,

    /// Base delay between retries (doubles each attempt)
    pub base_delay: Duration,

    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            max_auth_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Compute the delay before the next reconnect attempt.
///
/// The delay follows exponential backoff with base 2:
/// `min(base_delay * 2^attempt + jitter, max_delay)`.
///
/// Jitter is 0-25% of the computed delay, derived from `SystemTime`
/// subsecond nanos to avoid pulling in a random number generator.
#[must_use]
pub fn delay_for_attempt(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt));
    let base = base.min(policy.max_delay);

    let jitter_nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();

    // Scale to 0-25% of the base delay
    let jitter_fraction = f64::from(jitter_nanos % 250) / 1000.0;
    let jitter = base.mul_f64(jitter_fraction);

    (base + jitter).min(policy.max_delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- delay_for_attempt ----------------------------------------------------

    #[test]
    fn exponential_growth() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            ..RetryPolicy::default()
        };

        let d0 = delay_for_attempt(&policy, 0);
        let d1 = delay_for_attempt(&policy, 1);
        let d2 = delay_for_attempt(&policy, 2);

        // Each attempt's base doubles; jitter adds up to 25%, so the lower
        // bound of the next attempt should exceed the previous base
        assert!(d0 >= Duration::from_millis(100), "attempt 0: {d0:?}");
        assert!(d1 >= Duration::from_millis(200), "attempt 1: {d1:?}");
        assert!(d2 >= Duration::from_millis(400), "attempt 2: {d2:?}");
    }

    #[test]
    fn consecutive_delays_non_decreasing_up_to_cap() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            ..RetryPolicy::default()
        };

        // Compare jitter-free lower bounds: base * 2^n, capped
        let mut previous = Duration::ZERO;
        for attempt in 0..16 {
            let lower = policy
                .base_delay
                .saturating_mul(2u32.saturating_pow(attempt))
                .min(policy.max_delay);
            assert!(lower >= previous, "attempt {attempt}");
            previous = lower;
        }
    }

    #[test]
    fn delay_capped_at_max() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(15),
            ..RetryPolicy::default()
        };

        // 10s * 2^3 = 80s, should be capped at 15s
        let d = delay_for_attempt(&policy, 3);
        assert!(d <= policy.max_delay, "delay {d:?} exceeds max");
    }

    #[test]
    fn cap_never_exceeded_even_at_extreme_attempts() {
        let policy = RetryPolicy::default();
        for attempt in [10, 20, 31, 32, 100] {
            let d = delay_for_attempt(&policy, attempt);
            assert!(d <= policy.max_delay, "attempt {attempt}: {d:?}");
        }
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(60),
            ..RetryPolicy::default()
        };

        // Run multiple times; jitter should keep delay within [base, base * 1.25]
        for _ in 0..50 {
            let d = delay_for_attempt(&policy, 0);
            assert!(d >= Duration::from_millis(1000), "below base: {d:?}");
            assert!(d <= Duration::from_millis(1250), "above 125%: {d:?}");
        }
    }

    // -- Default policy -------------------------------------------------------

    #[test]
    fn default_policy_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 10);
        assert_eq!(policy.max_auth_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(60));
    }
}
