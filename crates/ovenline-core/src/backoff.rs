//! Backoff policy shared by startup connect and steady-state reconnect.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with a hard cap and a little jitter.
///
/// `delay_for(n) = min(base_delay * multiplier^(n-1), max_delay)`, then
/// scaled by a random factor in `[0.9, 1.1)`. The cap keeps steady-state
/// reconnect attempts bounded; the jitter keeps a fleet of workers from
/// hammering a recovering broker in lockstep.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier,
            max_delay,
        }
    }

    /// Delay before the given attempt (1-indexed: the delay after the first
    /// failure is `delay_for(1)`).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());
        let jitter = rand::thread_rng().gen_range(0.9..1.1);
        Duration::from_secs_f64(capped * jitter)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_ms(base: u64, max: u64) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(base),
            2.0,
            Duration::from_millis(max),
        )
    }

    fn assert_within_jitter(actual: Duration, nominal_ms: u64) {
        let lo = Duration::from_secs_f64(nominal_ms as f64 / 1000.0 * 0.9);
        let hi = Duration::from_secs_f64(nominal_ms as f64 / 1000.0 * 1.1);
        assert!(
            actual >= lo && actual <= hi,
            "expected ~{nominal_ms}ms, got {actual:?}"
        );
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = policy_ms(100, 60_000);
        assert_within_jitter(policy.delay_for(1), 100);
        assert_within_jitter(policy.delay_for(2), 200);
        assert_within_jitter(policy.delay_for(3), 400);
    }

    #[test]
    fn delay_is_capped() {
        let policy = policy_ms(100, 500);
        assert_within_jitter(policy.delay_for(10), 500);
        // Large attempt counts must not overflow into nonsense.
        assert_within_jitter(policy.delay_for(10_000), 500);
    }

    #[test]
    fn attempt_zero_uses_base_delay() {
        let policy = policy_ms(100, 500);
        assert_within_jitter(policy.delay_for(0), 100);
    }
}
