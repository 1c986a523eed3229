//! Reconnect policy with bounded exponential back-off.

use std::time::Duration;

/// Controls how the client reconnects after an involuntary connection loss.
///
/// The delay for attempt `n` is `min(base_delay × multiplier^n, max_delay)`.
/// The attempt counter resets every time a connection reaches ready, so a
/// long-lived connection that later drops restarts from `base_delay`.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt.
    pub base_delay: Duration,
    /// Growth factor applied per consecutive failure.
    pub multiplier: f64,
    /// Cap on the delay between attempts.
    pub max_delay: Duration,
    /// Consecutive failures before giving up. `0` means retry forever.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            multiplier: 1.5,
            max_delay: Duration::from_millis(30_000),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay for the given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let delay_ms = base_ms * self.multiplier.powi(attempt as i32);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// Whether the given consecutive-failure count exhausts the policy.
    pub fn should_give_up(&self, failures: u32) -> bool {
        self.max_attempts > 0 && failures >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_values() {
        let p = ReconnectPolicy::default();
        assert_eq!(p.base_delay, Duration::from_millis(1000));
        assert_eq!(p.max_delay, Duration::from_millis(30_000));
        assert_eq!(p.multiplier, 1.5);
        assert_eq!(p.max_attempts, 5);
    }

    #[test]
    fn delay_follows_formula() {
        let p = ReconnectPolicy::default();
        assert_eq!(p.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(p.delay_for_attempt(1), Duration::from_millis(1500));
        assert_eq!(p.delay_for_attempt(2), Duration::from_millis(2250));
        assert_eq!(p.delay_for_attempt(3), Duration::from_millis(3375));
    }

    #[test]
    fn delay_capped_at_max() {
        let p = ReconnectPolicy::default();
        // 1000 × 1.5^10 ≈ 57665 ms, well past the cap.
        assert_eq!(p.delay_for_attempt(10), Duration::from_millis(30_000));
        assert_eq!(p.delay_for_attempt(100), Duration::from_millis(30_000));
    }

    #[test]
    fn should_give_up_when_limited() {
        let p = ReconnectPolicy::default();
        assert!(!p.should_give_up(4));
        assert!(p.should_give_up(5));
        assert!(p.should_give_up(6));
    }

    #[test]
    fn unlimited_never_gives_up() {
        let p = ReconnectPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(!p.should_give_up(1_000_000));
    }
}
