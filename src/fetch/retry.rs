//! Retry/backoff policy (spec.md §4.1): exponential backoff with full
//! jitter, default 3 attempts, 10s base, 120s cap.
//!
//! The delay computation is a pure function of `(attempt, base, cap)` plus
//! an injected random sample in `[0, 1)`, so it's unit-testable without
//! real sleeps or a real RNG.

use crate::config::LoaderConfig;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, base: Duration, cap: Duration) -> Self {
        Self {
            max_attempts,
            base,
            cap,
        }
    }

    /// Builds the fetch retry policy from the loader's own config (spec.md
    /// §4.1 defaults: 3 attempts, 10s base, 120s cap), rather than leaving
    /// `LoaderConfig`'s fetch knobs unread.
    #[must_use]
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(config.fetch_retry_attempts, config.backoff_base(), config.backoff_cap())
    }

    /// Full-jitter backoff delay before the given retry attempt (1-indexed:
    /// the delay before the *second* overall try is `backoff_delay(1, ..)`).
    /// `jitter` must be in `[0.0, 1.0)`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32, jitter: f64) -> Duration {
        let exp = self.base.as_secs_f64() * 2f64.powi(attempt.saturating_sub(1) as i32);
        let capped = exp.min(self.cap.as_secs_f64());
        Duration::from_secs_f64(capped * jitter.clamp(0.0, 1.0))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(10), Duration::from_secs(120))
    }
}

/// Sample a jitter fraction in `[0.0, 1.0)` using the process RNG.
#[must_use]
pub fn random_jitter() -> f64 {
    use rand::Rng;
    rand::rng().random_range(0.0..1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_until_capped() {
        let policy = RetryPolicy::new(5, Duration::from_secs(10), Duration::from_secs(120));
        assert_eq!(policy.backoff_delay(1, 1.0), Duration::from_secs(10));
        assert_eq!(policy.backoff_delay(2, 1.0), Duration::from_secs(20));
        assert_eq!(policy.backoff_delay(3, 1.0), Duration::from_secs(40));
        assert_eq!(policy.backoff_delay(4, 1.0), Duration::from_secs(80));
        // would be 160s uncapped; capped to 120s
        assert_eq!(policy.backoff_delay(5, 1.0), Duration::from_secs(120));
    }

    #[test]
    fn zero_jitter_yields_zero_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(1, 0.0), Duration::ZERO);
    }
}
