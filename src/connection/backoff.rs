//! Exponential reconnect backoff with full jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectConfig;

/// Reconnect delay policy.
///
/// The delay for attempt `n` is drawn uniformly from `[0, ceiling(n)]` and
/// then floored at the base delay, so it always lies in
/// `[base, min(base * 2^n, max)]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// Upper bound of the draw for `attempt`: `min(base * 2^attempt, max)`.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }

    pub fn delay_with<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let ceiling_ms = self.ceiling(attempt).as_millis() as u64;
        let drawn = Duration::from_millis(rng.gen_range(0..=ceiling_ms));
        drawn.max(self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn backoff() -> Backoff {
        Backoff::from_config(&ReconnectConfig::default())
    }

    #[test]
    fn test_ceiling_doubles_then_caps() {
        let backoff = backoff();
        assert_eq!(backoff.ceiling(0), Duration::from_millis(1000));
        assert_eq!(backoff.ceiling(3), Duration::from_millis(8000));
        assert_eq!(backoff.ceiling(5), Duration::from_millis(30_000));
        assert_eq!(backoff.ceiling(64), Duration::from_millis(30_000));
    }

    #[test]
    fn test_draws_stay_within_bounds() {
        let backoff = backoff();
        let mut rng = StdRng::seed_from_u64(7);
        for i in 0..1000u32 {
            let attempt = i % 25;
            let delay = backoff.delay_with(attempt, &mut rng);
            assert!(delay >= Duration::from_millis(1000), "attempt {} drew {:?}", attempt, delay);
            assert!(delay <= backoff.ceiling(attempt), "attempt {} drew {:?}", attempt, delay);
            assert!(delay <= Duration::from_millis(30_000));
        }
    }

    #[test]
    fn test_draws_are_jittered() {
        let backoff = backoff();
        let mut rng = StdRng::seed_from_u64(11);
        let draws: Vec<_> = (0..50).map(|_| backoff.delay_with(6, &mut rng)).collect();
        assert!(draws.iter().any(|d| *d != draws[0]));
    }

    #[test]
    fn test_attempt_zero_is_base() {
        let backoff = backoff();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            assert_eq!(backoff.delay_with(0, &mut rng), Duration::from_millis(1000));
        }
    }
}
