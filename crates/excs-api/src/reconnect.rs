//! Exponential backoff for reconnect attempts.

use std::time::Duration;

/// Exponential backoff configuration for reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 2s.
    pub min_delay: Duration,

    /// Upper bound on backoff delay. Default: 60s.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Backoff state: `delay = min(min_delay * 2^failures, max_delay)`.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    current: Duration,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        let current = config.min_delay.min(config.max_delay);
        Self { config, current }
    }

    /// Delay to wait before the next attempt.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Return the delay for this attempt and double it for the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self
            .current
            .checked_mul(2)
            .unwrap_or(self.config.max_delay)
            .min(self.config.max_delay);
        delay
    }

    /// Back to the minimum delay, after a successful connect.
    pub fn reset(&mut self) {
        self.current = self.config.min_delay.min(self.config.max_delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.min_delay, Duration::from_secs(2));
        assert_eq!(config.max_delay, Duration::from_secs(60));
    }

    #[test]
    fn backoff_doubles_per_failure() {
        let mut backoff = Backoff::new(ReconnectConfig::default());
        let delays: Vec<u64> = (0..4).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16]);
    }

    #[test]
    fn backoff_never_exceeds_max_delay() {
        let config = ReconnectConfig {
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        };
        let mut backoff = Backoff::new(config);
        for _ in 0..100 {
            assert!(backoff.next_delay() <= Duration::from_secs(10));
        }
        assert_eq!(backoff.current(), Duration::from_secs(10));
    }

    #[test]
    fn reset_returns_to_minimum() {
        let mut backoff = Backoff::new(ReconnectConfig::default());
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn min_above_max_is_clamped() {
        let config = ReconnectConfig {
            min_delay: Duration::from_secs(90),
            max_delay: Duration::from_secs(60),
        };
        let mut backoff = Backoff::new(config);
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
    }
}
