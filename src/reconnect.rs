//! Reconnection policy for the realtime client.
//!
//! A single strategy value decides how long to wait before the next connect
//! attempt and when to give up: fixed or bounded-exponential delay, with an
//! optional cap on consecutive failed attempts.

use std::time::Duration;

/// Delay used when nothing else is configured.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1500);

/// How the delay evolves between consecutive attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay every time.
    Fixed(Duration),
    /// Doubles from `initial` after every failed attempt, clamped at `max`.
    Exponential {
        /// Delay before the first retry.
        initial: Duration,
        /// Ceiling for the delay.
        max: Duration,
    },
}

/// When and whether to reconnect after a connection is lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    backoff: Backoff,
    max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectPolicy {
    /// Retry forever with a constant delay.
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self {
            backoff: Backoff::Fixed(delay),
            max_attempts: None,
        }
    }

    /// Retry forever with doubling delay, clamped at `max`.
    #[must_use]
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            backoff: Backoff::Exponential {
                initial,
                max: max.max(initial),
            },
            max_attempts: None,
        }
    }

    /// Give up after `attempts` consecutive reconnects without a successful open.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// The backoff strategy.
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// The attempt cap, if any.
    #[must_use]
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Delay before reconnect number `attempt` (1-based).
    ///
    /// Returns `None` when the cap has been reached and the client should stop.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            return Some(Duration::ZERO);
        }
        if self.max_attempts.is_some_and(|max| attempt > max) {
            return None;
        }
        Some(match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let shift = (attempt - 1).min(31);
                initial.saturating_mul(1u32 << shift).min(max)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_fixed_and_uncapped() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.backoff(), Backoff::Fixed(DEFAULT_RECONNECT_DELAY));
        assert_eq!(policy.max_attempts(), None);
        assert_eq!(policy.delay_for(1), Some(DEFAULT_RECONNECT_DELAY));
        assert_eq!(policy.delay_for(10_000), Some(DEFAULT_RECONNECT_DELAY));
    }

    #[test]
    fn test_fixed_with_cap() {
        let policy = ReconnectPolicy::fixed(Duration::from_secs(3)).with_max_attempts(5);
        assert_eq!(policy.delay_for(5), Some(Duration::from_secs(3)));
        assert_eq!(policy.delay_for(6), None);
    }

    #[test]
    fn test_exponential_doubles_and_clamps() {
        let policy =
            ReconnectPolicy::exponential(Duration::from_secs(1), Duration::from_secs(10));
        let delays: Vec<u64> = (1..=6)
            .filter_map(|n| policy.delay_for(n))
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn test_exponential_huge_attempt_does_not_overflow() {
        let policy =
            ReconnectPolicy::exponential(Duration::from_millis(500), Duration::from_secs(60));
        assert_eq!(policy.delay_for(u32::MAX), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_exponential_max_below_initial_is_raised() {
        let policy =
            ReconnectPolicy::exponential(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Some(Duration::from_secs(5)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_zero_cap_never_retries() {
        let policy = ReconnectPolicy::default().with_max_attempts(0);
        assert_eq!(policy.delay_for(1), None);
    }
}
