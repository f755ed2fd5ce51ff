//! Bounded retry policy
//!
//! Shared by the module invoker and the HTTP probe. A policy is an attempt
//! budget plus the delay to wait after each failed attempt.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Growth of the delay between attempts
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Backoff {
    /// Same delay after every attempt
    Fixed,
    /// Delay multiplied after every attempt, capped at `max_interval_secs`
    Exponential {
        multiplier: u32,
        max_interval_secs: u64,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed
    }
}

/// Attempt budget and inter-attempt delay
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub interval: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
            backoff: Backoff::Fixed,
        }
    }

    /// Single attempt, no waiting
    #[cfg(test)]
    pub fn none() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential {
                multiplier,
                max_interval_secs,
            } => {
                let factor = multiplier
                    .max(1)
                    .saturating_pow(attempt.saturating_sub(1));
                let cap = Duration::from_secs(max_interval_secs);
                self.interval.saturating_mul(factor).min(cap)
            }
        }
    }

    /// Whether another attempt is allowed after `attempt` attempts
    pub fn allows_another(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Upper bound on total time spent sleeping between attempts
    pub fn worst_case_wait(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| self.delay_after(attempt))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::fixed(10, Duration::from_secs(10));
        assert_eq!(policy.delay_after(1), Duration::from_secs(10));
        assert_eq!(policy.delay_after(9), Duration::from_secs(10));
        assert_eq!(policy.worst_case_wait(), Duration::from_secs(90));
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy::fixed(6, Duration::from_secs(1)).with_backoff(
            Backoff::Exponential {
                multiplier: 2,
                max_interval_secs: 5,
            },
        );
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
        assert_eq!(policy.delay_after(4), Duration::from_secs(5));
    }

    #[test]
    fn test_attempt_budget() {
        let policy = RetryPolicy::fixed(3, Duration::ZERO);
        assert!(policy.allows_another(2));
        assert!(!policy.allows_another(3));

        let single = RetryPolicy::none();
        assert!(!single.allows_another(1));
        assert_eq!(RetryPolicy::fixed(0, Duration::ZERO).max_attempts, 1);
    }
}
