// Fleetsim - Industrial sensor telemetry simulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Retry schedules
//!
//! A [`RetryStrategy`] only computes delays; the caller owns the loop so it can log
//! and sleep on its own runtime.

use std::time::Duration;

/// Retry strategy for operations
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RetryStrategy {
    /// No retries
    #[default]
    None,
    /// Exponential backoff
    ExponentialBackoff {
        /// Maximum number of retry attempts
        max_retries: u32,
        /// Initial delay
        initial_delay: Duration,
        /// Maximum delay
        max_delay: Duration,
        /// Multiplier for each attempt
        multiplier: f64,
    },
}

impl RetryStrategy {
    /// Delay to wait after failed attempt `attempt` (0-indexed)
    ///
    /// Returns None once the retry budget is spent.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::ExponentialBackoff {
                max_retries,
                initial_delay,
                max_delay,
                multiplier,
            } => {
                if attempt < *max_retries {
                    let delay_ms =
                        initial_delay.as_millis() as f64 * multiplier.powi(attempt as i32);
                    let delay = Duration::from_millis(delay_ms as u64);
                    Some(delay.min(*max_delay))
                } else {
                    None
                }
            }
        }
    }

    /// Get maximum number of retries
    pub fn max_retries(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::ExponentialBackoff { max_retries, .. } => *max_retries,
        }
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries() + 1
    }

    /// Create an exponential backoff strategy (multiplier 2)
    pub fn exponential(max_retries: u32, initial_delay: Duration) -> Self {
        Self::ExponentialBackoff {
            max_retries,
            initial_delay,
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_strategy_none() {
        let strategy = RetryStrategy::None;
        assert_eq!(strategy.delay_for_attempt(0), None);
        assert_eq!(strategy.max_retries(), 0);
        assert_eq!(strategy.max_attempts(), 1);
    }

    #[test]
    fn test_exponential_backoff_powers_of_two() {
        // Sink connect schedule: 3 attempts, sleeping 2^attempt seconds between them
        let strategy = RetryStrategy::exponential(2, Duration::from_secs(1));

        assert_eq!(strategy.delay_for_attempt(0), Some(Duration::from_secs(1)));
        assert_eq!(strategy.delay_for_attempt(1), Some(Duration::from_secs(2)));
        assert_eq!(strategy.delay_for_attempt(2), None);
        assert_eq!(strategy.max_attempts(), 3);
    }

    #[test]
    fn test_exponential_backoff_max_delay() {
        let strategy = RetryStrategy::ExponentialBackoff {
            max_retries: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
        };

        assert_eq!(
            strategy.delay_for_attempt(2),
            Some(Duration::from_millis(400))
        );
        assert_eq!(
            strategy.delay_for_attempt(3),
            Some(Duration::from_millis(500))
        );
        assert_eq!(
            strategy.delay_for_attempt(9),
            Some(Duration::from_millis(500))
        );
    }
}
