//! Exponential backoff between transaction conflict retries
//!
//! Conflicting transactions that retry immediately tend to collide again;
//! spacing retries out (with optional jitter) lets one of them win.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Exponential backoff strategy for conflict retries.
///
/// # Example
///
/// ```
/// use leasepool::transaction::BackoffStrategy;
/// use std::time::Duration;
///
/// let backoff = BackoffStrategy::new(10, 1_000);
///
/// assert_eq!(backoff.calculate_delay(0), Duration::from_millis(10));
/// assert_eq!(backoff.calculate_delay(1), Duration::from_millis(20));
/// assert!(backoff.calculate_delay(20) <= Duration::from_millis(1_000));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffStrategy {
    /// Delay before the first retry, in milliseconds
    initial_ms: u64,
    /// Cap for exponential growth, in milliseconds
    max_ms: u64,
    /// Growth factor per attempt
    multiplier: f64,
    /// Randomise each delay by up to ±25%
    jitter: bool,
}

impl BackoffStrategy {
    /// Create a strategy growing from `initial_ms` up to `max_ms`
    pub fn new(initial_ms: u64, max_ms: u64) -> Self {
        let initial_ms = initial_ms.max(1);
        Self {
            initial_ms,
            max_ms: max_ms.max(initial_ms),
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// Set the multiplier for exponential growth (at least 1.0)
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Enable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt` (0 = first retry)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = (self.initial_ms as f64) * self.multiplier.powi(exponent);
        let capped_ms = delay_ms.min(self.max_ms as f64) as u64;

        let final_ms = if self.jitter {
            let jitter_range = capped_ms / 4;
            let offset = rand::thread_rng().gen_range(0..=jitter_range * 2);
            capped_ms
                .saturating_sub(jitter_range)
                .saturating_add(offset)
        } else {
            capped_ms
        };

        Duration::from_millis(final_ms)
    }

    /// Get the initial delay
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    /// Get the maximum delay
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

impl Default for BackoffStrategy {
    /// 10ms initial, 1 second max, 2x multiplier, no jitter
    fn default() -> Self {
        Self::new(10, 1_000)
    }
}
