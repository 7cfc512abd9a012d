//! Pool configuration types

use std::time::Duration;

use leasepool_core::{PoolError, Result};
use serde::{Deserialize, Serialize};

/// Which idle connection a checkout receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReuseDiscipline {
    /// Least-recently-used first, so every connection keeps cycling through
    /// use and none sits idle long enough for the server to drop it
    #[default]
    Fifo,
    /// Most-recently-used first, keeping a hot subset busy
    Lifo,
}

/// Configuration for a connection pool
///
/// Controls pool sizing, overflow, reuse ordering and the default checkout wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Connections opened at start and kept open after failures
    min_size: usize,
    /// Connections kept open once created
    max_size: usize,
    /// Extra transient connections allowed beyond `max_size` under load
    overflow: usize,
    /// Idle connection selection order
    reuse: ReuseDiscipline,
    /// Bound on how long `checkout` waits; `None` waits indefinitely
    checkout_timeout_ms: Option<u64>,
}

impl PoolConfig {
    /// Create a new pool configuration with the given min and max sizes
    pub fn new(min_size: usize, max_size: usize) -> Self {
        Self {
            min_size,
            max_size,
            overflow: 0,
            reuse: ReuseDiscipline::Fifo,
            checkout_timeout_ms: None,
        }
    }

    /// Set the number of overflow connections
    pub fn with_overflow(mut self, overflow: usize) -> Self {
        self.overflow = overflow;
        self
    }

    /// Set the reuse discipline
    pub fn with_reuse(mut self, reuse: ReuseDiscipline) -> Self {
        self.reuse = reuse;
        self
    }

    /// Bound checkout waits to `timeout_ms` milliseconds
    pub fn with_checkout_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.checkout_timeout_ms = Some(timeout_ms);
        self
    }

    /// Check sizing constraints
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(PoolError::Configuration(
                "max_size must be greater than 0".into(),
            ));
        }
        if self.min_size > self.max_size {
            return Err(PoolError::Configuration(format!(
                "min_size ({}) cannot exceed max_size ({})",
                self.min_size, self.max_size
            )));
        }
        Ok(())
    }

    /// Get the minimum pool size
    pub fn min_size(&self) -> usize {
        self.min_size
    }

    /// Get the maximum pool size
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Get the overflow allowance
    pub fn overflow(&self) -> usize {
        self.overflow
    }

    /// Upper bound on live connections: `max_size + overflow`
    pub fn capacity(&self) -> usize {
        self.max_size.saturating_add(self.overflow)
    }

    /// Get the reuse discipline
    pub fn reuse(&self) -> ReuseDiscipline {
        self.reuse
    }

    /// Get the checkout timeout as a Duration if set
    pub fn checkout_timeout(&self) -> Option<Duration> {
        self.checkout_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for PoolConfig {
    /// min 1, max 10, no overflow, FIFO, unbounded checkout wait
    fn default() -> Self {
        Self::new(1, 10)
    }
}
