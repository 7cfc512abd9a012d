//! Pool statistics types

use serde::{Deserialize, Serialize};

/// Snapshot of a pool's current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolStats {
    /// Live connections, including ones being opened
    pub total: usize,
    /// Connections available for checkout
    pub idle: usize,
    /// Connections currently leased out
    pub active: usize,
    /// Checkout requests queued for a connection
    pub waiting: usize,
    /// Live connections above `max_size`
    pub overflow: usize,
}

impl PoolStats {
    /// Fraction of live connections currently leased (0.0 to 1.0)
    ///
    /// Returns 0.0 for an empty pool.
    pub fn utilization(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.active as f64 / self.total as f64
        }
    }

    /// Check if every live connection is leased out
    pub fn is_full(&self) -> bool {
        self.idle == 0 && self.total > 0
    }
}
