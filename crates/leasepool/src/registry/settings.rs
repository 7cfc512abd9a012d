use serde::{Deserialize, Serialize};

use crate::pool::{PoolConfig, ReuseDiscipline};

/// Partial pool configuration supplied when registering a pool
///
/// Unset fields fall back to [`PoolConfig::default`]; in particular an unset
/// reuse discipline means FIFO. Settings carry no factory: every
/// pool in a registry opens connections through the registry's factory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overflow: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reuse: Option<ReuseDiscipline>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_timeout_ms: Option<u64>,
}

impl PoolSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(mut self, min_size: usize, max_size: usize) -> Self {
        self.min_size = Some(min_size);
        self.max_size = Some(max_size);
        self
    }

    pub fn with_overflow(mut self, overflow: usize) -> Self {
        self.overflow = Some(overflow);
        self
    }

    pub fn with_reuse(mut self, reuse: ReuseDiscipline) -> Self {
        self.reuse = Some(reuse);
        self
    }

    pub fn with_checkout_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.checkout_timeout_ms = Some(timeout_ms);
        self
    }

    /// Fill in defaults and produce a full pool configuration
    pub fn merge(&self) -> PoolConfig {
        let defaults = PoolConfig::default();
        let mut config = PoolConfig::new(
            self.min_size.unwrap_or(defaults.min_size()),
            self.max_size.unwrap_or(defaults.max_size()),
        )
        .with_overflow(self.overflow.unwrap_or(defaults.overflow()))
        .with_reuse(self.reuse.unwrap_or_default());
        if let Some(timeout_ms) = self.checkout_timeout_ms {
            config = config.with_checkout_timeout_ms(timeout_ms);
        }
        config
    }
}

impl From<PoolConfig> for PoolSettings {
    fn from(config: PoolConfig) -> Self {
        Self {
            min_size: Some(config.min_size()),
            max_size: Some(config.max_size()),
            overflow: Some(config.overflow()),
            reuse: Some(config.reuse()),
            checkout_timeout_ms: config
                .checkout_timeout()
                .map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}
