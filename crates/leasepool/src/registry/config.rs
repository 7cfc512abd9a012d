//! File-based registry configuration
//!
//! ```toml
//! [[pools]]
//! scope = "global"
//! name = "orders"
//! min_size = 2
//! max_size = 8
//! reuse = "lifo"
//!
//! [pools.connection]
//! driver = "postgres"
//! host = "localhost"
//! database = "orders"
//! ```

use std::path::Path;

use leasepool_core::{ConnectionConfig, PoolError, Result};
use serde::{Deserialize, Serialize};

use super::{PoolId, PoolSettings, Scope};

/// One `[[pools]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolEntry {
    #[serde(default)]
    pub scope: Scope,
    pub name: String,
    #[serde(flatten)]
    pub settings: PoolSettings,
    pub connection: ConnectionConfig,
}

impl PoolEntry {
    pub fn id(&self) -> PoolId {
        PoolId::new(self.scope, self.name.clone())
    }
}

/// Pools to register at startup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub pools: Vec<PoolEntry>,
}

impl RegistryConfig {
    /// Read and parse a TOML file
    #[tracing::instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(PoolError::Io)?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(pools = config.pools.len(), "registry config loaded");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| PoolError::Configuration(format!("Invalid registry config: {}", e)))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PoolError::Configuration(format!("Cannot serialize registry config: {}", e)))
    }
}
