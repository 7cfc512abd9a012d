//! Named pools
//!
//! A [`PoolRegistry`] maps [`PoolId`]s to running pools. Every pool in a
//! registry opens connections through the registry's factory; callers only
//! choose sizing and reuse through [`PoolSettings`]. Pools can also be
//! declared in a TOML file and registered with
//! [`PoolRegistry::add_pools_from_config`].

mod config;
mod id;
mod registry;
mod settings;


pub use config::{PoolEntry, RegistryConfig};
pub use id::{PoolId, Scope};
pub use registry::PoolRegistry;
pub use settings::PoolSettings;
