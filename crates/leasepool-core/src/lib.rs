//! leasepool core - collaborator traits and shared types
//!
//! This crate defines what the pool needs from the outside world and what it
//! hands back to callers:
//!
//! - `Connection` - a database session the pool leases out
//! - `ConnectionFactory` - opens, closes and health-checks connections
//! - `ConnectionConfig` - opaque driver arguments passed to the factory
//! - `PoolError` - the error taxonomy shared by every leasepool crate

mod config;
mod connection;
mod error;
mod types;

pub use config::*;
pub use connection::*;
pub use error::*;
pub use types::*;
