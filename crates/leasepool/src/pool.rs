//! Connection pooling
//!
//! A [`Pool`] owns a bounded set of connections and leases them out one
//! caller at a time. Idle connections are handed out in the configured
//! [`ReuseDiscipline`] order; callers that arrive while the pool is at
//! capacity queue up and are served strictly in arrival order.
//!
//! # Example
//!
//! ```ignore
//! use leasepool::pool::{Pool, PoolConfig};
//!
//! let config = PoolConfig::new(2, 10).with_overflow(5);
//! let pool = Pool::start("reports", config, factory, connection_config).await?;
//!
//! let lease = pool.checkout().await?;
//! lease.execute("UPDATE jobs SET state = 'done'", &[]).await?;
//! pool.checkin(lease).await?;
//! ```

mod config;
mod lease;
mod pool;
mod stats;


pub use config::{PoolConfig, ReuseDiscipline};
pub use lease::Lease;
pub use pool::Pool;
pub use stats::PoolStats;
