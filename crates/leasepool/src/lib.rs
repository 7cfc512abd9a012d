//! leasepool - bounded database connection pools with transactional helpers
//!
//! - [`pool`] - a bounded pool handing out exclusive leases, FIFO or LIFO
//!   reuse, overflow connections and strictly ordered waiters
//! - [`transaction`] - scoped checkout and begin/commit/rollback with
//!   conflict retries
//! - [`registry`] - pools registered under scoped names, optionally from a
//!   TOML file
//! - [`logging`] - `tracing-subscriber` setup for host applications
//!
//! Connections come from a caller-supplied [`ConnectionFactory`]; see
//! `leasepool-core` for the collaborator traits.

pub mod logging;
pub mod pool;
pub mod registry;
pub mod transaction;

pub use leasepool_core::{
    Connection, ConnectionConfig, ConnectionFactory, PoolError, QueryResult, Result, Row,
    StatementResult, TransactionStage, Value,
};
pub use pool::{Lease, Pool, PoolConfig, PoolStats, ReuseDiscipline};
pub use registry::{PoolEntry, PoolId, PoolRegistry, PoolSettings, RegistryConfig, Scope};
pub use transaction::{
    BackoffStrategy, Retries, TransactionPolicy, Work, WorkFn, run_scoped, run_transaction,
    run_transaction_with_policy, run_transaction_with_retries,
};
