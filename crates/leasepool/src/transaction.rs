//! Transactional execution on pooled connections
//!
//! [`run_transaction`] checks a connection out, wraps caller work in
//! begin/commit, rolls back and re-runs the work when the database reports a
//! conflict, and always checks the connection back in. [`run_scoped`] is the
//! same lease discipline without the transaction.
//!
//! # Example
//!
//! ```ignore
//! use leasepool::transaction::{Retries, WorkFn, run_transaction_with_retries};
//!
//! let bump = WorkFn::new(2, |conn, args| {
//!     Box::pin(async move {
//!         conn.execute("UPDATE counters SET n = n + 1 WHERE id = $1", args).await
//!     })
//! });
//! run_transaction_with_retries(&pool, &bump, &[Value::from(1i64)], Retries::Limited(3)).await?;
//! ```

mod backoff;
mod policy;
mod runner;
mod work;


pub use backoff::BackoffStrategy;
pub use policy::{Retries, TransactionPolicy};
pub use runner::{
    run_scoped, run_transaction, run_transaction_with_policy, run_transaction_with_retries,
};
pub use work::{Work, WorkFn};
