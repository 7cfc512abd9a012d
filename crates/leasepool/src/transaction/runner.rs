//! Scoped and transactional execution on pooled connections

use futures::future::BoxFuture;
use leasepool_core::{Connection, PoolError, Result, TransactionStage, Value};

use super::policy::{Retries, TransactionPolicy};
use super::work::{Work, check_arity};
use crate::pool::{Lease, Pool};

/// Check out a connection, run `f` on it and check it back in
///
/// No transaction is opened; use this for single statements or when `f`
/// manages its own transaction. `f`'s result or error is returned once the
/// connection is back in the pool.
#[tracing::instrument(skip(pool, f), fields(pool = %pool.name()))]
pub async fn run_scoped<T, F>(pool: &Pool, f: F) -> Result<T>
where
    F: for<'a> FnOnce(&'a dyn Connection) -> BoxFuture<'a, Result<T>>,
{
    let lease = pool.checkout().await?;
    let result = f(&*lease).await;
    pool.checkin(lease).await?;
    result
}

/// Run `work` in a transaction, retrying conflicts without limit
///
/// Equivalent to [`run_transaction_with_retries`] with `Retries::Unbounded`.
pub async fn run_transaction<W: Work>(pool: &Pool, work: &W, args: &[Value]) -> Result<W::Output> {
    run_transaction_with_policy(pool, work, args, TransactionPolicy::new(Retries::Unbounded)).await
}

/// Run `work` in a transaction, re-running it at most `retries` more times
/// when the database reports a conflict
pub async fn run_transaction_with_retries<W: Work>(
    pool: &Pool,
    work: &W,
    args: &[Value],
    retries: Retries,
) -> Result<W::Output> {
    run_transaction_with_policy(pool, work, args, TransactionPolicy::new(retries)).await
}

/// Run `work` in a transaction under an explicit retry policy
///
/// - The arity of `work` is checked before anything is checked out.
/// - On success the transaction is committed and the value returned.
/// - On `PoolError::TransactionConflict` the transaction is rolled back and
///   `work` runs again while the policy allows; once it does not, the last
///   conflict is returned.
/// - Any other error from `work` is returned unchanged after rollback.
/// - Failures of `begin`/`commit` itself surface as
///   `PoolError::TransactionFailed`.
///
/// The connection is checked in exactly once, whichever way this returns.
#[tracing::instrument(skip(pool, work, args, policy), fields(pool = %pool.name(), args = args.len()))]
pub async fn run_transaction_with_policy<W: Work>(
    pool: &Pool,
    work: &W,
    args: &[Value],
    policy: TransactionPolicy,
) -> Result<W::Output> {
    check_arity(work, args)?;

    let mut lease = pool.checkout().await?;
    let outcome = run_attempts(&mut lease, work, args, &policy).await;
    pool.checkin(lease).await?;
    outcome
}

async fn run_attempts<W: Work>(
    lease: &mut Lease,
    work: &W,
    args: &[Value],
    policy: &TransactionPolicy,
) -> Result<W::Output> {
    let mut retries_done: u32 = 0;
    loop {
        match run_once(lease, work, args).await {
            Ok(value) => {
                if retries_done > 0 {
                    tracing::debug!(retries = retries_done, "transaction committed after retry");
                }
                return Ok(value);
            }
            Err(e)
                if e.is_retryable()
                    && !lease.is_invalidated()
                    && policy.retries().allows(retries_done) =>
            {
                tracing::debug!(attempt = retries_done + 1, error = %e, "transaction conflict, retrying");
                if let Some(delay) = policy.delay(retries_done) {
                    tokio::time::sleep(delay).await;
                }
                retries_done += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(retries = retries_done, error = %e, "transaction retries exhausted");
                }
                return Err(e);
            }
        }
    }
}

async fn run_once<W: Work>(lease: &mut Lease, work: &W, args: &[Value]) -> Result<W::Output> {
    lease
        .begin()
        .await
        .map_err(|e| terminal(e, TransactionStage::Begin))?;

    let value = match work.call(&**lease, args).await {
        Ok(value) => value,
        Err(e) => {
            rollback(lease).await;
            return Err(e);
        }
    };

    if let Err(e) = lease.commit().await {
        rollback(lease).await;
        return Err(terminal(e, TransactionStage::Commit));
    }
    Ok(value)
}

/// Conflicts stay retryable; anything else from begin/commit is terminal
fn terminal(e: PoolError, stage: TransactionStage) -> PoolError {
    if e.is_retryable() {
        e
    } else {
        PoolError::TransactionFailed {
            stage,
            message: e.to_string(),
        }
    }
}

async fn rollback(lease: &mut Lease) {
    if let Err(e) = lease.rollback().await {
        tracing::warn!(error = %e, "rollback failed, connection will be discarded");
        lease.invalidate();
    }
}
