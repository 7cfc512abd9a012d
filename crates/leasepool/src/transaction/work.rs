//! Caller-supplied units of work run against a leased connection

use std::marker::PhantomData;

use futures::future::BoxFuture;
use leasepool_core::{Connection, PoolError, Result, Value};

/// Work run by the transaction runner
///
/// The connection is always the first parameter; `arity` counts it, so work
/// called with `n` arguments must report an arity of `n + 1`.
pub trait Work: Send + Sync {
    type Output: Send;

    /// Number of parameters, including the leading connection
    fn arity(&self) -> usize;

    fn call<'a>(
        &'a self,
        conn: &'a dyn Connection,
        args: &'a [Value],
    ) -> BoxFuture<'a, Result<Self::Output>>;
}

/// [`Work`] built from a closure and a declared arity
///
/// ```ignore
/// let transfer = WorkFn::new(3, |conn, args| {
///     Box::pin(async move {
///         conn.execute("UPDATE accounts SET balance = balance - $2 WHERE id = $1", args).await?;
///         Ok(())
///     })
/// });
/// run_transaction(&pool, &transfer, &[Value::from(7i64), Value::from(100i64)]).await?;
/// ```
pub struct WorkFn<F, T> {
    arity: usize,
    f: F,
    _output: PhantomData<fn() -> T>,
}

impl<F, T> WorkFn<F, T> {
    pub fn new(arity: usize, f: F) -> Self
    where
        F: for<'a> Fn(&'a dyn Connection, &'a [Value]) -> BoxFuture<'a, Result<T>> + Send + Sync,
        T: Send,
    {
        Self {
            arity,
            f,
            _output: PhantomData,
        }
    }
}

impl<F, T> Work for WorkFn<F, T>
where
    F: for<'a> Fn(&'a dyn Connection, &'a [Value]) -> BoxFuture<'a, Result<T>> + Send + Sync,
    T: Send,
{
    type Output = T;

    fn arity(&self) -> usize {
        self.arity
    }

    fn call<'a>(&'a self, conn: &'a dyn Connection, args: &'a [Value]) -> BoxFuture<'a, Result<T>> {
        (self.f)(conn, args)
    }
}

/// Fail with `PoolError::Arity` unless `work` takes the connection plus `args`
pub(crate) fn check_arity<W: Work + ?Sized>(work: &W, args: &[Value]) -> Result<()> {
    let got = args.len() + 1;
    if work.arity() != got {
        return Err(PoolError::Arity {
            expected: work.arity(),
            got,
        });
    }
    Ok(())
}
