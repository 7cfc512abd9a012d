//! Collaborator traits: the database connection and the factory that opens it

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::{ConnectionConfig, PoolError, QueryResult, Result, StatementResult, Value};

/// A database connection
///
/// Implemented by driver crates; the pool only moves connections around and
/// never looks inside them.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "sqlite", "postgresql", "mysql")
    fn driver_name(&self) -> &str;

    /// Execute a statement that modifies data (INSERT/UPDATE/DELETE)
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a query that returns rows (SELECT)
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Execute a statement, failing with `PoolError::Timeout` after `timeout`
    async fn execute_with_timeout(
        &self,
        sql: &str,
        params: &[Value],
        timeout: Duration,
    ) -> Result<StatementResult> {
        tokio::time::timeout(timeout, self.execute(sql, params))
            .await
            .map_err(|_| PoolError::Timeout(format!("execute exceeded {:?}", timeout)))?
    }

    /// Run a query, failing with `PoolError::Timeout` after `timeout`
    async fn query_with_timeout(
        &self,
        sql: &str,
        params: &[Value],
        timeout: Duration,
    ) -> Result<QueryResult> {
        tokio::time::timeout(timeout, self.query(sql, params))
            .await
            .map_err(|_| PoolError::Timeout(format!("query exceeded {:?}", timeout)))?
    }

    /// Begin a transaction
    async fn begin(&self) -> Result<()>;

    /// Commit the current transaction
    ///
    /// Drivers report serialization failures as `PoolError::TransactionConflict`.
    async fn commit(&self) -> Result<()>;

    /// Roll back the current transaction
    async fn rollback(&self) -> Result<()>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}

/// Opens, closes and health-checks connections on behalf of a pool
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Open a new connection
    async fn open(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>>;

    /// Close a connection the pool is discarding
    async fn close(&self, conn: Arc<dyn Connection>) -> Result<()> {
        conn.close().await
    }

    /// Whether a returned connection may be handed out again
    ///
    /// Must not block; it runs while the pool is deciding where a connection goes.
    fn is_alive(&self, conn: &dyn Connection) -> bool {
        !conn.is_closed()
    }
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn open(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        (**self).open(config).await
    }

    async fn close(&self, conn: Arc<dyn Connection>) -> Result<()> {
        (**self).close(conn).await
    }

    fn is_alive(&self, conn: &dyn Connection) -> bool {
        (**self).is_alive(conn)
    }
}
