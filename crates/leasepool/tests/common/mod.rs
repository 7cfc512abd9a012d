//! Shared fixtures for the integration tests: an in-memory connection
//! factory whose behaviour the tests can steer.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use async_trait::async_trait;
use leasepool::{
    Connection, ConnectionConfig, ConnectionFactory, PoolError, QueryResult, Result,
    StatementResult, Value,
};
use parking_lot::Mutex;

static TRACING: Once = Once::new();

/// Route pool logs through the test writer; filter with `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// State shared between a [`MemoryFactory`] and every connection it opened
#[derive(Default)]
pub struct MemoryState {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub refuse: AtomicBool,
    /// Commits to fail with a conflict before commits succeed again
    pub commit_conflicts: AtomicUsize,
    pub begins: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub statements: Mutex<Vec<String>>,
}

pub struct MemoryConnection {
    serial: usize,
    state: Arc<MemoryState>,
    closed: AtomicBool,
}

#[async_trait]
impl Connection for MemoryConnection {
    fn driver_name(&self) -> &str {
        "memory"
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        if self.is_closed() {
            return Err(PoolError::Connection("connection is closed".into()));
        }
        self.state.statements.lock().push(sql.to_string());
        Ok(StatementResult::affected(params.len() as u64))
    }

    async fn query(&self, sql: &str, _params: &[Value]) -> Result<QueryResult> {
        if self.is_closed() {
            return Err(PoolError::Connection("connection is closed".into()));
        }
        self.state.statements.lock().push(sql.to_string());
        Ok(QueryResult::from_rows(
            vec!["serial".into()],
            vec![vec![Value::from(self.serial as i64)]],
        ))
    }

    async fn begin(&self) -> Result<()> {
        self.state.begins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        let pending = self.state.commit_conflicts.load(Ordering::SeqCst);
        if pending > 0 {
            self.state
                .commit_conflicts
                .store(pending - 1, Ordering::SeqCst);
            return Err(PoolError::TransactionConflict(
                "could not serialize access due to concurrent update".into(),
            ));
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Factory for [`MemoryConnection`]s
#[derive(Default)]
pub struct MemoryFactory {
    pub state: Arc<MemoryState>,
}

impl MemoryFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.state.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectionFactory for MemoryFactory {
    async fn open(&self, _config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        if self.state.refuse.load(Ordering::SeqCst) {
            return Err(PoolError::Connection("connection refused".into()));
        }
        let serial = self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryConnection {
            serial,
            state: self.state.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&self, conn: Arc<dyn Connection>) -> Result<()> {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        conn.close().await
    }
}

pub fn memory_config() -> ConnectionConfig {
    ConnectionConfig::new("memory").with_param("database", "test")
}

/// Serial number of the connection behind `conn`
pub async fn serial_of(conn: &dyn Connection) -> anyhow::Result<i64> {
    let result = conn.query("SELECT serial", &[]).await?;
    result
        .rows
        .first()
        .and_then(|row| row.get(0))
        .and_then(Value::as_i64)
        .ok_or_else(|| anyhow::anyhow!("no serial in result"))
}
