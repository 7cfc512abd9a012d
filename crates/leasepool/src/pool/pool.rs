//! Connection pool implementation

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use leasepool_core::{Connection, ConnectionConfig, ConnectionFactory, PoolError, Result};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::config::{PoolConfig, ReuseDiscipline};
use super::lease::Lease;
use super::stats::PoolStats;

/// A connection passed from the pool to a new lease holder
pub(super) struct Handoff {
    pub(super) lease_id: Uuid,
    pub(super) connection_id: Uuid,
    pub(super) connection: Arc<dyn Connection>,
}

struct IdleConnection {
    id: Uuid,
    connection: Arc<dyn Connection>,
}

/// A suspended checkout
struct Waiter {
    id: u64,
    enqueued_at: Instant,
    tx: oneshot::Sender<Result<Handoff>>,
}

/// All mutable pool state, guarded by one lock
struct PoolState {
    idle: VecDeque<IdleConnection>,
    waiters: VecDeque<Waiter>,
    /// lease id -> connection id for every connection currently out
    leased: HashMap<Uuid, Uuid>,
    /// Idle + leased + connections being opened
    live: usize,
    next_waiter_id: u64,
    closed: bool,
}

impl PoolState {
    fn new() -> Self {
        Self {
            idle: VecDeque::new(),
            waiters: VecDeque::new(),
            leased: HashMap::new(),
            live: 0,
            next_waiter_id: 0,
            closed: false,
        }
    }

    /// Hand `connection` to the longest-waiting live waiter.
    ///
    /// Gives the connection back when nobody is left waiting.
    fn dispatch(
        &mut self,
        pool: &str,
        connection_id: Uuid,
        mut connection: Arc<dyn Connection>,
    ) -> Option<Arc<dyn Connection>> {
        while let Some(waiter) = self.waiters.pop_front() {
            let lease_id = Uuid::new_v4();
            self.leased.insert(lease_id, connection_id);
            let handoff = Handoff {
                lease_id,
                connection_id,
                connection,
            };
            match waiter.tx.send(Ok(handoff)) {
                Ok(()) => {
                    tracing::debug!(
                        pool = %pool,
                        waiter = waiter.id,
                        waited_ms = u64::try_from(waiter.enqueued_at.elapsed().as_millis()).unwrap_or(u64::MAX),
                        %connection_id,
                        "connection handed to waiter"
                    );
                    return None;
                }
                Err(returned) => {
                    // Waiter gave up between queueing and now
                    self.leased.remove(&lease_id);
                    let Ok(handoff) = returned else {
                        return None;
                    };
                    connection = handoff.connection;
                }
            }
        }
        Some(connection)
    }

    fn lease(&mut self, connection_id: Uuid, connection: Arc<dyn Connection>) -> Handoff {
        let lease_id = Uuid::new_v4();
        self.leased.insert(lease_id, connection_id);
        Handoff {
            lease_id,
            connection_id,
            connection,
        }
    }
}

/// Work left over after a state change that must happen outside the lock
#[derive(Default)]
pub(super) struct Followup {
    close: Vec<Arc<dyn Connection>>,
    /// Slots reserved for replacement connections
    replenish: usize,
}

impl Followup {
    fn is_empty(&self) -> bool {
        self.close.is_empty() && self.replenish == 0
    }

    fn merge(&mut self, other: Followup) {
        self.close.extend(other.close);
        self.replenish += other.replenish;
    }
}

pub(crate) struct PoolInner {
    name: String,
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
    connection_config: ConnectionConfig,
    state: Mutex<PoolState>,
}

/// Releases a reserved live slot if the connection it was reserved for
/// never materialises (open failed, or the opening future was dropped).
struct Reservation {
    pool: Arc<PoolInner>,
    armed: bool,
}

impl Reservation {
    fn new(pool: Arc<PoolInner>) -> Self {
        Self { pool, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.armed {
            let followup = self.pool.release_slot(None);
            PoolInner::spawn_followup(&self.pool, followup);
        }
    }
}

impl PoolInner {
    pub(super) fn name(&self) -> &str {
        &self.name
    }

    /// Decide where a returned connection goes.
    ///
    /// Runs entirely under the state lock so it is safe to call from `Drop`.
    pub(super) fn release(
        &self,
        lease_id: Uuid,
        connection_id: Uuid,
        connection: Arc<dyn Connection>,
        broken: bool,
    ) -> Followup {
        let alive = !broken && self.factory.is_alive(connection.as_ref());
        let mut state = self.state.lock();

        if state.leased.remove(&lease_id).is_none() {
            tracing::error!(pool = %self.name, %lease_id, "released lease was not on record");
            return Followup {
                close: vec![connection],
                replenish: 0,
            };
        }

        if state.closed || !alive {
            if !state.closed {
                tracing::warn!(pool = %self.name, %connection_id, "discarding dead connection");
            }
            return self.release_slot_locked(&mut state, Some(connection));
        }

        self.place(&mut state, connection_id, connection)
    }

    /// Route a live connection whose slot is already counted: to the oldest
    /// waiter, else back to the idle set, else (above `max_size`) closed.
    fn place(
        &self,
        state: &mut PoolState,
        connection_id: Uuid,
        connection: Arc<dyn Connection>,
    ) -> Followup {
        let Some(connection) = state.dispatch(&self.name, connection_id, connection) else {
            return Followup::default();
        };

        if state.live > self.config.max_size() {
            state.live -= 1;
            tracing::debug!(pool = %self.name, %connection_id, "closing overflow connection");
            return Followup {
                close: vec![connection],
                replenish: 0,
            };
        }

        state.idle.push_back(IdleConnection {
            id: connection_id,
            connection,
        });
        Followup::default()
    }

    fn release_slot(&self, discarded: Option<Arc<dyn Connection>>) -> Followup {
        let mut state = self.state.lock();
        self.release_slot_locked(&mut state, discarded)
    }

    /// Give up one live slot, reserving a new one for a replacement when the
    /// pool is below `min_size` or a waiter needs a connection.
    fn release_slot_locked(
        &self,
        state: &mut PoolState,
        discarded: Option<Arc<dyn Connection>>,
    ) -> Followup {
        state.live = state.live.saturating_sub(1);
        let replenish = !state.closed
            && state.live < self.config.capacity()
            && (state.live < self.config.min_size() || !state.waiters.is_empty());
        if replenish {
            state.live += 1;
        }
        Followup {
            close: discarded.into_iter().collect(),
            replenish: usize::from(replenish),
        }
    }

    /// Place a freshly opened connection whose slot is already counted
    fn admit(&self, connection_id: Uuid, connection: Arc<dyn Connection>) -> Followup {
        let mut state = self.state.lock();
        if state.closed {
            state.live = state.live.saturating_sub(1);
            return Followup {
                close: vec![connection],
                replenish: 0,
            };
        }
        self.place(&mut state, connection_id, connection)
    }

    pub(super) async fn run_followup(self: Arc<Self>, followup: Followup) {
        for connection in followup.close {
            if let Err(e) = self.factory.close(connection).await {
                tracing::warn!(pool = %self.name, error = %e, "failed to close connection");
            }
        }
        for _ in 0..followup.replenish {
            Arc::clone(&self).replenish().await;
        }
    }

    /// Run a followup on the current runtime, or settle it synchronously
    /// when no runtime is available (pool dropped outside tokio).
    pub(super) fn spawn_followup(pool: &Arc<Self>, followup: Followup) {
        if followup.is_empty() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(Arc::clone(pool).run_followup(followup));
            }
            Err(_) => {
                if followup.replenish > 0 {
                    let mut state = pool.state.lock();
                    state.live = state.live.saturating_sub(followup.replenish);
                }
                tracing::warn!(
                    pool = %pool.name,
                    "no async runtime available; connections dropped without close"
                );
            }
        }
    }

    /// Open a connection for an already reserved slot.
    ///
    /// On failure the oldest waiter, if any, receives the error instead of
    /// waiting on a slot that will not be filled. While more waiters remain
    /// and the pool has room, the slot is reserved again and the open
    /// retried, so every failed attempt settles exactly one waiter.
    async fn replenish(self: Arc<Self>) {
        loop {
            let reservation = Reservation::new(Arc::clone(&self));
            let error = match self.factory.open(&self.connection_config).await {
                Ok(connection) => {
                    reservation.disarm();
                    let connection_id = Uuid::new_v4();
                    tracing::debug!(pool = %self.name, %connection_id, "replacement connection opened");
                    let followup = self.admit(connection_id, connection);
                    PoolInner::spawn_followup(&self, followup);
                    return;
                }
                Err(e) => {
                    reservation.disarm();
                    e
                }
            };

            tracing::warn!(pool = %self.name, error = %error, "failed to open replacement connection");
            let retry = {
                let mut state = self.state.lock();
                state.live = state.live.saturating_sub(1);
                if let Some(waiter) = state.waiters.pop_front() {
                    let _ = waiter.tx.send(Err(connection_error(error)));
                }
                let retry = !state.closed
                    && !state.waiters.is_empty()
                    && state.live < self.config.capacity();
                if retry {
                    state.live += 1;
                }
                retry
            };
            if !retry {
                return;
            }
        }
    }
}

fn connection_error(e: PoolError) -> PoolError {
    match e {
        PoolError::Connection(_) => e,
        other => PoolError::Connection(other.to_string()),
    }
}

enum CheckoutStep {
    Ready(Handoff),
    Open,
    Wait(u64, oneshot::Receiver<Result<Handoff>>),
}

/// Queue position of a suspended checkout.
///
/// Dropping it before a connection arrives removes the waiter; a connection
/// that was handed over in the meantime goes back to the pool.
struct WaitGuard {
    pool: Arc<PoolInner>,
    id: u64,
    rx: oneshot::Receiver<Result<Handoff>>,
    finished: bool,
}

impl WaitGuard {
    async fn wait(mut self) -> Result<Lease> {
        let received = (&mut self.rx).await;
        self.finished = true;
        match received {
            Ok(Ok(handoff)) => Ok(Lease::new(Arc::clone(&self.pool), handoff)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PoolError::PoolClosed(self.pool.name.clone())),
        }
    }
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.pool.state.lock().waiters.retain(|w| w.id != self.id);
        self.rx.close();
        if let Ok(Ok(handoff)) = self.rx.try_recv() {
            drop(Lease::new(Arc::clone(&self.pool), handoff));
        }
        tracing::debug!(pool = %self.pool.name, waiter = self.id, "checkout abandoned");
    }
}

/// A bounded pool of database connections handing out exclusive leases
///
/// Cloning a `Pool` yields another handle to the same pool.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Create a pool and open `min_size` connections up front
    ///
    /// Fails with `PoolError::Configuration` for invalid sizing and with
    /// `PoolError::Connection` if any initial connection cannot be opened;
    /// connections opened before the failure are closed again.
    #[tracing::instrument(skip(config, factory, connection_config), fields(min = config.min_size(), max = config.max_size()))]
    pub async fn start<F: ConnectionFactory>(
        name: &str,
        config: PoolConfig,
        factory: F,
        connection_config: ConnectionConfig,
    ) -> Result<Self> {
        Self::start_with_factory(name, config, Arc::new(factory), connection_config).await
    }

    pub(crate) async fn start_with_factory(
        name: &str,
        config: PoolConfig,
        factory: Arc<dyn ConnectionFactory>,
        connection_config: ConnectionConfig,
    ) -> Result<Self> {
        config.validate()?;
        let min_size = config.min_size();
        let pool = Self {
            inner: Arc::new(PoolInner {
                name: name.to_string(),
                config,
                factory,
                connection_config,
                state: Mutex::new(PoolState::new()),
            }),
        };

        for _ in 0..min_size {
            pool.inner.state.lock().live += 1;
            let reservation = Reservation::new(Arc::clone(&pool.inner));
            match pool.inner.factory.open(&pool.inner.connection_config).await {
                Ok(connection) => {
                    reservation.disarm();
                    pool.inner.state.lock().idle.push_back(IdleConnection {
                        id: Uuid::new_v4(),
                        connection,
                    });
                }
                Err(e) => {
                    reservation.disarm();
                    {
                        let mut state = pool.inner.state.lock();
                        state.live = state.live.saturating_sub(1);
                    }
                    tracing::error!(pool = %name, error = %e, "failed to open initial connection");
                    pool.shutdown().await;
                    return Err(connection_error(e));
                }
            }
        }

        tracing::info!(pool = %name, "pool started");
        Ok(pool)
    }

    pub(super) fn from_inner(inner: Arc<PoolInner>) -> Self {
        Self { inner }
    }

    /// Pool name (the registry id it was started under)
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Check out a connection
    ///
    /// 1. Take an idle connection, chosen by the reuse discipline
    /// 2. Otherwise open a new one if the pool is below `max_size + overflow`
    /// 3. Otherwise wait in line until a connection is checked in
    ///
    /// Waits indefinitely unless the pool was configured with a checkout
    /// timeout, in which case it fails with `PoolError::PoolExhausted`.
    #[tracing::instrument(skip(self), fields(pool = %self.inner.name))]
    pub async fn checkout(&self) -> Result<Lease> {
        match self.inner.config.checkout_timeout() {
            Some(timeout) => self.checkout_with_timeout(timeout).await,
            None => self.checkout_unbounded().await,
        }
    }

    /// Check out a connection, giving up with `PoolError::PoolExhausted`
    /// after `timeout`
    pub async fn checkout_with_timeout(&self, timeout: Duration) -> Result<Lease> {
        tokio::time::timeout(timeout, self.checkout_unbounded())
            .await
            .map_err(|_| PoolError::PoolExhausted {
                pool: self.inner.name.clone(),
                timeout,
            })?
    }

    async fn checkout_unbounded(&self) -> Result<Lease> {
        let mut followup = Followup::default();
        let mut discarded = 0;
        let step = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(PoolError::PoolClosed(self.inner.name.clone()));
            }
            let mut ready = None;
            loop {
                let next = match self.inner.config.reuse() {
                    ReuseDiscipline::Fifo => state.idle.pop_front(),
                    ReuseDiscipline::Lifo => state.idle.pop_back(),
                };
                let Some(idle) = next else { break };
                if self.inner.factory.is_alive(idle.connection.as_ref()) {
                    ready = Some(state.lease(idle.id, idle.connection));
                    break;
                }
                discarded += 1;
                followup.merge(
                    self.inner
                        .release_slot_locked(&mut state, Some(idle.connection)),
                );
            }

            let has_room = state.live < self.inner.config.capacity();
            if let Some(handoff) = ready {
                CheckoutStep::Ready(handoff)
            } else if has_room && state.waiters.is_empty() {
                state.live += 1;
                CheckoutStep::Open
            } else {
                // Queue behind earlier callers; spare room goes to the
                // head of the line through a replacement open
                if has_room {
                    state.live += 1;
                    followup.replenish += 1;
                }
                let id = state.next_waiter_id;
                state.next_waiter_id += 1;
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(Waiter {
                    id,
                    enqueued_at: Instant::now(),
                    tx,
                });
                CheckoutStep::Wait(id, rx)
            }
        };

        if discarded > 0 {
            tracing::warn!(pool = %self.inner.name, count = discarded, "discarding dead idle connections");
        }
        PoolInner::spawn_followup(&self.inner, followup);

        match step {
            CheckoutStep::Ready(handoff) => {
                tracing::debug!(connection_id = %handoff.connection_id, "reusing idle connection");
                Ok(Lease::new(Arc::clone(&self.inner), handoff))
            }
            CheckoutStep::Open => self.open_for_checkout().await,
            CheckoutStep::Wait(id, rx) => {
                tracing::debug!(waiter = id, "waiting for a connection");
                WaitGuard {
                    pool: Arc::clone(&self.inner),
                    id,
                    rx,
                    finished: false,
                }
                .wait()
                .await
            }
        }
    }

    async fn open_for_checkout(&self) -> Result<Lease> {
        let reservation = Reservation::new(Arc::clone(&self.inner));
        let connection = self
            .inner
            .factory
            .open(&self.inner.connection_config)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "failed to open connection");
                connection_error(e)
            })?;
        reservation.disarm();

        let connection_id = Uuid::new_v4();
        let mut state = self.inner.state.lock();
        if state.closed {
            state.live = state.live.saturating_sub(1);
            drop(state);
            PoolInner::spawn_followup(
                &self.inner,
                Followup {
                    close: vec![connection],
                    replenish: 0,
                },
            );
            return Err(PoolError::PoolClosed(self.inner.name.clone()));
        }
        let handoff = state.lease(connection_id, connection);
        drop(state);
        tracing::debug!(%connection_id, "opened new connection");
        Ok(Lease::new(Arc::clone(&self.inner), handoff))
    }

    /// Return a leased connection
    ///
    /// A queued waiter receives it immediately; otherwise it rejoins the idle
    /// set. Dead or invalidated connections are closed and, when the pool is
    /// below `min_size` or a waiter is queued, replaced before this returns.
    /// Fails with `PoolError::UnknownLease` for a lease issued by another
    /// pool; that lease then returns to its own pool as it is dropped.
    #[tracing::instrument(skip(self, lease), fields(pool = %self.inner.name, lease_id = %lease.lease_id()))]
    pub async fn checkin(&self, lease: Lease) -> Result<()> {
        if !lease.belongs_to(&self.inner) {
            return Err(PoolError::UnknownLease {
                pool: self.inner.name.clone(),
                lease: lease.lease_id(),
            });
        }
        let (lease_id, connection_id, connection, broken) = lease.take();
        let followup = self
            .inner
            .release(lease_id, connection_id, connection, broken);
        Arc::clone(&self.inner).run_followup(followup).await;
        Ok(())
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            total: state.live,
            idle: state.idle.len(),
            active: state.leased.len(),
            waiting: state.waiters.len(),
            overflow: state.live.saturating_sub(self.inner.config.max_size()),
        }
    }

    /// Whether `shutdown` has been called
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Shut the pool down
    ///
    /// Idle connections are closed, queued waiters fail with
    /// `PoolError::PoolClosed`, and leased connections are closed as they
    /// come back. Further checkouts fail with `PoolError::PoolClosed`.
    #[tracing::instrument(skip(self), fields(pool = %self.inner.name))]
    pub async fn shutdown(&self) {
        let (idle, waiters) = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            let idle: Vec<_> = state.idle.drain(..).collect();
            state.live = state.live.saturating_sub(idle.len());
            let waiters: Vec<_> = state.waiters.drain(..).collect();
            (idle, waiters)
        };

        for waiter in waiters {
            let _ = waiter
                .tx
                .send(Err(PoolError::PoolClosed(self.inner.name.clone())));
        }

        let closing = idle.len();
        for idle in idle {
            if let Err(e) = self.inner.factory.close(idle.connection).await {
                tracing::warn!(error = %e, "failed to close connection during shutdown");
            }
        }
        tracing::info!(closed = closing, "pool shut down");
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}
