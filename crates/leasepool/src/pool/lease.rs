//! Exclusive connection leases

use std::ops::Deref;
use std::sync::Arc;

use leasepool_core::Connection;
use uuid::Uuid;

use super::pool::{Handoff, PoolInner};

/// A connection checked out of a pool
///
/// The lease is the only handle to its connection while it is out. Hand it
/// back with [`Pool::checkin`](super::Pool::checkin) or [`Lease::release`];
/// dropping it without doing so (early return, panic, cancelled task) still
/// returns the connection to its pool, after a liveness check.
pub struct Lease {
    pool: Arc<PoolInner>,
    lease_id: Uuid,
    connection_id: Uuid,
    connection: Option<Arc<dyn Connection>>,
    broken: bool,
}

impl Lease {
    pub(super) fn new(pool: Arc<PoolInner>, handoff: Handoff) -> Self {
        Self {
            pool,
            lease_id: handoff.lease_id,
            connection_id: handoff.connection_id,
            connection: Some(handoff.connection),
            broken: false,
        }
    }

    /// Identifier the pool issued for this checkout
    pub fn lease_id(&self) -> Uuid {
        self.lease_id
    }

    /// Stable identifier of the underlying connection across checkouts
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Name of the pool that issued this lease
    pub fn pool_name(&self) -> &str {
        self.pool.name()
    }

    /// Get the underlying connection as an Arc
    pub fn connection(&self) -> &Arc<dyn Connection> {
        self.connection.as_ref().expect("connection taken")
    }

    /// Mark the connection unusable; checkin will close it instead of recycling it
    pub fn invalidate(&mut self) {
        self.broken = true;
    }

    /// Whether `invalidate` was called
    pub fn is_invalidated(&self) -> bool {
        self.broken
    }

    /// Return the connection to the pool that issued it
    pub async fn release(self) -> leasepool_core::Result<()> {
        let pool = super::Pool::from_inner(Arc::clone(&self.pool));
        pool.checkin(self).await
    }

    pub(super) fn belongs_to(&self, pool: &Arc<PoolInner>) -> bool {
        Arc::ptr_eq(&self.pool, pool)
    }

    /// Take the connection out, leaving `Drop` with nothing to reclaim
    pub(super) fn take(mut self) -> (Uuid, Uuid, Arc<dyn Connection>, bool) {
        let connection = self.connection.take().expect("connection taken");
        (self.lease_id, self.connection_id, connection, self.broken)
    }
}

impl Deref for Lease {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.connection().as_ref()
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("pool", &self.pool.name())
            .field("lease_id", &self.lease_id)
            .field("connection_id", &self.connection_id)
            .field("broken", &self.broken)
            .finish()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            tracing::debug!(
                pool = %self.pool.name(),
                lease_id = %self.lease_id,
                "lease dropped without checkin, reclaiming connection"
            );
            let followup =
                self.pool
                    .release(self.lease_id, self.connection_id, connection, self.broken);
            PoolInner::spawn_followup(&self.pool, followup);
        }
    }
}
