//! Registry of named pools sharing one connection factory

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use futures::future::BoxFuture;
use leasepool_core::{Connection, ConnectionConfig, ConnectionFactory, PoolError, Result, Value};
use parking_lot::RwLock;

use super::{PoolId, PoolSettings, RegistryConfig};
use crate::pool::{Lease, Pool};
use crate::transaction::{self, TransactionPolicy, Work};

/// Maps pool ids to running pools
///
/// The registry is an ordinary value: create one per application (or per
/// test) and pass it to whoever needs pools.
pub struct PoolRegistry {
    /// Factory every registered pool opens connections through
    factory: Arc<dyn ConnectionFactory>,

    /// Running pools
    pools: RwLock<HashMap<PoolId, Pool>>,
}

impl PoolRegistry {
    /// Create an empty registry whose pools use `factory`
    pub fn new<F: ConnectionFactory>(factory: F) -> Self {
        Self::with_factory(Arc::new(factory))
    }

    /// Create an empty registry from a shared factory
    pub fn with_factory(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            factory,
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// Start a pool and register it under `id`
    ///
    /// Fails with `PoolAlreadyExists` if `id` is taken; the existing pool is
    /// left untouched.
    #[tracing::instrument(skip(self, settings, connection_config), fields(pool = %id, driver = %connection_config.driver))]
    pub async fn add_pool(
        &self,
        id: PoolId,
        settings: PoolSettings,
        connection_config: ConnectionConfig,
    ) -> Result<Pool> {
        if self.pools.read().contains_key(&id) {
            tracing::warn!("pool already registered");
            return Err(PoolError::PoolAlreadyExists(id.to_string()));
        }

        let config = settings.merge();
        let pool = Pool::start_with_factory(
            &id.to_string(),
            config,
            self.factory.clone(),
            connection_config,
        )
        .await?;

        let registered = match self.pools.write().entry(id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(pool.clone());
                true
            }
        };

        if !registered {
            // Another caller registered the same id while this pool was opening
            tracing::warn!("pool registered concurrently, discarding");
            pool.shutdown().await;
            return Err(PoolError::PoolAlreadyExists(id.to_string()));
        }

        tracing::info!("pool registered");
        Ok(pool)
    }

    /// Register every pool listed in `config`, in order
    ///
    /// Stops at the first failure; pools registered before it stay registered.
    #[tracing::instrument(skip(self, config), fields(pools = config.pools.len()))]
    pub async fn add_pools_from_config(&self, config: &RegistryConfig) -> Result<Vec<PoolId>> {
        let mut added = Vec::with_capacity(config.pools.len());
        for entry in &config.pools {
            let id = entry.id();
            self.add_pool(id.clone(), entry.settings.clone(), entry.connection.clone())
                .await?;
            added.push(id);
        }
        Ok(added)
    }

    /// Get the pool registered under `id`
    pub fn lookup(&self, id: &PoolId) -> Result<Pool> {
        let pool = self.pools.read().get(id).cloned();
        pool.ok_or_else(|| {
            tracing::debug!(pool = %id, "pool not found in registry");
            PoolError::PoolNotFound(id.to_string())
        })
    }

    /// Check if a pool is registered under `id`
    pub fn contains(&self, id: &PoolId) -> bool {
        self.pools.read().contains_key(id)
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<PoolId> {
        let mut ids: Vec<_> = self.pools.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.pools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.read().is_empty()
    }

    /// Deregister the pool under `id` and shut it down
    #[tracing::instrument(skip(self), fields(pool = %id))]
    pub async fn remove_pool(&self, id: &PoolId) -> Result<()> {
        let pool = self.pools.write().remove(id);
        let pool = pool.ok_or_else(|| PoolError::PoolNotFound(id.to_string()))?;
        pool.shutdown().await;
        tracing::info!("pool removed");
        Ok(())
    }

    /// Deregister and shut down every pool
    #[tracing::instrument(skip(self))]
    pub async fn shutdown_all(&self) {
        let pools: Vec<_> = self.pools.write().drain().collect();
        tracing::info!(count = pools.len(), "shutting down all pools");
        for (_, pool) in pools {
            pool.shutdown().await;
        }
    }

    /// Check out a connection from the pool under `id`
    pub async fn checkout(&self, id: &PoolId) -> Result<Lease> {
        self.lookup(id)?.checkout().await
    }

    /// Return a lease to the pool under `id`
    pub async fn checkin(&self, id: &PoolId, lease: Lease) -> Result<()> {
        self.lookup(id)?.checkin(lease).await
    }

    /// [`transaction::run_scoped`] on the pool under `id`
    pub async fn run_scoped<T, F>(&self, id: &PoolId, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a dyn Connection) -> BoxFuture<'a, Result<T>>,
    {
        let pool = self.lookup(id)?;
        transaction::run_scoped(&pool, f).await
    }

    /// [`transaction::run_transaction`] on the pool under `id`
    pub async fn run_transaction<W: Work>(
        &self,
        id: &PoolId,
        work: &W,
        args: &[Value],
    ) -> Result<W::Output> {
        let pool = self.lookup(id)?;
        transaction::run_transaction(&pool, work, args).await
    }

    /// [`transaction::run_transaction_with_policy`] on the pool under `id`
    pub async fn run_transaction_with_policy<W: Work>(
        &self,
        id: &PoolId,
        work: &W,
        args: &[Value],
        policy: impl Into<TransactionPolicy>,
    ) -> Result<W::Output> {
        let pool = self.lookup(id)?;
        transaction::run_transaction_with_policy(&pool, work, args, policy.into()).await
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("pools", &self.ids())
            .finish_non_exhaustive()
    }
}
