//! Pool behaviour tests
//!
//! Capacity, waiter ordering, reuse discipline and dead-connection handling,
//! exercised through the public API against the in-memory factory.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use leasepool::{Pool, PoolConfig, PoolError, ReuseDiscipline};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rstest::*;
use tokio::sync::mpsc;
use tokio::time::sleep;

use common::{MemoryFactory, init_tracing, memory_config, serial_of};

async fn start(config: PoolConfig, factory: &Arc<MemoryFactory>) -> anyhow::Result<Pool> {
    init_tracing();
    Pool::start("it", config, factory.clone(), memory_config())
        .await
        .context("Failed to start pool")
}

/// Poll until `n` callers are queued on `pool`
async fn wait_for_waiters(pool: &Pool, n: usize) -> anyhow::Result<()> {
    for _ in 0..200 {
        if pool.stats().waiting == n {
            return Ok(());
        }
        sleep(Duration::from_millis(1)).await;
    }
    anyhow::bail!("expected {} waiters, found {}", n, pool.stats().waiting)
}

#[rstest]
#[case::exact(1, 0)]
#[case::several(3, 0)]
#[case::with_overflow(2, 2)]
#[tokio::test]
async fn test_checkouts_within_capacity_do_not_block(
    #[case] max_size: usize,
    #[case] overflow: usize,
) -> anyhow::Result<()> {
    let factory = MemoryFactory::new();
    let pool = start(PoolConfig::new(0, max_size).with_overflow(overflow), &factory).await?;

    let mut leases = Vec::new();
    for i in 0..max_size + overflow {
        let lease = pool
            .checkout_with_timeout(Duration::from_millis(100))
            .await
            .with_context(|| format!("checkout {} should not block", i))?;
        leases.push(lease);
    }

    let stats = pool.stats();
    assert_eq!(stats.active, max_size + overflow);
    assert_eq!(stats.overflow, overflow);
    assert!(stats.is_full());

    let blocked = pool.checkout_with_timeout(Duration::from_millis(30)).await;
    assert!(
        matches!(blocked, Err(PoolError::PoolExhausted { .. })),
        "checkout beyond capacity should time out"
    );
    assert_eq!(pool.stats().waiting, 0, "timed-out waiter should be gone");

    for lease in leases {
        pool.checkin(lease).await?;
    }
    assert_eq!(pool.stats().active, 0);
    assert_eq!(pool.stats().total, max_size, "overflow connections closed on checkin");
    assert_eq!(factory.closed(), overflow);

    Ok(())
}

#[tokio::test]
async fn test_waiters_served_in_arrival_order() -> anyhow::Result<()> {
    let factory = MemoryFactory::new();
    let pool = start(PoolConfig::new(1, 1), &factory).await?;
    let held = pool.checkout().await?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut tasks = Vec::new();
    for caller in 0..3 {
        let task_pool = pool.clone();
        let tx = tx.clone();
        tasks.push(tokio::spawn(async move {
            let lease = task_pool.checkout().await?;
            tx.send(caller).ok();
            sleep(Duration::from_millis(5)).await;
            task_pool.checkin(lease).await
        }));
        wait_for_waiters(&pool, caller + 1).await?;
    }
    drop(tx);

    pool.checkin(held).await?;
    for task in tasks {
        task.await??;
    }

    let mut order = Vec::new();
    while let Some(caller) = rx.recv().await {
        order.push(caller);
    }
    assert_eq!(order, vec![0, 1, 2]);
    assert_eq!(factory.opened(), 1, "a single connection served everyone");

    Ok(())
}

#[tokio::test]
async fn test_blocked_caller_receives_returned_connection() -> anyhow::Result<()> {
    let factory = MemoryFactory::new();
    let pool = start(PoolConfig::new(1, 1), &factory).await?;

    let lease_a = pool.checkout().await?;
    let serial_a = serial_of(&*lease_a).await?;

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move {
            let lease_b = pool.checkout().await?;
            let serial_b = serial_of(&*lease_b).await?;
            pool.checkin(lease_b).await?;
            anyhow::Ok(serial_b)
        })
    };
    wait_for_waiters(&pool, 1).await?;

    pool.checkin(lease_a).await?;
    let serial_b = waiter.await??;

    assert_eq!(serial_b, serial_a);
    assert_eq!(factory.opened(), 1);

    Ok(())
}

#[rstest]
#[case::fifo(ReuseDiscipline::Fifo, 4)]
#[case::lifo(ReuseDiscipline::Lifo, 1)]
#[tokio::test]
async fn test_reuse_discipline(
    #[case] reuse: ReuseDiscipline,
    #[case] expected_distinct: usize,
) -> anyhow::Result<()> {
    let factory = MemoryFactory::new();
    let pool = start(PoolConfig::new(4, 4).with_reuse(reuse), &factory).await?;

    let mut seen = Vec::new();
    for _ in 0..4 {
        let lease = pool.checkout().await?;
        seen.push(lease.connection_id());
        pool.checkin(lease).await?;
    }

    let distinct: HashSet<_> = seen.iter().collect();
    assert_eq!(distinct.len(), expected_distinct);
    assert_eq!(factory.opened(), 4, "no connection opened beyond min_size");

    Ok(())
}

#[rstest]
#[case::replaced_below_min(2, 2, 3)]
#[case::not_replaced_without_min(0, 0, 1)]
#[tokio::test]
async fn test_dead_connection_discarded_on_checkin(
    #[case] min_size: usize,
    #[case] total_after: usize,
    #[case] opened_after: usize,
) -> anyhow::Result<()> {
    let factory = MemoryFactory::new();
    let pool = start(PoolConfig::new(min_size, 2), &factory).await?;

    let lease = pool.checkout().await?;
    let dead_id = lease.connection_id();
    lease.close().await?;
    pool.checkin(lease).await?;
    sleep(Duration::from_millis(10)).await;

    let stats = pool.stats();
    assert_eq!(factory.closed(), 1);
    assert_eq!(stats.total, total_after);
    assert_eq!(factory.opened(), opened_after);

    for _ in 0..stats.idle {
        let lease = pool.checkout().await?;
        assert!(lease.connection_id() != dead_id, "dead connection handed out again");
        drop(lease);
    }

    Ok(())
}

#[tokio::test]
async fn test_no_two_callers_share_a_connection() -> anyhow::Result<()> {
    let factory = MemoryFactory::new();
    let pool = start(PoolConfig::new(1, 3).with_overflow(1), &factory).await?;
    let holders = Arc::new(Mutex::new(HashSet::new()));

    let mut tasks = Vec::new();
    for _ in 0..12 {
        let pool = pool.clone();
        let holders = holders.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..10 {
                let lease = pool.checkout().await?;
                let id = lease.connection_id();
                anyhow::ensure!(holders.lock().insert(id), "connection {} leased twice", id);
                tokio::task::yield_now().await;
                holders.lock().remove(&id);
                pool.checkin(lease).await?;
            }
            anyhow::Ok(())
        }));
    }
    for task in tasks {
        task.await??;
    }

    let stats = pool.stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.waiting, 0);
    assert!(stats.total <= 3, "overflow connections should be closed, got {}", stats.total);

    Ok(())
}

#[tokio::test]
async fn test_dropped_checkout_leaves_no_waiter() -> anyhow::Result<()> {
    let factory = MemoryFactory::new();
    let pool = start(PoolConfig::new(1, 1), &factory).await?;
    let held = pool.checkout().await?;

    let abandoned = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.checkout().await.map(|_| ()) })
    };
    wait_for_waiters(&pool, 1).await?;
    abandoned.abort();
    let _ = abandoned.await;

    assert_eq!(pool.stats().waiting, 0);
    pool.checkin(held).await?;

    let lease = pool.checkout_with_timeout(Duration::from_millis(50)).await?;
    assert_eq!(pool.stats().active, 1);
    pool.checkin(lease).await?;

    Ok(())
}

#[tokio::test]
async fn test_shutdown_rejects_new_checkouts() -> anyhow::Result<()> {
    let factory = MemoryFactory::new();
    let pool = start(PoolConfig::new(2, 2), &factory).await?;
    let lease = pool.checkout().await?;

    pool.shutdown().await;
    assert!(matches!(pool.checkout().await, Err(PoolError::PoolClosed(_))));
    assert_eq!(factory.closed(), 1);

    // The outstanding lease is closed when it comes back
    pool.checkin(lease).await?;
    assert_eq!(factory.closed(), 2);
    assert_eq!(pool.stats().total, 0);

    Ok(())
}
