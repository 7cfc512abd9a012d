//! Registry tests
//!
//! Registration, lookup and file-based configuration of named pools.

mod common;

use std::sync::atomic::Ordering;

use anyhow::Context;
use leasepool::{
    PoolError, PoolId, PoolRegistry, PoolSettings, RegistryConfig, ReuseDiscipline, Scope, Value,
    WorkFn,
};
use pretty_assertions::assert_eq;
use rstest::*;

use common::{MemoryFactory, init_tracing, memory_config};

#[fixture]
fn factory() -> std::sync::Arc<MemoryFactory> {
    init_tracing();
    MemoryFactory::new()
}

#[rstest]
#[tokio::test]
async fn test_duplicate_registration_leaves_first_pool_usable(
    factory: std::sync::Arc<MemoryFactory>,
) -> anyhow::Result<()> {
    let registry = PoolRegistry::new(factory.clone());
    let id = PoolId::global("billing");

    registry
        .add_pool(id.clone(), PoolSettings::new().with_size(1, 1), memory_config())
        .await?;
    let err = registry
        .add_pool(id.clone(), PoolSettings::new().with_size(2, 2), memory_config())
        .await
        .expect_err("second registration should fail");
    assert!(matches!(err, PoolError::PoolAlreadyExists(ref name) if name == "global:billing"));

    let lease = registry.checkout(&id).await?;
    registry.checkin(&id, lease).await?;
    assert_eq!(registry.lookup(&id)?.config().max_size(), 1);
    assert_eq!(factory.opened(), 1);

    Ok(())
}

#[rstest]
#[case::default_fifo(None, ReuseDiscipline::Fifo)]
#[case::explicit_lifo(Some(ReuseDiscipline::Lifo), ReuseDiscipline::Lifo)]
#[tokio::test]
async fn test_reuse_discipline_merge(
    factory: std::sync::Arc<MemoryFactory>,
    #[case] requested: Option<ReuseDiscipline>,
    #[case] expected: ReuseDiscipline,
) -> anyhow::Result<()> {
    let registry = PoolRegistry::new(factory);
    let settings = PoolSettings {
        reuse: requested,
        ..PoolSettings::default()
    };

    let pool = registry
        .add_pool(PoolId::local("sessions"), settings, memory_config())
        .await?;
    assert_eq!(pool.config().reuse(), expected);

    Ok(())
}

#[rstest]
#[case::global(Scope::Global)]
#[case::local(Scope::Local)]
#[tokio::test]
async fn test_lookup_unknown_id(
    factory: std::sync::Arc<MemoryFactory>,
    #[case] scope: Scope,
) -> anyhow::Result<()> {
    let registry = PoolRegistry::new(factory);
    registry
        .add_pool(PoolId::new(Scope::Global, "known"), PoolSettings::new(), memory_config())
        .await?;

    let missing = PoolId::new(scope, "unknown");
    assert!(matches!(
        registry.lookup(&missing),
        Err(PoolError::PoolNotFound(_))
    ));
    assert!(matches!(
        registry.checkout(&missing).await,
        Err(PoolError::PoolNotFound(_))
    ));

    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_pools_from_toml(factory: std::sync::Arc<MemoryFactory>) -> anyhow::Result<()> {
    let config = RegistryConfig::from_toml_str(
        r#"
        [[pools]]
        name = "primary"
        min_size = 2
        max_size = 6
        overflow = 2
        checkout_timeout_ms = 500

        [pools.connection]
        driver = "memory"
        database = "app"

        [[pools]]
        scope = "local"
        name = "scratch"
        min_size = 0
        reuse = "lifo"

        [pools.connection]
        driver = "memory"
        "#,
    )
    .context("Failed to parse registry config")?;

    let registry = PoolRegistry::new(factory.clone());
    let added = registry.add_pools_from_config(&config).await?;
    assert_eq!(
        added,
        vec![PoolId::global("primary"), PoolId::local("scratch")]
    );
    assert_eq!(factory.opened(), 2);

    let primary = registry.lookup(&PoolId::global("primary"))?;
    assert_eq!(primary.config().capacity(), 8);
    assert_eq!(primary.config().reuse(), ReuseDiscipline::Fifo);
    assert_eq!(
        primary.config().checkout_timeout(),
        Some(std::time::Duration::from_millis(500))
    );

    let count = WorkFn::new(2, |conn, args| {
        Box::pin(async move { conn.execute("INSERT INTO audit VALUES ($1)", args).await })
    });
    let result = registry
        .run_transaction(&PoolId::local("scratch"), &count, &[Value::from("boot")])
        .await?;
    assert_eq!(result.affected_rows, 1);
    assert_eq!(factory.state.commits.load(Ordering::SeqCst), 1);

    registry.shutdown_all().await;
    assert!(registry.is_empty());
    assert_eq!(factory.closed(), factory.opened());

    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_config_stops_at_duplicate(factory: std::sync::Arc<MemoryFactory>) -> anyhow::Result<()> {
    let config = RegistryConfig::from_toml_str(
        r#"
        [[pools]]
        name = "dup"
        min_size = 0
        [pools.connection]
        driver = "memory"

        [[pools]]
        name = "dup"
        min_size = 0
        [pools.connection]
        driver = "memory"
        "#,
    )?;

    let registry = PoolRegistry::new(factory);
    let err = registry
        .add_pools_from_config(&config)
        .await
        .expect_err("duplicate entry");
    assert!(matches!(err, PoolError::PoolAlreadyExists(_)));
    assert_eq!(registry.ids(), vec![PoolId::global("dup")]);

    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_remove_and_reregister(factory: std::sync::Arc<MemoryFactory>) -> anyhow::Result<()> {
    let registry = PoolRegistry::new(factory.clone());
    let id = PoolId::local("cache");

    let old = registry
        .add_pool(id.clone(), PoolSettings::new(), memory_config())
        .await?;
    registry.remove_pool(&id).await?;
    assert!(old.is_closed());

    let new = registry
        .add_pool(id.clone(), PoolSettings::new(), memory_config())
        .await?;
    assert!(!new.is_closed());
    assert_eq!(registry.len(), 1);
    assert_eq!(factory.opened(), 2);

    Ok(())
}
