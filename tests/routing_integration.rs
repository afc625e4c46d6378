//! End-to-end routing through the facade with the in-memory backend.

use pretty_assertions::assert_eq;
use tenantry::prelude::*;
use tenantry::tenant::{SchemaLayout, Tenant, TenantKey, TenantStatus, UnknownTenantPolicy};
use tenantry::testing::{MemoryPool, StaticTenantStore};
use uuid::Uuid;

fn provision(store: &StaticTenantStore, layout: &SchemaLayout, key: &str) -> Tenant {
    let mut tenant = Tenant::provision(TenantKey::parse(key).unwrap(), layout).unwrap();
    tenant.transition(TenantStatus::Active).unwrap();
    store.insert(tenant.key().as_str(), tenant.schema().as_str());
    tenant
}

#[tokio::test]
async fn request_to_commit() {
    let config = TenantConfig::builder()
        .base_domain("platform.example")
        .build()
        .unwrap();
    let layout = config.layout().unwrap();
    let store = StaticTenantStore::new();
    let acme = provision(&store, &layout, "acme");

    let pool = MemoryPool::new(2);
    let provider = SchemaScopedConnectionProvider::new(pool.clone(), store, &config).unwrap();
    let uow = TenantBoundUnitOfWork::new(provider);

    let signals = RequestSignals::new().host("acme.platform.example:8443");
    let tenant = uow.provider().resolver().resolve(&signals).await;
    assert_eq!(tenant, acme.tenant_id());

    let schema = uow
        .with_tenant(tenant, |lease| {
            Box::pin(async move {
                lease.batch_execute("INSERT INTO orders DEFAULT VALUES").await?;
                Ok::<_, TenancyError>(lease.schema().as_str().to_string())
            })
        })
        .await
        .unwrap();
    assert_eq!(schema, "store_acme");

    let log = pool.connection_log(0);
    assert_eq!(
        log.statements,
        vec![
            "SET search_path TO \"public\"",
            "SET search_path TO \"store_acme\"",
            "BEGIN ISOLATION LEVEL READ COMMITTED READ WRITE",
            "INSERT INTO orders DEFAULT VALUES",
            "COMMIT",
            "SET search_path TO \"public\"",
        ]
    );
    assert_eq!(log.returned_with, vec!["public"]);
}

#[tokio::test]
async fn unknown_tenant_falls_back_to_neutral_schema() {
    let pool = MemoryPool::new(1);
    let provider = SchemaScopedConnectionProvider::new(
        pool.clone(),
        StaticTenantStore::new(),
        &TenantConfig::default(),
    )
    .unwrap();

    let lease = provider.lease("never-provisioned").await.unwrap();
    assert_eq!(lease.schema().as_str(), "public");
    assert_eq!(lease.tenant_id().map(TenantId::as_str), Some("never-provisioned"));
    provider.release(lease).await.unwrap();

    let rejecting = TenantConfig::builder()
        .unknown_tenant(UnknownTenantPolicy::Reject)
        .build()
        .unwrap();
    let provider =
        SchemaScopedConnectionProvider::new(pool, StaticTenantStore::new(), &rejecting).unwrap();
    assert!(provider.lease("never-provisioned").await.unwrap_err().is_not_resolvable());
}

#[tokio::test]
async fn tenant_looked_up_by_stable_id() {
    let store = StaticTenantStore::new();
    let tenant = Tenant::from_parts(
        Uuid::new_v4(),
        TenantKey::parse("initech").unwrap(),
        SchemaLayout::default().schema_name("initech").unwrap(),
        TenantStatus::Active,
    );
    store.insert(tenant.id().to_string(), tenant.schema().as_str());

    let pool = MemoryPool::new(1);
    let provider =
        SchemaScopedConnectionProvider::new(pool, store, &TenantConfig::default()).unwrap();

    let lease = provider.lease(tenant.id().to_string()).await.unwrap();
    assert_eq!(lease.schema(), tenant.schema());
    provider.release(lease).await.unwrap();
}

#[tokio::test]
async fn broken_reset_never_reaches_the_pool() {
    let pool = MemoryPool::new(1);
    let store = StaticTenantStore::new().with_tenant("acme", "store_acme");
    let provider =
        SchemaScopedConnectionProvider::new(pool.clone(), store, &TenantConfig::default()).unwrap();

    let lease = provider.lease("acme").await.unwrap();
    pool.fail_statements_containing("\"public\"");
    let err = provider.release(lease).await.unwrap_err();
    assert!(err.is_connection_error());
    assert_eq!(pool.discarded(), 1);

    pool.clear_failures();
    let lease = provider.lease("acme").await.unwrap();
    provider.release(lease).await.unwrap();
    assert_eq!(pool.connection_logs().len(), 2);
}
