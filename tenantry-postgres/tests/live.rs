//! Tests against a real PostgreSQL server.
//!
//! Run with `DATABASE_URL=postgres://... cargo test -p tenantry-postgres -- --ignored`.
//! Each test creates its own schemas and drops them afterwards.

use pretty_assertions::assert_eq;
use tenantry_core::{TenancyError, TenantBoundUnitOfWork, TenantConfig, TenantId, TenantStore};
use tenantry_postgres::{PgConfig, PgPool, PgProvider, PgTenantStore, TenantTable};

async fn pool(max: usize) -> PgPool {
    PgPool::builder()
        .config(PgConfig::from_env().unwrap())
        .max_connections(max)
        .build()
        .unwrap()
}

async fn setup(prefix: &str) -> (PgPool, PgTenantStore) {
    let admin = pool(1).await;
    let conn = admin.get().await.unwrap();
    conn.batch_execute(&format!(
        r#"
        DROP SCHEMA IF EXISTS {p}_control, {p}_a, {p}_b CASCADE;
        CREATE SCHEMA {p}_control;
        CREATE TABLE {p}_control.tenants (
            id uuid PRIMARY KEY,
            key text UNIQUE NOT NULL,
            schema_name text NOT NULL,
            status text NOT NULL
        );
        INSERT INTO {p}_control.tenants VALUES
            ('00000000-0000-0000-0000-00000000000a', 'alpha', '{p}_a', 'active'),
            ('00000000-0000-0000-0000-00000000000b', 'beta', '{p}_b', 'active'),
            ('00000000-0000-0000-0000-00000000000c', 'gone', '{p}_gone', 'deleted');
        CREATE SCHEMA {p}_a;
        CREATE SCHEMA {p}_b;
        CREATE TABLE {p}_a.items (name text);
        CREATE TABLE {p}_b.items (name text);
        "#,
        p = prefix
    ))
    .await
    .unwrap();

    let table = TenantTable::new(&format!("{}_control", prefix), "tenants").unwrap();
    (pool(2).await, PgTenantStore::with_table(admin, table))
}

async fn teardown(prefix: &str) {
    let conn = pool(1).await.get().await.unwrap();
    conn.batch_execute(&format!(
        "DROP SCHEMA IF EXISTS {p}_control, {p}_a, {p}_b CASCADE",
        p = prefix
    ))
    .await
    .unwrap();
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn store_resolves_by_key_and_id() {
    let (_pool, store) = setup("tl_store").await;

    let by_key = store.schema_name_for(&TenantId::new("alpha")).await.unwrap();
    let by_id = store
        .schema_name_for(&TenantId::new("00000000-0000-0000-0000-00000000000b"))
        .await
        .unwrap();
    let deleted = store.schema_name_for(&TenantId::new("gone")).await.unwrap();

    assert_eq!(by_key.as_deref(), Some("tl_store_a"));
    assert_eq!(by_id.as_deref(), Some("tl_store_b"));
    assert_eq!(deleted, None);

    let tenant = store.find_tenant(&TenantId::new("alpha")).await.unwrap().unwrap();
    assert_eq!(tenant.schema().as_str(), "tl_store_a");

    teardown("tl_store").await;
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn unqualified_tables_follow_the_tenant() {
    let (pool, store) = setup("tl_route").await;
    let provider = PgProvider::new(pool.clone(), store, &TenantConfig::default()).unwrap();
    let uow = TenantBoundUnitOfWork::new(provider);

    for tenant in ["alpha", "beta", "alpha"] {
        uow.with_tenant(tenant, move |lease| {
            Box::pin(async move {
                lease
                    .connection()?
                    .execute("INSERT INTO items (name) VALUES ($1)", &[&tenant])
                    .await
                    .map_err(TenancyError::from)?;
                Ok::<_, TenancyError>(())
            })
        })
        .await
        .unwrap();
    }

    let conn = pool.get().await.unwrap();
    let a: i64 = conn
        .query_one("SELECT count(*) FROM tl_route_a.items WHERE name = 'alpha'", &[])
        .await
        .unwrap()
        .get(0);
    let b: i64 = conn
        .query_one("SELECT count(*) FROM tl_route_b.items", &[])
        .await
        .unwrap()
        .get(0);
    assert_eq!((a, b), (2, 1));
    drop(conn);

    teardown("tl_route").await;
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn failed_unit_of_work_rolls_back() {
    let (pool, store) = setup("tl_abort").await;
    let provider = PgProvider::new(pool.clone(), store, &TenantConfig::default()).unwrap();
    let uow = TenantBoundUnitOfWork::new(provider);

    let result: Result<(), TenancyError> = uow
        .with_tenant("beta", |lease| {
            Box::pin(async move {
                lease
                    .connection()?
                    .execute("INSERT INTO items (name) VALUES ('lost')", &[])
                    .await
                    .map_err(TenancyError::from)?;
                Err(TenancyError::internal("checkout rejected"))
            })
        })
        .await;
    assert!(result.is_err());

    let conn = pool.get().await.unwrap();
    let count: i64 = conn
        .query_one("SELECT count(*) FROM tl_abort_b.items", &[])
        .await
        .unwrap()
        .get(0);
    assert_eq!(count, 0);
    drop(conn);

    teardown("tl_abort").await;
}
