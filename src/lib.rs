//! # Tenantry
//!
//! Schema-per-tenant routing for services that share one PostgreSQL
//! cluster between many stores.
//!
//! Tenantry provides:
//! - Tenant resolution from headers, hosts and test overrides, never failing
//! - A task-local tenant context bound to one unit of work
//! - Connection leases whose `search_path` points at exactly one tenant
//!   schema and is reset before the connection is reused
//! - Tenant-bound units of work that commit, roll back and clean up for you
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tenantry::prelude::*;
//! use tenantry::postgres::{PgPool, PgTenantStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tenantry::TenancyError> {
//!     let config = TenantConfig::from_env()?;
//!     let pool = PgPool::builder().url("postgresql://localhost/shop").build()?;
//!     let directory = PgPool::builder()
//!         .url("postgresql://localhost/shop")
//!         .max_connections(2)
//!         .build()?;
//!
//!     let provider =
//!         SchemaScopedConnectionProvider::new(pool, PgTenantStore::new(directory), &config)?;
//!     let uow = TenantBoundUnitOfWork::new(provider);
//!
//!     let signals = RequestSignals::new().host("acme.platform.example");
//!     let tenant = uow.provider().resolver().resolve(&signals).await;
//!
//!     uow.with_tenant(tenant, |lease| {
//!         Box::pin(async move {
//!             lease.batch_execute("UPDATE carts SET touched_at = now()").await
//!         })
//!     })
//!     .await
//! }
//! ```
//!
//! ## Feature flags
//!
//! - `postgres` (default): the PostgreSQL backend, re-exported as [`postgres`]
//! - `logging`: [`logging::init`] installs a `tracing-subscriber` formatter

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use tenantry_core::{
    connection, env, error, logging, prelude, tenant, testing, transaction,
};

pub use tenantry_core::{
    ConnectionLease, ConnectionSource, ErrorCode, RawConnection, RequestSignals, SchemaCache,
    SchemaName, SchemaScopedConnectionProvider, TenancyError, TenancyResult,
    TenantBoundUnitOfWork, TenantConfig, TenantContext, TenantId, TenantIdentifierResolver,
    TenantStore, TransactionConfig, UnknownTenantPolicy,
};

/// PostgreSQL backend.
#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub mod postgres {
    pub use tenantry_postgres::*;
}
