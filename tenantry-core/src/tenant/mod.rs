//! Tenant routing and schema-scoped connections.
//!
//! Each tenant ("store") owns one schema in a shared database. This module
//! answers two questions for every unit of work: *which tenant is this?* and
//! *give me a connection that can only see that tenant's tables*.
//!
//! - [`task_local`] holds the active [`TenantContext`] for the current task.
//! - [`TenantIdentifierResolver`] picks the tenant from request signals
//!   (override, header, context, subdomain, then the configured default).
//! - [`SchemaCache`] remembers each tenant's schema, asking a
//!   [`TenantStore`] on a miss.
//! - [`SchemaScopedConnectionProvider`] leases pooled connections with the
//!   `search_path` pointed at the tenant schema, and resets it before the
//!   pool sees the connection again.
//! - [`TenantBoundUnitOfWork`] ties it together: context, lease,
//!   transaction, cleanup.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tenantry_core::tenant::{
//!     RequestSignals, SchemaScopedConnectionProvider, TenantBoundUnitOfWork, TenantConfig,
//! };
//!
//! let config = TenantConfig::from_env()?;
//! let provider = SchemaScopedConnectionProvider::new(pool, store, &config)?;
//! let uow = TenantBoundUnitOfWork::new(provider.clone())
//!     .with_transaction(config.transaction_config());
//!
//! let tenant = provider.resolver().resolve(&RequestSignals::from_headers(headers)).await;
//! uow.with_tenant(tenant, |lease| Box::pin(async move {
//!     lease.batch_execute("UPDATE orders SET status = 'shipped' WHERE id = 7").await
//! }))
//! .await?;
//! ```

mod cache;
pub(crate) mod config;
mod context;
mod model;
mod provider;
mod resolver;
mod schema;
mod store;
pub mod task_local;
mod unit_of_work;

pub use cache::{CacheConfig, CacheMetrics, SchemaCache};
pub use config::{TenantConfig, TenantConfigBuilder};
pub use context::{MAX_TENANT_ID_LEN, TenantContext, TenantId};
pub use model::{Tenant, TenantKey, TenantStatus};
pub use provider::{ConnectionLease, SchemaScopedConnectionProvider, UnknownTenantPolicy};
pub use resolver::{
    ContextStrategy, DEFAULT_TENANT_HEADER, HeaderStrategy, OverrideStrategy, RequestSignals,
    Resolution, ResolutionSource, ResolutionStrategy, ResolverProfile, SubdomainStrategy,
    TenantIdentifierResolver,
};
pub use schema::{MAX_IDENTIFIER_LEN, SchemaLayout, SchemaName, SearchPathFormat, quote_identifier};
pub use store::TenantStore;
pub use task_local::{
    ContextGuard, SyncTenantGuard, current_context, current_schema, current_tenant_id, has_tenant,
    require_tenant, set_sync_tenant, sync_tenant_id,
};
pub use unit_of_work::{TenantBoundUnitOfWork, UnitOfWorkState};
