//! # tenantry-core
//!
//! Driver-agnostic tenant routing for schema-per-tenant databases.
//!
//! This crate provides:
//! - Tenant resolution from request signals with a total fallback
//! - A task-local tenant context that never outlives its unit of work
//! - A tenant-to-schema cache backed by a pluggable tenant directory
//! - Connection leases bound to one tenant schema and reset on release
//! - Tenant-bound units of work with their own transaction
//! - Configuration from code, TOML or `TENANTRY_*` environment variables
//!
//! Database drivers plug in through [`connection::ConnectionSource`] and
//! [`connection::RawConnection`]; `tenantry-postgres` is the PostgreSQL
//! backend and [`testing::MemoryPool`] an in-memory one.
//!
//! ## Identifiers
//!
//! ```rust
//! use tenantry_core::tenant::{SchemaLayout, TenantId};
//!
//! let tenant = TenantId::parse(" store-42 ").unwrap();
//! assert_eq!(tenant.as_str(), "store-42");
//!
//! let layout = SchemaLayout::default();
//! let schema = layout.schema_name("blue-moon").unwrap();
//! assert_eq!(schema.as_str(), "store_blue_moon");
//! assert_eq!(
//!     layout.search_path_sql(&schema),
//!     "SET search_path TO \"store_blue_moon\""
//! );
//! ```
//!
//! ## Resolution
//!
//! ```rust
//! use tenantry_core::tenant::{RequestSignals, TenantConfig, TenantIdentifierResolver};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let resolver = TenantIdentifierResolver::production(&TenantConfig::default());
//!
//! let signals = RequestSignals::new().header("X-Tenant-ID", "store-42");
//! assert_eq!(resolver.resolve(&signals).await.as_str(), "store-42");
//!
//! let signals = RequestSignals::new().host("www.platform.example");
//! assert_eq!(resolver.resolve(&signals).await.as_str(), "default");
//! # });
//! ```

pub mod connection;
pub mod env;
pub mod error;
pub mod logging;
pub mod tenant;
pub mod testing;
pub mod transaction;

pub use connection::{ConnectionSource, PoolStatus, RawConnection};
pub use error::{ErrorCode, ErrorContext, TenancyError, TenancyResult};
pub use tenant::{
    ConnectionLease, RequestSignals, SchemaCache, SchemaName, SchemaScopedConnectionProvider,
    TenantBoundUnitOfWork, TenantConfig, TenantContext, TenantId, TenantIdentifierResolver,
    TenantStore, UnknownTenantPolicy,
};
pub use transaction::{AccessMode, IsolationLevel, TransactionConfig};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::connection::{ConnectionSource, RawConnection};
    pub use crate::error::{TenancyError, TenancyResult};
    pub use crate::tenant::{
        ConnectionLease, RequestSignals, SchemaScopedConnectionProvider, TenantBoundUnitOfWork,
        TenantConfig, TenantId, TenantIdentifierResolver, TenantStore,
    };
    pub use crate::transaction::{IsolationLevel, TransactionConfig};
}
