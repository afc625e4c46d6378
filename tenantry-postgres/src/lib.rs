//! # tenantry-postgres
//!
//! PostgreSQL backend for tenantry: pooled connections that
//! `tenantry-core` scopes to one tenant schema at a time.
//!
//! This crate provides:
//! - Connection pool management using `deadpool-postgres`
//! - [`PgConnection`], the connection handed to tenant leases
//! - [`PgTenantStore`], a tenant directory read from a table
//!
//! ## Example
//!
//! ```rust,ignore
//! use tenantry_core::{TenantBoundUnitOfWork, TenantConfig, TenancyError};
//! use tenantry_postgres::{PgPool, PgProvider, PgTenantStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tenants = PgPool::builder()
//!         .url("postgresql://app@localhost/shop")
//!         .build()?;
//!     let directory = PgPool::builder()
//!         .url("postgresql://app@localhost/shop")
//!         .max_connections(2)
//!         .build()?;
//!
//!     let provider = PgProvider::new(
//!         tenants,
//!         PgTenantStore::new(directory),
//!         &TenantConfig::from_env()?,
//!     )?;
//!     let uow = TenantBoundUnitOfWork::new(provider);
//!
//!     let count: i64 = uow
//!         .with_tenant("store-42", |lease| {
//!             Box::pin(async move {
//!                 let conn = lease.connection()?;
//!                 let row = conn
//!                     .query_one("SELECT count(*) FROM orders", &[])
//!                     .await
//!                     .map_err(TenancyError::from)?;
//!                 Ok::<_, TenancyError>(row.get(0))
//!             })
//!         })
//!         .await?;
//!
//!     println!("store-42 has {count} orders");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod pool;
pub mod store;

pub use config::{PgConfig, PgConfigBuilder, SslMode};
pub use connection::PgConnection;
pub use error::{PgError, PgResult};
pub use pool::{PgPool, PgPoolBuilder, PoolConfig, RecyclingMethod};
pub use store::{PgTenantStore, TenantTable};

/// Tenant connection provider over a PostgreSQL pool.
pub type PgProvider = tenantry_core::SchemaScopedConnectionProvider<PgPool>;

/// Tenant-bound unit of work over a PostgreSQL pool.
pub type PgUnitOfWork = tenantry_core::TenantBoundUnitOfWork<PgPool>;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::{PgConfig, PgConfigBuilder};
    pub use crate::connection::PgConnection;
    pub use crate::error::{PgError, PgResult};
    pub use crate::pool::{PgPool, PgPoolBuilder};
    pub use crate::store::PgTenantStore;
    pub use crate::{PgProvider, PgUnitOfWork};
}
