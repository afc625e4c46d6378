//! Tenant-bound units of work.
//!
//! [`TenantBoundUnitOfWork::with_tenant`] runs one operation against one
//! tenant, inside its own context scope, on its own freshly leased
//! connection, in its own transaction:
//!
//! ```text
//! Idle -> ContextSet -> TransactionOpen -> Executing
//!      -> Committed | RolledBack -> ContextCleared -> Idle
//! ```
//!
//! Cleanup is unconditional. The transaction is committed only if the
//! operation returned `Ok`; the lease is released and the context cleared on
//! every path, including panics and cancellation (through the lease and
//! context guards).
//!
//! ```rust,ignore
//! let total: i64 = uow
//!     .with_tenant("store-42", |lease| {
//!         Box::pin(async move {
//!             let row = lease.connection()?.query_one("SELECT count(*) FROM orders", &[]).await?;
//!             Ok::<_, AppError>(row.get(0))
//!         })
//!     })
//!     .await?;
//! ```

use std::fmt;

use futures::future::BoxFuture;
use tracing::{error, trace, warn};

use super::context::TenantId;
use super::provider::{ConnectionLease, SchemaScopedConnectionProvider};
use super::task_local::{self, ContextGuard};
use crate::connection::ConnectionSource;
use crate::error::TenancyError;
use crate::transaction::TransactionConfig;

/// Where a unit of work is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitOfWorkState {
    /// Not started.
    Idle,
    /// Tenant context set for the current task.
    ContextSet,
    /// Connection leased and transaction begun.
    TransactionOpen,
    /// The operation is running.
    Executing,
    /// The operation succeeded and was committed.
    Committed,
    /// The operation failed and was rolled back.
    RolledBack,
    /// Lease released and context cleared.
    ContextCleared,
}

impl fmt::Display for UnitOfWorkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ContextSet => "context_set",
            Self::TransactionOpen => "transaction_open",
            Self::Executing => "executing",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
            Self::ContextCleared => "context_cleared",
        };
        f.write_str(name)
    }
}

fn enter_state(tenant_id: &TenantId, state: UnitOfWorkState) {
    trace!(tenant_id = %tenant_id, state = %state, "Unit of work state");
}

/// Runs operations bound to a single tenant.
pub struct TenantBoundUnitOfWork<S: ConnectionSource> {
    provider: SchemaScopedConnectionProvider<S>,
    transaction: TransactionConfig,
}

impl<S: ConnectionSource> Clone for TenantBoundUnitOfWork<S> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            transaction: self.transaction.clone(),
        }
    }
}

impl<S: ConnectionSource> fmt::Debug for TenantBoundUnitOfWork<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantBoundUnitOfWork")
            .field("provider", &self.provider)
            .field("transaction", &self.transaction)
            .finish()
    }
}

impl<S: ConnectionSource> TenantBoundUnitOfWork<S> {
    /// Create a runner using the provider's configured transaction settings.
    pub fn new(provider: SchemaScopedConnectionProvider<S>) -> Self {
        let transaction = provider.transaction_config().clone();
        Self { provider, transaction }
    }

    /// Use `config` for every unit of work.
    pub fn with_transaction(mut self, config: TransactionConfig) -> Self {
        self.transaction = config;
        self
    }

    /// The connection provider.
    pub fn provider(&self) -> &SchemaScopedConnectionProvider<S> {
        &self.provider
    }

    /// The transaction settings.
    pub fn transaction_config(&self) -> &TransactionConfig {
        &self.transaction
    }

    /// Run `op` against `tenant_id`.
    ///
    /// A blank tenant id is a contract violation and nothing is leased. The
    /// operation's own error is returned after rollback and cleanup; a
    /// failure to reset the connection afterwards is logged, not returned.
    pub async fn with_tenant<T, E, F>(&self, tenant_id: impl Into<TenantId>, op: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut ConnectionLease<S>) -> BoxFuture<'c, Result<T, E>>,
        E: From<TenancyError>,
    {
        let tenant_id = tenant_id.into();
        if tenant_id.is_blank() {
            error!("Unit of work started without a tenant id");
            return Err(TenancyError::contract_violation("a unit of work requires a non-empty tenant id")
                .with_context("with_tenant")
                .into());
        }

        task_local::scope(self.run(tenant_id, op)).await
    }

    async fn run<T, E, F>(&self, tenant_id: TenantId, op: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut ConnectionLease<S>) -> BoxFuture<'c, Result<T, E>>,
        E: From<TenancyError>,
    {
        enter_state(&tenant_id, UnitOfWorkState::Idle);
        let context = ContextGuard::enter(tenant_id.clone())?;
        enter_state(&tenant_id, UnitOfWorkState::ContextSet);

        let mut lease = self.provider.lease(tenant_id.clone()).await?;
        // Only fails without a tenant, which the guard above rules out.
        let _ = task_local::set_schema(lease.schema().clone());

        if let Err(e) = lease.begin(&self.transaction).await {
            if let Err(release_err) = lease.release().await {
                warn!(tenant_id = %tenant_id, error = %release_err, "Release after failed BEGIN failed");
            }
            return Err(e.into());
        }
        enter_state(&tenant_id, UnitOfWorkState::TransactionOpen);

        enter_state(&tenant_id, UnitOfWorkState::Executing);
        let mut result = op(&mut lease).await;

        if result.is_ok() {
            match lease.commit().await {
                Ok(()) => enter_state(&tenant_id, UnitOfWorkState::Committed),
                Err(e) => {
                    error!(tenant_id = %tenant_id, error = %e, "Commit failed");
                    result = Err(e.into());
                }
            }
        } else {
            if let Err(e) = lease.rollback().await {
                warn!(tenant_id = %tenant_id, error = %e, "Rollback failed");
            }
            enter_state(&tenant_id, UnitOfWorkState::RolledBack);
        }

        if let Err(e) = lease.release().await {
            warn!(tenant_id = %tenant_id, error = %e, "Connection release failed");
        }
        drop(context);
        enter_state(&tenant_id, UnitOfWorkState::ContextCleared);

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::config::TenantConfig;
    use crate::error::{ErrorCode, TenancyResult};
    use crate::testing::{MemoryPool, StaticTenantStore};
    use crate::transaction::IsolationLevel;
    use pretty_assertions::assert_eq;

    fn unit_of_work(pool: &MemoryPool) -> TenantBoundUnitOfWork<MemoryPool> {
        let store = StaticTenantStore::new()
            .with_tenant("store-42", "store_store_42")
            .with_tenant("acme", "store_acme");
        let provider =
            SchemaScopedConnectionProvider::new(pool.clone(), store, &TenantConfig::default()).unwrap();
        TenantBoundUnitOfWork::new(provider)
    }

    #[tokio::test]
    async fn test_success_commits() {
        let pool = MemoryPool::new(1);
        let uow = unit_of_work(&pool);

        let seen: TenancyResult<(String, String)> = uow
            .with_tenant("store-42", |lease| {
                Box::pin(async move {
                    lease.batch_execute("INSERT INTO orders DEFAULT VALUES").await?;
                    let tenant = task_local::current_tenant_id().unwrap();
                    let schema = task_local::current_schema().unwrap();
                    Ok((tenant.into_inner(), schema.as_str().to_string()))
                })
            })
            .await;

        assert_eq!(
            seen.unwrap(),
            ("store-42".to_string(), "store_store_42".to_string())
        );
        let log = pool.connection_log(0);
        assert_eq!(
            log.statements[1..],
            [
                "SET search_path TO \"store_store_42\"".to_string(),
                "BEGIN ISOLATION LEVEL READ COMMITTED READ WRITE".to_string(),
                "INSERT INTO orders DEFAULT VALUES".to_string(),
                "COMMIT".to_string(),
                "SET search_path TO \"public\"".to_string(),
            ]
        );
        assert!(task_local::current_tenant_id().is_none());
    }

    #[tokio::test]
    async fn test_failure_rolls_back_and_propagates() {
        let pool = MemoryPool::new(1);
        let uow = unit_of_work(&pool);

        let result: TenancyResult<()> = uow
            .with_tenant("store-42", |_lease| {
                Box::pin(async { Err(TenancyError::internal("boom")) })
            })
            .await;

        assert_eq!(result.unwrap_err().code, ErrorCode::Internal);
        let log = pool.connection_log(0);
        assert!(log.statements.contains(&"ROLLBACK".to_string()));
        assert!(!log.statements.contains(&"COMMIT".to_string()));
        assert_eq!(log.returned_with, vec!["public".to_string()]);
    }

    #[tokio::test]
    async fn test_blank_tenant_leases_nothing() {
        let pool = MemoryPool::new(1);
        let uow = unit_of_work(&pool);

        let result: TenancyResult<()> = uow
            .with_tenant("", |_lease| Box::pin(async { Ok(()) }))
            .await;

        assert!(result.unwrap_err().is_contract_violation());
        assert_eq!(pool.status().size, 0);
    }

    #[tokio::test]
    async fn test_configured_isolation() {
        let pool = MemoryPool::new(1);
        let uow = unit_of_work(&pool)
            .with_transaction(TransactionConfig::new().isolation(IsolationLevel::Serializable));

        let result: TenancyResult<()> = uow
            .with_tenant("acme", |_lease| Box::pin(async { Ok(()) }))
            .await;
        result.unwrap();

        let log = pool.connection_log(0);
        assert!(
            log.statements
                .contains(&"BEGIN ISOLATION LEVEL SERIALIZABLE READ WRITE".to_string())
        );
    }

    #[tokio::test]
    async fn test_isolation_from_tenant_config() {
        let pool = MemoryPool::new(1);
        let config = TenantConfig::builder()
            .isolation(IsolationLevel::Serializable)
            .build()
            .unwrap();
        let store = StaticTenantStore::new().with_tenant("acme", "store_acme");
        let provider = SchemaScopedConnectionProvider::new(pool.clone(), store, &config).unwrap();
        let uow = TenantBoundUnitOfWork::new(provider);
        assert_eq!(uow.transaction_config().isolation, IsolationLevel::Serializable);

        let result: TenancyResult<()> = uow
            .with_tenant("acme", |_lease| Box::pin(async { Ok(()) }))
            .await;
        result.unwrap();

        let log = pool.connection_log(0);
        assert_eq!(log.statements[2], "BEGIN ISOLATION LEVEL SERIALIZABLE READ WRITE");
    }

    #[tokio::test]
    async fn test_nested_unit_of_work_restores_outer_tenant() {
        let pool = MemoryPool::new(2);
        let uow = unit_of_work(&pool);
        let inner = uow.clone();

        let result: TenancyResult<(String, String)> = uow
            .with_tenant("acme", move |_lease| {
                Box::pin(async move {
                    let nested: TenancyResult<String> = inner
                        .with_tenant("store-42", |_lease| {
                            Box::pin(async {
                                Ok(task_local::current_tenant_id().unwrap().into_inner())
                            })
                        })
                        .await;
                    let after = task_local::current_tenant_id().unwrap().into_inner();
                    Ok((nested?, after))
                })
            })
            .await;

        assert_eq!(
            result.unwrap(),
            ("store-42".to_string(), "acme".to_string())
        );
    }

    #[test]
    fn test_state_names() {
        assert_eq!(UnitOfWorkState::TransactionOpen.to_string(), "transaction_open");
        assert_eq!(UnitOfWorkState::ContextCleared.to_string(), "context_cleared");
    }
}
