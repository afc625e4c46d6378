//! Schema-scoped connection leasing.
//!
//! [`SchemaScopedConnectionProvider`] hands out [`ConnectionLease`]s: pooled
//! connections whose `search_path` has been pointed at one tenant's schema.
//! A lease is the only way tenant code reaches a connection, and a lease
//! always resets the connection to the neutral schema before the pool can see
//! it again:
//!
//! - [`ConnectionLease::release`] rolls back any open transaction, resets the
//!   search path and returns the connection.
//! - Dropping a lease without releasing it (early return, panic, a cancelled
//!   future) spawns the same cleanup on the current Tokio runtime.
//! - If the reset fails, or the cleanup itself is cancelled, or there is no
//!   runtime to run it on, the physical connection is discarded.
//!
//! Connections are always bound per lease; aggressive release (giving a
//! connection back between statements) is not supported.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace, warn};

use super::cache::SchemaCache;
use super::config::TenantConfig;
use super::context::TenantId;
use super::resolver::{RequestSignals, TenantIdentifierResolver};
use super::schema::{SchemaLayout, SchemaName};
use super::store::TenantStore;
use crate::connection::{ConnectionSource, PoolStatus, RawConnection};
use crate::error::{TenancyError, TenancyResult};
use crate::transaction::{COMMIT_SQL, ROLLBACK_SQL, TransactionConfig};

/// What to do when the tenant store does not know a tenant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownTenantPolicy {
    /// Warn and hand out a connection bound to the neutral schema.
    #[default]
    #[serde(alias = "fallback")]
    FallbackToDefault,
    /// Fail the lease with a not-resolvable error.
    Reject,
}

/// Leases pooled connections bound to a tenant's schema.
pub struct SchemaScopedConnectionProvider<S: ConnectionSource> {
    source: Arc<S>,
    store: Arc<dyn TenantStore>,
    cache: Arc<SchemaCache>,
    layout: Arc<SchemaLayout>,
    resolver: Arc<TenantIdentifierResolver>,
    unknown_tenant: UnknownTenantPolicy,
    transaction: TransactionConfig,
    reset_sql: Arc<str>,
}

impl<S: ConnectionSource> Clone for SchemaScopedConnectionProvider<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            layout: Arc::clone(&self.layout),
            resolver: Arc::clone(&self.resolver),
            unknown_tenant: self.unknown_tenant,
            transaction: self.transaction.clone(),
            reset_sql: Arc::clone(&self.reset_sql),
        }
    }
}

impl<S: ConnectionSource> fmt::Debug for SchemaScopedConnectionProvider<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaScopedConnectionProvider")
            .field("layout", &self.layout)
            .field("unknown_tenant", &self.unknown_tenant)
            .field("pool", &self.source.status())
            .finish()
    }
}

impl<S: ConnectionSource> SchemaScopedConnectionProvider<S> {
    /// Build a provider from configuration.
    pub fn new<T>(source: S, store: T, config: &TenantConfig) -> TenancyResult<Self>
    where
        T: TenantStore + 'static,
    {
        Self::with_shared(
            Arc::new(source),
            Arc::new(store),
            Arc::new(SchemaCache::new(config.cache_config())),
            config,
        )
    }

    /// Build a provider around an existing pool, store and cache.
    pub fn with_shared(
        source: Arc<S>,
        store: Arc<dyn TenantStore>,
        cache: Arc<SchemaCache>,
        config: &TenantConfig,
    ) -> TenancyResult<Self> {
        let layout = config.layout()?;
        let reset_sql: Arc<str> = layout.reset_sql().into();
        Ok(Self {
            source,
            store,
            cache,
            layout: Arc::new(layout),
            resolver: Arc::new(TenantIdentifierResolver::from_config(config)),
            unknown_tenant: config.unknown_tenant,
            transaction: config.transaction_config(),
            reset_sql,
        })
    }

    /// Replace the resolver chain used by [`Self::lease_current`].
    pub fn with_resolver(mut self, resolver: TenantIdentifierResolver) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Always `false`: a connection stays bound to its lease until release.
    pub fn supports_aggressive_release(&self) -> bool {
        false
    }

    /// The schema cache.
    pub fn cache(&self) -> &SchemaCache {
        &self.cache
    }

    /// Transaction settings from the configuration this provider was built with.
    pub fn transaction_config(&self) -> &TransactionConfig {
        &self.transaction
    }

    /// The schema naming and search path rules.
    pub fn layout(&self) -> &SchemaLayout {
        &self.layout
    }

    /// The resolver chain.
    pub fn resolver(&self) -> &TenantIdentifierResolver {
        &self.resolver
    }

    /// The underlying pool.
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Current pool occupancy.
    pub fn pool_status(&self) -> PoolStatus {
        self.source.status()
    }

    /// The schema for a tenant, through the cache.
    pub async fn schema_for_tenant(&self, tenant_id: &TenantId) -> TenancyResult<Option<SchemaName>> {
        self.cache.get_or_lookup(tenant_id, self.store.as_ref()).await
    }

    /// Lease a connection bound to the neutral schema.
    ///
    /// The connection is reset explicitly rather than trusting the pool.
    pub async fn lease_any(&self) -> TenancyResult<ConnectionLease<S>> {
        let conn = self.source.acquire().await?;
        let mut lease = ConnectionLease {
            conn: Some(conn),
            source: Arc::clone(&self.source),
            tenant_id: None,
            schema: self.layout.neutral.clone(),
            reset_sql: Arc::clone(&self.reset_sql),
            in_transaction: false,
        };

        if let Err(e) = lease.batch_execute(&self.reset_sql).await {
            let neutral = self.layout.neutral.clone();
            lease.discard();
            return Err(TenancyError::schema_switch(neutral.as_str(), e.message.clone()).with_source(e));
        }

        trace!(schema = %self.layout.neutral, "Neutral connection leased");
        Ok(lease)
    }

    /// Give back a lease obtained from [`Self::lease_any`].
    pub async fn release_any(&self, lease: ConnectionLease<S>) -> TenancyResult<()> {
        lease.release().await
    }

    /// Lease a connection bound to `tenant_id`'s schema.
    ///
    /// The schema is looked up before a connection is checked out, so the
    /// store's own connection is never requested while this one is held.
    pub async fn lease(&self, tenant_id: impl Into<TenantId>) -> TenancyResult<ConnectionLease<S>> {
        let tenant_id = tenant_id.into();
        if tenant_id.is_blank() {
            return Err(TenancyError::contract_violation("cannot lease a connection for a blank tenant id"));
        }

        let schema = match self.schema_for_tenant(&tenant_id).await? {
            Some(schema) => schema,
            None => match self.unknown_tenant {
                UnknownTenantPolicy::Reject => {
                    debug!(tenant_id = %tenant_id, "Rejecting lease for unknown tenant");
                    return Err(TenancyError::tenant_not_resolvable(tenant_id.as_str()));
                }
                UnknownTenantPolicy::FallbackToDefault => {
                    warn!(
                        tenant_id = %tenant_id,
                        schema = %self.layout.neutral,
                        "Unknown tenant, using the neutral schema"
                    );
                    let mut lease = self.lease_any().await?;
                    lease.tenant_id = Some(tenant_id);
                    return Ok(lease);
                }
            },
        };

        let mut lease = self.lease_any().await?;
        let sql = self.layout.search_path_sql(&schema);
        if let Err(e) = lease.batch_execute(&sql).await {
            error!(tenant_id = %tenant_id, schema = %schema, error = %e, "Schema switch failed");
            // The failed SET may have left the session in any state.
            let _ = lease.release().await;
            return Err(TenancyError::schema_switch(schema.as_str(), e.message.clone())
                .with_tenant(tenant_id.as_str())
                .with_source(e));
        }

        debug!(tenant_id = %tenant_id, schema = %schema, "Tenant connection leased");
        lease.tenant_id = Some(tenant_id);
        lease.schema = schema;
        Ok(lease)
    }

    /// Give back a tenant lease.
    pub async fn release(&self, lease: ConnectionLease<S>) -> TenancyResult<()> {
        lease.release().await
    }

    /// Resolve the tenant from `signals` and lease a connection for it.
    pub async fn lease_current(&self, signals: &RequestSignals) -> TenancyResult<ConnectionLease<S>> {
        let tenant_id = self.resolver.resolve(signals).await;
        self.lease(tenant_id).await
    }
}

/// A pooled connection bound to one schema for one unit of work.
///
/// Release it with [`ConnectionLease::release`]. If it is dropped instead,
/// cleanup runs in the background.
#[must_use = "a lease holds a pooled connection until it is released"]
pub struct ConnectionLease<S: ConnectionSource> {
    conn: Option<S::Connection>,
    source: Arc<S>,
    tenant_id: Option<TenantId>,
    schema: SchemaName,
    reset_sql: Arc<str>,
    in_transaction: bool,
}

impl<S: ConnectionSource> ConnectionLease<S> {
    /// The tenant this lease was taken for; `None` for neutral leases.
    pub fn tenant_id(&self) -> Option<&TenantId> {
        self.tenant_id.as_ref()
    }

    /// The schema the connection is bound to.
    pub fn schema(&self) -> &SchemaName {
        &self.schema
    }

    /// Whether a transaction opened through this lease is still running.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// The underlying driver connection.
    pub fn connection(&mut self) -> TenancyResult<&mut S::Connection> {
        self.conn
            .as_mut()
            .ok_or_else(|| TenancyError::contract_violation("connection lease already released"))
    }

    /// Run statements on the leased connection.
    pub async fn batch_execute(&mut self, sql: &str) -> TenancyResult<()> {
        self.connection()?.batch_execute(sql).await
    }

    /// Open a transaction.
    pub async fn begin(&mut self, config: &TransactionConfig) -> TenancyResult<()> {
        if self.in_transaction {
            return Err(TenancyError::contract_violation("a transaction is already open on this lease"));
        }
        let mut sql = config.to_begin_sql();
        if let Some(setup) = config.to_setup_sql() {
            sql.push_str("; ");
            sql.push_str(&setup);
        }
        self.batch_execute(&sql)
            .await
            .map_err(|e| TenancyError::transaction(format!("BEGIN failed: {}", e.message)).with_source(e))?;
        self.in_transaction = true;
        Ok(())
    }

    /// Commit the open transaction.
    pub async fn commit(&mut self) -> TenancyResult<()> {
        if !self.in_transaction {
            return Err(TenancyError::contract_violation("no open transaction to commit"));
        }
        self.batch_execute(COMMIT_SQL)
            .await
            .map_err(|e| TenancyError::transaction(format!("COMMIT failed: {}", e.message)).with_source(e))?;
        self.in_transaction = false;
        Ok(())
    }

    /// Roll back the open transaction.
    pub async fn rollback(&mut self) -> TenancyResult<()> {
        if !self.in_transaction {
            return Err(TenancyError::contract_violation("no open transaction to roll back"));
        }
        // Whatever ROLLBACK reports, the transaction is over.
        self.in_transaction = false;
        self.batch_execute(ROLLBACK_SQL)
            .await
            .map_err(|e| TenancyError::transaction(format!("ROLLBACK failed: {}", e.message)).with_source(e))
    }

    /// Reset the connection and return it to the pool.
    ///
    /// If the reset fails the connection is closed and the failure is
    /// returned; the lease is gone either way.
    pub async fn release(mut self) -> TenancyResult<()> {
        match self.reclaim() {
            Some(reclaim) => reclaim.run().await,
            None => Ok(()),
        }
    }

    fn reclaim(&mut self) -> Option<Reclaim<S>> {
        let conn = self.conn.take()?;
        Some(Reclaim {
            conn: Some(conn),
            source: Arc::clone(&self.source),
            reset_sql: Arc::clone(&self.reset_sql),
            in_transaction: std::mem::take(&mut self.in_transaction),
            tenant_id: self.tenant_id.take(),
        })
    }

    fn discard(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.source.discard(conn);
        }
    }
}

impl<S: ConnectionSource> fmt::Debug for ConnectionLease<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionLease")
            .field("tenant_id", &self.tenant_id)
            .field("schema", &self.schema)
            .field("in_transaction", &self.in_transaction)
            .field("released", &self.conn.is_none())
            .finish()
    }
}

impl<S: ConnectionSource> Drop for ConnectionLease<S> {
    fn drop(&mut self) {
        let Some(reclaim) = self.reclaim() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(
                    tenant_id = ?reclaim.tenant_id,
                    "Lease dropped without release, resetting in background"
                );
                handle.spawn(async move {
                    let _ = reclaim.run().await;
                });
            }
            Err(_) => {
                warn!(
                    tenant_id = ?reclaim.tenant_id,
                    "Lease dropped outside a runtime, discarding connection"
                );
                // Reclaim's drop discards the connection.
                drop(reclaim);
            }
        }
    }
}

/// Rollback-reset-return for one connection.
///
/// If this is dropped before finishing, the connection is discarded rather
/// than returned.
struct Reclaim<S: ConnectionSource> {
    conn: Option<S::Connection>,
    source: Arc<S>,
    reset_sql: Arc<str>,
    in_transaction: bool,
    tenant_id: Option<TenantId>,
}

impl<S: ConnectionSource> Reclaim<S> {
    async fn run(mut self) -> TenancyResult<()> {
        let Some(conn) = self.conn.as_mut() else {
            return Ok(());
        };

        if self.in_transaction {
            if let Err(e) = conn.batch_execute(ROLLBACK_SQL).await {
                warn!(tenant_id = ?self.tenant_id, error = %e, "Rollback on release failed");
            }
        }

        match conn.batch_execute(&self.reset_sql).await {
            Ok(()) => {
                // Dropping the driver connection returns it to the pool.
                drop(self.conn.take());
                trace!(tenant_id = ?self.tenant_id, "Connection reset and returned");
                Ok(())
            }
            Err(e) => {
                error!(
                    tenant_id = ?self.tenant_id,
                    error = %e,
                    "Schema reset failed, discarding connection"
                );
                if let Some(conn) = self.conn.take() {
                    self.source.discard(conn);
                }
                let mut err = TenancyError::schema_reset(e.message.clone()).with_source(e);
                if let Some(tenant_id) = &self.tenant_id {
                    err = err.with_tenant(tenant_id.as_str());
                }
                Err(err)
            }
        }
    }
}

impl<S: ConnectionSource> Drop for Reclaim<S> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.source.discard(conn);
        }
    }
}
