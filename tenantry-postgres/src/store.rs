//! Tenant directory backed by a PostgreSQL table.

use std::str::FromStr;

use async_trait::async_trait;
use tenantry_core::tenant::{Tenant, TenantKey, TenantStatus, quote_identifier};
use tenantry_core::{SchemaName, TenancyError, TenancyResult, TenantId, TenantStore};
use tokio_postgres::IsolationLevel;
use tokio_postgres::types::ToSql;
use tracing::debug;
use uuid::Uuid;

use crate::error::{PgError, PgResult};
use crate::pool::PgPool;

/// Where the tenant directory lives.
///
/// The table needs `id uuid`, `key text`, `schema_name text` and
/// `status text` columns. Rows are matched by id or key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantTable {
    schema: String,
    table: String,
}

impl TenantTable {
    /// A table in the given schema. Both names are validated as identifiers.
    pub fn new(schema: &str, table: &str) -> TenancyResult<Self> {
        Ok(Self {
            schema: SchemaName::parse(schema)?.as_str().to_string(),
            table: SchemaName::parse(table)?.as_str().to_string(),
        })
    }

    /// The quoted, schema-qualified table name.
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_identifier(&self.schema), quote_identifier(&self.table))
    }
}

impl Default for TenantTable {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            table: "tenants".to_string(),
        }
    }
}

/// Looks tenants up in a directory table.
///
/// Lookups run in their own short read-only, read-committed transaction on
/// a connection from `pool`. Give the store a pool separate from the one
/// tenant leases come from so lookups never wait behind leased connections.
/// Tenants that are being deleted or are deleted do not resolve.
#[derive(Clone)]
pub struct PgTenantStore {
    pool: PgPool,
    schema_sql: String,
    tenant_sql: String,
}

impl PgTenantStore {
    /// Use `public.tenants` as the directory.
    pub fn new(pool: PgPool) -> Self {
        Self::with_table(pool, TenantTable::default())
    }

    /// Use a custom directory table.
    pub fn with_table(pool: PgPool, table: TenantTable) -> Self {
        let from = format!(
            "FROM {} WHERE (id::text = $1 OR key = $1) AND status NOT IN ('deleting', 'deleted') LIMIT 1",
            table.qualified()
        );
        Self {
            pool,
            schema_sql: format!("SELECT schema_name {}", from),
            tenant_sql: format!("SELECT id, key, schema_name, status {}", from),
        }
    }

    /// The SQL used to find a tenant's schema.
    pub fn lookup_sql(&self) -> &str {
        &self.schema_sql
    }

    /// Load the full tenant record.
    pub async fn find_tenant(&self, tenant_id: &TenantId) -> TenancyResult<Option<Tenant>> {
        let row = self
            .read_one(&self.tenant_sql, &[&tenant_id.as_str()])
            .await
            .map_err(|e| lookup_error(tenant_id, e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: Uuid = row.try_get("id").map_err(PgError::from)?;
        let key: String = row.try_get("key").map_err(PgError::from)?;
        let schema: String = row.try_get("schema_name").map_err(PgError::from)?;
        let status: String = row.try_get("status").map_err(PgError::from)?;

        Ok(Some(Tenant::from_parts(
            id,
            TenantKey::parse(key)?,
            SchemaName::parse(schema)?,
            TenantStatus::from_str(&status)?,
        )))
    }

    async fn read_one(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> PgResult<Option<tokio_postgres::Row>> {
        let mut conn = self.pool.get().await?;
        let txn = conn
            .inner_mut()
            .build_transaction()
            .isolation_level(IsolationLevel::ReadCommitted)
            .read_only(true)
            .start()
            .await?;
        let row = txn.query_opt(sql, params).await?;
        txn.commit().await?;
        Ok(row)
    }
}

fn lookup_error(tenant_id: &TenantId, err: PgError) -> TenancyError {
    let message = err.to_string();
    TenancyError::schema_lookup(tenant_id.as_str(), message).with_source(err)
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn schema_name_for(&self, tenant_id: &TenantId) -> TenancyResult<Option<String>> {
        debug!(tenant_id = %tenant_id, "Looking up tenant schema");
        let row = self
            .read_one(&self.schema_sql, &[&tenant_id.as_str()])
            .await
            .map_err(|e| lookup_error(tenant_id, e))?;

        match row {
            Some(row) => {
                let schema: Option<String> = row
                    .try_get(0)
                    .map_err(|e| lookup_error(tenant_id, PgError::from(e)))?;
                Ok(schema)
            }
            None => Ok(None),
        }
    }
}
