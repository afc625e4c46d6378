//! PostgreSQL connection wrapper.

use async_trait::async_trait;
use deadpool_postgres::Object;
use tenantry_core::{RawConnection, TenancyResult};
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;
use tracing::debug;

use crate::error::PgResult;

/// A pooled PostgreSQL connection.
///
/// Statements are prepared per call. A prepared plan keeps the tables it
/// resolved through the `search_path` in effect when it was prepared, so
/// reusing one across leases would read another tenant's tables.
pub struct PgConnection {
    client: Object,
}

impl PgConnection {
    pub(crate) fn new(client: Object) -> Self {
        Self { client }
    }

    /// Execute a query and return all rows.
    pub async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> PgResult<Vec<Row>> {
        debug!(sql = %sql, "Executing query");
        Ok(self.client.query(sql, params).await?)
    }

    /// Execute a query and return exactly one row.
    pub async fn query_one(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> PgResult<Row> {
        debug!(sql = %sql, "Executing query_one");
        Ok(self.client.query_one(sql, params).await?)
    }

    /// Execute a query and return zero or one row.
    pub async fn query_opt(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> PgResult<Option<Row>> {
        debug!(sql = %sql, "Executing query_opt");
        Ok(self.client.query_opt(sql, params).await?)
    }

    /// Execute a statement and return the number of affected rows.
    pub async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> PgResult<u64> {
        debug!(sql = %sql, "Executing statement");
        Ok(self.client.execute(sql, params).await?)
    }

    /// Execute a batch of statements in a single round-trip.
    pub async fn batch_execute(&self, sql: &str) -> PgResult<()> {
        debug!(sql = %sql, "Executing batch");
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    /// Whether the server side of the connection has gone away.
    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    /// The underlying pooled client.
    pub fn inner(&self) -> &Object {
        &self.client
    }

    pub(crate) fn inner_mut(&mut self) -> &mut Object {
        &mut self.client
    }

    pub(crate) fn into_inner(self) -> Object {
        self.client
    }
}

#[async_trait]
impl RawConnection for PgConnection {
    async fn batch_execute(&mut self, sql: &str) -> TenancyResult<()> {
        PgConnection::batch_execute(self, sql).await.map_err(Into::into)
    }
}
