//! The authoritative tenant directory.

use async_trait::async_trait;

use super::context::TenantId;
use crate::error::TenancyResult;

/// Looks up the schema that holds a tenant's tables.
///
/// Implementations must run the lookup in its own, independent read-committed
/// transaction on a connection of their own. The caller may be in the middle
/// of leasing a connection for a different purpose, and must never see the
/// lookup joined to, or blocked by, that work.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// The raw schema name for `tenant_id`, or `None` if no such tenant is
    /// provisioned.
    ///
    /// The returned name is untrusted; callers validate it before it reaches
    /// SQL.
    async fn schema_name_for(&self, tenant_id: &TenantId) -> TenancyResult<Option<String>>;
}

#[async_trait]
impl<T: TenantStore + ?Sized> TenantStore for std::sync::Arc<T> {
    async fn schema_name_for(&self, tenant_id: &TenantId) -> TenancyResult<Option<String>> {
        (**self).schema_name_for(tenant_id).await
    }
}
