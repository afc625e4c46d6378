//! Unit-of-work scoped tenant context using task-local storage.
//!
//! Each unit of work enters its own slot with [`scope`] (empty) or
//! [`with_tenant_context`] (pre-populated). Inside the slot the context can be
//! read and replaced; when the scoped future finishes, panics or is dropped,
//! Tokio restores whatever slot was active before, so a context can never leak
//! into the next unit of work that reuses the worker thread.
//!
//! # Example
//!
//! ```rust
//! use tenantry_core::tenant::task_local::{self, current_tenant_id};
//!
//! # tokio_test_block_on(async {
//! task_local::scope(async {
//!     task_local::set_current("store-42").unwrap();
//!     assert_eq!(current_tenant_id().unwrap().as_str(), "store-42");
//!     task_local::clear();
//!     assert!(current_tenant_id().is_none());
//! })
//! .await;
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```
//!
//! Blocking code paths that never touch an async runtime can use the
//! thread-local variant ([`set_sync_tenant`]), which restores the previous
//! value when its guard drops.

use std::cell::RefCell;
use std::future::Future;

use uuid::Uuid;

use super::context::{TenantContext, TenantId};
use super::schema::SchemaName;
use crate::error::{TenancyError, TenancyResult};

tokio::task_local! {
    /// The active unit of work's tenant slot.
    static TENANT_SLOT: RefCell<Option<TenantContext>>;
}

thread_local! {
    /// Thread-local tenant ID for sync code paths.
    static SYNC_TENANT_ID: RefCell<Option<TenantId>> = const { RefCell::new(None) };
}

/// Run `f` inside a fresh, empty tenant slot.
pub async fn scope<F>(f: F) -> F::Output
where
    F: Future,
{
    TENANT_SLOT.scope(RefCell::new(None), f).await
}

/// Run `f` inside a slot that already holds `ctx`.
pub async fn with_tenant_context<F>(ctx: TenantContext, f: F) -> F::Output
where
    F: Future,
{
    TENANT_SLOT.scope(RefCell::new(Some(ctx)), f).await
}

/// Whether the caller is inside a unit-of-work slot.
#[inline]
pub fn in_scope() -> bool {
    TENANT_SLOT.try_with(|_| ()).is_ok()
}

/// Make `tenant_id` the active tenant, discarding any schema resolved for a
/// previous tenant.
///
/// Fails with a contract violation outside a slot: there is no unit of work
/// to bind the tenant to.
pub fn set_current(tenant_id: impl Into<TenantId>) -> TenancyResult<()> {
    let tenant_id = tenant_id.into();
    TENANT_SLOT
        .try_with(|slot| {
            *slot.borrow_mut() = Some(TenantContext::new(tenant_id.clone()));
        })
        .map_err(|_| {
            TenancyError::contract_violation(
                "set_current called outside a tenant scope; wrap the unit of work in task_local::scope",
            )
            .with_tenant(tenant_id.as_str())
        })
}

/// Record the schema resolved for the active tenant.
pub fn set_schema(schema: SchemaName) -> TenancyResult<()> {
    update_context(|ctx| ctx.schema = Some(schema))
}

/// Record the active tenant's UUID.
pub fn set_tenant_uuid(uuid: Uuid) -> TenancyResult<()> {
    update_context(|ctx| ctx.tenant_uuid = Some(uuid))
}

fn update_context(f: impl FnOnce(&mut TenantContext)) -> TenancyResult<()> {
    TENANT_SLOT
        .try_with(|slot| match slot.borrow_mut().as_mut() {
            Some(ctx) => {
                f(ctx);
                Ok(())
            }
            None => Err(TenancyError::contract_violation(
                "no current tenant; call set_current first",
            )),
        })
        .map_err(|_| TenancyError::contract_violation("called outside a tenant scope"))?
}

/// Get the current tenant context if set.
#[inline]
pub fn current_context() -> Option<TenantContext> {
    TENANT_SLOT
        .try_with(|slot| slot.borrow().clone())
        .ok()
        .flatten()
}

/// Get the current tenant ID if set.
#[inline]
pub fn current_tenant_id() -> Option<TenantId> {
    TENANT_SLOT
        .try_with(|slot| slot.borrow().as_ref().map(|ctx| ctx.id.clone()))
        .ok()
        .flatten()
}

/// Get the schema resolved for the current tenant, if any.
#[inline]
pub fn current_schema() -> Option<SchemaName> {
    TENANT_SLOT
        .try_with(|slot| slot.borrow().as_ref().and_then(|ctx| ctx.schema.clone()))
        .ok()
        .flatten()
}

/// Check if a tenant is currently set.
#[inline]
pub fn has_tenant() -> bool {
    current_tenant_id().is_some()
}

/// Require a tenant, returning a contract violation if none is set.
pub fn require_tenant() -> TenancyResult<TenantId> {
    current_tenant_id()
        .ok_or_else(|| TenancyError::contract_violation("tenant context required but not set"))
}

/// Empty the current slot. Idempotent, and a no-op outside a slot.
pub fn clear() {
    let _ = TENANT_SLOT.try_with(|slot| {
        slot.borrow_mut().take();
    });
}

/// Clears the current slot when dropped.
///
/// Created by [`ContextGuard::enter`]; holding one across the body of a unit
/// of work guarantees the clear also happens on early return and unwinding.
#[derive(Debug)]
#[must_use = "the context is cleared as soon as the guard is dropped"]
pub struct ContextGuard {
    tenant_id: TenantId,
}

impl ContextGuard {
    /// Set the current tenant and return a guard that clears it.
    pub fn enter(tenant_id: impl Into<TenantId>) -> TenancyResult<Self> {
        let tenant_id = tenant_id.into();
        set_current(tenant_id.clone())?;
        Ok(Self { tenant_id })
    }

    /// The tenant this guard set.
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        clear();
        tracing::trace!(tenant_id = %self.tenant_id, "Tenant context cleared");
    }
}

// ============================================================================
// Sync Context (Thread-Local)
// ============================================================================

/// Set the tenant ID for synchronous code on the current thread.
///
/// The previous value is restored when the guard is dropped.
pub fn set_sync_tenant(tenant_id: impl Into<TenantId>) -> SyncTenantGuard {
    let id = tenant_id.into();
    let previous = SYNC_TENANT_ID.with(|cell| cell.replace(Some(id)));
    SyncTenantGuard { previous }
}

/// Get the current sync tenant ID.
#[inline]
pub fn sync_tenant_id() -> Option<TenantId> {
    SYNC_TENANT_ID.with(|cell| cell.borrow().clone())
}

/// Guard that resets the sync tenant when dropped.
#[derive(Debug)]
#[must_use = "the sync tenant is restored as soon as the guard is dropped"]
pub struct SyncTenantGuard {
    previous: Option<TenantId>,
}

impl Drop for SyncTenantGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        SYNC_TENANT_ID.with(|cell| *cell.borrow_mut() = previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_tenant_outside_scope() {
        assert!(!in_scope());
        assert!(current_tenant_id().is_none());
        assert!(current_schema().is_none());
        clear();
        assert!(set_current("store-1").unwrap_err().is_contract_violation());
    }

    #[tokio::test]
    async fn test_set_and_clear() {
        scope(async {
            assert!(in_scope());
            assert!(!has_tenant());

            set_current("store-1").unwrap();
            set_schema(SchemaName::parse("store_store_1").unwrap()).unwrap();
            assert_eq!(current_tenant_id().unwrap().as_str(), "store-1");
            assert_eq!(current_schema().unwrap().as_str(), "store_store_1");

            clear();
            clear();
            assert!(current_tenant_id().is_none());
            assert!(current_schema().is_none());
        })
        .await;
    }

    #[tokio::test]
    async fn test_switching_tenant_drops_old_schema() {
        scope(async {
            set_current("a").unwrap();
            set_schema(SchemaName::parse("store_a").unwrap()).unwrap();
            set_current("b").unwrap();
            assert_eq!(current_tenant_id().unwrap().as_str(), "b");
            assert!(current_schema().is_none());
        })
        .await;
    }

    #[tokio::test]
    async fn test_set_schema_requires_tenant() {
        scope(async {
            let err = set_schema(SchemaName::parse("store_a").unwrap()).unwrap_err();
            assert!(err.is_contract_violation());
        })
        .await;
    }

    #[tokio::test]
    async fn test_nested_scopes_restore() {
        with_tenant_context(TenantContext::new("outer"), async {
            assert_eq!(current_tenant_id().unwrap().as_str(), "outer");

            scope(async {
                assert!(current_tenant_id().is_none());
                set_current("inner").unwrap();
                assert_eq!(current_tenant_id().unwrap().as_str(), "inner");
            })
            .await;

            assert_eq!(current_tenant_id().unwrap().as_str(), "outer");
        })
        .await;
        assert!(current_tenant_id().is_none());
    }

    #[tokio::test]
    async fn test_guard_clears_on_drop() {
        scope(async {
            {
                let guard = ContextGuard::enter("store-9").unwrap();
                assert_eq!(guard.tenant_id().as_str(), "store-9");
                assert!(has_tenant());
            }
            assert!(!has_tenant());
        })
        .await;
    }

    #[tokio::test]
    async fn test_spawned_tasks_do_not_inherit() {
        scope(async {
            set_current("parent").unwrap();
            let seen = tokio::spawn(async { current_tenant_id() }).await.unwrap();
            assert!(seen.is_none());
        })
        .await;
    }

    #[test]
    fn test_sync_tenant() {
        {
            let _outer = set_sync_tenant("sync-a");
            {
                let _inner = set_sync_tenant("sync-b");
                assert_eq!(sync_tenant_id().unwrap().as_str(), "sync-b");
            }
            assert_eq!(sync_tenant_id().unwrap().as_str(), "sync-a");
        }
        assert!(sync_tenant_id().is_none());
    }
}
