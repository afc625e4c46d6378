//! Tenant-to-schema cache.
//!
//! [`SchemaCache`] remembers which schema each tenant lives in so the
//! directory lookup happens once per tenant rather than once per lease.
//!
//! - Entries may carry a TTL; without one they live until invalidated.
//! - Unknown tenants are never cached, so a tenant provisioned after a failed
//!   lookup becomes visible on the very next call.
//! - The map lock is never held while the store is queried.
//! - A lookup that was already running when `invalidate` or
//!   `invalidate_all` was called does not write its answer back.
//!
//! # Example
//!
//! ```rust,ignore
//! use tenantry_core::tenant::{SchemaCache, CacheConfig};
//!
//! let cache = SchemaCache::new(CacheConfig::default().with_ttl(Duration::from_secs(300)));
//! let schema = cache.get_or_lookup(&"store-42".into(), &store).await?;
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::context::TenantId;
use super::schema::SchemaName;
use super::store::TenantStore;
use crate::error::{TenancyError, TenancyResult};

/// Configuration for the schema cache.
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    /// Time-to-live for cached entries; `None` keeps them until invalidated.
    pub ttl: Option<Duration>,
}

impl CacheConfig {
    /// Expire entries after `ttl`.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    schema: SchemaName,
    inserted_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.is_some_and(|ttl| self.inserted_at.elapsed() >= ttl)
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    lookups: AtomicU64,
    invalidations: AtomicU64,
}

/// Snapshot of cache activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    /// Answers served from the map.
    pub hits: u64,
    /// Calls that found nothing (or an expired entry).
    pub misses: u64,
    /// Calls made to the tenant store.
    pub lookups: u64,
    /// Entries removed by `invalidate` / `invalidate_all`.
    pub invalidations: u64,
    /// Entries currently held.
    pub entries: usize,
}

impl CacheMetrics {
    /// Fraction of calls answered from the map.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Concurrent tenant ID to schema name map.
#[derive(Debug, Default)]
pub struct SchemaCache {
    config: CacheConfig,
    entries: RwLock<HashMap<TenantId, CacheEntry>>,
    // Bumped under the write lock by every invalidation.
    epoch: AtomicU64,
    counters: Counters,
}

impl SchemaCache {
    /// Create a cache.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            epoch: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    /// The cached schema for `tenant_id`, without consulting the store.
    pub fn schema_for(&self, tenant_id: &TenantId) -> Option<SchemaName> {
        let found = {
            let entries = self.entries.read();
            entries
                .get(tenant_id)
                .filter(|e| !e.is_expired(self.config.ttl))
                .map(|e| e.schema.clone())
        };

        if found.is_some() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// The schema for `tenant_id`, asking `store` on a miss.
    ///
    /// `Ok(None)` means the store does not know the tenant; nothing is
    /// cached in that case. A name that is not a valid identifier is
    /// reported as a schema switch failure and never cached.
    pub async fn get_or_lookup(
        &self,
        tenant_id: &TenantId,
        store: &dyn TenantStore,
    ) -> TenancyResult<Option<SchemaName>> {
        if let Some(schema) = self.schema_for(tenant_id) {
            trace!(tenant_id = %tenant_id, schema = %schema, "Schema cache hit");
            return Ok(Some(schema));
        }

        self.counters.lookups.fetch_add(1, Ordering::Relaxed);
        let epoch = self.epoch.load(Ordering::Acquire);
        let raw = store
            .schema_name_for(tenant_id)
            .await
            .map_err(|e| e.with_tenant(tenant_id.as_str()))?;

        let Some(raw) = raw else {
            debug!(tenant_id = %tenant_id, "Tenant not found in store");
            return Ok(None);
        };

        let schema = SchemaName::parse(raw.clone()).map_err(|e| {
            TenancyError::schema_switch(raw, "tenant store returned an invalid schema name")
                .with_tenant(tenant_id.as_str())
                .with_source(e)
        })?;

        if self.insert_if_current(tenant_id, &schema, epoch) {
            debug!(tenant_id = %tenant_id, schema = %schema, "Schema cached");
        } else {
            debug!(
                tenant_id = %tenant_id,
                schema = %schema,
                "Cache invalidated during lookup, answer not cached"
            );
        }
        Ok(Some(schema))
    }

    fn insert_if_current(&self, tenant_id: &TenantId, schema: &SchemaName, epoch: u64) -> bool {
        let mut entries = self.entries.write();
        if self.epoch.load(Ordering::Acquire) != epoch {
            return false;
        }
        entries.insert(
            tenant_id.clone(),
            CacheEntry {
                schema: schema.clone(),
                inserted_at: Instant::now(),
            },
        );
        true
    }

    /// Store a mapping, replacing any previous one.
    pub fn insert(&self, tenant_id: TenantId, schema: SchemaName) {
        self.entries.write().insert(
            tenant_id,
            CacheEntry {
                schema,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Forget one tenant. The next lookup goes to the store.
    pub fn invalidate(&self, tenant_id: &TenantId) {
        let removed = {
            let mut entries = self.entries.write();
            self.epoch.fetch_add(1, Ordering::AcqRel);
            entries.remove(tenant_id)
        };
        if removed.is_some() {
            self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
            debug!(tenant_id = %tenant_id, "Schema cache entry invalidated");
        }
    }

    /// Forget every tenant.
    pub fn invalidate_all(&self) {
        let removed = {
            let mut entries = self.entries.write();
            self.epoch.fetch_add(1, Ordering::AcqRel);
            let n = entries.len();
            entries.clear();
            n
        };
        self.counters
            .invalidations
            .fetch_add(removed as u64, Ordering::Relaxed);
        debug!(removed, "Schema cache cleared");
    }

    /// Number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Current counters.
    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            lookups: self.counters.lookups.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}
