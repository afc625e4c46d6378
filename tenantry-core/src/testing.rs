//! In-memory stand-ins for a database pool and tenant directory.
//!
//! [`MemoryPool`] behaves like a bounded connection pool: checkouts wait
//! when every connection is in use, dropped connections go back to the idle
//! list, and discarded ones are gone for good. Each connection tracks its
//! `search_path` by interpreting `SET search_path` statements, and the pool
//! keeps a [`ConnectionLog`] per connection so tests can see exactly what
//! ran, under which schema, and in what state the connection re-entered the
//! pool.
//!
//! [`StaticTenantStore`] is a map-backed [`TenantStore`] that counts lookups
//! and can be told to fail.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::connection::{ConnectionSource, PoolStatus, RawConnection};
use crate::error::{TenancyError, TenancyResult};
use crate::tenant::{TenantId, TenantStore};

/// Search path of a connection that has never been reset.
pub const INITIAL_SEARCH_PATH: &str = "$user, public";

/// Everything that happened on one pooled connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionLog {
    /// Connection number, in creation order.
    pub id: usize,
    /// Every statement sent, failed ones included.
    pub statements: Vec<String>,
    /// The search path in effect when each statement ran.
    pub active_paths: Vec<String>,
    /// The search path each time the connection went back to the pool.
    pub returned_with: Vec<String>,
    /// Whether the connection was discarded.
    pub discarded: bool,
}

#[derive(Debug)]
struct PoolInner {
    max_size: usize,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<(usize, String)>>,
    logs: Mutex<Vec<ConnectionLog>>,
    failing: RwLock<Vec<String>>,
    yield_on_execute: AtomicBool,
    size: AtomicUsize,
    discarded: AtomicUsize,
}

/// A bounded in-memory connection pool.
#[derive(Debug, Clone)]
pub struct MemoryPool {
    inner: Arc<PoolInner>,
}

impl MemoryPool {
    /// Create a pool that opens at most `max_size` connections.
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                max_size,
                permits: Arc::new(Semaphore::new(max_size)),
                idle: Mutex::new(Vec::new()),
                logs: Mutex::new(Vec::new()),
                failing: RwLock::new(Vec::new()),
                yield_on_execute: AtomicBool::new(false),
                size: AtomicUsize::new(0),
                discarded: AtomicUsize::new(0),
            }),
        }
    }

    /// Fail every statement containing `pattern`.
    pub fn fail_statements_containing(&self, pattern: impl Into<String>) {
        self.inner.failing.write().push(pattern.into());
    }

    /// Stop injecting failures.
    pub fn clear_failures(&self) {
        self.inner.failing.write().clear();
    }

    /// Yield to the scheduler before each statement, to force interleaving.
    pub fn yield_on_execute(&self, enabled: bool) {
        self.inner.yield_on_execute.store(enabled, Ordering::Relaxed);
    }

    /// Log of connection `id`.
    ///
    /// # Panics
    ///
    /// If no connection with that id was ever opened.
    pub fn connection_log(&self, id: usize) -> ConnectionLog {
        self.inner.logs.lock()[id].clone()
    }

    /// Logs of every connection ever opened.
    pub fn connection_logs(&self) -> Vec<ConnectionLog> {
        self.inner.logs.lock().clone()
    }

    /// Connections discarded so far.
    pub fn discarded(&self) -> usize {
        self.inner.discarded.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ConnectionSource for MemoryPool {
    type Connection = MemoryConnection;

    async fn acquire(&self) -> TenancyResult<MemoryConnection> {
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| TenancyError::connection("memory pool closed"))?;

        let reused = self.inner.idle.lock().pop();
        let (id, search_path) = match reused {
            Some(idle) => idle,
            None => {
                let mut logs = self.inner.logs.lock();
                let id = logs.len();
                logs.push(ConnectionLog {
                    id,
                    ..ConnectionLog::default()
                });
                self.inner.size.fetch_add(1, Ordering::Relaxed);
                (id, INITIAL_SEARCH_PATH.to_string())
            }
        };

        Ok(MemoryConnection {
            id,
            search_path,
            pool: Arc::clone(&self.inner),
            discarded: false,
            _permit: permit,
        })
    }

    fn discard(&self, mut conn: MemoryConnection) {
        conn.discarded = true;
        self.inner.logs.lock()[conn.id].discarded = true;
        self.inner.size.fetch_sub(1, Ordering::Relaxed);
        self.inner.discarded.fetch_add(1, Ordering::Relaxed);
    }

    fn status(&self) -> PoolStatus {
        PoolStatus {
            available: self.inner.idle.lock().len(),
            size: self.inner.size.load(Ordering::Relaxed),
            max_size: self.inner.max_size,
            waiting: 0,
        }
    }
}

/// A connection checked out of a [`MemoryPool`].
#[derive(Debug)]
pub struct MemoryConnection {
    id: usize,
    search_path: String,
    pool: Arc<PoolInner>,
    discarded: bool,
    _permit: OwnedSemaphorePermit,
}

impl MemoryConnection {
    /// Connection number.
    pub fn id(&self) -> usize {
        self.id
    }

    /// The search path currently in effect, unquoted.
    pub fn search_path(&self) -> &str {
        &self.search_path
    }
}

fn parse_search_path(sql: &str) -> Option<String> {
    let rest = sql.trim().strip_prefix("SET search_path TO ")?;
    let schemas: Vec<&str> = rest.split(',').map(|s| s.trim().trim_matches('"')).collect();
    Some(schemas.join(", "))
}

#[async_trait]
impl RawConnection for MemoryConnection {
    async fn batch_execute(&mut self, sql: &str) -> TenancyResult<()> {
        if self.pool.yield_on_execute.load(Ordering::Relaxed) {
            tokio::task::yield_now().await;
        }

        {
            let mut logs = self.pool.logs.lock();
            let log = &mut logs[self.id];
            log.statements.push(sql.to_string());
            log.active_paths.push(self.search_path.clone());
        }

        let failing = self
            .pool
            .failing
            .read()
            .iter()
            .any(|pattern| sql.contains(pattern.as_str()));
        if failing {
            return Err(TenancyError::connection(format!("injected failure for '{}'", sql)));
        }

        if let Some(path) = parse_search_path(sql) {
            self.search_path = path;
        }
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        if self.discarded {
            return;
        }
        self.pool.logs.lock()[self.id]
            .returned_with
            .push(self.search_path.clone());
        self.pool
            .idle
            .lock()
            .push((self.id, std::mem::take(&mut self.search_path)));
    }
}

/// A map-backed tenant directory.
#[derive(Debug, Clone, Default)]
pub struct StaticTenantStore {
    schemas: Arc<RwLock<HashMap<String, String>>>,
    lookups: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl StaticTenantStore {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tenant.
    pub fn with_tenant(self, tenant_id: impl Into<String>, schema: impl Into<String>) -> Self {
        self.insert(tenant_id, schema);
        self
    }

    /// Add or replace a tenant.
    pub fn insert(&self, tenant_id: impl Into<String>, schema: impl Into<String>) {
        self.schemas.write().insert(tenant_id.into(), schema.into());
    }

    /// Remove a tenant.
    pub fn remove(&self, tenant_id: &str) {
        self.schemas.write().remove(tenant_id);
    }

    /// Make every lookup fail (or stop failing).
    pub fn fail_lookups(&self, fail: bool) {
        self.failing.store(fail, Ordering::Relaxed);
    }

    /// Lookups served so far, failed ones included.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TenantStore for StaticTenantStore {
    async fn schema_name_for(&self, tenant_id: &TenantId) -> TenancyResult<Option<String>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        if self.failing.load(Ordering::Relaxed) {
            return Err(TenancyError::schema_lookup(
                tenant_id.as_str(),
                "tenant directory unavailable",
            ));
        }
        Ok(self.schemas.read().get(tenant_id.as_str()).cloned())
    }
}
