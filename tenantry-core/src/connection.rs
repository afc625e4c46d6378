//! The driver seam.
//!
//! The routing layer never talks to a database driver directly. A backend
//! provides a [`ConnectionSource`] (the pool) handing out
//! [`RawConnection`]s; dropping a raw connection returns it to its pool,
//! and [`ConnectionSource::discard`] closes it instead.
//!
//! `tenantry-postgres` implements both for `deadpool-postgres`;
//! [`crate::testing::MemoryPool`] implements them in memory.

use async_trait::async_trait;

use crate::error::TenancyResult;

/// A physical connection checked out of a pool.
#[async_trait]
pub trait RawConnection: Send + 'static {
    /// Run one or more statements without parameters or results.
    async fn batch_execute(&mut self, sql: &str) -> TenancyResult<()>;
}

/// A pool of physical connections.
#[async_trait]
pub trait ConnectionSource: Send + Sync + 'static {
    /// The connection type handed out.
    type Connection: RawConnection;

    /// Check out a connection.
    async fn acquire(&self) -> TenancyResult<Self::Connection>;

    /// Close a connection instead of returning it to the pool.
    fn discard(&self, conn: Self::Connection);

    /// Current pool occupancy.
    fn status(&self) -> PoolStatus;
}

/// Pool status information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of available (idle) connections.
    pub available: usize,
    /// Current total size of the pool.
    pub size: usize,
    /// Maximum size of the pool.
    pub max_size: usize,
    /// Number of tasks waiting for a connection.
    pub waiting: usize,
}

impl PoolStatus {
    /// Connections currently checked out.
    pub fn in_use(&self) -> usize {
        self.size.saturating_sub(self.available)
    }
}
