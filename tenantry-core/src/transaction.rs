//! Transaction settings for tenant-bound units of work.
//!
//! Every unit of work opens its own transaction on its own lease; these types
//! only describe how that transaction starts.
//!
//! ```rust
//! use tenantry_core::{IsolationLevel, TransactionConfig};
//!
//! let config = TransactionConfig::new()
//!     .isolation(IsolationLevel::Serializable)
//!     .read_only()
//!     .deferrable();
//!
//! assert_eq!(
//!     config.to_begin_sql(),
//!     "BEGIN ISOLATION LEVEL SERIALIZABLE READ ONLY DEFERRABLE"
//! );
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Statement that commits the open transaction.
pub const COMMIT_SQL: &str = "COMMIT";

/// Statement that aborts the open transaction.
pub const ROLLBACK_SQL: &str = "ROLLBACK";

/// Transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Read uncommitted (PostgreSQL treats it as read committed).
    ReadUncommitted,
    /// Read committed - prevents dirty reads.
    #[default]
    ReadCommitted,
    /// Repeatable read - prevents non-repeatable reads.
    RepeatableRead,
    /// Serializable - highest isolation level.
    Serializable,
}

impl IsolationLevel {
    /// Get the SQL clause for this isolation level.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

/// Access mode for transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Read-write access (default).
    #[default]
    ReadWrite,
    /// Read-only access.
    ReadOnly,
}

impl AccessMode {
    /// Get the SQL clause for this access mode.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadWrite => "READ WRITE",
            Self::ReadOnly => "READ ONLY",
        }
    }
}

/// How a unit of work's transaction begins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionConfig {
    /// Isolation level.
    pub isolation: IsolationLevel,
    /// Access mode.
    pub access_mode: AccessMode,
    /// Statement timeout applied for the duration of the transaction.
    pub statement_timeout: Option<Duration>,
    /// Wait for a safe snapshot before running. Only applies to
    /// SERIALIZABLE READ ONLY transactions; constraint timing is unaffected.
    pub deferrable: bool,
}

impl TransactionConfig {
    /// Create a new transaction config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the isolation level.
    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = level;
        self
    }

    /// Set the access mode.
    pub fn access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }

    /// Limit how long any statement inside the transaction may run.
    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    /// Make the transaction read-only.
    pub fn read_only(self) -> Self {
        self.access_mode(AccessMode::ReadOnly)
    }

    /// Request DEFERRABLE, so a SERIALIZABLE READ ONLY transaction blocks
    /// until it can run without serialization failures. Ignored for any
    /// other isolation level or access mode.
    pub fn deferrable(mut self) -> Self {
        self.deferrable = true;
        self
    }

    /// Generate the BEGIN statement.
    pub fn to_begin_sql(&self) -> String {
        let mut parts = vec!["BEGIN", "ISOLATION LEVEL", self.isolation.as_sql()];
        parts.push(self.access_mode.as_sql());

        // Only meaningful for SERIALIZABLE READ ONLY.
        if self.deferrable
            && self.isolation == IsolationLevel::Serializable
            && self.access_mode == AccessMode::ReadOnly
        {
            parts.push("DEFERRABLE");
        }

        let sql = parts.join(" ");
        debug!(
            isolation = %self.isolation.as_sql(),
            access_mode = %self.access_mode.as_sql(),
            "Transaction BEGIN"
        );
        sql
    }

    /// Statements to run right after BEGIN, if any.
    pub fn to_setup_sql(&self) -> Option<String> {
        self.statement_timeout
            .map(|t| format!("SET LOCAL statement_timeout = {}", t.as_millis()))
    }
}
