//! Error types for the PostgreSQL backend.

use tenantry_core::{ErrorCode, TenancyError};
use thiserror::Error;

/// Result type for PostgreSQL operations.
pub type PgResult<T> = Result<T, PgError>;

/// SQLSTATE for `invalid_schema_name`.
const INVALID_SCHEMA_NAME: &str = "3F000";

/// Errors that can occur in the PostgreSQL backend.
#[derive(Error, Debug)]
pub enum PgError {
    /// Connection pool error.
    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// PostgreSQL error.
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Checkout timed out.
    #[error("operation timed out after {0}ms")]
    Timeout(u64),

    /// A row did not have the expected shape.
    #[error("unexpected row: {0}")]
    Row(String),
}

impl PgError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a row shape error.
    pub fn row(message: impl Into<String>) -> Self {
        Self::Row(message.into())
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Pool(_) => true,
            Self::Postgres(e) => e.is_closed(),
            _ => false,
        }
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Pool(deadpool_postgres::PoolError::Timeout(_))
        )
    }

    /// The server's SQLSTATE, if the server reported one.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Self::Postgres(e) => e.code().map(|c| c.code()),
            _ => None,
        }
    }
}

impl From<PgError> for TenancyError {
    fn from(err: PgError) -> Self {
        let message = err.to_string();
        let base = match &err {
            PgError::Pool(deadpool_postgres::PoolError::Timeout(_)) | PgError::Timeout(_) => {
                TenancyError::new(ErrorCode::ConnectionTimeout, message)
                    .with_suggestion("Increase the pool wait timeout or max_connections")
            }
            PgError::Pool(_) => TenancyError::connection(message),
            PgError::Postgres(e) if e.is_closed() => TenancyError::connection(message),
            PgError::Postgres(_) if err.sqlstate() == Some(INVALID_SCHEMA_NAME) => {
                TenancyError::new(ErrorCode::SchemaSwitchFailed, message)
                    .with_suggestion("Check that the tenant schema has been provisioned")
            }
            PgError::Postgres(_) => TenancyError::query(message),
            PgError::Config(_) => TenancyError::config(message),
            PgError::Row(_) => TenancyError::internal(message),
        };
        base.with_source(err)
    }
}
