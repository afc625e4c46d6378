//! Error types for tenant routing with actionable messages.
//!
//! Every error carries an [`ErrorCode`] for programmatic handling plus an
//! optional [`ErrorContext`] with suggestions and help text.
//!
//! # Error Codes
//!
//! Error codes follow a pattern: T{category}{number}
//! - 1xxx: Tenant resolution (identifier missing or malformed)
//! - 2xxx: Schema lookup, switch and reset
//! - 3xxx: Connection and pool errors
//! - 4xxx: Transaction errors
//! - 5xxx: Contract violations (programming errors)
//! - 6xxx: Statement errors reported by the database
//! - 7xxx: Configuration errors
//! - 9xxx: Internal errors
//!
//! ```rust
//! use tenantry_core::{ErrorCode, TenancyError};
//!
//! let err = TenancyError::tenant_not_resolvable("store-42");
//! assert_eq!(err.code, ErrorCode::TenantNotResolvable);
//! assert_eq!(err.code.code(), "T2002");
//! ```
//!
//! # Propagation
//!
//! Resolution failures never leave the resolver chain; they are recovered by
//! falling back to the default tenant. Connection-level failures
//! ([`TenancyError::is_connection_error`], schema switch and reset failures)
//! always abort the current unit of work. Nothing here retries.

use std::fmt;
use thiserror::Error;

/// Result type for tenant routing operations.
pub type TenancyResult<T> = Result<T, TenancyError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Resolution errors (1xxx)
    /// No strategy produced a tenant (T1001).
    ResolutionFailed = 1001,
    /// Tenant identifier is empty or malformed (T1002).
    InvalidTenantId = 1002,

    // Schema errors (2xxx)
    /// The tenant store lookup itself failed (T2001).
    SchemaLookupFailed = 2001,
    /// The tenant has no schema mapping (T2002).
    TenantNotResolvable = 2002,
    /// Switching the connection to the tenant schema failed (T2003).
    SchemaSwitchFailed = 2003,
    /// Resetting the connection to the neutral schema failed (T2004).
    SchemaResetFailed = 2004,
    /// Schema or tenant key failed identifier validation (T2005).
    InvalidIdentifier = 2005,

    // Connection errors (3xxx)
    /// Database connection failed (T3001).
    ConnectionFailed = 3001,
    /// Connection pool exhausted (T3002).
    PoolExhausted = 3002,
    /// Connection checkout timed out (T3003).
    ConnectionTimeout = 3003,

    // Transaction errors (4xxx)
    /// Begin, commit or rollback failed (T4001).
    TransactionFailed = 4001,

    // Contract errors (5xxx)
    /// A caller broke the API contract (T5001).
    ContractViolation = 5001,
    /// Invalid tenant lifecycle transition (T5002).
    InvalidTransition = 5002,

    // Statement errors (6xxx)
    /// A tenant statement failed on the server (T6001).
    QueryFailed = 6001,

    // Configuration errors (7xxx)
    /// Invalid configuration (T7001).
    InvalidConfiguration = 7001,
    /// Missing configuration (T7002).
    MissingConfiguration = 7002,

    // Internal errors (9xxx)
    /// Internal error (T9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "T2003").
    pub fn code(&self) -> String {
        format!("T{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::ResolutionFailed => "Tenant resolution failed",
            Self::InvalidTenantId => "Invalid tenant identifier",
            Self::SchemaLookupFailed => "Schema lookup failed",
            Self::TenantNotResolvable => "Tenant not resolvable",
            Self::SchemaSwitchFailed => "Schema switch failed",
            Self::SchemaResetFailed => "Schema reset failed",
            Self::InvalidIdentifier => "Invalid identifier",
            Self::ConnectionFailed => "Database connection failed",
            Self::PoolExhausted => "Connection pool exhausted",
            Self::ConnectionTimeout => "Connection timeout",
            Self::TransactionFailed => "Transaction failed",
            Self::ContractViolation => "Contract violation",
            Self::InvalidTransition => "Invalid tenant status transition",
            Self::QueryFailed => "Statement failed",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::MissingConfiguration => "Missing configuration",
            Self::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation that was being performed.
    pub operation: Option<String>,
    /// The tenant involved.
    pub tenant_id: Option<String>,
    /// The schema involved.
    pub schema: Option<String>,
    /// Suggestions for fixing the error.
    pub suggestions: Vec<String>,
    /// Help text.
    pub help: Option<String>,
}

/// Errors raised by the routing layer.
#[derive(Error, Debug)]
pub struct TenancyError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any).
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for TenancyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl TenancyError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add context about the operation.
    pub fn with_context(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Record the tenant the error relates to.
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.context.tenant_id = Some(tenant_id.into());
        self
    }

    /// Record the schema the error relates to.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.context.schema = Some(schema.into());
        self
    }

    /// Add a suggestion for fixing the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context.suggestions.push(suggestion.into());
        self
    }

    /// Add help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.context.help = Some(help.into());
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// Create an invalid tenant identifier error.
    pub fn invalid_tenant_id(value: impl Into<String>, reason: impl Into<String>) -> Self {
        let value = value.into();
        Self::new(
            ErrorCode::InvalidTenantId,
            format!("Invalid tenant identifier '{}': {}", value, reason.into()),
        )
        .with_tenant(value)
    }

    /// Create a schema lookup failure (the store itself failed).
    pub fn schema_lookup(tenant_id: impl Into<String>, message: impl Into<String>) -> Self {
        let tenant_id = tenant_id.into();
        Self::new(
            ErrorCode::SchemaLookupFailed,
            format!("Schema lookup for tenant '{}' failed: {}", tenant_id, message.into()),
        )
        .with_tenant(tenant_id)
        .with_suggestion("Check that the tenant directory is reachable")
    }

    /// Create a tenant-not-resolvable error (no schema mapping exists).
    pub fn tenant_not_resolvable(tenant_id: impl Into<String>) -> Self {
        let tenant_id = tenant_id.into();
        Self::new(
            ErrorCode::TenantNotResolvable,
            format!("Tenant '{}' has no schema mapping", tenant_id),
        )
        .with_tenant(tenant_id)
        .with_suggestion("Verify the tenant has been provisioned and is not deleted")
    }

    /// Create a schema switch failure.
    pub fn schema_switch(schema: impl Into<String>, message: impl Into<String>) -> Self {
        let schema = schema.into();
        Self::new(
            ErrorCode::SchemaSwitchFailed,
            format!("Failed to switch connection to schema '{}': {}", schema, message.into()),
        )
        .with_schema(schema)
        .with_help("The connection was returned to the pool in its neutral state")
    }

    /// Create a schema reset failure.
    pub fn schema_reset(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::SchemaResetFailed,
            format!("Failed to reset connection schema: {}", message.into()),
        )
        .with_help("The connection was discarded instead of being returned to the pool")
    }

    /// Create an invalid identifier error.
    pub fn invalid_identifier(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InvalidIdentifier,
            format!("Invalid identifier '{}': {}", value.into(), reason.into()),
        )
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ConnectionFailed,
            format!("Connection error: {}", message.into()),
        )
        .with_suggestion("Check that the database server is running")
        .with_suggestion("Verify the connection URL is correct")
    }

    /// Create a connection timeout error.
    pub fn connection_timeout(duration_ms: u64) -> Self {
        Self::new(
            ErrorCode::ConnectionTimeout,
            format!("Connection checkout timed out after {}ms", duration_ms),
        )
        .with_suggestion("Increase the pool wait timeout")
    }

    /// Create a pool exhausted error.
    pub fn pool_exhausted(max_connections: usize) -> Self {
        Self::new(
            ErrorCode::PoolExhausted,
            format!("Connection pool exhausted (max {} connections)", max_connections),
        )
        .with_suggestion("Increase max_connections in pool configuration")
        .with_suggestion("Ensure leases are being released")
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::TransactionFailed,
            format!("Transaction error: {}", message.into()),
        )
    }

    /// Create a contract violation.
    pub fn contract_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ContractViolation, message.into())
            .with_help("This is a programming error in the caller and is not retryable")
    }

    /// Create an invalid status transition error.
    pub fn invalid_transition(from: impl fmt::Display, to: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::InvalidTransition,
            format!("Tenant cannot move from {} to {}", from, to),
        )
    }

    /// Create a statement failure.
    pub fn query(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::QueryFailed,
            format!("Statement failed: {}", message.into()),
        )
    }

    /// Create an invalid configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message.into())
    }

    /// Create a missing configuration error.
    pub fn missing_config(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::new(
            ErrorCode::MissingConfiguration,
            format!("Missing required configuration: {}", key),
        )
        .with_suggestion(format!("Set {} in the environment or config file", key))
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, format!("Internal error: {}", message.into()))
    }

    // ============== Error Checks ==============

    /// Check if this error means the tenant has no schema.
    pub fn is_not_resolvable(&self) -> bool {
        self.code == ErrorCode::TenantNotResolvable
    }

    /// Check if this is a contract violation.
    pub fn is_contract_violation(&self) -> bool {
        self.code == ErrorCode::ContractViolation
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        self.code == ErrorCode::ConnectionTimeout
    }

    /// Check if this error concerns the physical connection.
    ///
    /// These are never recovered silently; the unit of work must abort.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::ConnectionFailed
                | ErrorCode::PoolExhausted
                | ErrorCode::ConnectionTimeout
                | ErrorCode::SchemaSwitchFailed
                | ErrorCode::SchemaResetFailed
        )
    }

    /// Display the full error with all context and suggestions.
    pub fn display_full(&self) -> String {
        let mut output = format!("Error [{}]: {}\n", self.code.code(), self.message);

        if let Some(ref op) = self.context.operation {
            output.push_str(&format!("  → While: {}\n", op));
        }
        if let Some(ref tenant) = self.context.tenant_id {
            output.push_str(&format!("  → Tenant: {}\n", tenant));
        }
        if let Some(ref schema) = self.context.schema {
            output.push_str(&format!("  → Schema: {}\n", schema));
        }

        if !self.context.suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for (i, suggestion) in self.context.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        if let Some(ref help) = self.context.help {
            output.push_str(&format!("\nHelp: {}\n", help));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::ResolutionFailed.code(), "T1001");
        assert_eq!(ErrorCode::SchemaSwitchFailed.code(), "T2003");
        assert_eq!(ErrorCode::ContractViolation.code(), "T5001");
    }

    #[test]
    fn test_not_resolvable() {
        let err = TenancyError::tenant_not_resolvable("store-42");
        assert!(err.is_not_resolvable());
        assert!(!err.is_connection_error());
        assert_eq!(err.context.tenant_id.as_deref(), Some("store-42"));
        assert!(err.to_string().starts_with("[T2002]"));
    }

    #[test]
    fn test_connection_level_errors() {
        assert!(TenancyError::schema_switch("store_acme", "boom").is_connection_error());
        assert!(TenancyError::schema_reset("boom").is_connection_error());
        assert!(TenancyError::pool_exhausted(10).is_connection_error());
        assert!(!TenancyError::contract_violation("no tenant").is_connection_error());
    }

    #[test]
    fn test_display_full() {
        let err = TenancyError::schema_switch("store_acme", "schema does not exist")
            .with_tenant("acme")
            .with_context("leasing connection");

        let output = err.display_full();
        assert!(output.contains("T2003"));
        assert!(output.contains("Tenant: acme"));
        assert!(output.contains("Schema: store_acme"));
        assert!(output.contains("leasing connection"));
    }

    #[test]
    fn test_source_is_kept() {
        let io = std::io::Error::other("socket closed");
        let err = TenancyError::connection("checkout failed").with_source(io);
        assert!(std::error::Error::source(&err).is_some());
    }
}
