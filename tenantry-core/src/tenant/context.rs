//! Tenant context for tracking the current tenant.

use std::fmt;

use uuid::Uuid;

use super::schema::SchemaName;
use crate::error::{TenancyError, TenancyResult};

/// Longest tenant identifier accepted from any transport.
pub const MAX_TENANT_ID_LEN: usize = 128;

/// An opaque tenant identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantId(String);

impl TenantId {
    /// Create a new tenant ID without validation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a tenant ID from untrusted input.
    ///
    /// The value is trimmed and must be 1..=128 characters of ASCII
    /// alphanumerics, `-`, `_` or `.`.
    pub fn parse(raw: &str) -> TenancyResult<Self> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(TenancyError::invalid_tenant_id(raw, "identifier is empty"));
        }
        if value.len() > MAX_TENANT_ID_LEN {
            return Err(TenancyError::invalid_tenant_id(
                raw,
                format!("identifier is longer than {} characters", MAX_TENANT_ID_LEN),
            ));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(TenancyError::invalid_tenant_id(
                raw,
                "identifier contains characters outside [A-Za-z0-9._-]",
            ));
        }
        Ok(Self(value.to_string()))
    }

    /// Get the tenant ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is empty or only whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Convert to the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&TenantId> for TenantId {
    fn from(id: &TenantId) -> Self {
        id.clone()
    }
}

impl From<Uuid> for TenantId {
    fn from(u: Uuid) -> Self {
        Self::new(u.to_string())
    }
}

/// Routing state for one unit of work.
///
/// Holds the active tenant, the schema it resolved to and, when known, the
/// tenant's stable UUID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    /// The tenant identifier.
    pub id: TenantId,
    /// The resolved schema, once the connection provider has looked it up.
    pub schema: Option<SchemaName>,
    /// The tenant's stable UUID, when the caller has it.
    pub tenant_uuid: Option<Uuid>,
}

impl TenantContext {
    /// Create a new tenant context with just an ID.
    pub fn new(id: impl Into<TenantId>) -> Self {
        Self {
            id: id.into(),
            schema: None,
            tenant_uuid: None,
        }
    }

    /// Attach the resolved schema.
    pub fn with_schema(mut self, schema: SchemaName) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Attach the tenant UUID.
    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.tenant_uuid = Some(uuid);
        self
    }

    /// Get the schema for this tenant.
    pub fn schema(&self) -> Option<&SchemaName> {
        self.schema.as_ref()
    }
}
