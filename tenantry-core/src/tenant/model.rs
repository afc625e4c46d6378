//! The provisioned tenant record.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::TenantId;
use super::schema::{SchemaLayout, SchemaName};
use crate::error::{TenancyError, TenancyResult};

/// A store's human-readable slug.
///
/// 2..=63 characters of lowercase ASCII letters, digits and `-`, not starting
/// or ending with `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantKey(String);

impl TenantKey {
    /// Validate a tenant key.
    pub fn parse(raw: impl Into<String>) -> TenancyResult<Self> {
        let raw = raw.into();
        let valid = (2..=63).contains(&raw.len())
            && raw
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !raw.starts_with('-')
            && !raw.ends_with('-');
        if !valid {
            return Err(TenancyError::invalid_identifier(
                raw,
                "tenant keys are 2-63 chars of [a-z0-9-] without leading or trailing '-'",
            ));
        }
        Ok(Self(raw))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TenantKey {
    type Error = TenancyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TenantKey> for String {
    fn from(key: TenantKey) -> Self {
        key.0
    }
}

/// Lifecycle of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    /// Provisioning has started.
    #[default]
    Pending,
    /// Serving traffic.
    Active,
    /// Temporarily disabled.
    Suspended,
    /// Teardown in progress.
    Deleting,
    /// Gone.
    Deleted,
}

impl TenantStatus {
    /// Whether moving to `next` is a legal lifecycle step.
    pub fn can_transition_to(self, next: TenantStatus) -> bool {
        use TenantStatus::*;
        matches!(
            (self, next),
            (Pending, Active)
                | (Active, Suspended)
                | (Suspended, Active)
                | (Pending | Active | Suspended, Deleting)
                | (Deleting, Deleted)
        )
    }

    /// The lowercase name used in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TenantStatus {
    type Err = TenancyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "deleting" => Ok(Self::Deleting),
            "deleted" => Ok(Self::Deleted),
            other => Err(TenancyError::config(format!("unknown tenant status '{}'", other))),
        }
    }
}

/// A provisioned store.
///
/// The schema name is computed once from the key and never changes; status
/// transitions are the only mutation after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    id: Uuid,
    key: TenantKey,
    schema: SchemaName,
    status: TenantStatus,
}

impl Tenant {
    /// Create a pending tenant, deriving its schema from the key.
    pub fn provision(key: TenantKey, layout: &SchemaLayout) -> TenancyResult<Self> {
        let schema = layout.schema_name(key.as_str())?;
        Ok(Self {
            id: Uuid::new_v4(),
            key,
            schema,
            status: TenantStatus::Pending,
        })
    }

    /// Rebuild a tenant from stored fields.
    pub fn from_parts(id: Uuid, key: TenantKey, schema: SchemaName, status: TenantStatus) -> Self {
        Self {
            id,
            key,
            schema,
            status,
        }
    }

    /// Stable identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Human key.
    pub fn key(&self) -> &TenantKey {
        &self.key
    }

    /// Schema holding this tenant's tables.
    pub fn schema(&self) -> &SchemaName {
        &self.schema
    }

    /// Current lifecycle status.
    pub fn status(&self) -> TenantStatus {
        self.status
    }

    /// The identifier used for routing (the key).
    pub fn tenant_id(&self) -> TenantId {
        TenantId::new(self.key.as_str())
    }

    /// Move to a new lifecycle status.
    pub fn transition(&mut self, next: TenantStatus) -> TenancyResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(TenancyError::invalid_transition(self.status, next).with_tenant(self.key.as_str()));
        }
        tracing::debug!(
            tenant_id = %self.key,
            from = %self.status,
            to = %next,
            "Tenant status changed"
        );
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tenant_key_validation() {
        assert!(TenantKey::parse("acme").is_ok());
        assert!(TenantKey::parse("blue-moon-42").is_ok());
        assert!(TenantKey::parse("a").is_err());
        assert!(TenantKey::parse("-acme").is_err());
        assert!(TenantKey::parse("acme-").is_err());
        assert!(TenantKey::parse("Acme").is_err());
        assert!(TenantKey::parse("acme_corp").is_err());
    }

    #[test]
    fn test_provision_derives_schema() {
        let tenant = Tenant::provision(
            TenantKey::parse("blue-moon").unwrap(),
            &SchemaLayout::default(),
        )
        .unwrap();

        assert_eq!(tenant.schema().as_str(), "store_blue_moon");
        assert_eq!(tenant.status(), TenantStatus::Pending);
        assert_eq!(tenant.tenant_id().as_str(), "blue-moon");
    }

    #[test]
    fn test_lifecycle() {
        let mut tenant =
            Tenant::provision(TenantKey::parse("acme").unwrap(), &SchemaLayout::default()).unwrap();
        let schema = tenant.schema().clone();

        tenant.transition(TenantStatus::Active).unwrap();
        tenant.transition(TenantStatus::Suspended).unwrap();
        tenant.transition(TenantStatus::Active).unwrap();
        tenant.transition(TenantStatus::Deleting).unwrap();
        tenant.transition(TenantStatus::Deleted).unwrap();

        assert_eq!(tenant.schema(), &schema);
        assert!(tenant.transition(TenantStatus::Active).is_err());
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!TenantStatus::Pending.can_transition_to(TenantStatus::Suspended));
        assert!(!TenantStatus::Active.can_transition_to(TenantStatus::Pending));
        assert!(!TenantStatus::Deleting.can_transition_to(TenantStatus::Active));
        assert!(!TenantStatus::Deleted.can_transition_to(TenantStatus::Deleting));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("suspended".parse::<TenantStatus>().unwrap(), TenantStatus::Suspended);
        assert!("archived".parse::<TenantStatus>().is_err());
    }

    #[test]
    fn test_serde_shape() {
        let tenant = Tenant::from_parts(
            Uuid::nil(),
            TenantKey::parse("acme").unwrap(),
            SchemaName::parse("store_acme").unwrap(),
            TenantStatus::Active,
        );
        let json = serde_json::to_value(&tenant).unwrap();
        assert_eq!(json["key"], "acme");
        assert_eq!(json["schema"], "store_acme");
        assert_eq!(json["status"], "active");
    }
}
