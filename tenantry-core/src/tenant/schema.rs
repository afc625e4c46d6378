//! Schema names and search path generation.
//!
//! Every schema name that reaches SQL goes through [`SchemaName`], which
//! validates the identifier and always emits it double-quoted. There is no
//! unquoted rendering.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{TenancyError, TenancyResult};

/// PostgreSQL's identifier length limit (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// A validated schema identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaName(String);

impl SchemaName {
    /// Validate a schema name.
    ///
    /// Accepts 1..=63 bytes, starting with an ASCII letter or `_`, followed by
    /// ASCII alphanumerics, `_` or `$`.
    pub fn parse(raw: impl Into<String>) -> TenancyResult<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(TenancyError::invalid_identifier(raw, "schema name is empty"));
        }
        if raw.len() > MAX_IDENTIFIER_LEN {
            return Err(TenancyError::invalid_identifier(
                raw,
                format!("schema name exceeds {} bytes", MAX_IDENTIFIER_LEN),
            ));
        }
        let mut chars = raw.chars();
        let first_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !first_ok {
            return Err(TenancyError::invalid_identifier(
                raw,
                "schema name must start with a letter or underscore",
            ));
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
            return Err(TenancyError::invalid_identifier(
                raw,
                "schema name may only contain letters, digits, '_' and '$'",
            ));
        }
        Ok(Self(raw))
    }

    /// The raw, unquoted name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name as a double-quoted SQL identifier.
    pub fn quoted(&self) -> String {
        quote_identifier(&self.0)
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SchemaName {
    type Error = TenancyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SchemaName> for String {
    fn from(name: SchemaName) -> Self {
        name.0
    }
}

/// Quote an SQL identifier, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Format for the schema search path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPathFormat {
    /// Only include the tenant schema.
    #[default]
    TenantOnly,
    /// Tenant schema first, then shared.
    TenantFirst,
    /// Shared schema first, then tenant.
    SharedFirst,
}

/// Naming rules and search path layout for schema-per-tenant isolation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaLayout {
    /// Prefix for tenant schema names (e.g., "store_" -> "store_acme").
    pub prefix: String,
    /// Suffix for tenant schema names.
    pub suffix: String,
    /// Schema every connection returns to between leases.
    pub neutral: SchemaName,
    /// Schema holding tables shared by all tenants.
    pub shared: Option<SchemaName>,
    /// Search path format.
    pub format: SearchPathFormat,
}

impl Default for SchemaLayout {
    fn default() -> Self {
        Self {
            prefix: "store_".to_string(),
            suffix: String::new(),
            neutral: SchemaName("public".to_string()),
            shared: None,
            format: SearchPathFormat::TenantOnly,
        }
    }
}

impl SchemaLayout {
    /// Derive the schema name for a tenant key.
    ///
    /// Hyphens in the key become underscores.
    pub fn schema_name(&self, key: &str) -> TenancyResult<SchemaName> {
        let mut name = String::with_capacity(self.prefix.len() + key.len() + self.suffix.len());
        name.push_str(&self.prefix);
        name.push_str(&key.to_ascii_lowercase().replace('-', "_"));
        name.push_str(&self.suffix);
        SchemaName::parse(name)
    }

    /// Generate the statement that binds a connection to a tenant schema.
    pub fn search_path_sql(&self, tenant_schema: &SchemaName) -> String {
        let shared = self.shared.as_ref().unwrap_or(&self.neutral);
        match self.format {
            SearchPathFormat::TenantOnly => {
                format!("SET search_path TO {}", tenant_schema.quoted())
            }
            SearchPathFormat::TenantFirst => {
                format!(
                    "SET search_path TO {}, {}",
                    tenant_schema.quoted(),
                    shared.quoted()
                )
            }
            SearchPathFormat::SharedFirst => {
                format!(
                    "SET search_path TO {}, {}",
                    shared.quoted(),
                    tenant_schema.quoted()
                )
            }
        }
    }

    /// Generate the statement that returns a connection to the neutral schema.
    pub fn reset_sql(&self) -> String {
        format!("SET search_path TO {}", self.neutral.quoted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_schema_name_validation() {
        assert!(SchemaName::parse("store_acme").is_ok());
        assert!(SchemaName::parse("_private$1").is_ok());
        assert!(SchemaName::parse("").is_err());
        assert!(SchemaName::parse("1store").is_err());
        assert!(SchemaName::parse("store-acme").is_err());
        assert!(SchemaName::parse("acme\"; DROP SCHEMA public; --").is_err());
        assert!(SchemaName::parse("a".repeat(64)).is_err());
        assert!(SchemaName::parse("a".repeat(63)).is_ok());
    }

    #[test]
    fn test_quote_identifier_escapes() {
        assert_eq!(quote_identifier("plain"), "\"plain\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_schema_name_derivation() {
        let layout = SchemaLayout::default();
        assert_eq!(layout.schema_name("acme").unwrap().as_str(), "store_acme");
        assert_eq!(
            layout.schema_name("Blue-Moon").unwrap().as_str(),
            "store_blue_moon"
        );
        assert!(layout.schema_name("bad key").is_err());
    }

    #[test]
    fn test_search_path_formats() {
        let tenant = SchemaName::parse("store_acme").unwrap();
        let mut layout = SchemaLayout::default();

        assert_eq!(
            layout.search_path_sql(&tenant),
            "SET search_path TO \"store_acme\""
        );

        layout.format = SearchPathFormat::TenantFirst;
        layout.shared = Some(SchemaName::parse("shared").unwrap());
        assert_eq!(
            layout.search_path_sql(&tenant),
            "SET search_path TO \"store_acme\", \"shared\""
        );

        layout.format = SearchPathFormat::SharedFirst;
        assert_eq!(
            layout.search_path_sql(&tenant),
            "SET search_path TO \"shared\", \"store_acme\""
        );
    }

    #[test]
    fn test_reset_sql_uses_neutral_schema() {
        let layout = SchemaLayout::default();
        assert_eq!(layout.reset_sql(), "SET search_path TO \"public\"");
    }

    #[test]
    fn test_serde_round_trip_validates() {
        let parsed: Result<SchemaName, _> = serde_json::from_str("\"bad-name\"");
        assert!(parsed.is_err());
        let ok: SchemaName = serde_json::from_str("\"store_acme\"").unwrap();
        assert_eq!(ok.as_str(), "store_acme");
    }
}
