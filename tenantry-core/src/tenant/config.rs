//! Tenant routing configuration.
//!
//! [`TenantConfig`] can be built in code, parsed from TOML, or read from
//! `TENANTRY_*` environment variables layered over any of those.
//!
//! ```toml
//! default_tenant = "default"
//! neutral_schema = "public"
//! schema_prefix = "store_"
//! tenant_header = "X-Tenant-ID"
//! reserved_subdomains = ["www", "api"]
//! base_domain = "platform.example"
//! profile = "production"
//! unknown_tenant = "reject"
//! cache_ttl_secs = 300
//! isolation = "read_committed"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::cache::CacheConfig;
use super::context::TenantId;
use super::provider::UnknownTenantPolicy;
use super::resolver::{DEFAULT_TENANT_HEADER, ResolverProfile};
use super::schema::{SchemaLayout, SchemaName, SearchPathFormat};
use crate::env::{EnvSource, StdEnvSource};
use crate::error::{TenancyError, TenancyResult};
use crate::transaction::{IsolationLevel, TransactionConfig};

/// Configuration for tenant routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TenantConfig {
    /// Tenant used when no resolver strategy matches.
    pub default_tenant: String,
    /// Schema every pooled connection is reset to.
    pub neutral_schema: String,
    /// Schema with tables shared by all tenants.
    pub shared_schema: Option<String>,
    /// How the search path is built.
    pub search_path_format: SearchPathFormat,
    /// Prefix for derived schema names.
    pub schema_prefix: String,
    /// Suffix for derived schema names.
    pub schema_suffix: String,
    /// Header carrying the tenant id.
    pub tenant_header: String,
    /// Subdomain labels that never name a tenant.
    pub reserved_subdomains: Vec<String>,
    /// Only hosts under this domain are matched by subdomain.
    pub base_domain: Option<String>,
    /// Which resolver chain to build.
    pub profile: ResolverProfile,
    /// What to do with tenants the store does not know.
    pub unknown_tenant: UnknownTenantPolicy,
    /// Schema cache TTL; unset keeps entries until invalidated.
    pub cache_ttl_secs: Option<u64>,
    /// Isolation level for units of work.
    pub isolation: IsolationLevel,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            default_tenant: "default".to_string(),
            neutral_schema: "public".to_string(),
            shared_schema: None,
            search_path_format: SearchPathFormat::TenantOnly,
            schema_prefix: "store_".to_string(),
            schema_suffix: String::new(),
            tenant_header: DEFAULT_TENANT_HEADER.to_string(),
            reserved_subdomains: vec!["www".to_string()],
            base_domain: None,
            profile: ResolverProfile::Production,
            unknown_tenant: UnknownTenantPolicy::FallbackToDefault,
            cache_ttl_secs: None,
            isolation: IsolationLevel::ReadCommitted,
        }
    }
}

impl TenantConfig {
    /// Create a builder starting from the defaults.
    pub fn builder() -> TenantConfigBuilder {
        TenantConfigBuilder::default()
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> TenancyResult<Self> {
        let config: Self = toml::from_str(input).map_err(|e| {
            TenancyError::config(format!("invalid tenant configuration: {}", e.message()))
                .with_source(e)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> TenancyResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TenancyError::config(format!("failed to read {}: {}", path.display(), e)).with_source(e)
        })?;
        Self::from_toml_str(&content)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> TenancyResult<Self> {
        let mut config = Self::default();
        config.apply_env(&StdEnvSource)?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `TENANTRY_*` variables in `env`.
    ///
    /// | variable | field |
    /// |----------|-------|
    /// | `TENANTRY_DEFAULT_TENANT` | `default_tenant` |
    /// | `TENANTRY_NEUTRAL_SCHEMA` | `neutral_schema` |
    /// | `TENANTRY_SHARED_SCHEMA` | `shared_schema` |
    /// | `TENANTRY_SCHEMA_PREFIX` | `schema_prefix` |
    /// | `TENANTRY_TENANT_HEADER` | `tenant_header` |
    /// | `TENANTRY_RESERVED_SUBDOMAINS` | `reserved_subdomains` (comma separated) |
    /// | `TENANTRY_BASE_DOMAIN` | `base_domain` |
    /// | `TENANTRY_PROFILE` | `profile` |
    /// | `TENANTRY_UNKNOWN_TENANT` | `unknown_tenant` |
    /// | `TENANTRY_CACHE_TTL_SECS` | `cache_ttl_secs` |
    /// | `TENANTRY_ISOLATION` | `isolation` |
    pub fn apply_env<E: EnvSource>(&mut self, env: &E) -> TenancyResult<()> {
        if let Some(v) = env.get("TENANTRY_DEFAULT_TENANT") {
            self.default_tenant = v;
        }
        if let Some(v) = env.get("TENANTRY_NEUTRAL_SCHEMA") {
            self.neutral_schema = v;
        }
        if let Some(v) = env.get("TENANTRY_SHARED_SCHEMA") {
            self.shared_schema = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = env.get("TENANTRY_SCHEMA_PREFIX") {
            self.schema_prefix = v;
        }
        if let Some(v) = env.get("TENANTRY_TENANT_HEADER") {
            self.tenant_header = v;
        }
        if let Some(v) = env.get("TENANTRY_RESERVED_SUBDOMAINS") {
            self.reserved_subdomains = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = env.get("TENANTRY_BASE_DOMAIN") {
            self.base_domain = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = env.get("TENANTRY_PROFILE") {
            self.profile = parse_enum("TENANTRY_PROFILE", &v)?;
        }
        if let Some(v) = env.get("TENANTRY_UNKNOWN_TENANT") {
            self.unknown_tenant = parse_enum("TENANTRY_UNKNOWN_TENANT", &v)?;
        }
        if let Some(v) = env.get("TENANTRY_ISOLATION") {
            self.isolation = parse_enum("TENANTRY_ISOLATION", &v)?;
        }
        if let Some(v) = env.get("TENANTRY_CACHE_TTL_SECS") {
            let secs = v.trim().parse::<u64>().map_err(|_| {
                TenancyError::config(format!("TENANTRY_CACHE_TTL_SECS must be a number, got '{}'", v))
            })?;
            self.cache_ttl_secs = Some(secs);
        }
        Ok(())
    }

    /// Check that every identifier is usable.
    pub fn validate(&self) -> TenancyResult<()> {
        TenantId::parse(&self.default_tenant).map_err(|e| {
            TenancyError::config(format!("default_tenant is invalid: {}", e.message))
        })?;
        if self.tenant_header.trim().is_empty() {
            return Err(TenancyError::config("tenant_header must not be empty"));
        }
        if self.cache_ttl_secs == Some(0) {
            return Err(TenancyError::config("cache_ttl_secs must be positive")
                .with_suggestion("Omit cache_ttl_secs to cache until invalidated"));
        }
        self.layout().map(|_| ())
    }

    /// The schema naming and search path rules.
    pub fn layout(&self) -> TenancyResult<SchemaLayout> {
        let neutral = SchemaName::parse(self.neutral_schema.clone())
            .map_err(|e| e.with_context("neutral_schema"))?;
        let shared = self
            .shared_schema
            .clone()
            .map(SchemaName::parse)
            .transpose()
            .map_err(|e| e.with_context("shared_schema"))?;
        if shared.is_none() && self.search_path_format != SearchPathFormat::TenantOnly {
            tracing::debug!("No shared schema configured, the neutral schema stands in");
        }

        Ok(SchemaLayout {
            prefix: self.schema_prefix.clone(),
            suffix: self.schema_suffix.clone(),
            neutral,
            shared,
            format: self.search_path_format,
        })
    }

    /// The default tenant as an identifier.
    pub fn default_tenant_id(&self) -> TenantId {
        TenantId::new(self.default_tenant.clone())
    }

    /// Schema cache settings.
    pub fn cache_config(&self) -> CacheConfig {
        match self.cache_ttl_secs {
            Some(secs) => CacheConfig::default().with_ttl(Duration::from_secs(secs)),
            None => CacheConfig::default(),
        }
    }

    /// Transaction settings for units of work.
    pub fn transaction_config(&self) -> TransactionConfig {
        TransactionConfig::new().isolation(self.isolation)
    }
}

fn parse_enum<T: serde::de::DeserializeOwned>(key: &str, value: &str) -> TenancyResult<T> {
    use serde::de::IntoDeserializer;
    use serde::de::value::{Error, StrDeserializer};

    let normalized = value.trim().to_ascii_lowercase();
    let de: StrDeserializer<'_, Error> = normalized.as_str().into_deserializer();
    T::deserialize(de)
        .map_err(|e| TenancyError::config(format!("{} has an unsupported value '{}': {}", key, value, e)))
}

/// Builder for [`TenantConfig`].
#[derive(Debug, Clone, Default)]
pub struct TenantConfigBuilder {
    config: TenantConfig,
}

impl TenantConfigBuilder {
    /// Set the default tenant.
    pub fn default_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.config.default_tenant = tenant.into();
        self
    }

    /// Set the neutral schema.
    pub fn neutral_schema(mut self, schema: impl Into<String>) -> Self {
        self.config.neutral_schema = schema.into();
        self
    }

    /// Set the shared schema.
    pub fn shared_schema(mut self, schema: impl Into<String>) -> Self {
        self.config.shared_schema = Some(schema.into());
        self
    }

    /// Set the search path format.
    pub fn search_path_format(mut self, format: SearchPathFormat) -> Self {
        self.config.search_path_format = format;
        self
    }

    /// Set the schema prefix.
    pub fn schema_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.schema_prefix = prefix.into();
        self
    }

    /// Set the schema suffix.
    pub fn schema_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.schema_suffix = suffix.into();
        self
    }

    /// Set the tenant header name.
    pub fn tenant_header(mut self, header: impl Into<String>) -> Self {
        self.config.tenant_header = header.into();
        self
    }

    /// Replace the reserved subdomain labels.
    pub fn reserved_subdomains<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.reserved_subdomains = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict subdomain matching to a base domain.
    pub fn base_domain(mut self, domain: impl Into<String>) -> Self {
        self.config.base_domain = Some(domain.into());
        self
    }

    /// Set the resolver profile.
    pub fn profile(mut self, profile: ResolverProfile) -> Self {
        self.config.profile = profile;
        self
    }

    /// Set the unknown tenant policy.
    pub fn unknown_tenant(mut self, policy: UnknownTenantPolicy) -> Self {
        self.config.unknown_tenant = policy;
        self
    }

    /// Expire cached schemas after `ttl`.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl_secs = Some(ttl.as_secs().max(1));
        self
    }

    /// Set the unit of work isolation level.
    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.config.isolation = level;
        self
    }

    /// Validate and build.
    pub fn build(self) -> TenancyResult<TenantConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MapEnvSource;
    use crate::error::ErrorCode;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = TenantConfig::default();
        config.validate().unwrap();
        assert_eq!(config.default_tenant_id().as_str(), "default");
        assert_eq!(config.layout().unwrap().reset_sql(), "SET search_path TO \"public\"");
        assert!(config.cache_config().ttl.is_none());
    }

    #[test]
    fn test_from_toml() {
        let config = TenantConfig::from_toml_str(
            r#"
            default_tenant = "lobby"
            shared_schema = "shared"
            search_path_format = "tenant_first"
            reserved_subdomains = ["www", "api"]
            profile = "test"
            unknown_tenant = "reject"
            cache_ttl_secs = 60
            isolation = "serializable"
            "#,
        )
        .unwrap();

        assert_eq!(config.default_tenant, "lobby");
        assert_eq!(config.reserved_subdomains, vec!["www", "api"]);
        assert_eq!(config.profile, ResolverProfile::Test);
        assert_eq!(config.unknown_tenant, UnknownTenantPolicy::Reject);
        assert_eq!(config.cache_config().ttl, Some(Duration::from_secs(60)));
        assert_eq!(config.transaction_config().isolation, IsolationLevel::Serializable);

        let schema = SchemaName::parse("store_acme").unwrap();
        assert_eq!(
            config.layout().unwrap().search_path_sql(&schema),
            "SET search_path TO \"store_acme\", \"shared\""
        );
    }

    #[test]
    fn test_toml_rejects_unknown_keys_and_bad_schema() {
        assert!(TenantConfig::from_toml_str("tenant_column = \"x\"").is_err());
        let err = TenantConfig::from_toml_str("neutral_schema = \"pub lic\"").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidIdentifier);
    }

    #[test]
    fn test_env_overrides() {
        let env = MapEnvSource::new()
            .set("TENANTRY_DEFAULT_TENANT", "lobby")
            .set("TENANTRY_RESERVED_SUBDOMAINS", "www, api ,")
            .set("TENANTRY_PROFILE", "Test")
            .set("TENANTRY_UNKNOWN_TENANT", "fallback")
            .set("TENANTRY_CACHE_TTL_SECS", "30")
            .set("TENANTRY_ISOLATION", "serializable");
        let mut config = TenantConfig::default();
        config.apply_env(&env).unwrap();

        assert_eq!(config.default_tenant, "lobby");
        assert_eq!(config.reserved_subdomains, vec!["www", "api"]);
        assert_eq!(config.profile, ResolverProfile::Test);
        assert_eq!(config.unknown_tenant, UnknownTenantPolicy::FallbackToDefault);
        assert_eq!(config.cache_ttl_secs, Some(30));
        assert_eq!(config.isolation, IsolationLevel::Serializable);
        assert_eq!(
            config.transaction_config().isolation,
            IsolationLevel::Serializable
        );
    }

    #[test]
    fn test_env_rejects_garbage() {
        let mut config = TenantConfig::default();
        let env = MapEnvSource::new().set("TENANTRY_PROFILE", "staging");
        assert!(config.apply_env(&env).is_err());

        let env = MapEnvSource::new().set("TENANTRY_CACHE_TTL_SECS", "soon");
        assert!(config.apply_env(&env).is_err());
    }

    #[test]
    fn test_builder_validates() {
        assert!(TenantConfig::builder().default_tenant("").build().is_err());
        assert!(TenantConfig::builder().tenant_header(" ").build().is_err());
        assert!(TenantConfig::builder().shared_schema("1bad").build().is_err());

        let config = TenantConfig::builder()
            .base_domain("platform.example")
            .cache_ttl(Duration::from_secs(120))
            .build()
            .unwrap();
        assert_eq!(config.base_domain.as_deref(), Some("platform.example"));
        assert_eq!(config.cache_ttl_secs, Some(120));
    }
}
