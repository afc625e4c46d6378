//! Tenant identifier resolution.
//!
//! [`TenantIdentifierResolver`] runs an ordered chain of
//! [`ResolutionStrategy`] values against the [`RequestSignals`] of a unit of
//! work. The first strategy to produce an identifier wins; strategies that
//! find nothing, find garbage, or fail are skipped with a debug log. When the
//! whole chain comes up empty the configured default tenant is returned, so
//! resolution is total.
//!
//! Two chains exist and one is picked at startup from
//! [`ResolverProfile`]:
//!
//! | position | production | test |
//! |----------|------------|------|
//! | 1 | - | [`OverrideStrategy`] |
//! | 2 | [`HeaderStrategy`] | [`HeaderStrategy`] |
//! | 3 | [`ContextStrategy`] | [`ContextStrategy`] |
//! | 4 | [`SubdomainStrategy`] | [`SubdomainStrategy`] |
//! | 5 | default tenant | default tenant |

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::config::TenantConfig;
use super::context::TenantId;
use super::task_local;
use crate::error::TenancyResult;

/// Header carrying the tenant identifier unless configured otherwise.
pub const DEFAULT_TENANT_HEADER: &str = "X-Tenant-ID";

/// Inbound metadata available to the resolver.
#[derive(Debug, Clone, Default)]
pub struct RequestSignals {
    headers: Vec<(String, String)>,
    host: Option<String>,
}

impl RequestSignals {
    /// No signals at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list of header pairs.
    pub fn from_headers<I, K, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            host: None,
        }
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the request host explicitly.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Look up a header by case-insensitive name.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The request host: the explicit host, else the `Host` header.
    pub fn host_value(&self) -> Option<&str> {
        self.host.as_deref().or_else(|| self.header_value("Host"))
    }
}

/// Which strategy produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionSource {
    /// Explicit override.
    Override,
    /// Request header.
    Header,
    /// Enclosing unit of work's context.
    Context,
    /// Host subdomain.
    Subdomain,
    /// Configured default.
    Default,
}

impl fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Override => "override",
            Self::Header => "header",
            Self::Context => "context",
            Self::Subdomain => "subdomain",
            Self::Default => "default",
        };
        f.write_str(name)
    }
}

/// Outcome of a resolver chain run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The resolved tenant.
    pub tenant_id: TenantId,
    /// The strategy that produced it.
    pub source: ResolutionSource,
}

/// One link in the resolver chain.
///
/// `Ok(None)` defers to the next strategy. Errors are treated the same way
/// by the chain, but are logged with their message.
#[async_trait]
pub trait ResolutionStrategy: Send + Sync {
    /// Which source this strategy represents.
    fn source(&self) -> ResolutionSource;

    /// Try to derive a tenant from the signals.
    async fn resolve(&self, signals: &RequestSignals) -> TenancyResult<Option<TenantId>>;
}

/// Forces a tenant regardless of transport. Used by tests and debugging.
#[derive(Debug, Clone, Default)]
pub struct OverrideStrategy {
    forced: Arc<RwLock<Option<TenantId>>>,
}

impl OverrideStrategy {
    /// Create an override with nothing forced.
    pub fn new() -> Self {
        Self::default()
    }

    /// Force every resolution to `tenant_id`.
    pub fn set(&self, tenant_id: impl Into<TenantId>) {
        *self.forced.write() = Some(tenant_id.into());
    }

    /// Stop forcing a tenant.
    pub fn clear(&self) {
        *self.forced.write() = None;
    }

    /// The forced tenant, if any.
    pub fn get(&self) -> Option<TenantId> {
        self.forced.read().clone()
    }
}

#[async_trait]
impl ResolutionStrategy for OverrideStrategy {
    fn source(&self) -> ResolutionSource {
        ResolutionSource::Override
    }

    async fn resolve(&self, _signals: &RequestSignals) -> TenancyResult<Option<TenantId>> {
        Ok(self.get())
    }
}

/// Reads the tenant from a designated request header.
#[derive(Debug, Clone)]
pub struct HeaderStrategy {
    header_name: String,
}

impl HeaderStrategy {
    /// Create a new header strategy.
    pub fn new(header_name: impl Into<String>) -> Self {
        Self {
            header_name: header_name.into(),
        }
    }

    /// The header this strategy reads.
    pub fn header_name(&self) -> &str {
        &self.header_name
    }
}

impl Default for HeaderStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_TENANT_HEADER)
    }
}

#[async_trait]
impl ResolutionStrategy for HeaderStrategy {
    fn source(&self) -> ResolutionSource {
        ResolutionSource::Header
    }

    async fn resolve(&self, signals: &RequestSignals) -> TenancyResult<Option<TenantId>> {
        match signals.header_value(&self.header_name) {
            Some(raw) if !raw.trim().is_empty() => TenantId::parse(raw).map(Some),
            _ => Ok(None),
        }
    }
}

/// Reads the tenant set by an enclosing unit of work.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextStrategy;

#[async_trait]
impl ResolutionStrategy for ContextStrategy {
    fn source(&self) -> ResolutionSource {
        ResolutionSource::Context
    }

    async fn resolve(&self, _signals: &RequestSignals) -> TenancyResult<Option<TenantId>> {
        Ok(task_local::current_tenant_id())
    }
}

/// Derives the tenant from the first label of the request host.
///
/// `acme.platform.example` resolves to `acme`. Hosts with fewer than three
/// labels, IP address literals, and reserved labels such as `www`, resolve
/// to nothing.
#[derive(Debug, Clone)]
pub struct SubdomainStrategy {
    reserved: HashSet<String>,
    base_domain: Option<String>,
}

impl SubdomainStrategy {
    /// Create a strategy that ignores the given labels.
    pub fn new<I, S>(reserved: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            reserved: reserved
                .into_iter()
                .map(|s| s.into().to_ascii_lowercase())
                .collect(),
            base_domain: None,
        }
    }

    /// Only accept hosts directly under `base` (e.g. `platform.example`).
    pub fn with_base_domain(mut self, base: impl Into<String>) -> Self {
        self.base_domain = Some(base.into().trim_matches('.').to_ascii_lowercase());
        self
    }

    fn label<'a>(&self, host: &'a str) -> Option<&'a str> {
        // Bracketed or bare IPv6 literals carry no label.
        if host.starts_with('[') || host.matches(':').count() > 1 {
            return None;
        }
        let domain = host.split(':').next().unwrap_or(host).trim_end_matches('.');
        if domain.parse::<IpAddr>().is_ok() {
            return None;
        }
        let mut labels = domain.split('.');
        let first = labels.next()?;
        let rest: Vec<&str> = labels.collect();
        if rest.len() < 2 || first.is_empty() {
            return None;
        }
        if let Some(base) = &self.base_domain {
            if !rest.join(".").eq_ignore_ascii_case(base) {
                return None;
            }
        }
        Some(first)
    }
}

impl Default for SubdomainStrategy {
    fn default() -> Self {
        Self::new(["www"])
    }
}

#[async_trait]
impl ResolutionStrategy for SubdomainStrategy {
    fn source(&self) -> ResolutionSource {
        ResolutionSource::Subdomain
    }

    async fn resolve(&self, signals: &RequestSignals) -> TenancyResult<Option<TenantId>> {
        let Some(host) = signals.host_value() else {
            return Ok(None);
        };
        let Some(label) = self.label(host) else {
            return Ok(None);
        };
        let label = label.to_ascii_lowercase();
        if self.reserved.contains(&label) {
            trace!(label = %label, "Ignoring reserved subdomain");
            return Ok(None);
        }
        TenantId::parse(&label).map(Some)
    }
}

/// Which resolver chain to build at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverProfile {
    /// Header, context, subdomain, default.
    #[default]
    Production,
    /// Override, header, context, subdomain, default.
    Test,
}

/// Ordered strategy chain with a default fallback.
#[derive(Clone)]
pub struct TenantIdentifierResolver {
    strategies: Vec<Arc<dyn ResolutionStrategy>>,
    default_tenant: TenantId,
    override_handle: Option<OverrideStrategy>,
}

impl TenantIdentifierResolver {
    /// Create an empty chain that always yields `default_tenant`.
    pub fn new(default_tenant: impl Into<TenantId>) -> Self {
        Self {
            strategies: Vec::new(),
            default_tenant: default_tenant.into(),
            override_handle: None,
        }
    }

    /// Build the chain selected by `config.profile`.
    pub fn from_config(config: &TenantConfig) -> Self {
        match config.profile {
            ResolverProfile::Production => Self::production(config),
            ResolverProfile::Test => Self::testing(config),
        }
    }

    /// Header, context, subdomain, default.
    pub fn production(config: &TenantConfig) -> Self {
        let mut subdomain = SubdomainStrategy::new(config.reserved_subdomains.iter().cloned());
        if let Some(base) = &config.base_domain {
            subdomain = subdomain.with_base_domain(base.clone());
        }
        Self::new(config.default_tenant.clone())
            .with(HeaderStrategy::new(config.tenant_header.clone()))
            .with(ContextStrategy)
            .with(subdomain)
    }

    /// Override, header, context, subdomain, default.
    pub fn testing(config: &TenantConfig) -> Self {
        let overrides = OverrideStrategy::new();
        let mut resolver = Self::new(config.default_tenant.clone()).with(overrides.clone());
        resolver.override_handle = Some(overrides);
        let production = Self::production(config);
        resolver.strategies.extend(production.strategies);
        resolver
    }

    /// Append a strategy to the chain.
    pub fn with<S: ResolutionStrategy + 'static>(mut self, strategy: S) -> Self {
        self.strategies.push(Arc::new(strategy));
        self
    }

    /// The override strategy of a test chain.
    pub fn overrides(&self) -> Option<&OverrideStrategy> {
        self.override_handle.as_ref()
    }

    /// The tenant used when nothing else matches.
    pub fn default_tenant_id(&self) -> &TenantId {
        &self.default_tenant
    }

    /// Number of strategies before the default.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Whether the chain has no strategies.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Resolve the tenant for a unit of work. Never fails.
    pub async fn resolve(&self, signals: &RequestSignals) -> TenantId {
        self.resolve_traced(signals).await.tenant_id
    }

    /// Resolve and report which strategy won.
    pub async fn resolve_traced(&self, signals: &RequestSignals) -> Resolution {
        for strategy in &self.strategies {
            let source = strategy.source();
            match strategy.resolve(signals).await {
                Ok(Some(tenant_id)) => {
                    debug!(tenant_id = %tenant_id, source = %source, "Tenant resolved");
                    return Resolution { tenant_id, source };
                }
                Ok(None) => {
                    trace!(source = %source, "No tenant from strategy");
                }
                Err(e) => {
                    debug!(source = %source, error = %e, "Tenant strategy failed, trying next");
                }
            }
        }

        debug!(
            tenant_id = %self.default_tenant,
            "No strategy resolved a tenant, using default"
        );
        Resolution {
            tenant_id: self.default_tenant.clone(),
            source: ResolutionSource::Default,
        }
    }
}

impl fmt::Debug for TenantIdentifierResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantIdentifierResolver")
            .field(
                "strategies",
                &self.strategies.iter().map(|s| s.source()).collect::<Vec<_>>(),
            )
            .field("default_tenant", &self.default_tenant)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TenancyError;
    use pretty_assertions::assert_eq;

    struct FailingStrategy;

    #[async_trait]
    impl ResolutionStrategy for FailingStrategy {
        fn source(&self) -> ResolutionSource {
            ResolutionSource::Header
        }

        async fn resolve(&self, _signals: &RequestSignals) -> TenancyResult<Option<TenantId>> {
            Err(TenancyError::internal("directory unavailable"))
        }
    }

    fn production() -> TenantIdentifierResolver {
        TenantIdentifierResolver::production(&TenantConfig::default())
    }

    #[tokio::test]
    async fn test_no_signals_returns_default() {
        let resolution = production().resolve_traced(&RequestSignals::new()).await;
        assert_eq!(resolution.tenant_id.as_str(), "default");
        assert_eq!(resolution.source, ResolutionSource::Default);
    }

    #[tokio::test]
    async fn test_header_wins() {
        let signals = RequestSignals::new()
            .header("x-tenant-id", "store-42")
            .host("acme.platform.example");
        let resolution = production().resolve_traced(&signals).await;
        assert_eq!(resolution.tenant_id.as_str(), "store-42");
        assert_eq!(resolution.source, ResolutionSource::Header);
    }

    #[tokio::test]
    async fn test_malformed_header_is_skipped() {
        let signals = RequestSignals::new()
            .header("X-Tenant-ID", "store'; --")
            .host("acme.platform.example");
        let resolution = production().resolve_traced(&signals).await;
        assert_eq!(resolution.tenant_id.as_str(), "acme");
        assert_eq!(resolution.source, ResolutionSource::Subdomain);
    }

    #[tokio::test]
    async fn test_context_beats_subdomain() {
        task_local::scope(async {
            task_local::set_current("from-context").unwrap();
            let signals = RequestSignals::new().host("acme.platform.example");
            let resolution = production().resolve_traced(&signals).await;
            assert_eq!(resolution.tenant_id.as_str(), "from-context");
            assert_eq!(resolution.source, ResolutionSource::Context);
        })
        .await;
    }

    #[tokio::test]
    async fn test_subdomain_rules() {
        let resolver = production();
        let cases = [
            ("acme.platform.example", "acme"),
            ("ACME.platform.example:8443", "acme"),
            ("www.platform.example", "default"),
            ("platform.example", "default"),
            ("localhost:3000", "default"),
            ("10.0.0.1", "default"),
            ("192.168.1.20:8080", "default"),
            ("[::1]:8080", "default"),
            ("fe80::1", "default"),
        ];
        for (host, expected) in cases {
            let tenant = resolver.resolve(&RequestSignals::new().host(host)).await;
            assert_eq!(tenant.as_str(), expected, "host {}", host);
        }
    }

    #[tokio::test]
    async fn test_host_header_is_used() {
        let signals = RequestSignals::from_headers([("Host", "acme.platform.example")]);
        assert_eq!(production().resolve(&signals).await.as_str(), "acme");
    }

    #[tokio::test]
    async fn test_base_domain_restriction() {
        let strategy = SubdomainStrategy::default().with_base_domain("platform.example");
        let ok = strategy
            .resolve(&RequestSignals::new().host("acme.platform.example"))
            .await
            .unwrap();
        let other = strategy
            .resolve(&RequestSignals::new().host("acme.evil.example"))
            .await
            .unwrap();
        assert_eq!(ok.unwrap().as_str(), "acme");
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_failing_strategy_falls_through() {
        let resolver = TenantIdentifierResolver::new("fallback")
            .with(FailingStrategy)
            .with(HeaderStrategy::default());
        let signals = RequestSignals::new().header("X-Tenant-ID", "store-7");
        assert_eq!(resolver.resolve(&signals).await.as_str(), "store-7");
        assert_eq!(
            resolver.resolve(&RequestSignals::new()).await.as_str(),
            "fallback"
        );
    }

    #[tokio::test]
    async fn test_override_only_in_test_profile() {
        let config = TenantConfig::default();
        assert!(TenantIdentifierResolver::production(&config).overrides().is_none());

        let resolver = TenantIdentifierResolver::testing(&config);
        assert_eq!(resolver.len(), 4);
        let overrides = resolver.overrides().unwrap();
        overrides.set("forced");

        let signals = RequestSignals::new().header("X-Tenant-ID", "store-42");
        let resolution = resolver.resolve_traced(&signals).await;
        assert_eq!(resolution.tenant_id.as_str(), "forced");
        assert_eq!(resolution.source, ResolutionSource::Override);

        overrides.clear();
        assert_eq!(resolver.resolve(&signals).await.as_str(), "store-42");
    }

    #[tokio::test]
    async fn test_custom_header_name() {
        let config = TenantConfig::builder().tenant_header("X-Store").build().unwrap();
        let resolver = TenantIdentifierResolver::from_config(&config);
        let signals = RequestSignals::new()
            .header("X-Tenant-ID", "ignored")
            .header("X-Store", "store-3");
        assert_eq!(resolver.resolve(&signals).await.as_str(), "store-3");
    }
}
