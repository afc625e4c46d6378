//! Logging setup controlled by `TENANTRY_*` environment variables.
//!
//! - `TENANTRY_DEBUG=true` - Enable debug logging
//! - `TENANTRY_LOG_LEVEL=trace|debug|info|warn|error` - Set a specific level
//! - `TENANTRY_LOG_FORMAT=json|pretty|compact` - Output format (default: json)
//!
//! ```rust,no_run
//! use tenantry_core::logging;
//!
//! // Call once at startup.
//! logging::init();
//! ```
//!
//! Inside the crates, plain `tracing` macros with structured fields are used:
//! `tenant_id`, `schema`, `source` and `state` are the common field names.
//!
//! Without the `tracing-subscriber` feature [`init`] does nothing and the
//! host application is expected to install its own subscriber.

use std::sync::Once;

use crate::env::{EnvSource, StdEnvSource, is_truthy};

static INIT: Once = Once::new();

/// Resolved logging settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    /// Whether anything asked for logging at all.
    pub enabled: bool,
    /// Level for the tenantry crates.
    pub level: &'static str,
    /// Output format.
    pub format: &'static str,
}

impl LogSettings {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_source(&StdEnvSource)
    }

    /// Read settings from an arbitrary source.
    ///
    /// The level defaults to `debug` when `TENANTRY_DEBUG` is set and `warn`
    /// otherwise; unknown values fall back to that default.
    pub fn from_source<S: EnvSource>(env: &S) -> Self {
        let debug = env.get("TENANTRY_DEBUG").is_some_and(|v| is_truthy(&v));
        let fallback = if debug { "debug" } else { "warn" };
        let requested = env.get("TENANTRY_LOG_LEVEL");

        let level = match requested.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => fallback,
        };

        let format = match env
            .get("TENANTRY_LOG_FORMAT")
            .map(|f| f.to_ascii_lowercase())
            .as_deref()
        {
            Some("pretty") => "pretty",
            Some("compact") => "compact",
            _ => "json",
        };

        Self {
            enabled: debug || requested.is_some(),
            level,
            format,
        }
    }

    /// The `EnvFilter` directive covering every tenantry crate.
    pub fn filter_directive(&self) -> String {
        format!(
            "tenantry={0},tenantry_core={0},tenantry_postgres={0}",
            self.level
        )
    }
}

/// Check if debug logging is enabled via `TENANTRY_DEBUG`.
#[inline]
pub fn is_debug_enabled() -> bool {
    StdEnvSource
        .get("TENANTRY_DEBUG")
        .is_some_and(|v| is_truthy(&v))
}

/// Install a global subscriber. Subsequent calls are no-ops.
pub fn init() {
    INIT.call_once(|| {
        let settings = LogSettings::from_env();
        if !settings.enabled {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let filter = EnvFilter::try_new(settings.filter_directive())
                .unwrap_or_else(|_| EnvFilter::new("warn"));
            let registry = tracing_subscriber::registry().with(filter);

            // A subscriber installed by the host application wins.
            let installed = match settings.format {
                "json" => registry.with(fmt::layer().json()).try_init(),
                "compact" => registry.with(fmt::layer().compact()).try_init(),
                _ => registry.with(fmt::layer().pretty()).try_init(),
            };

            if installed.is_ok() {
                tracing::info!(
                    level = settings.level,
                    format = settings.format,
                    "Tenantry logging initialized"
                );
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MapEnvSource;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_disabled_by_default() {
        let settings = LogSettings::from_source(&MapEnvSource::new());
        assert_eq!(
            settings,
            LogSettings {
                enabled: false,
                level: "warn",
                format: "json",
            }
        );
    }

    #[test]
    fn test_debug_flag() {
        let env = MapEnvSource::new()
            .set("TENANTRY_DEBUG", "yes")
            .set("TENANTRY_LOG_FORMAT", "Compact");
        let settings = LogSettings::from_source(&env);
        assert!(settings.enabled);
        assert_eq!(settings.level, "debug");
        assert_eq!(settings.format, "compact");
    }

    #[test]
    fn test_explicit_level() {
        let env = MapEnvSource::new().set("TENANTRY_LOG_LEVEL", "TRACE");
        let settings = LogSettings::from_source(&env);
        assert_eq!(settings.level, "trace");
        assert_eq!(
            settings.filter_directive(),
            "tenantry=trace,tenantry_core=trace,tenantry_postgres=trace"
        );
    }

    #[test]
    fn test_unknown_level_falls_back() {
        let env = MapEnvSource::new().set("TENANTRY_LOG_LEVEL", "loud");
        let settings = LogSettings::from_source(&env);
        assert!(settings.enabled);
        assert_eq!(settings.level, "warn");
    }
}
