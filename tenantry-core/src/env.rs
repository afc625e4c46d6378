//! Environment variable access and expansion.
//!
//! Configuration never reads `std::env` directly; it goes through an
//! [`EnvSource`] so tests can supply a fixed map instead of mutating the
//! process environment.

use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

use crate::error::{TenancyError, TenancyResult};

/// Source for environment variables.
pub trait EnvSource: Send + Sync {
    /// Get an environment variable value.
    fn get(&self, name: &str) -> Option<String>;

    /// Check if a variable exists.
    fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// Default environment source using std::env.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Environment source backed by a HashMap.
#[derive(Debug, Clone, Default)]
pub struct MapEnvSource {
    vars: HashMap<String, String>,
}

impl MapEnvSource {
    /// Create an empty map source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl EnvSource for MapEnvSource {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

/// Expands `${VAR}`, `${VAR:-default}`, `${VAR:?message}` and `$VAR`
/// references, typically inside a database URL.
#[derive(Debug, Clone, Default)]
pub struct EnvExpander<S: EnvSource = StdEnvSource> {
    source: S,
}

impl<S: EnvSource> EnvExpander<S> {
    /// Create an expander reading from `source`.
    pub fn with_source(source: S) -> Self {
        Self { source }
    }

    /// Expand every variable reference in `input`.
    pub fn expand(&self, input: &str) -> TenancyResult<String> {
        let mut result = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' {
                result.push(c);
                continue;
            }
            match chars.peek() {
                Some('{') => {
                    chars.next();
                    result.push_str(&self.expand_braced(&mut chars)?);
                }
                Some(n) if n.is_ascii_alphabetic() || *n == '_' => {
                    result.push_str(&self.expand_simple(&mut chars)?);
                }
                _ => result.push(c),
            }
        }

        Ok(result)
    }

    fn expand_braced(&self, chars: &mut Peekable<Chars<'_>>) -> TenancyResult<String> {
        let mut name = String::new();
        let mut modifier = None;
        let mut fallback = String::new();
        let mut closed = false;

        while let Some(c) = chars.next() {
            match c {
                '}' => {
                    closed = true;
                    break;
                }
                ':' if modifier.is_none() => modifier = chars.next(),
                _ if modifier.is_some() => fallback.push(c),
                _ => name.push(c),
            }
        }

        if !closed {
            return Err(TenancyError::config(format!(
                "unterminated variable reference '${{{}'",
                name
            )));
        }
        if name.is_empty() {
            return Err(TenancyError::config("empty variable name in '${}'"));
        }

        match self.source.get(&name) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => match modifier {
                Some('-') => Ok(fallback),
                Some('?') if !fallback.is_empty() => Err(TenancyError::missing_config(&name)
                    .with_help(fallback)),
                _ => Err(TenancyError::missing_config(name)),
            },
        }
    }

    fn expand_simple(&self, chars: &mut Peekable<Chars<'_>>) -> TenancyResult<String> {
        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(c);
                chars.next();
            } else {
                break;
            }
        }
        self.source
            .get(&name)
            .ok_or_else(|| TenancyError::missing_config(name))
    }
}

/// Expand variable references using the process environment.
pub fn expand_env(input: &str) -> TenancyResult<String> {
    EnvExpander::with_source(StdEnvSource).expand(input)
}

/// Interpret common truthy spellings (`true`, `1`, `yes`, `on`).
pub(crate) fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}
