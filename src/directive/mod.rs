//! The `@cache` directive — declared arguments and their typed configuration.
//!
//! A field opts into caching by carrying the directive in the schema:
//!
//! ```graphql
//! type Product {
//!   reviews(first: Int): [Review] @cache(ttl: 300, cacheKey: ["parent.id", "args"])
//! }
//! ```
//!
//! [`DirectiveArgs`] holds the arguments exactly as declared (any subset may be
//! missing) and reads them with type coercion. [`FieldCacheConfig::from_args`]
//! turns them into the immutable configuration used for one field evaluation.
//! Absent or malformed arguments are never errors; they fall back to defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// SDL a schema must include to declare the `@cache` directive.
pub const CACHE_DIRECTIVE_SDL: &str = r#"enum CacheType {
  SHARED
  SCOPED
}

directive @cache(
  ttl: Int
  cacheKey: [String]
  type: CacheType
  pollingTimeout: Int
  pingInterval: Int
) on FIELD_DEFINITION
"#;

/// Default entry lifetime in seconds.
pub const DEFAULT_TTL_SECS: u64 = 900;

/// Default lifetime of a processing claim in seconds.
pub const DEFAULT_POLLING_TIMEOUT_SECS: u64 = 30;

/// Default poll interval for SHARED waiters in milliseconds.
pub const DEFAULT_PING_INTERVAL_MS: u64 = 1000;

/// Default key spec.
pub const DEFAULT_CACHE_KEY: [&str; 3] = ["parent", "args", "vars"];

/// Coordination policy between concurrent resolutions of the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheType {
    /// Callers deduplicate resolver calls through a processing marker.
    #[default]
    Shared,
    /// Every caller that misses resolves on its own.
    Scoped,
}

impl CacheType {
    /// Returns the variant for a GraphQL enum value, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("SHARED") {
            Some(Self::Shared)
        } else if name.eq_ignore_ascii_case("SCOPED") {
            Some(Self::Scoped)
        } else {
            None
        }
    }

    /// Returns the GraphQL enum value name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shared => "SHARED",
            Self::Scoped => "SCOPED",
        }
    }
}

impl std::fmt::Display for CacheType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments of one directive application, as declared in the schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectiveArgs {
    values: Map<String, Value>,
}

impl DirectiveArgs {
    /// Creates an empty argument set. Every read falls back to its default.
    pub fn new() -> Self {
        Self { values: Map::new() }
    }

    /// Builds an argument set from a JSON object. Anything else is treated as
    /// an empty argument set.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(values) => Self { values },
            _ => Self::new(),
        }
    }

    /// Adds an argument, replacing any previous value under the same name.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Returns the raw declared value of `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Reads a positive integer argument.
    ///
    /// Integers and numeric strings are accepted. Zero, negatives, fractions
    /// and other types yield `default`.
    ///
    /// # Examples
    ///
    /// ```
    /// use fieldcache::directive::DirectiveArgs;
    ///
    /// let args = DirectiveArgs::new().with("ttl", 60).with("pingInterval", "250");
    /// assert_eq!(args.int("ttl", 900), 60);
    /// assert_eq!(args.int("pingInterval", 1000), 250);
    /// assert_eq!(args.int("pollingTimeout", 30), 30);
    /// ```
    pub fn int(&self, name: &str, default: u64) -> u64 {
        let parsed = match self.get(name) {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            _ => None,
        };
        parsed.filter(|n| *n > 0).unwrap_or(default)
    }

    /// Reads a string argument, falling back to `default` for non-strings.
    pub fn string(&self, name: &str, default: &str) -> String {
        match self.get(name) {
            Some(Value::String(s)) => s.clone(),
            _ => default.to_string(),
        }
    }

    /// Reads an ordered list of strings.
    ///
    /// A single string is normalized to a one-element list. A list containing
    /// anything but strings, an empty list, or any other type yields `default`.
    pub fn string_list(&self, name: &str, default: &[String]) -> Vec<String> {
        let items = match self.get(name) {
            Some(Value::String(s)) => return vec![s.clone()],
            Some(Value::Array(items)) if !items.is_empty() => items,
            _ => return default.to_vec(),
        };

        let mut list = Vec::with_capacity(items.len());
        for item in items {
            match item.as_str() {
                Some(token) => list.push(token.to_owned()),
                None => return default.to_vec(),
            }
        }
        list
    }

    /// Reads a [`CacheType`] argument.
    pub fn cache_type(&self, name: &str, default: CacheType) -> CacheType {
        let value = self.string(name, default.as_str());
        CacheType::from_name(&value).unwrap_or(default)
    }
}

impl FromIterator<(String, Value)> for DirectiveArgs {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// A directive applied to a field definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    /// Directive name without the `@`.
    pub name: String,
    /// Declared arguments.
    pub arguments: DirectiveArgs,
}

impl Directive {
    pub fn new(name: impl Into<String>, arguments: DirectiveArgs) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Caching configuration of one field.
///
/// Derived from the directive arguments on every evaluation and never mutated
/// afterwards. Also deserializable (camelCase keys, all optional) so that
/// application config can supply the fallback defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldCacheConfig {
    /// Lifetime of a completed entry, in seconds.
    pub ttl: u64,
    /// Ordered key spec tokens.
    pub cache_key: Vec<String>,
    /// Coordination policy.
    #[serde(rename = "type")]
    pub cache_type: CacheType,
    /// Lifetime of a processing claim, in seconds.
    pub polling_timeout: u64,
    /// Poll interval for SHARED waiters, in milliseconds.
    pub ping_interval: u64,
}

impl Default for FieldCacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL_SECS,
            cache_key: DEFAULT_CACHE_KEY.iter().map(|t| t.to_string()).collect(),
            cache_type: CacheType::Shared,
            polling_timeout: DEFAULT_POLLING_TIMEOUT_SECS,
            ping_interval: DEFAULT_PING_INTERVAL_MS,
        }
    }
}

impl FieldCacheConfig {
    /// Reads the configuration from declared directive arguments.
    ///
    /// # Arguments
    ///
    /// - `args` — the arguments as declared on the field.
    /// - `defaults` — values used for every absent or malformed argument.
    ///
    /// # Examples
    ///
    /// ```
    /// use fieldcache::directive::{CacheType, DirectiveArgs, FieldCacheConfig};
    ///
    /// let args = DirectiveArgs::new()
    ///     .with("ttl", 300)
    ///     .with("cacheKey", "parent.id")
    ///     .with("type", "SCOPED");
    /// let config = FieldCacheConfig::from_args(&args, &FieldCacheConfig::default());
    ///
    /// assert_eq!(config.ttl, 300);
    /// assert_eq!(config.cache_key, vec!["parent.id".to_string()]);
    /// assert_eq!(config.cache_type, CacheType::Scoped);
    /// assert_eq!(config.polling_timeout, 30);
    /// assert_eq!(config.ping_interval, 1000);
    /// ```
    pub fn from_args(args: &DirectiveArgs, defaults: &FieldCacheConfig) -> Self {
        Self {
            ttl: args.int("ttl", defaults.ttl),
            cache_key: args.string_list("cacheKey", &defaults.cache_key),
            cache_type: args.cache_type("type", defaults.cache_type),
            polling_timeout: args.int("pollingTimeout", defaults.polling_timeout),
            ping_interval: args.int("pingInterval", defaults.ping_interval),
        }
    }

    /// Store ttl for completed entries.
    pub fn entry_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl)
    }

    /// Store ttl for processing claims.
    pub fn claim_ttl(&self) -> Duration {
        Duration::from_secs(self.polling_timeout)
    }

    /// Sleep between two reads of a key that is being processed elsewhere.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval)
    }

    /// Number of polls a SHARED waiter performs before it treats a processing
    /// claim as abandoned: `ceil(pollingTimeout / pingInterval)`, at least 1.
    pub fn max_polls(&self) -> u64 {
        let timeout_ms = self.polling_timeout.saturating_mul(1000);
        let interval_ms = self.ping_interval.max(1);
        timeout_ms.div_ceil(interval_ms).max(1)
    }
}
