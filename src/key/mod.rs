//! Cache key compilation — turn a declarative key spec into a stable store key.
//!
//! A key spec is an ordered list of tokens. Each token names one of the three
//! addressable data sources of a field evaluation, optionally narrowed to a
//! single property:
//!
//! | Token          | Contributes                                  |
//! |----------------|----------------------------------------------|
//! | `parent`       | the whole parent value                       |
//! | `args`         | the whole field argument map                 |
//! | `vars`         | the whole query variable map                 |
//! | `parent.id`    | only `parent["id"]` (`null` when missing)    |
//! | `other.thing`  | nothing — unknown sources are skipped        |
//!
//! The extracted values are combined into a JSON array in token order, hashed
//! with SHA-256 and prefixed with [`KEY_PREFIX`].

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Literal prefix of every compiled cache key.
pub const KEY_PREFIX: &str = "ch-";

/// One of the three data sources a key token may address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySource {
    /// The value returned by the parent field's resolver.
    Parent,
    /// The arguments passed to this field.
    Args,
    /// The variables of the enclosing operation.
    Vars,
}

impl KeySource {
    /// Returns the source matching `name`, or `None` for anything unrecognized.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "parent" => Some(Self::Parent),
            "args" => Some(Self::Args),
            "vars" => Some(Self::Vars),
            _ => None,
        }
    }

    /// Returns the token name of this source.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parent => "parent",
            Self::Args => "args",
            Self::Vars => "vars",
        }
    }
}

/// A parsed key-spec token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyToken {
    /// A bare source name: the whole source value is taken.
    Whole(KeySource),
    /// `source.property`: only that property of the source is taken.
    Property(KeySource, String),
    /// A token whose source is not recognized. It contributes nothing.
    Ignored(String),
}

impl KeyToken {
    /// Parses a raw token such as `"args"` or `"parent.id"`.
    ///
    /// Only the first `.` separates source from property, so `"parent.a.b"`
    /// addresses the property literally named `"a.b"`.
    ///
    /// # Examples
    ///
    /// ```
    /// use fieldcache::key::{KeySource, KeyToken};
    ///
    /// assert_eq!(KeyToken::parse("vars"), KeyToken::Whole(KeySource::Vars));
    /// assert_eq!(
    ///     KeyToken::parse("parent.id"),
    ///     KeyToken::Property(KeySource::Parent, "id".to_string())
    /// );
    /// assert!(matches!(KeyToken::parse("context.user"), KeyToken::Ignored(_)));
    /// ```
    pub fn parse(raw: &str) -> Self {
        let (source, property) = match raw.split_once('.') {
            Some((source, property)) => (source, Some(property)),
            None => (raw, None),
        };

        match (KeySource::from_name(source), property) {
            (Some(source), None) => Self::Whole(source),
            (Some(source), Some(property)) => Self::Property(source, property.to_string()),
            (None, _) => Self::Ignored(raw.to_string()),
        }
    }
}

/// Compiles the cache key for one field evaluation.
///
/// # Arguments
///
/// - `cache_key` — the ordered key spec, e.g. `["parent.id", "args"]`.
/// - `parent` — the parent value handed to the resolver.
/// - `args` — the field's argument map.
/// - `vars` — the operation's variable map.
///
/// # Returns
///
/// `"ch-"` followed by the 64-character hex SHA-256 digest of the extracted
/// values. Identical inputs always produce the same key; reordering tokens
/// changes it unless the extracted values coincide.
///
/// # Examples
///
/// ```
/// use fieldcache::key::compile_key;
/// use serde_json::json;
///
/// let spec = vec!["parent.id".to_string()];
/// let a = compile_key(&spec, &json!({"id": "12345"}), &json!({"first": 1}), &json!({}));
/// let b = compile_key(&spec, &json!({"id": "12345"}), &json!({"first": 2}), &json!({"x": 1}));
/// assert_eq!(a, b);
/// assert!(a.starts_with("ch-"));
/// ```
pub fn compile_key(cache_key: &[String], parent: &Value, args: &Value, vars: &Value) -> String {
    let parts: Vec<Value> = cache_key
        .iter()
        .filter_map(|raw| extract(&KeyToken::parse(raw), parent, args, vars))
        .collect();

    // serde_json keeps object keys sorted, so the rendering is canonical.
    let combined = Value::Array(parts).to_string();
    let digest = Sha256::digest(combined.as_bytes());

    format!("{KEY_PREFIX}{}", hex::encode(digest))
}

fn extract(token: &KeyToken, parent: &Value, args: &Value, vars: &Value) -> Option<Value> {
    let pick = |source: KeySource| match source {
        KeySource::Parent => parent,
        KeySource::Args => args,
        KeySource::Vars => vars,
    };

    match token {
        KeyToken::Whole(source) => Some(pick(*source).clone()),
        KeyToken::Property(source, property) => {
            let value = pick(*source).get(property.as_str()).cloned();
            Some(value.unwrap_or(Value::Null))
        }
        KeyToken::Ignored(raw) => {
            tracing::trace!(token = %raw, "ignoring cache key token with unknown source");
            None
        }
    }
}
