//! Cache key construction.
//!
//! A cache key is derived from the logical endpoint plus its normalized
//! query parameters. Two requests with the same endpoint and semantically
//! equal parameters produce the same key regardless of the order in which
//! parameters were added; unset parameters are excluded before the key is
//! built. Keys stay human-readable so substring invalidation
//! (`invalidate_pattern`) can target whole endpoint families.

use std::collections::BTreeMap;
use std::fmt;

/// A single query parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Int(i64),
    Str(String),
    Bool(bool),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(value) => f.write_str(value),
            Self::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Normalized query parameters for one upstream request.
///
/// Backed by an ordered map, so iteration (and therefore key derivation)
/// is independent of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    values: BTreeMap<String, ParamValue>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Set a parameter only when a value is present. Absent parameters do
    /// not participate in key derivation.
    pub fn set_opt(
        &mut self,
        key: impl Into<String>,
        value: Option<impl Into<ParamValue>>,
    ) -> &mut Self {
        if let Some(value) = value {
            self.values.insert(key.into(), value.into());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }
}

/// Build the cache key for an endpoint + parameter combination.
pub fn cache_key(endpoint: &str, params: &QueryParams) -> String {
    if params.is_empty() {
        return endpoint.to_string();
    }

    let mut key = String::with_capacity(endpoint.len() + 16 * params.len());
    key.push_str(endpoint);
    key.push(':');
    for (index, (name, value)) in params.iter().enumerate() {
        if index > 0 {
            key.push('&');
        }
        key.push_str(name);
        key.push('=');
        key.push_str(&value.to_string());
    }
    key
}
