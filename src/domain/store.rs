//! Request Option Store
//!
//! A read-only key/value bag handed to storage drivers with every call. Keys
//! are case-insensitive. Values come from path variables, query parameters
//! and the JSON request body, in that order of precedence (later wins).

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Case-insensitive option bag
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Store {
    values: BTreeMap<String, Value>,
}

impl Store {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with string variables (e.g. path parameters)
    pub fn with_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut store = Self::new();
        for (k, v) in vars {
            store.set(k.as_ref(), Value::String(v.into()));
        }
        store
    }

    /// Merge the members of a JSON object into the store
    pub fn merge_object(&mut self, object: Map<String, Value>) {
        for (k, v) in object {
            self.set(&k, v);
        }
    }

    /// Set a value
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_lowercase(), value.into());
    }

    /// Builder-style `set`
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Get a raw value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(&key.to_lowercase())
    }

    /// Whether a key is present
    pub fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// All keys (lower-cased)
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// String value, empty when absent
    pub fn get_string(&self, key: &str) -> String {
        self.get_string_ptr(key).unwrap_or_default()
    }

    /// String value, `None` when absent or null
    pub fn get_string_ptr(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Boolean value. A bare key (empty string) counts as `true`.
    pub fn get_bool(&self, key: &str) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(
                s.to_lowercase().as_str(),
                "" | "true" | "1" | "yes" | "on"
            ),
            Some(Value::Number(n)) => n.as_i64().map(|n| n != 0).unwrap_or(false),
            _ => false,
        }
    }

    /// Integer value, zero when absent or unparsable
    pub fn get_int64(&self, key: &str) -> i64 {
        self.get_int64_ptr(key).unwrap_or_default()
    }

    /// Integer value, `None` when absent or unparsable
    pub fn get_int64_ptr(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}
