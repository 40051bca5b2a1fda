//! Result Filter
//!
//! Key/value predicates over a storage object's `fields`. An object is kept
//! iff, for every predicate key, it has a non-empty value for that key equal
//! to one of the allowed values. An empty predicate set keeps everything.
//!
//! Predicates come from URL query strings. Option keys such as
//! `attachments` are consumed by the request itself and never act as
//! predicates.

use crate::domain::{Fields, StorageObject};
use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Query keys that are request options rather than predicates
pub const RESERVED_KEYS: &[&str] = &["attachments"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    predicates: BTreeMap<String, Vec<String>>,
}

impl Filter {
    /// Filter that keeps everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from key/value pairs; repeated keys accumulate allowed values
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut predicates: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in pairs {
            let key = key.into();
            if is_reserved(&key) {
                continue;
            }
            predicates.entry(key).or_default().push(value.into());
        }
        Self { predicates }
    }

    /// Parse a raw (percent-encoded) URL query string
    pub fn from_query(query: &str) -> Result<Self> {
        Ok(Self::from_pairs(parse_query(query)?))
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn predicates(&self) -> &BTreeMap<String, Vec<String>> {
        &self.predicates
    }

    /// Whether an attribute map satisfies every predicate
    pub fn matches(&self, fields: &Fields) -> bool {
        self.predicates.iter().all(|(key, allowed)| match fields.get(key) {
            Some(value) if !value.is_empty() => allowed.iter().any(|a| a == value),
            _ => false,
        })
    }

    pub fn matches_object<O: StorageObject>(&self, object: &O) -> bool {
        self.matches(object.fields())
    }

    /// Keep the objects that satisfy the filter
    pub fn apply<O: StorageObject>(&self, objects: Vec<O>) -> Vec<O> {
        if self.is_empty() {
            return objects;
        }
        objects
            .into_iter()
            .filter(|o| self.matches_object(o))
            .collect()
    }
}

fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.iter().any(|r| r.eq_ignore_ascii_case(key))
}

/// Split and percent-decode a URL query string
pub fn parse_query(query: &str) -> Result<Vec<(String, String)>> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            Ok((decode_component(key)?, decode_component(value)?))
        })
        .collect()
}

fn decode_component(raw: &str) -> Result<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .map_err(|e| Error::InvalidRequest(format!("invalid query component {}: {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Volume;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_filter_table() {
        let f = Filter::from_pairs([("env", "prod"), ("env", "stage")]);

        let cases = [
            (fields(&[("env", "prod")]), true),
            (fields(&[("env", "stage"), ("tier", "gold")]), true),
            (fields(&[("env", "dev")]), false),
            (fields(&[("env", "")]), false),
            (fields(&[("tier", "gold")]), false),
            (fields(&[]), false),
        ];

        for (input, expected) in cases {
            assert_eq!(f.matches(&input), expected, "fields: {:?}", input);
        }
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        let f = Filter::new();
        assert!(f.matches(&fields(&[])));
        assert!(f.matches(&fields(&[("anything", "")])));
    }

    #[test]
    fn test_every_key_must_match() {
        let f = Filter::from_pairs([("env", "prod"), ("tier", "gold")]);
        assert!(f.matches(&fields(&[("env", "prod"), ("tier", "gold")])));
        assert!(!f.matches(&fields(&[("env", "prod"), ("tier", "silver")])));
    }

    #[test]
    fn test_from_query_decodes_and_strips_reserved() {
        let f = Filter::from_query("name=my%20vol&attachments&zone=a+b&Attachments=true").unwrap();
        let keys: Vec<_> = f.predicates().keys().cloned().collect();
        assert_eq!(keys, vec!["name", "zone"]);
        assert_eq!(f.predicates()["name"], vec!["my vol"]);
        assert_eq!(f.predicates()["zone"], vec!["a b"]);
    }

    #[test]
    fn test_from_query_rejects_bad_encoding() {
        let err = Filter::from_query("name=%FF%FE").unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_apply() {
        let volumes = vec![
            Volume::new("v1", "a").with_field("env", "prod"),
            Volume::new("v2", "b").with_field("env", "dev"),
            Volume::new("v3", "c"),
        ];
        let kept = Filter::from_pairs([("env", "prod")]).apply(volumes);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "v1");
    }
}
