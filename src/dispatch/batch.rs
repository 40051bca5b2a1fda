//! Batch Responses
//!
//! The aggregated outcome of one fan-out: successful results keyed by
//! service name alongside the errors of the services that failed. A failing
//! service never discards a sibling's result.

use crate::domain::VolumeMap;
use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Whether services with an empty result appear in the batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyPolicy {
    /// Keep empty entries (list operations)
    Keep,
    /// Omit services whose result is empty (detach-all)
    Omit,
}

/// Results that can be empty
pub trait IsEmpty {
    fn is_empty_result(&self) -> bool;
}

impl<K, V> IsEmpty for BTreeMap<K, V> {
    fn is_empty_result(&self) -> bool {
        self.is_empty()
    }
}

impl<T> IsEmpty for Vec<T> {
    fn is_empty_result(&self) -> bool {
        self.is_empty()
    }
}

#[derive(Debug)]
pub struct BatchResponse<T> {
    results: BTreeMap<String, T>,
    /// Work a failed service completed before failing
    partials: BTreeMap<String, Value>,
    errors: BTreeMap<String, Arc<Error>>,
    policy: EmptyPolicy,
}

impl<T> BatchResponse<T> {
    pub fn new(policy: EmptyPolicy) -> Self {
        Self {
            results: BTreeMap::new(),
            partials: BTreeMap::new(),
            errors: BTreeMap::new(),
            policy,
        }
    }

    /// Record a service's successful result, honoring the empty policy
    pub fn insert_result(&mut self, service: impl Into<String>, result: T)
    where
        T: IsEmpty,
    {
        if self.policy == EmptyPolicy::Omit && result.is_empty_result() {
            return;
        }
        self.results.insert(service.into(), result);
    }

    pub fn insert_error(&mut self, service: impl Into<String>, error: Arc<Error>) {
        self.errors.insert(service.into(), error);
    }

    /// Record a failed service's completed work under its name
    ///
    /// Kept alongside the failure; empty partials are ignored.
    pub fn insert_partial(&mut self, service: impl Into<String>, partial: Value) {
        let empty = match &partial {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            Value::Array(items) => items.is_empty(),
            _ => false,
        };
        if !empty {
            self.partials.insert(service.into(), partial);
        }
    }

    /// Record a failed service, keeping any partial result it carries
    pub fn insert_failure(&mut self, service: impl Into<String>, error: Arc<Error>) {
        let service = service.into();
        if let Some(partial) = error.partial_result() {
            self.insert_partial(service.clone(), partial.clone());
        }
        self.insert_error(service, error);
    }

    pub fn results(&self) -> &BTreeMap<String, T> {
        &self.results
    }

    pub fn errors(&self) -> &BTreeMap<String, Arc<Error>> {
        &self.errors
    }

    /// True when no service failed
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok` with every result when complete, otherwise `BatchPartial`
    pub fn into_result(self) -> Result<BTreeMap<String, T>>
    where
        T: Serialize,
    {
        let Some(first) = self.errors.values().next().cloned() else {
            return Ok(self.results);
        };

        let mut partial = serde_json::to_value(&self.results)?;
        if let Value::Object(map) = &mut partial {
            map.extend(self.partials);
        }
        let failures = self
            .errors
            .iter()
            .map(|(service, err)| (service.clone(), err.to_string()))
            .collect();

        Err(Error::BatchPartial {
            partial: Box::new(partial),
            failures,
            first,
        })
    }
}

/// Batch of per-service volume maps
pub type VolumeBatch = BatchResponse<VolumeMap>;
