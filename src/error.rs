//! Error types for the storage gateway
//!
//! Provides structured error types for the capability registry, the service
//! catalog, the task engine, the fan-out dispatcher and the HTTP surface.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Unified error type for the gateway
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Registry / Lookup Errors
    // =========================================================================
    #[error("{kind} not found: {name}")]
    NotFound { kind: String, name: String },

    #[error("Invalid {kind} type for {name}: {reason}")]
    InvalidType {
        kind: String,
        name: String,
        reason: String,
    },

    // =========================================================================
    // Backend Errors
    // =========================================================================
    #[error("Driver {driver} failed: {reason}")]
    Driver { driver: String, reason: String },

    #[error("Backend operation failed: {service} - {operation}: {source}")]
    BackendOperation {
        service: String,
        operation: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Operation {operation} not supported by service {service}")]
    Unsupported { service: String, operation: String },

    #[error("Batch partially failed ({} service(s)): {first}", .failures.len())]
    BatchPartial {
        /// Serialized batch response holding every successful service entry
        partial: Box<serde_json::Value>,
        /// Failure message per failed service
        failures: BTreeMap<String, String>,
        /// First failure in service-name order
        #[source]
        first: Arc<Error>,
    },

    // =========================================================================
    // Task Errors
    // =========================================================================
    #[error("Task cancelled")]
    Cancelled,

    #[error("Task timed out after {0:?}")]
    Timeout(Duration),

    // =========================================================================
    // API Errors
    // =========================================================================
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Response does not match schema {schema}: {reason}")]
    Schema { schema: String, reason: String },

    // =========================================================================
    // Parse / IO Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a `NotFound` error
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Wrap a driver error with the service and operation it came from
    pub fn backend(service: &str, operation: &str, source: Error) -> Self {
        Error::BackendOperation {
            service: service.to_string(),
            operation: operation.to_string(),
            source: Box::new(source),
        }
    }

    /// HTTP status code a route handler reports for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::InvalidRequest(_) | Error::JsonParse(_) => 400,
            Error::Unsupported { .. } => 501,
            Error::Timeout(_) => 504,
            Error::Cancelled => 503,
            Error::BackendOperation { source, .. } => source.status_code(),
            _ => 500,
        }
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Timeout(_) | Error::Cancelled | Error::Io(_) => true,
            Error::BackendOperation { source, .. } => source.is_transient(),
            Error::BatchPartial { first, .. } => first.is_transient(),
            _ => false,
        }
    }

    /// Results a partially failed operation completed before failing
    pub fn partial_result(&self) -> Option<&serde_json::Value> {
        match self {
            Error::BatchPartial { partial, .. } => Some(partial),
            Error::BackendOperation { source, .. } => source.partial_result(),
            _ => None,
        }
    }
}

/// Result type alias for the gateway
pub type Result<T> = std::result::Result<T, Error>;
