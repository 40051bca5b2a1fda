//! Router Contract
//!
//! A router is a named, registry-constructed bundle of routes. Each route
//! carries its HTTP method, an axum-style path, the query keys that must be
//! present for it to match, and an async handler that receives the shared
//! [`AppState`] plus a [`RouteRequest`] built from the path variables, the
//! query string and the JSON body.

use crate::catalog::ServiceCatalog;
use crate::config::GatewayConfig;
use crate::dispatch::Dispatcher;
use crate::domain::Store;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::metrics::Metrics;
use crate::registry::Registry;
use crate::schema::ResponseSchema;
use crate::task::{Task, TaskEngine};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

// =============================================================================
// Router Trait
// =============================================================================

/// A named group of HTTP routes
pub trait Router: Send + Sync {
    fn name(&self) -> &str;

    /// Called once with the gateway configuration before `routes`
    fn init(&mut self, _config: &GatewayConfig) -> Result<()> {
        Ok(())
    }

    fn routes(&self) -> Vec<Route>;
}

// =============================================================================
// Routes
// =============================================================================

pub type RouteHandler =
    Arc<dyn Fn(AppState, RouteRequest) -> BoxFuture<'static, Response> + Send + Sync>;

#[derive(Clone)]
pub struct Route {
    pub name: &'static str,
    pub method: Method,
    pub path: &'static str,
    /// Query keys that must be present for this route to match
    pub queries: Vec<&'static str>,
    pub handler: RouteHandler,
}

impl Route {
    /// Create a route from an async handler; handler errors are written with
    /// [`error_response`]
    pub fn new<F, Fut>(name: &'static str, method: Method, path: &'static str, handler: F) -> Self
    where
        F: Fn(AppState, RouteRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        let handler: RouteHandler = Arc::new(move |state, req| {
            let fut = handler(state, req);
            Box::pin(async move { fut.await.unwrap_or_else(|e| error_response(&e)) })
        });

        Self {
            name,
            method,
            path,
            queries: Vec::new(),
            handler,
        }
    }

    pub fn get<F, Fut>(name: &'static str, path: &'static str, handler: F) -> Self
    where
        F: Fn(AppState, RouteRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        Self::new(name, Method::GET, path, handler)
    }

    pub fn post<F, Fut>(name: &'static str, path: &'static str, handler: F) -> Self
    where
        F: Fn(AppState, RouteRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        Self::new(name, Method::POST, path, handler)
    }

    pub fn delete<F, Fut>(name: &'static str, path: &'static str, handler: F) -> Self
    where
        F: Fn(AppState, RouteRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        Self::new(name, Method::DELETE, path, handler)
    }

    /// Require the given query keys
    pub fn queries(mut self, keys: &[&'static str]) -> Self {
        self.queries = keys.to_vec();
        self
    }

    /// Whether every required query key is present (case-insensitive)
    pub fn matches_query(&self, query: &[(String, String)]) -> bool {
        self.queries
            .iter()
            .all(|required| query.iter().any(|(k, _)| k.eq_ignore_ascii_case(required)))
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("queries", &self.queries)
            .finish()
    }
}

// =============================================================================
// Request State
// =============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub dispatcher: Arc<Dispatcher>,
    pub engine: Arc<TaskEngine>,
    pub metrics: Option<Arc<Metrics>>,
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    pub fn new(
        registry: Arc<Registry>,
        dispatcher: Arc<Dispatcher>,
        config: GatewayConfig,
    ) -> Self {
        let engine = dispatcher.catalog().engine().clone();
        let metrics = engine.metrics().cloned();

        Self {
            registry,
            dispatcher,
            engine,
            metrics,
            config: Arc::new(config),
        }
    }

    pub fn catalog(&self) -> &Arc<ServiceCatalog> {
        self.dispatcher.catalog()
    }
}

/// One matched HTTP request
#[derive(Debug, Clone)]
pub struct RouteRequest {
    /// Path variables, e.g. `service` and `volumeID`
    pub vars: HashMap<String, String>,
    /// Decoded query pairs in request order
    pub query: Vec<(String, String)>,
    /// Path variables, query parameters and JSON body, later sources winning
    pub store: Store,
    /// Cancelled when the client goes away or the engine shuts down
    pub cancel: CancellationToken,
}

impl RouteRequest {
    /// A path variable
    pub fn var(&self, name: &str) -> Result<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| Error::InvalidRequest(format!("missing path variable {}", name)))
    }

    /// A non-empty string option
    pub fn require(&self, key: &str) -> Result<String> {
        match self.store.get_string_ptr(key) {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(Error::InvalidRequest(format!("{} is required", key))),
        }
    }

    /// Predicates taken from the query string
    pub fn filter(&self) -> Filter {
        Filter::from_pairs(self.query.iter().cloned())
    }
}

// =============================================================================
// Replies
// =============================================================================

/// Error body returned by every route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Successful entries of a partially failed batch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failures: Option<BTreeMap<String, String>>,
}

impl ApiErrorResponse {
    pub fn from_error(err: &Error) -> Self {
        let (partial, failures) = match err {
            Error::BatchPartial {
                partial, failures, ..
            } => (Some((**partial).clone()), Some(failures.clone())),
            _ => (None, None),
        };

        Self {
            error: error_code(err).to_string(),
            message: err.to_string(),
            details: std::error::Error::source(err).map(|s| s.to_string()),
            partial,
            failures,
        }
    }
}

fn error_code(err: &Error) -> &'static str {
    match err {
        Error::NotFound { .. } => "not_found",
        Error::InvalidRequest(_) | Error::JsonParse(_) => "invalid_request",
        Error::Unsupported { .. } => "unsupported",
        Error::Timeout(_) => "timeout",
        Error::Cancelled => "cancelled",
        Error::BatchPartial { .. } => "batch_partial",
        Error::Schema { .. } => "schema_mismatch",
        Error::BackendOperation { source, .. } => match **source {
            Error::Driver { .. } => "backend_error",
            ref inner => error_code(inner),
        },
        _ => "internal_error",
    }
}

/// Write an error with its mapped status code
pub fn error_response(err: &Error) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(error = %err, "Request failed");
    } else {
        debug!(error = %err, "Request rejected");
    }

    (status, Json(ApiErrorResponse::from_error(err))).into_response()
}

/// Serialize a value, check it against its schema and write it
pub fn write_value<T: Serialize>(
    value: &T,
    schema: Option<ResponseSchema>,
    status: StatusCode,
) -> Response {
    let json = match serde_json::to_value(value) {
        Ok(json) => json,
        Err(e) => return error_response(&Error::from(e)),
    };

    if let Some(schema) = schema {
        if let Err(e) = schema.validate(&json) {
            return error_response(&e);
        }
    }

    (status, Json(json)).into_response()
}

/// Wait for a task and write its result, validated against the task's schema
pub async fn reply<T>(task: Arc<Task<T>>, status: StatusCode) -> Result<Response>
where
    T: Serialize + Send + Sync + 'static,
{
    Ok(match task.wait().await {
        Ok(value) => write_value(value, task.schema(), status),
        Err(e) => error_response(e),
    })
}

/// Wait for a task with no result and write a bare status
pub async fn reply_empty(task: Arc<Task<()>>, status: StatusCode) -> Result<Response> {
    Ok(match task.wait().await {
        Ok(()) => status.into_response(),
        Err(e) => error_response(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn noop_route() -> Route {
        Route::post("noop", "/noop", |_state, _req| async {
            Ok(StatusCode::OK.into_response())
        })
    }

    #[test]
    fn test_route_query_matching() {
        let route = noop_route().queries(&["detach"]);
        let pairs = |p: &[(&str, &str)]| -> Vec<(String, String)> {
            p.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
        };

        assert!(route.matches_query(&pairs(&[("detach", "")])));
        assert!(route.matches_query(&pairs(&[("force", "true"), ("Detach", "")])));
        assert!(!route.matches_query(&pairs(&[("attach", "")])));
        assert!(noop_route().matches_query(&[]));
    }

    #[test]
    fn test_request_helpers() {
        let req = RouteRequest {
            vars: [("service".to_string(), "alpha".to_string())].into_iter().collect(),
            query: vec![
                ("attachments".to_string(), String::new()),
                ("region".to_string(), "us-east".to_string()),
            ],
            store: Store::new().with("volumeName", "copy").with("blank", " "),
            cancel: CancellationToken::new(),
        };

        assert_eq!(req.var("service").unwrap(), "alpha");
        assert!(req.var("volumeID").is_err());
        assert_eq!(req.require("volumename").unwrap(), "copy");
        assert!(req.require("blank").is_err());
        assert!(req.require("absent").is_err());

        let filter = req.filter();
        assert_eq!(filter.predicates().len(), 1);
        assert!(filter.predicates().contains_key("region"));
    }

    #[test]
    fn test_error_body() {
        let err = Error::backend(
            "alpha",
            "volumes",
            Error::Driver {
                driver: "vfs".into(),
                reason: "boom".into(),
            },
        );
        let body = ApiErrorResponse::from_error(&err);
        assert_eq!(body.error, "backend_error");
        assert!(body.details.unwrap().contains("boom"));
        assert!(body.partial.is_none());

        let first = Arc::new(Error::not_found("volume", "vol-9"));
        let err = Error::BatchPartial {
            partial: Box::new(serde_json::json!({"alpha": {}})),
            failures: [("beta".to_string(), first.to_string())].into_iter().collect(),
            first,
        };
        let body = ApiErrorResponse::from_error(&err);
        assert_eq!(body.error, "batch_partial");
        assert_eq!(body.partial.unwrap()["alpha"], serde_json::json!({}));
        assert_eq!(body.failures.unwrap().len(), 1);
    }

    #[test]
    fn test_error_response_status() {
        let resp = error_response(&Error::not_found("service", "gamma"));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = error_response(&Error::Timeout(std::time::Duration::from_secs(1)));
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_write_value_schema_mismatch() {
        let bad = serde_json::json!({"vol-1": {"id": "vol-1"}});
        let resp = write_value(&bad, Some(ResponseSchema::VolumeMap), StatusCode::OK);
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let good = serde_json::json!({"vol-1": {"id": "vol-1", "name": "data"}});
        let resp = write_value(&good, Some(ResponseSchema::VolumeMap), StatusCode::OK);
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
