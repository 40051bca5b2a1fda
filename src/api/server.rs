//! API Server
//!
//! Assembles the routes of every registered router into one axum
//! application and serves it until shutdown.
//!
//! Several routes may share a path and method and differ only by the query
//! keys they require (`POST /volumes/:service/:volumeID?attach` versus
//! `?detach`). axum routes on path alone, so each path gets a single
//! handler that picks the most specific route whose method matches and
//! whose required keys are all present.

use super::router::{error_response, AppState, Route, RouteRequest};
use crate::domain::Store;
use crate::error::{Error, Result};
use crate::filter::parse_query;
use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::header::{HeaderValue, CONTENT_TYPE};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Response header carrying the configured server name
pub const SERVER_NAME_HEADER: &str = "x-storage-gateway-server";

// =============================================================================
// Application
// =============================================================================

/// Build the axum application from the routers in the registry
pub fn build_app(state: AppState) -> Result<axum::Router> {
    let mut by_path: IndexMap<&'static str, Vec<Route>> = IndexMap::new();

    for mut router in state.registry.routers() {
        router.init(&state.config)?;
        for route in router.routes() {
            debug!(
                router = router.name(),
                route = route.name,
                method = %route.method,
                path = route.path,
                queries = ?route.queries,
                "Registered route"
            );
            by_path.entry(route.path).or_default().push(route);
        }
    }

    let mut app: axum::Router<AppState> = axum::Router::new();
    for (path, routes) in by_path {
        let routes: Arc<[Route]> = routes.into();
        app = app.route(
            path,
            any(
                move |State(state): State<AppState>,
                      method: Method,
                      vars: Option<Path<HashMap<String, String>>>,
                      RawQuery(query): RawQuery,
                      body: Bytes| {
                    let routes = routes.clone();
                    async move {
                        let vars = vars.map(|Path(vars)| vars).unwrap_or_default();
                        handle(state, &routes, method, vars, query, body).await
                    }
                },
            ),
        );
    }

    let app = app
        .route("/healthz", get(health_check))
        .route("/readyz", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state);

    Ok(app)
}

/// Select the matching route for a request
///
/// `Err(true)` means the path has no route for the method, `Err(false)`
/// that none of its routes had their query keys satisfied.
fn select_route<'a>(
    routes: &'a [Route],
    method: &Method,
    query: &[(String, String)],
) -> std::result::Result<&'a Route, bool> {
    let mut candidates = routes.iter().filter(|r| r.method == *method).peekable();
    if candidates.peek().is_none() {
        return Err(true);
    }

    candidates
        .filter(|r| r.matches_query(query))
        .max_by_key(|r| r.queries.len())
        .ok_or(false)
}

/// Layer path variables, query parameters and the JSON body into a store
fn build_store(
    vars: &HashMap<String, String>,
    query: &[(String, String)],
    body: &Bytes,
) -> Result<Store> {
    let mut store = Store::with_vars(vars.iter().map(|(k, v)| (k, v.clone())));
    for (key, value) in query {
        store.set(key, value.as_str());
    }

    if !body.iter().all(u8::is_ascii_whitespace) {
        match serde_json::from_slice::<serde_json::Value>(body)? {
            serde_json::Value::Object(object) => store.merge_object(object),
            serde_json::Value::Null => {}
            _ => {
                return Err(Error::InvalidRequest(
                    "request body must be a JSON object".into(),
                ))
            }
        }
    }

    Ok(store)
}

async fn handle(
    state: AppState,
    routes: &[Route],
    method: Method,
    vars: HashMap<String, String>,
    query: Option<String>,
    body: Bytes,
) -> Response {
    let query = match parse_query(query.as_deref().unwrap_or_default()) {
        Ok(query) => query,
        Err(e) => return error_response(&e),
    };

    let route = match select_route(routes, &method, &query) {
        Ok(route) => route,
        Err(true) => return StatusCode::METHOD_NOT_ALLOWED.into_response(),
        Err(false) => {
            let path = routes.first().map(|r| r.path).unwrap_or_default();
            return error_response(&Error::not_found("route", format!("{} {}", method, path)));
        }
    };

    let store = match build_store(&vars, &query, &body) {
        Ok(store) => store,
        Err(e) => return error_response(&e),
    };

    // Dropping the guard cancels the request's tasks if the client goes away
    let cancel = state.engine.request_token();
    let _guard = cancel.clone().drop_guard();

    debug!(route = route.name, "http request");
    let server_name = HeaderValue::from_str(&state.config.server.name).ok();
    let req = RouteRequest {
        vars,
        query,
        store,
        cancel,
    };

    let mut response = (route.handler)(state, req).await;
    if let Some(name) = server_name {
        response.headers_mut().insert(SERVER_NAME_HEADER, name);
    }
    response
}

// =============================================================================
// Health & Metrics
// =============================================================================

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness check
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.engine.is_shutdown() {
        (StatusCode::SERVICE_UNAVAILABLE, "shutting down")
    } else if state.catalog().is_empty() {
        (StatusCode::SERVICE_UNAVAILABLE, "no storage services configured")
    } else {
        (StatusCode::OK, "ready")
    }
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    let Some(metrics) = state.metrics.as_ref() else {
        return (StatusCode::NOT_FOUND, "metrics disabled").into_response();
    };

    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

// =============================================================================
// API Server
// =============================================================================

pub struct ApiServer {
    addr: SocketAddr,
    state: AppState,
    shutdown_tx: broadcast::Sender<()>,
}

impl ApiServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            addr,
            state,
            shutdown_tx,
        }
    }

    /// Serve until [`ApiServer::shutdown`] is called
    pub async fn run(&self) -> Result<()> {
        let app = build_app(self.state.clone())?;
        let engine = self.state.engine.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| Error::Internal(format!("Failed to bind API server: {}", e)))?;

        info!(
            "API listening on {} ({} services)",
            self.addr,
            self.state.catalog().len()
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("API server shutting down");
                engine.shutdown();
            })
            .await
            .map_err(|e| {
                error!("API server error: {}", e);
                Error::Internal(format!("API server error: {}", e))
            })?;

        Ok(())
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(name: &'static str, method: Method, queries: &[&'static str]) -> Route {
        Route::new(name, method, "/volumes/:service", |_state, _req| async {
            Ok(StatusCode::OK.into_response())
        })
        .queries(queries)
    }

    fn pairs(keys: &[&str]) -> Vec<(String, String)> {
        keys.iter().map(|k| (k.to_string(), String::new())).collect()
    }

    #[test]
    fn test_select_most_specific_route() {
        let routes = vec![
            route("create", Method::POST, &[]),
            route("detachAll", Method::POST, &["detach"]),
            route("list", Method::GET, &[]),
        ];

        let picked = select_route(&routes, &Method::POST, &pairs(&["detach"])).unwrap();
        assert_eq!(picked.name, "detachAll");

        let picked = select_route(&routes, &Method::POST, &pairs(&["force"])).unwrap();
        assert_eq!(picked.name, "create");

        let picked = select_route(&routes, &Method::GET, &pairs(&["detach"])).unwrap();
        assert_eq!(picked.name, "list");

        assert!(select_route(&routes, &Method::DELETE, &[]).unwrap_err());
    }

    #[test]
    fn test_select_requires_query_keys() {
        let routes = vec![route("attach", Method::POST, &["attach"])];
        assert!(!select_route(&routes, &Method::POST, &[]).unwrap_err());
    }

    #[test]
    fn test_build_store_layers() {
        let vars: HashMap<String, String> = [("service".to_string(), "alpha".to_string())]
            .into_iter()
            .collect();
        let query = vec![("size".to_string(), "1".to_string())];
        let body = Bytes::from_static(br#"{"size": 10, "name": "data"}"#);

        let store = build_store(&vars, &query, &body).unwrap();
        assert_eq!(store.get_string("service"), "alpha");
        assert_eq!(store.get_int64("size"), 10);
        assert_eq!(store.get_string("name"), "data");
    }

    #[test]
    fn test_build_store_rejects_bad_body() {
        let vars = HashMap::new();
        assert!(build_store(&vars, &[], &Bytes::from_static(b"  \n")).is_ok());
        assert!(matches!(
            build_store(&vars, &[], &Bytes::from_static(b"[1, 2]")),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            build_store(&vars, &[], &Bytes::from_static(b"{not json")),
            Err(Error::JsonParse(_))
        ));
    }
}
