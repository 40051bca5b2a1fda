//! Shared helpers for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Method, Request, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use storage_gateway::config::ConfigScope;
use storage_gateway::domain::{VolumeDetachOpts, VolumeInspectOpts, VolumesOpts};
use storage_gateway::{
    build_app, AppState, Capabilities, Dispatcher, Error, GatewayConfig, Metrics, Registry,
    Result, ServiceCatalog, StorageDriver, TaskContext, TaskEngine, TaskEngineConfig, Volume,
};
use tower::ServiceExt;

// =============================================================================
// Scripted Driver
// =============================================================================

/// What a scripted driver answers to `volumes`
#[derive(Clone)]
pub enum Script {
    Volumes(Vec<Volume>),
    Timeout,
    Fail(&'static str),
    /// Lists the volumes; detaching the named one fails
    StuckDetach(Vec<Volume>, &'static str),
}

/// Storage driver whose listing is fixed up front
pub struct ScriptedDriver {
    name: String,
    script: Script,
}

impl ScriptedDriver {
    pub fn new(name: &str, script: Script) -> Self {
        Self {
            name: name.to_string(),
            script,
        }
    }
}

#[async_trait]
impl StorageDriver for ScriptedDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        match self.script {
            Script::StuckDetach(..) => Capabilities::REQUIRED | Capabilities::VOLUME_DETACH,
            _ => Capabilities::REQUIRED,
        }
    }

    async fn init(&mut self, _config: &ConfigScope) -> Result<()> {
        Ok(())
    }

    async fn volumes(&self, _ctx: &TaskContext, _opts: &VolumesOpts) -> Result<Vec<Volume>> {
        match &self.script {
            Script::Volumes(volumes) | Script::StuckDetach(volumes, _) => Ok(volumes.clone()),
            Script::Timeout => Err(Error::Timeout(Duration::from_secs(30))),
            Script::Fail(reason) => Err(Error::Driver {
                driver: self.name.clone(),
                reason: reason.to_string(),
            }),
        }
    }

    async fn volume_inspect(
        &self,
        _ctx: &TaskContext,
        volume_id: &str,
        _opts: &VolumeInspectOpts,
    ) -> Result<Volume> {
        match &self.script {
            Script::Volumes(volumes) => volumes
                .iter()
                .find(|v| v.id == volume_id)
                .cloned()
                .ok_or_else(|| Error::not_found("volume", volume_id)),
            _ => Err(Error::not_found("volume", volume_id)),
        }
    }

    async fn volume_detach(
        &self,
        _ctx: &TaskContext,
        volume_id: &str,
        _opts: &VolumeDetachOpts,
    ) -> Result<()> {
        match &self.script {
            Script::StuckDetach(_, stuck) if *stuck == volume_id => Err(Error::Driver {
                driver: self.name.clone(),
                reason: format!("{} stuck", volume_id),
            }),
            Script::StuckDetach(..) => Ok(()),
            _ => Err(Error::Unsupported {
                service: self.name.clone(),
                operation: "volume_detach".into(),
            }),
        }
    }
}

/// Register a scripted driver under `name`
pub fn register_scripted(registry: &Registry, name: &str, script: Script) {
    let driver_name = name.to_string();
    registry.register_storage_driver(name, move || {
        Box::new(ScriptedDriver::new(&driver_name, script.clone()))
    });
}

// =============================================================================
// Gateway
// =============================================================================

/// vfs services seeded with the given volume names
pub fn vfs_config(services: &[(&str, &[&str])]) -> GatewayConfig {
    services
        .iter()
        .fold(GatewayConfig::default(), |config, (name, volumes)| {
            let mut settings = serde_json::Map::new();
            settings.insert("volumes".into(), serde_json::json!(volumes));
            config.with_service(name, "vfs", settings)
        })
}

/// Build a fully wired gateway over `registry`
pub async fn gateway_with(registry: Arc<Registry>, config: GatewayConfig) -> AppState {
    let metrics = Metrics::new().unwrap();
    let engine = TaskEngine::with_metrics(TaskEngineConfig::from(&config.server.tasks), metrics);
    let catalog = ServiceCatalog::instantiate(&registry, &config, engine)
        .await
        .unwrap();
    AppState::new(registry, Dispatcher::new(catalog), config)
}

pub async fn gateway(config: GatewayConfig) -> AppState {
    gateway_with(Registry::with_builtins(), config).await
}

pub async fn app(config: GatewayConfig) -> axum::Router {
    build_app(gateway(config).await).unwrap()
}

// =============================================================================
// HTTP
// =============================================================================

/// Send one request; the body is parsed as JSON when there is one
pub async fn send(
    app: &axum::Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, json)
}

pub async fn get(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, None).await
}
