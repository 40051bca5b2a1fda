//! Service Routes
//!
//! Describe the configured storage services and inspect the instance each
//! one sees.

use super::router::{reply, write_value, AppState, Route, RouteRequest, Router};
use crate::catalog::StorageService;
use crate::error::Result;
use axum::http::StatusCode;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ROUTER_NAME: &str = "service";

/// Public description of one storage service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub name: String,
    pub driver: String,
    pub capabilities: Vec<String>,
}

impl From<&StorageService> for ServiceInfo {
    fn from(service: &StorageService) -> Self {
        Self {
            name: service.name().to_string(),
            driver: service.driver_name().to_string(),
            capabilities: service
                .capabilities()
                .names()
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ServiceRouter;

impl Router for ServiceRouter {
    fn name(&self) -> &str {
        ROUTER_NAME
    }

    fn routes(&self) -> Vec<Route> {
        vec![
            Route::get("services", "/services", services),
            Route::get("serviceInspect", "/services/:service", service_inspect),
            Route::get("instanceInspect", "/services/:service", instance_inspect)
                .queries(&["instance"]),
        ]
    }
}

async fn services(state: AppState, _req: RouteRequest) -> Result<Response> {
    let services: BTreeMap<String, ServiceInfo> = state
        .catalog()
        .all()
        .map(|svc| (svc.name().to_string(), ServiceInfo::from(svc.as_ref())))
        .collect();
    Ok(write_value(&services, None, StatusCode::OK))
}

async fn service_inspect(state: AppState, req: RouteRequest) -> Result<Response> {
    let service = state.catalog().lookup(req.var("service")?)?;
    Ok(write_value(
        &ServiceInfo::from(service.as_ref()),
        None,
        StatusCode::OK,
    ))
}

async fn instance_inspect(state: AppState, req: RouteRequest) -> Result<Response> {
    let task = state
        .dispatcher
        .instance_inspect(&req.cancel, req.var("service")?, req.store.clone())?;
    reply(task, StatusCode::OK).await
}
