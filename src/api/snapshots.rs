//! Snapshot Routes

use super::router::{reply, AppState, Route, RouteRequest, Router};
use crate::error::Result;
use axum::http::StatusCode;
use axum::response::Response;

pub const ROUTER_NAME: &str = "snapshot";

#[derive(Debug, Default)]
pub struct SnapshotRouter;

impl Router for SnapshotRouter {
    fn name(&self) -> &str {
        ROUTER_NAME
    }

    fn routes(&self) -> Vec<Route> {
        vec![
            Route::get("snapshots", "/snapshots", snapshots),
            Route::get(
                "snapshotsForService",
                "/snapshots/:service",
                snapshots_for_service,
            ),
        ]
    }
}

async fn snapshots(state: AppState, req: RouteRequest) -> Result<Response> {
    let task = state
        .dispatcher
        .snapshots(&req.cancel, req.store.clone(), req.filter());
    reply(task, StatusCode::OK).await
}

async fn snapshots_for_service(state: AppState, req: RouteRequest) -> Result<Response> {
    let task = state.dispatcher.snapshots_for_service(
        &req.cancel,
        req.var("service")?,
        req.store.clone(),
        req.filter(),
    )?;
    reply(task, StatusCode::OK).await
}
