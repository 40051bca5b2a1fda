//! HTTP API
//!
//! Routers are registered in the capability registry like any other module
//! kind and assembled into one axum application at startup.

pub mod router;
pub mod server;
pub mod services;
pub mod snapshots;
pub mod volumes;

pub use router::{
    error_response, reply, reply_empty, write_value, ApiErrorResponse, AppState, Route,
    RouteHandler, RouteRequest, Router,
};
pub use server::{build_app, ApiServer, SERVER_NAME_HEADER};
pub use services::{ServiceInfo, ServiceRouter};
pub use snapshots::SnapshotRouter;
pub use volumes::VolumeRouter;

use crate::registry::Registry;

/// Register the built-in routers
pub fn register_routers(registry: &Registry) {
    registry.register_router(volumes::ROUTER_NAME, || Box::new(VolumeRouter));
    registry.register_router(snapshots::ROUTER_NAME, || Box::new(SnapshotRouter));
    registry.register_router(services::ROUTER_NAME, || Box::new(ServiceRouter));
}
