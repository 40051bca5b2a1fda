//! Volume Routes
//!
//! | Route                  | Method | Path                               | Status |
//! |------------------------|--------|------------------------------------|--------|
//! | volumes                | GET    | `/volumes`                         | 200    |
//! | volumesForService      | GET    | `/volumes/:service`                | 200    |
//! | volumeInspect          | GET    | `/volumes/:service/:volumeID`      | 200    |
//! | volumeCreate           | POST   | `/volumes/:service`                | 201    |
//! | volumeCopy             | POST   | `/volumes/:service/:volumeID?copy` | 201    |
//! | volumeSnapshot         | POST   | `…/:volumeID?snapshot`             | 201    |
//! | volumeAttach           | POST   | `…/:volumeID?attach`               | 200    |
//! | volumeDetach           | POST   | `…/:volumeID?detach`               | 205    |
//! | volumeDetachAll        | POST   | `/volumes?detach`                  | 205    |
//! | volumeDetachAllForSvc  | POST   | `/volumes/:service?detach`         | 205    |
//! | volumeRemove           | DELETE | `/volumes/:service/:volumeID`      | 204    |

use super::router::{reply, reply_empty, AppState, Route, RouteRequest, Router};
use crate::domain::{
    Store, VolumeAttachOpts, VolumeCreateOpts, VolumeDetachOpts, VolumeInspectOpts, VolumesOpts,
};
use crate::error::Result;
use axum::http::StatusCode;
use axum::response::Response;

pub const ROUTER_NAME: &str = "volume";

#[derive(Debug, Default)]
pub struct VolumeRouter;

impl Router for VolumeRouter {
    fn name(&self) -> &str {
        ROUTER_NAME
    }

    fn routes(&self) -> Vec<Route> {
        vec![
            Route::get("volumes", "/volumes", volumes),
            Route::get("volumesForService", "/volumes/:service", volumes_for_service),
            Route::get("volumeInspect", "/volumes/:service/:volumeID", volume_inspect),
            Route::post("volumeCreate", "/volumes/:service", volume_create),
            Route::post("volumeCopy", "/volumes/:service/:volumeID", volume_copy)
                .queries(&["copy"]),
            Route::post("volumeSnapshot", "/volumes/:service/:volumeID", volume_snapshot)
                .queries(&["snapshot"]),
            Route::post("volumeAttach", "/volumes/:service/:volumeID", volume_attach)
                .queries(&["attach"]),
            Route::post("volumeDetach", "/volumes/:service/:volumeID", volume_detach)
                .queries(&["detach"]),
            Route::post("volumeDetachAll", "/volumes", volume_detach_all).queries(&["detach"]),
            Route::post(
                "volumeDetachAllForService",
                "/volumes/:service",
                volume_detach_all_for_service,
            )
            .queries(&["detach"]),
            Route::delete("volumeRemove", "/volumes/:service/:volumeID", volume_remove),
        ]
    }
}

// =============================================================================
// Option Builders
// =============================================================================

fn volumes_opts(store: &Store) -> VolumesOpts {
    VolumesOpts {
        attachments: store.get_bool("attachments"),
        opts: store.clone(),
    }
}

fn detach_opts(store: &Store) -> VolumeDetachOpts {
    VolumeDetachOpts {
        force: store.get_bool("force"),
        opts: store.clone(),
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn volumes(state: AppState, req: RouteRequest) -> Result<Response> {
    let task = state
        .dispatcher
        .volumes(&req.cancel, volumes_opts(&req.store), req.filter());
    reply(task, StatusCode::OK).await
}

async fn volumes_for_service(state: AppState, req: RouteRequest) -> Result<Response> {
    let task = state.dispatcher.volumes_for_service(
        &req.cancel,
        req.var("service")?,
        volumes_opts(&req.store),
        req.filter(),
    )?;
    reply(task, StatusCode::OK).await
}

async fn volume_inspect(state: AppState, req: RouteRequest) -> Result<Response> {
    let opts = VolumeInspectOpts {
        attachments: req.store.get_bool("attachments"),
        opts: req.store.clone(),
    };
    let task = state.dispatcher.volume_inspect(
        &req.cancel,
        req.var("service")?,
        req.var("volumeID")?.to_string(),
        opts,
    )?;
    reply(task, StatusCode::OK).await
}

async fn volume_create(state: AppState, req: RouteRequest) -> Result<Response> {
    let store = &req.store;
    let opts = VolumeCreateOpts {
        availability_zone: store.get_string_ptr("availabilityZone"),
        iops: store.get_int64_ptr("iops"),
        size: store.get_int64_ptr("size"),
        volume_type: store.get_string_ptr("type"),
        opts: store.clone(),
    };
    let task = state.dispatcher.volume_create(
        &req.cancel,
        req.var("service")?,
        store.get_string("name"),
        opts,
    )?;
    reply(task, StatusCode::CREATED).await
}

async fn volume_copy(state: AppState, req: RouteRequest) -> Result<Response> {
    let task = state.dispatcher.volume_copy(
        &req.cancel,
        req.var("service")?,
        req.var("volumeID")?.to_string(),
        req.require("volumeName")?,
        req.store.clone(),
    )?;
    reply(task, StatusCode::CREATED).await
}

async fn volume_snapshot(state: AppState, req: RouteRequest) -> Result<Response> {
    let task = state.dispatcher.volume_snapshot(
        &req.cancel,
        req.var("service")?,
        req.var("volumeID")?.to_string(),
        req.require("snapshotName")?,
        req.store.clone(),
    )?;
    reply(task, StatusCode::CREATED).await
}

async fn volume_attach(state: AppState, req: RouteRequest) -> Result<Response> {
    let opts = VolumeAttachOpts {
        next_device: req.store.get_string_ptr("nextDeviceName"),
        force: req.store.get_bool("force"),
        opts: req.store.clone(),
    };
    let task = state.dispatcher.volume_attach(
        &req.cancel,
        req.var("service")?,
        req.var("volumeID")?.to_string(),
        opts,
    )?;
    reply(task, StatusCode::OK).await
}

async fn volume_detach(state: AppState, req: RouteRequest) -> Result<Response> {
    let task = state.dispatcher.volume_detach(
        &req.cancel,
        req.var("service")?,
        req.var("volumeID")?.to_string(),
        detach_opts(&req.store),
    )?;
    reply_empty(task, StatusCode::RESET_CONTENT).await
}

async fn volume_detach_all(state: AppState, req: RouteRequest) -> Result<Response> {
    let task = state
        .dispatcher
        .volume_detach_all(&req.cancel, detach_opts(&req.store));
    reply(task, StatusCode::RESET_CONTENT).await
}

async fn volume_detach_all_for_service(state: AppState, req: RouteRequest) -> Result<Response> {
    let task = state.dispatcher.volume_detach_all_for_service(
        &req.cancel,
        req.var("service")?,
        detach_opts(&req.store),
    )?;
    reply(task, StatusCode::RESET_CONTENT).await
}

async fn volume_remove(state: AppState, req: RouteRequest) -> Result<Response> {
    let task = state.dispatcher.volume_remove(
        &req.cancel,
        req.var("service")?,
        req.var("volumeID")?.to_string(),
        req.store.clone(),
    )?;
    reply_empty(task, StatusCode::NO_CONTENT).await
}
