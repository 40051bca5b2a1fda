//! HTTP surface: route selection, status codes and error bodies

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{app, get, send, vfs_config};
use serde_json::json;
use storage_gateway::api::SERVER_NAME_HEADER;
use tower::ServiceExt;

async fn two_services() -> axum::Router {
    app(vfs_config(&[("alpha", &["data", "logs"][..]), ("beta", &["cache"][..])])).await
}

/// Create a volume on alpha and return its ID
async fn create(app: &axum::Router, name: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/volumes/alpha",
        Some(json!({"name": name, "size": 4})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_list_volumes_across_services() {
    let app = two_services().await;

    let (status, body) = get(&app, "/volumes").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alpha"].as_object().unwrap().len(), 2);
    assert_eq!(body["beta"].as_object().unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_volumes_with_filter() {
    let app = two_services().await;

    let (status, body) = get(&app, "/volumes?name=cache&attachments").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["alpha"].as_object().unwrap().is_empty());
    assert_eq!(body["beta"].as_object().unwrap().len(), 1);

    let (_, body) = get(&app, "/volumes/alpha?name=data&name=logs").await;
    assert_eq!(body.as_object().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unknown_service_is_not_found() {
    let app = two_services().await;

    let (status, body) = get(&app, "/volumes/gamma").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = get(&app, "/services/gamma").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_volume_lifecycle() {
    let app = two_services().await;
    let id = create(&app, "db").await;

    let (status, body) = get(&app, &format!("/volumes/alpha/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "db");
    assert_eq!(body["size"], 4);

    let uri = format!("/volumes/alpha/{}?attach", id);
    let body = json!({"nextDeviceName": "/dev/xvdf"});
    let (status, body) = send(&app, Method::POST, &uri, Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["attachments"][0]["deviceName"], "/dev/xvdf");

    // Attached volumes are not removed without force
    let (status, _) = send(&app, Method::DELETE, &format!("/volumes/alpha/{}", id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/volumes/alpha/{}?detach", id);
    let (status, body) = send(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::RESET_CONTENT);
    assert!(body.is_null());

    let (status, body) = send(&app, Method::DELETE, &format!("/volumes/alpha/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());

    let (status, _) = get(&app, &format!("/volumes/alpha/{}", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_requires_name() {
    let app = two_services().await;

    let (status, body) = send(&app, Method::POST, "/volumes/alpha", Some(json!({"size": 1}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn test_copy_and_snapshot() {
    let app = two_services().await;
    let id = create(&app, "src").await;

    let uri = format!("/volumes/alpha/{}?copy", id);
    let (status, _) = send(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::POST, &uri, Some(json!({"volumeName": "dst"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "dst");
    assert_eq!(body["size"], 4);

    let uri = format!("/volumes/alpha/{}?snapshot", id);
    let body = json!({"snapshotName": "nightly"});
    let (status, body) = send(&app, Method::POST, &uri, Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    let snapshot_id = body["id"].as_str().unwrap().to_string();
    assert_eq!(body["volumeId"], id.as_str());

    let (status, body) = get(&app, "/snapshots").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["alpha"].get(&snapshot_id).is_some());
    assert!(body["beta"].as_object().unwrap().is_empty());

    let (_, body) = get(&app, "/snapshots/alpha?name=weekly").await;
    assert!(body.as_object().unwrap().is_empty());
}

#[tokio::test]
async fn test_detach_all() {
    let app = two_services().await;
    let id = create(&app, "attached").await;

    let uri = format!("/volumes/alpha/{}?attach", id);
    let (status, _) = send(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::POST, "/volumes?detach", None).await;
    assert_eq!(status, StatusCode::RESET_CONTENT);
    let detached = body.as_object().unwrap();
    assert_eq!(detached.len(), 1, "services that detached nothing are omitted");
    assert!(body["alpha"].get(&id).is_some());

    // Nothing left to detach
    let (status, body) = send(&app, Method::POST, "/volumes/alpha?detach", None).await;
    assert_eq!(status, StatusCode::RESET_CONTENT);
    assert!(body.as_object().unwrap().is_empty());
}

#[tokio::test]
async fn test_partial_failure_body() {
    let mut config = vfs_config(&[("alpha", &["data"][..])]);
    let mut settings = serde_json::Map::new();
    settings.insert("faults".into(), json!(["volumes"]));
    config = config.with_service("beta", "vfs", settings);
    let app = app(config).await;

    let (status, body) = get(&app, "/volumes").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "batch_partial");
    assert_eq!(body["partial"]["alpha"].as_object().unwrap().len(), 1);
    assert!(body["partial"].get("beta").is_none());
    assert!(body["failures"]["beta"]
        .as_str()
        .unwrap()
        .contains("injected fault"));
}

#[tokio::test]
async fn test_services() {
    let app = two_services().await;

    let (status, body) = get(&app, "/services").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alpha"]["driver"], "vfs");
    assert!(body["beta"]["capabilities"]
        .as_array()
        .unwrap()
        .contains(&json!("volumes")));

    let (status, body) = get(&app, "/services/alpha").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "alpha");

    let (status, body) = get(&app, "/services/alpha?instance").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["providerName"], "vfs");
    assert_eq!(body["instanceId"]["id"], "vfs-0");
}

#[tokio::test]
async fn test_route_selection_errors() {
    let app = two_services().await;

    let (status, _) = send(&app, Method::PUT, "/volumes", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    // Only query-qualified POST routes exist on a volume path
    let (status, body) = send(&app, Method::POST, "/volumes/alpha/vol-000001", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/volumes/alpha")
        .body(Body::from("[1, 2]"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = two_services().await;

    assert_eq!(get(&app, "/healthz").await.0, StatusCode::OK);
    assert_eq!(get(&app, "/readyz").await.0, StatusCode::OK);

    get(&app, "/volumes").await;
    let (status, body) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = body.as_str().unwrap();
    assert!(text.contains("storage_gateway_tasks_submitted_total"));
    assert!(text.contains("storage_gateway_fanout_duration_seconds"));
}

#[tokio::test]
async fn test_readyz_without_services() {
    let app = app(vfs_config(&[])).await;
    assert_eq!(get(&app, "/readyz").await.0, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_server_name_header() {
    let app = two_services().await;
    let request = Request::builder().uri("/volumes").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(
        response.headers().get(SERVER_NAME_HEADER).unwrap(),
        "storage-gateway"
    );
}
