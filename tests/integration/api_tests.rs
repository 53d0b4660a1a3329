//! API integration tests for the mosaic task lifecycle and error handling.
//!
//! Tests verify:
//! - Upload, progress polling, result lookup and PNG download
//! - Error cases (no file, non-image, undecodable, bad parameters, unknown task)
//! - Cancellation of running and finished tasks
//! - HTTP response codes, headers and JSON error bodies

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use image::{Rgb, RgbImage};
use serde_json::Value;
use tower::ServiceExt;

use emoji_mosaic::{create_router, MosaicService, RouterConfig, TileLibrary};

use super::test_utils::{
    empty_multipart_body, get_request, load_library, multipart_body, png_bytes, rgb_tile_dir,
    test_service, upload_request, wait_for_result,
};

// =============================================================================
// Helpers
// =============================================================================

struct TestApp {
    router: Router,
    service: Arc<MosaicService>,
    _tiles: tempfile::TempDir,
    output: tempfile::TempDir,
}

fn test_app() -> TestApp {
    let tiles = rgb_tile_dir();
    let output = tempfile::tempdir().unwrap();
    let service = test_service(load_library(tiles.path()), output.path());
    let router = create_router(Arc::clone(&service), RouterConfig::new().with_tracing(false));

    TestApp {
        router,
        service,
        _tiles: tiles,
        output,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

async fn send_json(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(router, request).await;
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn image_upload(uri: &str) -> Request<Body> {
    let source = RgbImage::from_pixel(12, 8, Rgb([230, 20, 20]));
    upload_request(uri, multipart_body("image", "image/png", &png_bytes(&source)))
}

async fn create_task(app: &TestApp) -> String {
    let (status, json) = send_json(&app.router, image_upload("/create-mosaic?tile_size=4")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    json["task_id"].as_str().unwrap().to_string()
}

// =============================================================================
// Task Lifecycle
// =============================================================================

#[tokio::test]
async fn test_create_progress_download() {
    let app = test_app();
    let task_id = create_task(&app).await;

    let id = task_id.parse().unwrap();
    let record = wait_for_result(&app.service, &id).await;
    assert_eq!(record.status.to_string(), "completed");

    let (status, progress) =
        send_json(&app.router, get_request(&format!("/progress/{}", task_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["status"], "completed");
    assert_eq!(progress["progress"], 100);
    assert_eq!(progress["task_id"], task_id.as_str());

    let response = app
        .router
        .clone()
        .oneshot(get_request(&format!("/download/{}", task_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
    let disposition = response
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment"));
    assert!(disposition.contains("mosaic_"));

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let mosaic = image::load_from_memory(&body).unwrap();
    assert_eq!((mosaic.width(), mosaic.height()), (48, 32));
    assert_eq!(mosaic.to_rgb8().get_pixel(0, 0), &Rgb([255, 0, 0]));
}

#[tokio::test]
async fn test_result_endpoint_returns_persisted_record() {
    let app = test_app();
    let task_id = create_task(&app).await;
    wait_for_result(&app.service, &task_id.parse().unwrap()).await;

    let (status, json) = send_json(&app.router, get_request(&format!("/result/{}", task_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "completed");
    assert_eq!(json["grid_width"], 12);
    assert_eq!(json["grid_height"], 8);
    assert!(json["filepath"].as_str().unwrap().ends_with(".png"));
}

#[tokio::test]
async fn test_cancel_finished_task_conflict() {
    let app = test_app();
    let task_id = create_task(&app).await;
    wait_for_result(&app.service, &task_id.parse().unwrap()).await;

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/tasks/{}", task_id))
        .body(Body::empty())
        .unwrap();
    let (status, json) = send_json(&app.router, request).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "already_finished");
}

#[tokio::test]
async fn test_cancel_running_task() {
    let app = test_app();

    // Default 400x400 grid keeps the build running well past the cancel request
    let source = RgbImage::from_pixel(400, 400, Rgb([20, 20, 230]));
    let body = multipart_body("image", "image/png", &png_bytes(&source));
    let (status, json) = send_json(&app.router, upload_request("/create-mosaic", body)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let task_id = json["task_id"].as_str().unwrap().to_string();

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/tasks/{}", task_id))
        .body(Body::empty())
        .unwrap();
    let (status, json) = send_json(&app.router, request).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["status"], "processing");

    let record = wait_for_result(&app.service, &task_id.parse().unwrap()).await;
    assert_eq!(record.status.to_string(), "cancelled");
    assert!(record.filepath.is_none());

    let (status, json) = send_json(&app.router, get_request(&format!("/progress/{}", task_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "cancelled");

    let (status, json) = send_json(&app.router, get_request(&format!("/download/{}", task_id))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "not_completed");

    let written = std::fs::read_dir(app.output.path())
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(written, 0);
}

#[tokio::test]
async fn test_empty_library_task_fails() {
    let output = tempfile::tempdir().unwrap();
    let service = test_service(Arc::new(TileLibrary::default()), output.path());
    let router = create_router(Arc::clone(&service), RouterConfig::new().with_tracing(false));

    let (status, json) = send_json(&router, image_upload("/create-mosaic")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let task_id = json["task_id"].as_str().unwrap().to_string();

    let record = wait_for_result(&service, &task_id.parse().unwrap()).await;
    assert_eq!(record.status.to_string(), "failed");

    let (status, json) = send_json(&router, get_request(&format!("/download/{}", task_id))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "not_completed");
}

// =============================================================================
// Upload Errors
// =============================================================================

#[tokio::test]
async fn test_no_file_uploaded() {
    let app = test_app();
    let body = multipart_body("other", "text/plain", b"hello");

    let (status, json) = send_json(&app.router, upload_request("/create-mosaic", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "No file uploaded. Please upload an image file.");
    assert_eq!(json["status"], 400);
}

#[tokio::test]
async fn test_empty_multipart_body() {
    let app = test_app();

    let (status, json) =
        send_json(&app.router, upload_request("/create-mosaic", empty_multipart_body())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "no_file");
    assert!(app.service.registry().is_empty().await);
}

#[tokio::test]
async fn test_upload_not_an_image() {
    let app = test_app();
    let body = multipart_body("image", "text/plain", b"hello");

    let (status, json) = send_json(&app.router, upload_request("/create-mosaic", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json["message"],
        "Uploaded file is not an image. Please upload a valid image file."
    );
}

#[tokio::test]
async fn test_upload_undecodable_image() {
    let app = test_app();
    let body = multipart_body("image", "image/png", b"not really a png");

    let (status, json) = send_json(&app.router, upload_request("/create-mosaic", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_image");
    assert!(app.service.registry().is_empty().await);
}

#[tokio::test]
async fn test_upload_invalid_tile_size() {
    let app = test_app();

    for uri in ["/create-mosaic?tile_size=0", "/create-mosaic?tile_size=-1"] {
        let (status, json) = send_json(&app.router, image_upload(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "uri {}", uri);
        assert_eq!(json["error"], "invalid_parameter");
    }
    assert!(app.service.registry().is_empty().await);
}

// =============================================================================
// Unknown Tasks
// =============================================================================

#[tokio::test]
async fn test_unknown_task_not_found() {
    let app = test_app();
    let unknown = uuid::Uuid::new_v4().to_string();

    for path in [
        format!("/progress/{}", unknown),
        format!("/result/{}", unknown),
        format!("/download/{}", unknown),
        "/progress/not-a-task-id".to_string(),
    ] {
        let (status, json) = send_json(&app.router, get_request(&path)).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "path {}", path);
        assert_eq!(json["message"], "Task not found");
    }

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/tasks/{}", unknown))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send_json(&app.router, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Health and Status
// =============================================================================

#[tokio::test]
async fn test_health_and_ping() {
    let app = test_app();

    for path in ["/health", "/ping"] {
        let (status, json) = send_json(&app.router, get_request(path)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }
}

#[tokio::test]
async fn test_server_status() {
    let app = test_app();
    let task_id = create_task(&app).await;
    wait_for_result(&app.service, &task_id.parse().unwrap()).await;

    let (status, json) = send_json(&app.router, get_request("/server-status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "connected");
    assert_eq!(json["tile_count"], 3);
    assert_eq!(json["active_tasks"], 0);
    assert_eq!(json["tracked_tasks"], 1);
    assert_eq!(json["default_params"]["tile_size"], 10);
    assert_eq!(json["tile_cache_entries"], 1);
    assert_eq!(json["tile_cache_bytes"], 4 * 4 * 3);
    assert_eq!(
        json["tile_cache_capacity"],
        emoji_mosaic::DEFAULT_TILE_CACHE_CAPACITY as u64
    );
}

#[tokio::test]
async fn test_unknown_route() {
    let app = test_app();
    let (status, _) = send(&app.router, get_request("/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
