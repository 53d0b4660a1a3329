//! Test utilities for integration tests.
//!
//! Provides tile directory fixtures, in-memory image encoding and a
//! multipart body builder for upload requests.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use tempfile::TempDir;

use emoji_mosaic::{
    Compositor, MemoryStore, MosaicService, ServiceConfig, TaskId, TaskRecord, TileLibrary,
};

pub const BOUNDARY: &str = "mosaic-test-boundary";

// =============================================================================
// Tile Fixtures
// =============================================================================

/// Write a solid-color PNG tile.
pub fn write_tile(dir: &Path, name: &str, color: [u8; 3], size: u32) {
    RgbImage::from_pixel(size, size, Rgb(color))
        .save(dir.join(name))
        .unwrap();
}

/// Write a solid-color RGBA PNG tile.
pub fn write_rgba_tile(dir: &Path, name: &str, color: [u8; 4], size: u32) {
    RgbaImage::from_pixel(size, size, Rgba(color))
        .save(dir.join(name))
        .unwrap();
}

/// Directory with red, green and blue tiles.
pub fn rgb_tile_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_tile(dir.path(), "a_red.png", [255, 0, 0], 8);
    write_tile(dir.path(), "b_green.png", [0, 255, 0], 8);
    write_tile(dir.path(), "c_blue.png", [0, 0, 255], 8);
    dir
}

/// Load a tile directory into a shared library.
pub fn load_library(dir: &Path) -> Arc<TileLibrary> {
    Arc::new(TileLibrary::load(dir).unwrap())
}

// =============================================================================
// Image Encoding
// =============================================================================

/// Encode an image as PNG bytes.
pub fn png_bytes(image: &RgbImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// Source image split into a red left half and a blue right half.
pub fn split_source(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgb([240, 10, 10])
        } else {
            Rgb([10, 10, 240])
        }
    })
}

// =============================================================================
// Service Fixtures
// =============================================================================

/// Service over `library` writing into `output_dir`, with an in-memory store.
pub fn test_service(library: Arc<TileLibrary>, output_dir: &Path) -> Arc<MosaicService> {
    Arc::new(MosaicService::new(
        Compositor::new(library),
        Arc::new(MemoryStore::new()),
        ServiceConfig::default().with_output_dir(output_dir),
    ))
}

/// Wait until a task reaches a terminal state and its record is persisted.
pub async fn wait_for_result(service: &MosaicService, task_id: &TaskId) -> TaskRecord {
    for _ in 0..500 {
        if let Ok(record) = service.result(task_id).await {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {} did not finish", task_id);
}

// =============================================================================
// Multipart Requests
// =============================================================================

/// Build a multipart body with a single file part.
pub fn multipart_body(field: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"upload\"\r\n",
            field
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Build a multipart body with no parts.
pub fn empty_multipart_body() -> Vec<u8> {
    format!("--{}--\r\n", BOUNDARY).into_bytes()
}

/// POST a multipart body to `uri`.
pub fn upload_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

/// GET `uri`.
pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}
