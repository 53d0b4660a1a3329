//! HTTP request handlers for the mosaic API.
//!
//! # Endpoints
//!
//! - `POST /create-mosaic` - Upload an image and start a mosaic task
//! - `GET /progress/{task_id}` - Live task progress
//! - `GET /result/{task_id}` - Persisted task record
//! - `GET /download/{task_id}` - Finished mosaic PNG
//! - `DELETE /tasks/{task_id}` - Cancel an in-flight task
//! - `GET /health` - Health check endpoint
//! - `GET /server-status` - Library and task statistics

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{CompositeError, TaskError};
use crate::mosaic::MosaicParams;
use crate::task::{MosaicService, TaskId, TaskRecord};

/// Multipart field carrying the uploaded image.
pub const IMAGE_FIELD: &str = "image";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the mosaic service.
///
/// This is passed to all handlers via Axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    /// The service running mosaic tasks
    pub service: Arc<MosaicService>,
}

impl AppState {
    pub fn new(service: Arc<MosaicService>) -> Self {
        Self { service }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters for mosaic creation.
///
/// Signed so that negative values reach validation instead of failing extraction.
#[derive(Debug, Default, Deserialize)]
pub struct CreateMosaicQuery {
    /// Maximum grid width (defaults to the server setting)
    #[serde(default)]
    pub max_width: Option<i64>,

    /// Maximum grid height (defaults to the server setting)
    #[serde(default)]
    pub max_height: Option<i64>,

    /// Tile edge length in pixels (defaults to the server setting)
    #[serde(default)]
    pub tile_size: Option<i64>,
}

impl CreateMosaicQuery {
    /// Merge with defaults and validate.
    pub fn resolve(&self, defaults: MosaicParams) -> Result<MosaicParams, CompositeError> {
        MosaicParams::from_signed(
            self.max_width.unwrap_or(i64::from(defaults.max_width)),
            self.max_height.unwrap_or(i64::from(defaults.max_height)),
            self.tile_size.unwrap_or(i64::from(defaults.tile_size)),
        )
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_image")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Response to an accepted upload.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateMosaicResponse {
    pub task_id: String,
    pub progress_url: String,
    pub result_url: String,
    pub download_url: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

/// Server status response.
#[derive(Debug, Serialize)]
pub struct ServerStatusResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub tile_count: usize,
    pub skipped_tiles: usize,
    pub tile_cache_entries: usize,
    pub tile_cache_bytes: usize,
    pub tile_cache_capacity: usize,
    pub active_tasks: usize,
    pub tracked_tasks: usize,
    pub max_tasks: usize,
    pub default_params: MosaicParams,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Errors produced by the HTTP layer.
#[derive(Debug)]
pub enum ApiError {
    /// No `image` field in the upload
    MissingFile,

    /// The uploaded part is not declared as an image
    NotAnImage { content_type: Option<String> },

    /// The multipart body could not be read
    Upload { status: StatusCode, message: String },

    /// Error from the task layer
    Task(TaskError),
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        ApiError::Task(err)
    }
}

impl From<CompositeError> for ApiError {
    fn from(err: CompositeError) -> Self {
        ApiError::Task(TaskError::Composite(err))
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Upload {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

/// Convert ApiError to HTTP response.
///
/// - 4xx errors are logged at WARN level (404 at DEBUG)
/// - 5xx errors are logged at ERROR level
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            ApiError::MissingFile => (
                StatusCode::BAD_REQUEST,
                "no_file",
                "No file uploaded. Please upload an image file.".to_string(),
            ),
            ApiError::NotAnImage { .. } => (
                StatusCode::BAD_REQUEST,
                "not_an_image",
                "Uploaded file is not an image. Please upload a valid image file.".to_string(),
            ),
            ApiError::Upload { status, message } => {
                (*status, "invalid_upload", format!("Invalid upload: {}", message))
            }
            ApiError::Task(err) => task_error_parts(err),
        };

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Resource not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

fn task_error_parts(err: &TaskError) -> (StatusCode, &'static str, String) {
    let kind = err.kind();
    match err {
        TaskError::NotFound { .. } => (StatusCode::NOT_FOUND, kind, "Task not found".to_string()),
        TaskError::RegistryFull { .. } => (StatusCode::SERVICE_UNAVAILABLE, kind, err.to_string()),
        TaskError::AlreadyFinished { .. } | TaskError::NotCompleted { .. } => {
            (StatusCode::CONFLICT, kind, err.to_string())
        }
        TaskError::Composite(CompositeError::InvalidParameter { .. })
        | TaskError::Composite(CompositeError::SourceDecode { .. })
        | TaskError::Composite(CompositeError::OutputTooLarge { .. }) => {
            (StatusCode::BAD_REQUEST, kind, err.to_string())
        }
        TaskError::Composite(CompositeError::EmptyLibrary) => {
            (StatusCode::SERVICE_UNAVAILABLE, kind, err.to_string())
        }
        TaskError::Composite(CompositeError::Cancelled) => {
            (StatusCode::CONFLICT, kind, err.to_string())
        }
        TaskError::Output { .. } => (
            StatusCode::NOT_FOUND,
            "file_not_found",
            "File not found".to_string(),
        ),
        TaskError::Store(_) | TaskError::Worker(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, kind, err.to_string())
        }
    }
}

fn parse_task_id(raw: &str) -> Result<TaskId, ApiError> {
    raw.parse::<TaskId>().map_err(ApiError::Task)
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle image uploads.
///
/// # Endpoint
///
/// `POST /create-mosaic` (multipart/form-data, field `image`)
///
/// # Query Parameters
///
/// - `max_width`, `max_height`: grid bounding box (default 400x400)
/// - `tile_size`: tile edge in pixels (default 10)
///
/// # Response
///
/// - `202 Accepted`: `{ "task_id": ..., "progress_url": ..., ... }`
/// - `400 Bad Request`: no file, not an image, undecodable, or invalid parameters
/// - `503 Service Unavailable`: too many tasks in flight
pub async fn create_mosaic_handler(
    State(state): State<AppState>,
    Query(query): Query<CreateMosaicQuery>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let params = query.resolve(state.service.default_params())?;

    let mut upload: Option<Bytes> = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        if !content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
        {
            return Err(ApiError::NotAnImage { content_type });
        }

        upload = Some(field.bytes().await?);
        break;
    }

    let upload = upload.ok_or(ApiError::MissingFile)?;
    info!(bytes = upload.len(), "Received image upload");

    let task_id = state.service.submit(upload, params).await?;

    let body = CreateMosaicResponse {
        task_id: task_id.to_string(),
        progress_url: format!("/progress/{}", task_id),
        result_url: format!("/result/{}", task_id),
        download_url: format!("/download/{}", task_id),
    };

    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

/// Handle progress polling.
///
/// # Endpoint
///
/// `GET /progress/{task_id}`
///
/// `200 OK` with the live task record, `404 Not Found` for unknown tasks.
pub async fn progress_handler(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskRecord>, ApiError> {
    let task_id = parse_task_id(&task_id)?;
    Ok(Json(state.service.progress(&task_id).await?))
}

/// Handle result lookups from the persistent store.
///
/// # Endpoint
///
/// `GET /result/{task_id}`
pub async fn result_handler(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskRecord>, ApiError> {
    let task_id = parse_task_id(&task_id)?;
    Ok(Json(state.service.result(&task_id).await?))
}

/// Handle mosaic downloads.
///
/// # Endpoint
///
/// `GET /download/{task_id}`
///
/// # Response
///
/// - `200 OK`: PNG attachment
/// - `404 Not Found`: unknown task or missing file
/// - `409 Conflict`: task has not completed
pub async fn download_handler(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Response, ApiError> {
    let task_id = parse_task_id(&task_id)?;
    let download = state.service.download(&task_id).await?;

    let response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", download.filename),
            ),
        ],
        download.data,
    );

    Ok(response.into_response())
}

/// Handle cancellation requests.
///
/// # Endpoint
///
/// `DELETE /tasks/{task_id}`
///
/// `202 Accepted` with the task record at the time of the request.
pub async fn cancel_handler(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Response, ApiError> {
    let task_id = parse_task_id(&task_id)?;
    let record = state.service.cancel(&task_id).await?;
    Ok((StatusCode::ACCEPTED, Json(record)).into_response())
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle server status requests.
///
/// # Endpoint
///
/// `GET /server-status`
pub async fn server_status_handler(State(state): State<AppState>) -> Json<ServerStatusResponse> {
    let service = &state.service;
    let (active_tasks, tracked_tasks) = service.registry().counts().await;
    let library = service.library();

    Json(ServerStatusResponse {
        status: "connected".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: service.uptime().as_secs(),
        tile_count: library.len(),
        skipped_tiles: library.skipped().len(),
        tile_cache_entries: service.compositor().cache().len(),
        tile_cache_bytes: service.compositor().cache().size(),
        tile_cache_capacity: service.compositor().cache().capacity(),
        active_tasks,
        tracked_tasks,
        max_tasks: service.registry().capacity(),
        default_params: service.default_params(),
    })
}
