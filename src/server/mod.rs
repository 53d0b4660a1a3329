//! HTTP server layer for the mosaic service.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │      POST /create-mosaic    GET /progress/{task_id} ...         │
//! │                                                                 │
//! │  ┌───────────────────────────┐  ┌───────────────────────────┐   │
//! │  │         handlers          │  │          routes           │   │
//! │  │ (uploads, polling, files) │  │ (router, CORS, limits)    │   │
//! │  └───────────────────────────┘  └───────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    cancel_handler, create_mosaic_handler, download_handler, health_handler, progress_handler,
    result_handler, server_status_handler, ApiError, AppState, CreateMosaicQuery,
    CreateMosaicResponse, ErrorResponse, HealthResponse, ServerStatusResponse, IMAGE_FIELD,
};
pub use routes::{create_router, RouterConfig, DEFAULT_MAX_UPLOAD_BYTES};
