//! # Emoji Mosaic
//!
//! Turns an arbitrary image into a mosaic built from a library of small tile
//! images, each chosen because its average color best matches the region of
//! the source it replaces.
//!
//! ## Features
//!
//! - **Tile library**: decodes a directory of tiles once, skipping bad files
//! - **Color index**: k-d tree nearest-color lookup with deterministic ties
//! - **Parallel compositing**: grid rows are built concurrently with rayon
//! - **Asynchronous tasks**: upload, poll progress, download, cancel
//! - **HTTP API**: axum server with JSON errors and request tracing
//!
//! ## Architecture
//!
//! - [`library`] - Tile loading, average colors and the color index
//! - [`mosaic`] - Parameters, compositor, tile cache and progress events
//! - [`task`] - Task registry, record store and the mosaic service
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//! - [`error`] - Error types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use emoji_mosaic::{decode_source, Compositor, MosaicParams, NoProgress, TileLibrary};
//! use tokio_util::sync::CancellationToken;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let library = Arc::new(TileLibrary::load("static/emojis")?);
//! let compositor = Compositor::new(library);
//!
//! let source = decode_source(&std::fs::read("photo.jpg")?)?;
//! let mosaic = compositor.composite(
//!     &source,
//!     &MosaicParams::default(),
//!     &NoProgress,
//!     &CancellationToken::new(),
//! )?;
//! mosaic.image.save("mosaic.png")?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod library;
pub mod mosaic;
pub mod server;
pub mod task;

// Re-export commonly used types
pub use config::{Cli, Command, MosaicArgs, RenderConfig, ServeConfig};
pub use error::{CompositeError, DecodeError, LoadError, StoreError, TaskError};
pub use library::{ColorIndex, SkippedTile, Tile, TileLibrary};
pub use mosaic::{
    decode_source, fit_within, Compositor, MosaicOutput, MosaicParams, NoProgress, ProgressEvent,
    ProgressSink, TileCache, DEFAULT_TILE_CACHE_CAPACITY,
};
pub use server::{create_router, AppState, ErrorResponse, RouterConfig};
pub use task::{
    JsonFileStore, MemoryStore, MosaicService, ServiceConfig, TaskId, TaskRecord, TaskStatus,
    TaskStore,
};
