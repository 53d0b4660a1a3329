//! Mosaic construction.
//!
//! # Components
//!
//! - [`Compositor`]: downsamples a source image and pastes the nearest tile per cell
//! - [`MosaicParams`]: bounding box and tile size, validated before any work
//! - [`TileCache`]: LRU cache of decoded, resized tile rasters
//! - [`ProgressSink`]: receiver for coarse build milestones
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use emoji_mosaic::library::TileLibrary;
//! use emoji_mosaic::mosaic::{decode_source, Compositor, MosaicParams, NoProgress};
//! use tokio_util::sync::CancellationToken;
//!
//! let library = Arc::new(TileLibrary::load("static/emojis")?);
//! let compositor = Compositor::new(library);
//!
//! let source = decode_source(&std::fs::read("photo.jpg")?)?;
//! let output = compositor.composite(
//!     &source,
//!     &MosaicParams::default(),
//!     &NoProgress,
//!     &CancellationToken::new(),
//! )?;
//! output.image.save("mosaic.png")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod cache;
mod compositor;
mod params;
mod progress;

pub use cache::{TileCache, TileCacheKey, DEFAULT_TILE_CACHE_CAPACITY};
pub use compositor::{decode_source, downsample, Compositor, MosaicOutput, MAX_OUTPUT_PIXELS};
pub use params::{
    fit_within, MosaicParams, DEFAULT_MAX_HEIGHT, DEFAULT_MAX_WIDTH, DEFAULT_TILE_SIZE,
    MAX_TILE_SIZE,
};
pub use progress::{NoProgress, ProgressEvent, ProgressReporter, ProgressSink};
