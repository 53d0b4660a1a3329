//! Mosaic compositor.
//!
//! # Pipeline
//!
//! ```text
//!  source RgbImage
//!        │  fit_within(max_width, max_height), never upscale
//!        ▼
//!  grid RgbImage (gridWidth x gridHeight, one color per cell)
//!        │  ColorIndex::nearest per cell
//!        ▼
//!  tile positions ──► TileCache ──miss──► decode + resize to tile_size
//!        │
//!        ▼
//!  output RgbImage (gridWidth*tile_size x gridHeight*tile_size), white fill
//! ```
//!
//! Grid rows are processed in parallel. Each grid row owns a disjoint band of
//! the output buffer, so no locking is needed for pasting and the result is
//! identical regardless of scheduling.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{ImageBuffer, RgbImage};
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{CompositeError, DecodeError};
use crate::library::{decode_rgb, TileLibrary};

use super::cache::{TileCache, TileCacheKey, DEFAULT_TILE_CACHE_CAPACITY};
use super::params::{fit_within, MosaicParams};
use super::progress::{ProgressEvent, ProgressReporter, ProgressSink};

/// Upper bound on output pixels (256 megapixels).
pub const MAX_OUTPUT_PIXELS: u64 = 256 * 1024 * 1024;

/// Background color of cells whose tile could not be pasted.
const BACKGROUND: u8 = 255;

/// Filter used for both source downsampling and tile resizing.
const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// A finished mosaic.
#[derive(Debug, Clone)]
pub struct MosaicOutput {
    /// The composited raster
    pub image: RgbImage,

    /// Number of grid columns
    pub grid_width: u32,

    /// Number of grid rows
    pub grid_height: u32,

    /// Edge length of each tile in pixels
    pub tile_size: u32,

    /// Cells left as white background because their tile failed
    pub blank_cells: u64,
}

/// Decode uploaded bytes into an RGB source image.
pub fn decode_source(bytes: &[u8]) -> Result<RgbImage, CompositeError> {
    let image = image::load_from_memory(bytes).map_err(|e| CompositeError::SourceDecode {
        message: e.to_string(),
    })?;

    let rgb = image.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(CompositeError::SourceDecode {
            message: "image has no pixels".to_string(),
        });
    }
    Ok(rgb)
}

/// Shrink `source` to fit the bounding box, or return it unchanged.
pub fn downsample(source: &RgbImage, max_width: u32, max_height: u32) -> RgbImage {
    let (width, height) = fit_within(source.width(), source.height(), max_width, max_height);
    if (width, height) == source.dimensions() {
        return source.clone();
    }
    imageops::resize(source, width, height, RESIZE_FILTER)
}

/// Builds mosaics from a shared, read-only [`TileLibrary`].
///
/// Stateless between calls apart from the tile raster cache, which only
/// affects speed, never output.
pub struct Compositor {
    library: Arc<TileLibrary>,
    cache: TileCache,
}

impl Compositor {
    /// Create a compositor with the default tile cache.
    pub fn new(library: Arc<TileLibrary>) -> Self {
        Self::with_cache_capacity(library, DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Create a compositor caching at most `max_bytes` of resized tiles.
    pub fn with_cache_capacity(library: Arc<TileLibrary>, max_bytes: usize) -> Self {
        Self {
            library,
            cache: TileCache::with_capacity(max_bytes),
        }
    }

    /// The library this compositor matches against.
    pub fn library(&self) -> &Arc<TileLibrary> {
        &self.library
    }

    /// The resized tile cache.
    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    /// Build a mosaic of `source`.
    ///
    /// # Errors
    ///
    /// - [`CompositeError::InvalidParameter`] before any work if `params` is invalid
    /// - [`CompositeError::EmptyLibrary`] if there is nothing to match against
    /// - [`CompositeError::SourceDecode`] if `source` has no pixels
    /// - [`CompositeError::Cancelled`] if `cancel` fires before the last cell
    ///
    /// A tile that fails to decode only blanks its own cell.
    pub fn composite(
        &self,
        source: &RgbImage,
        params: &MosaicParams,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<MosaicOutput, CompositeError> {
        params.validate()?;

        if self.library.is_empty() {
            return Err(CompositeError::EmptyLibrary);
        }
        if source.width() == 0 || source.height() == 0 {
            return Err(CompositeError::SourceDecode {
                message: "image has no pixels".to_string(),
            });
        }

        progress.report(ProgressEvent::LoadStarted);

        let grid = downsample(source, params.max_width, params.max_height);
        let (grid_width, grid_height) = grid.dimensions();
        let tile_size = params.tile_size;

        progress.report(ProgressEvent::DecodeComplete {
            grid_width,
            grid_height,
        });

        let (out_width, out_height) = output_dimensions(grid_width, grid_height, tile_size)?;
        debug!(
            grid_width,
            grid_height, out_width, out_height, "Creating mosaic"
        );

        let mut buffer = vec![BACKGROUND; out_width as usize * out_height as usize * 3];
        let band_len = out_width as usize * tile_size as usize * 3;

        let reporter = ProgressReporter::new(progress, grid_height);
        let blank_cells = AtomicU64::new(0);

        buffer
            .par_chunks_mut(band_len)
            .enumerate()
            .try_for_each(|(gy, band)| {
                for gx in 0..grid_width {
                    if cancel.is_cancelled() {
                        return Err(CompositeError::Cancelled);
                    }
                    let color = *grid.get_pixel(gx, gy as u32);
                    if !self.paste_cell(band, out_width, gx, gy as u32, color, tile_size) {
                        blank_cells.fetch_add(1, Ordering::Relaxed);
                    }
                }
                reporter.row_done();
                Ok(())
            })?;

        if cancel.is_cancelled() {
            return Err(CompositeError::Cancelled);
        }

        let image: RgbImage = ImageBuffer::from_raw(out_width, out_height, buffer).ok_or(
            CompositeError::OutputTooLarge {
                width: u64::from(out_width),
                height: u64::from(out_height),
            },
        )?;

        let blank_cells = blank_cells.into_inner();
        progress.report(ProgressEvent::CompositingComplete);
        info!(
            grid_width,
            grid_height, blank_cells, "Mosaic image composited"
        );

        Ok(MosaicOutput {
            image,
            grid_width,
            grid_height,
            tile_size,
            blank_cells,
        })
    }

    /// Look up and paste one cell. Returns `false` if the cell stays blank.
    fn paste_cell(
        &self,
        band: &mut [u8],
        out_width: u32,
        gx: u32,
        gy: u32,
        color: image::Rgb<u8>,
        tile_size: u32,
    ) -> bool {
        let Some(position) = self.library.nearest_position(color) else {
            warn!(x = gx, y = gy, "No tile available for cell");
            return false;
        };

        match self.tile_raster(position, tile_size) {
            Ok(raster) => {
                paste(band, out_width, gx, tile_size, &raster);
                true
            }
            Err(e) => {
                warn!(
                    x = gx,
                    y = gy,
                    r = color[0],
                    g = color[1],
                    b = color[2],
                    "Leaving cell blank: {}",
                    e
                );
                false
            }
        }
    }

    /// Decoded tile at `position`, resized to `tile_size` square.
    fn tile_raster(&self, position: usize, tile_size: u32) -> Result<Arc<RgbImage>, DecodeError> {
        let key = TileCacheKey::new(position, tile_size);
        if let Some(raster) = self.cache.get(&key) {
            return Ok(raster);
        }

        let tile = self.library.get(position).ok_or_else(|| DecodeError::Empty {
            path: Path::new("<missing tile>").to_path_buf(),
        })?;

        let decoded = decode_rgb(tile.path())?;
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(DecodeError::Empty {
                path: tile.path().to_path_buf(),
            });
        }

        let resized = Arc::new(imageops::resize(
            &decoded,
            tile_size,
            tile_size,
            RESIZE_FILTER,
        ));
        self.cache.put(key, Arc::clone(&resized));
        Ok(resized)
    }
}

fn output_dimensions(
    grid_width: u32,
    grid_height: u32,
    tile_size: u32,
) -> Result<(u32, u32), CompositeError> {
    let width = u64::from(grid_width) * u64::from(tile_size);
    let height = u64::from(grid_height) * u64::from(tile_size);

    if width > u64::from(u32::MAX)
        || height > u64::from(u32::MAX)
        || width * height > MAX_OUTPUT_PIXELS
    {
        return Err(CompositeError::OutputTooLarge { width, height });
    }
    Ok((width as u32, height as u32))
}

/// Copy a `tile_size` square raster into column `gx` of a grid-row band.
fn paste(band: &mut [u8], out_width: u32, gx: u32, tile_size: u32, raster: &RgbImage) {
    let row_len = tile_size as usize * 3;
    let stride = out_width as usize * 3;
    let x_offset = gx as usize * row_len;
    let src = raster.as_raw();

    for ty in 0..tile_size as usize {
        let dst = ty * stride + x_offset;
        let from = ty * row_len;
        band[dst..dst + row_len].copy_from_slice(&src[from..from + row_len]);
    }
}
