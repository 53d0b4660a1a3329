//! Mosaic build parameters.

use serde::{Deserialize, Serialize};

use crate::error::CompositeError;

/// Default bounding box width of the mosaic grid, in cells.
pub const DEFAULT_MAX_WIDTH: u32 = 400;

/// Default bounding box height of the mosaic grid, in cells.
pub const DEFAULT_MAX_HEIGHT: u32 = 400;

/// Default edge length of one tile in the output, in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 10;

/// Largest accepted tile edge length.
pub const MAX_TILE_SIZE: u32 = 256;

/// Parameters for one mosaic build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MosaicParams {
    /// Maximum grid width; the source is shrunk to fit
    pub max_width: u32,

    /// Maximum grid height; the source is shrunk to fit
    pub max_height: u32,

    /// Edge length of each pasted tile in pixels
    pub tile_size: u32,
}

impl Default for MosaicParams {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
            tile_size: DEFAULT_TILE_SIZE,
        }
    }
}

impl MosaicParams {
    /// Create parameters with an explicit bounding box and tile size.
    pub fn new(max_width: u32, max_height: u32, tile_size: u32) -> Self {
        Self {
            max_width,
            max_height,
            tile_size,
        }
    }

    /// Override the tile size.
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    /// Override the bounding box.
    pub fn with_bounds(mut self, max_width: u32, max_height: u32) -> Self {
        self.max_width = max_width;
        self.max_height = max_height;
        self
    }

    /// Build parameters from signed values, as received from an outer layer.
    ///
    /// Zero or negative values are rejected.
    pub fn from_signed(
        max_width: i64,
        max_height: i64,
        tile_size: i64,
    ) -> Result<Self, CompositeError> {
        let params = Self::new(
            positive("max_width", max_width)?,
            positive("max_height", max_height)?,
            positive("tile_size", tile_size)?,
        );
        params.validate()?;
        Ok(params)
    }

    /// Reject parameters that cannot produce a mosaic.
    pub fn validate(&self) -> Result<(), CompositeError> {
        if self.tile_size == 0 {
            return Err(CompositeError::InvalidParameter {
                name: "tile_size",
                value: self.tile_size.to_string(),
                reason: "must be a positive integer",
            });
        }
        if self.tile_size > MAX_TILE_SIZE {
            return Err(CompositeError::InvalidParameter {
                name: "tile_size",
                value: self.tile_size.to_string(),
                reason: "must be at most 256",
            });
        }
        if self.max_width == 0 {
            return Err(CompositeError::InvalidParameter {
                name: "max_width",
                value: self.max_width.to_string(),
                reason: "must be a positive integer",
            });
        }
        if self.max_height == 0 {
            return Err(CompositeError::InvalidParameter {
                name: "max_height",
                value: self.max_height.to_string(),
                reason: "must be a positive integer",
            });
        }
        Ok(())
    }
}

fn positive(name: &'static str, value: i64) -> Result<u32, CompositeError> {
    if value <= 0 {
        return Err(CompositeError::InvalidParameter {
            name,
            value: value.to_string(),
            reason: "must be a positive integer",
        });
    }
    u32::try_from(value).map_err(|_| CompositeError::InvalidParameter {
        name,
        value: value.to_string(),
        reason: "is too large",
    })
}

/// Shrink `(width, height)` to fit inside `(max_width, max_height)`.
///
/// Aspect ratio is preserved, images already inside the box are returned
/// unchanged (never upscaled), and neither side drops below one pixel.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }

    let (w, h) = (u64::from(width), u64::from(height));
    let box_w = u64::from(max_width.min(width));
    let box_h = u64::from(max_height.min(height));

    // Box is relatively wider than the image: height is the binding side
    let (new_w, new_h) = if box_w * h >= w * box_h {
        (rounded_div(box_h * w, h), box_h)
    } else {
        (box_w, rounded_div(box_w * h, w))
    };

    (new_w.max(1) as u32, new_h.max(1) as u32)
}

fn rounded_div(numerator: u64, denominator: u64) -> u64 {
    (numerator + denominator / 2) / denominator
}
