//! Tile library: the decoded tile set and its color index.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 TileLibrary                  │
//! │  ┌────────────────┐   ┌───────────────────┐  │
//! │  │  Vec<Tile>     │◄──│    ColorIndex     │  │
//! │  │ (by position)  │   │ (k-d tree, RGB)   │  │
//! │  └────────────────┘   └───────────────────┘  │
//! └──────────────────────────────────────────────┘
//!            ▲
//!            │ load_directory()
//!   static/emojis/*.png
//! ```
//!
//! The tiles and the index are always built together and never mutated
//! afterwards. Share a library between concurrent builds with `Arc`.

pub mod color;
mod index;
mod loader;

use std::path::{Path, PathBuf};

use image::Rgb;

use crate::error::{DecodeError, LoadError};

pub use color::{average_color, distance_squared};
pub use index::ColorIndex;
pub use loader::{decode_rgb, load_directory, load_tile};

/// One tile image and its average color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    name: String,
    path: PathBuf,
    average: Rgb<u8>,
}

impl Tile {
    /// Create a tile record.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, average: Rgb<u8>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            average,
        }
    }

    /// File name the tile was loaded from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full path of the tile image.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Average color, truncated per channel.
    pub fn average(&self) -> Rgb<u8> {
        self.average
    }
}

/// A file that was present in the tile directory but could not be used.
#[derive(Debug, Clone)]
pub struct SkippedTile {
    /// Path of the rejected file
    pub path: PathBuf,

    /// Why it was rejected
    pub error: DecodeError,
}

/// Ordered tiles plus the index built over their average colors.
///
/// Index positions correspond one-to-one with tile positions.
#[derive(Debug, Clone, Default)]
pub struct TileLibrary {
    tiles: Vec<Tile>,
    index: ColorIndex,
    skipped: Vec<SkippedTile>,
}

impl TileLibrary {
    /// Load every decodable image in a directory.
    ///
    /// Fails only when no tile could be loaded.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, LoadError> {
        load_directory(dir)
    }

    /// Build a library from already computed tiles.
    pub fn from_tiles(tiles: Vec<Tile>) -> Self {
        let colors: Vec<Rgb<u8>> = tiles.iter().map(|t| t.average).collect();
        let index = ColorIndex::build(&colors);
        Self {
            tiles,
            index,
            skipped: Vec::new(),
        }
    }

    pub(crate) fn with_skipped(mut self, skipped: Vec<SkippedTile>) -> Self {
        self.skipped = skipped;
        self
    }

    /// Number of usable tiles.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Whether the library has no tiles.
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// All tiles in index order.
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Tile at an index position.
    pub fn get(&self, position: usize) -> Option<&Tile> {
        self.tiles.get(position)
    }

    /// Files that were rejected during loading.
    pub fn skipped(&self) -> &[SkippedTile] {
        &self.skipped
    }

    /// Position of the tile whose average color is closest to `color`.
    pub fn nearest_position(&self, color: Rgb<u8>) -> Option<usize> {
        self.index.nearest(color)
    }

    /// Tile whose average color is closest to `color`.
    pub fn nearest(&self, color: Rgb<u8>) -> Option<&Tile> {
        self.nearest_position(color).and_then(|i| self.tiles.get(i))
    }
}
