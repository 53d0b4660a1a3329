//! Tile directory loading.
//!
//! Every regular file in the tile directory is a candidate. Candidates are
//! processed in filename order so that library positions are stable from one
//! run to the next. Files that fail to decode are skipped with a warning; the
//! load only fails when nothing usable remains.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{DecodeError, LoadError};

use super::color::average_color;
use super::{SkippedTile, Tile, TileLibrary};

/// Decode an image file and flatten it to 8-bit RGB, discarding alpha.
pub fn decode_rgb(path: &Path) -> Result<image::RgbImage, DecodeError> {
    let reader = image::ImageReader::open(path).map_err(|e| DecodeError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let reader = reader.with_guessed_format().map_err(|e| DecodeError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let decoded = reader.decode().map_err(|e| DecodeError::Image {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    Ok(decoded.to_rgb8())
}

/// Decode one candidate and compute its average color.
pub fn load_tile(path: &Path) -> Result<Tile, DecodeError> {
    let rgb = decode_rgb(path)?;
    let average = average_color(&rgb).ok_or_else(|| DecodeError::Empty {
        path: path.to_path_buf(),
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok(Tile::new(name, path, average))
}

/// List candidate files in `dir`, sorted by file name.
fn candidate_files(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let entries = fs::read_dir(dir).map_err(|e| LoadError::Directory {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| LoadError::Directory {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        } else {
            debug!(path = %path.display(), "Skipping non-file entry");
        }
    }

    files.sort();
    Ok(files)
}

/// Load every decodable image in `dir` into a [`TileLibrary`].
pub fn load_directory(dir: impl AsRef<Path>) -> Result<TileLibrary, LoadError> {
    let dir = dir.as_ref();
    info!(dir = %dir.display(), "Loading tile library");

    let files = candidate_files(dir)?;

    // Decode in parallel; collect keeps filename order
    let results: Vec<Result<Tile, DecodeError>> =
        files.par_iter().map(|path| load_tile(path)).collect();

    let mut tiles = Vec::with_capacity(results.len());
    let mut skipped = Vec::new();

    for (path, result) in files.into_iter().zip(results) {
        match result {
            Ok(tile) => {
                debug!(
                    tile = %tile.name(),
                    r = tile.average()[0],
                    g = tile.average()[1],
                    b = tile.average()[2],
                    "Loaded tile"
                );
                tiles.push(tile);
            }
            Err(error) => {
                warn!(path = %path.display(), "Skipping tile: {}", error);
                skipped.push(SkippedTile { path, error });
            }
        }
    }

    if tiles.is_empty() {
        return Err(LoadError::NoUsableTiles {
            path: dir.to_path_buf(),
            skipped: skipped.len(),
        });
    }

    info!(
        loaded = tiles.len(),
        skipped = skipped.len(),
        "Tile library loaded and color index built"
    );

    Ok(TileLibrary::from_tiles(tiles).with_skipped(skipped))
}
