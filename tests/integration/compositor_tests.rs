//! Compositor tests against tile libraries loaded from disk.
//!
//! Tests verify:
//! - Output dimensions follow the downsampled grid times the tile size
//! - Each cell carries the tile nearest to its source pixel
//! - Identical inputs give pixel-identical outputs
//! - An empty library is a build error

use std::sync::Arc;
use std::sync::Mutex;

use image::{Rgb, RgbImage};
use tokio_util::sync::CancellationToken;

use emoji_mosaic::{
    decode_source, fit_within, CompositeError, Compositor, MosaicParams, NoProgress,
    ProgressEvent, TileLibrary,
};

use super::test_utils::{load_library, png_bytes, rgb_tile_dir, split_source, write_tile};

fn build(compositor: &Compositor, source: &RgbImage, params: MosaicParams) -> RgbImage {
    compositor
        .composite(source, &params, &NoProgress, &CancellationToken::new())
        .unwrap()
        .image
}

#[test]
fn test_single_tile_library_fills_every_cell() {
    let dir = tempfile::tempdir().unwrap();
    write_tile(dir.path(), "red.png", [255, 0, 0], 10);
    let compositor = Compositor::new(load_library(dir.path()));

    let source = RgbImage::from_pixel(1, 1, Rgb([250, 10, 5]));
    let output = build(&compositor, &source, MosaicParams::new(400, 400, 10));

    assert_eq!(output.dimensions(), (10, 10));
    assert!(output.pixels().all(|p| *p == Rgb([255, 0, 0])));
}

#[test]
fn test_small_source_not_upscaled() {
    let dir = tempfile::tempdir().unwrap();
    write_tile(dir.path(), "red.png", [255, 0, 0], 10);
    let compositor = Compositor::new(load_library(dir.path()));

    let source = RgbImage::from_pixel(10, 10, Rgb([255, 0, 0]));
    let output = compositor
        .composite(
            &source,
            &MosaicParams::new(400, 400, 10),
            &NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!((output.grid_width, output.grid_height), (10, 10));
    assert_eq!(output.image.dimensions(), (100, 100));
    assert_eq!(output.blank_cells, 0);
}

#[test]
fn test_output_size_law() {
    let dir = rgb_tile_dir();
    let compositor = Compositor::new(load_library(dir.path()));

    for (w, h, max_w, max_h, tile) in [
        (800, 600, 400, 400, 10),
        (37, 91, 20, 20, 3),
        (5, 5, 400, 400, 7),
        (1000, 10, 50, 50, 2),
    ] {
        let source = RgbImage::from_pixel(w, h, Rgb([128, 128, 128]));
        let (gw, gh) = fit_within(w, h, max_w, max_h);
        let output = build(&compositor, &source, MosaicParams::new(max_w, max_h, tile));

        assert_eq!(output.dimensions(), (gw * tile, gh * tile));
        assert!(gw <= max_w && gh <= max_h);
    }
}

#[test]
fn test_cells_pick_nearest_tile() {
    let dir = rgb_tile_dir();
    let compositor = Compositor::new(load_library(dir.path()));

    let source = split_source(4, 2);
    let output = build(&compositor, &source, MosaicParams::new(4, 2, 5));

    assert_eq!(output.dimensions(), (20, 10));
    assert_eq!(*output.get_pixel(2, 2), Rgb([255, 0, 0]));
    assert_eq!(*output.get_pixel(7, 7), Rgb([255, 0, 0]));
    assert_eq!(*output.get_pixel(12, 2), Rgb([0, 0, 255]));
    assert_eq!(*output.get_pixel(19, 9), Rgb([0, 0, 255]));
}

#[test]
fn test_repeated_builds_identical() {
    let dir = rgb_tile_dir();
    let source = RgbImage::from_fn(64, 48, |x, y| {
        Rgb([(x * 4) as u8, (y * 5) as u8, ((x + y) * 2) as u8])
    });
    let params = MosaicParams::new(32, 32, 4);

    let first = build(&Compositor::new(load_library(dir.path())), &source, params);
    let cached = Compositor::new(load_library(dir.path()));
    let second = build(&cached, &source, params);
    let third = build(&cached, &source, params);

    assert_eq!(first.as_raw(), second.as_raw());
    assert_eq!(second.as_raw(), third.as_raw());
}

#[test]
fn test_empty_library_is_error() {
    let compositor = Compositor::new(Arc::new(TileLibrary::default()));
    let source = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));

    let result = compositor.composite(
        &source,
        &MosaicParams::default(),
        &NoProgress,
        &CancellationToken::new(),
    );
    assert!(matches!(result, Err(CompositeError::EmptyLibrary)));
}

#[test]
fn test_tile_removed_after_load_leaves_white_cells() {
    let dir = tempfile::tempdir().unwrap();
    write_tile(dir.path(), "red.png", [255, 0, 0], 4);
    let library = load_library(dir.path());
    std::fs::remove_file(dir.path().join("red.png")).unwrap();

    let compositor = Compositor::with_cache_capacity(library, 0);
    let source = RgbImage::from_pixel(3, 2, Rgb([255, 0, 0]));
    let output = compositor
        .composite(
            &source,
            &MosaicParams::new(3, 2, 4),
            &NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!(output.blank_cells, 6);
    assert!(output.image.pixels().all(|p| *p == Rgb([255, 255, 255])));
}

#[test]
fn test_progress_milestones_in_order() {
    let dir = rgb_tile_dir();
    let compositor = Compositor::new(load_library(dir.path()));
    let source = RgbImage::from_pixel(8, 8, Rgb([0, 200, 0]));

    let events = Mutex::new(Vec::new());
    let sink = |event: ProgressEvent| events.lock().unwrap().push(event);
    compositor
        .composite(
            &source,
            &MosaicParams::new(8, 8, 2),
            &sink,
            &CancellationToken::new(),
        )
        .unwrap();

    let events = events.into_inner().unwrap();
    assert_eq!(events.first(), Some(&ProgressEvent::LoadStarted));
    assert_eq!(
        events.get(1),
        Some(&ProgressEvent::DecodeComplete {
            grid_width: 8,
            grid_height: 8
        })
    );
    assert_eq!(events.last(), Some(&ProgressEvent::CompositingComplete));

    let percents: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Compositing { percent } => Some(*percent),
            _ => None,
        })
        .collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(percents.last(), Some(&100));
}

#[test]
fn test_decode_source_from_png_bytes() {
    let source = split_source(6, 4);
    let decoded = decode_source(&png_bytes(&source)).unwrap();
    assert_eq!(decoded, source);
}
