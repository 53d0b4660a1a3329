//! Tile library loading tests.
//!
//! Tests verify:
//! - Corrupt and non-image files are skipped with one warning each
//! - A directory with no usable tiles is a load error
//! - Tile order and average colors are stable

use std::sync::{Arc, Mutex};

use image::Rgb;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use emoji_mosaic::{DecodeError, LoadError, TileLibrary};

use super::test_utils::{write_rgba_tile, write_tile};

/// Collects the `path` field of every WARN event.
#[derive(Clone, Default)]
struct WarnCapture(Arc<Mutex<Vec<String>>>);

struct PathVisitor(Option<String>);

impl Visit for PathVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "path" {
            self.0 = Some(format!("{:?}", value));
        }
    }
}

impl<S: Subscriber> Layer<S> for WarnCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            let mut visitor = PathVisitor(None);
            event.record(&mut visitor);
            self.0
                .lock()
                .unwrap()
                .push(visitor.0.unwrap_or_default());
        }
    }
}

#[test]
fn test_corrupt_file_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_tile(dir.path(), "one.png", [200, 50, 50], 6);
    write_tile(dir.path(), "two.png", [50, 200, 50], 6);
    std::fs::write(dir.path().join("broken.png"), b"definitely not a png").unwrap();

    let library = TileLibrary::load(dir.path()).unwrap();

    assert_eq!(library.len(), 2);
    assert_eq!(library.skipped().len(), 1);
    assert!(library.skipped()[0].path.ends_with("broken.png"));
    assert!(matches!(
        library.skipped()[0].error,
        DecodeError::Image { .. }
    ));
}

#[test]
fn test_corrupt_file_logs_one_warning() {
    let dir = tempfile::tempdir().unwrap();
    write_tile(dir.path(), "one.png", [200, 50, 50], 6);
    std::fs::write(dir.path().join("broken.png"), b"definitely not a png").unwrap();

    let capture = WarnCapture::default();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let library = tracing::subscriber::with_default(subscriber, || {
        TileLibrary::load(dir.path()).unwrap()
    });

    assert_eq!(library.len(), 1);
    let warnings = capture.0.lock().unwrap();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("broken.png"));
}

#[test]
fn test_no_usable_tiles() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();

    let result = TileLibrary::load(dir.path());
    assert!(matches!(
        result,
        Err(LoadError::NoUsableTiles { skipped: 1, .. })
    ));
}

#[test]
fn test_empty_directory() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        TileLibrary::load(dir.path()),
        Err(LoadError::NoUsableTiles { skipped: 0, .. })
    ));
}

#[test]
fn test_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    assert!(matches!(
        TileLibrary::load(&missing),
        Err(LoadError::Directory { .. })
    ));
}

#[test]
fn test_tiles_ordered_by_filename() {
    let dir = tempfile::tempdir().unwrap();
    write_tile(dir.path(), "c.png", [0, 0, 255], 4);
    write_tile(dir.path(), "a.png", [255, 0, 0], 4);
    write_tile(dir.path(), "b.png", [0, 255, 0], 4);

    let library = TileLibrary::load(dir.path()).unwrap();
    let names: Vec<_> = library.tiles().iter().map(|t| t.name()).collect();
    assert_eq!(names, vec!["a.png", "b.png", "c.png"]);
    assert_eq!(library.tiles()[1].average(), Rgb([0, 255, 0]));
}

#[test]
fn test_alpha_ignored_in_average() {
    let dir = tempfile::tempdir().unwrap();
    write_rgba_tile(dir.path(), "ghost.png", [120, 60, 30, 0], 4);

    let library = TileLibrary::load(dir.path()).unwrap();
    assert_eq!(library.tiles()[0].average(), Rgb([120, 60, 30]));
}

#[test]
fn test_subdirectories_ignored() {
    let dir = tempfile::tempdir().unwrap();
    write_tile(dir.path(), "tile.png", [9, 9, 9], 4);
    std::fs::create_dir(dir.path().join("nested.png")).unwrap();

    let library = TileLibrary::load(dir.path()).unwrap();
    assert_eq!(library.len(), 1);
    assert!(library.skipped().is_empty());
}
