//! Cache for decoded and resized tile rasters.
//!
//! A 400x400 grid pastes 160,000 cells drawn from a much smaller set of
//! distinct tiles. Decoding each tile file once per size instead of once per
//! cell is what keeps builds fast.
//!
//! # Cache Key
//!
//! Entries are keyed by:
//! - Library position of the tile
//! - Output tile edge length in pixels
//!
//! The cache is shared across builds and accessed from rayon worker threads,
//! so it is guarded by a blocking mutex rather than an async lock.
//!
//! # Size-Based Eviction
//!
//! The cache tracks the total bytes of cached rasters and evicts
//! least-recently-used entries when the capacity is exceeded. Tile size is
//! chosen per request, so an entry-count bound alone would not bound memory.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

use image::RgbImage;
use lru::LruCache;

/// Default cache capacity: 100MB of raster data.
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 100 * 1024 * 1024;

/// Default maximum number of entries (to bound LRU overhead)
const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Cache key for a resized tile raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    /// Position of the tile in the library
    pub position: usize,

    /// Edge length the tile was resized to
    pub tile_size: u32,
}

impl TileCacheKey {
    pub fn new(position: usize, tile_size: u32) -> Self {
        Self {
            position,
            tile_size,
        }
    }
}

struct CacheState {
    entries: LruCache<TileCacheKey, Arc<RgbImage>>,
    current_size: usize,
}

/// LRU cache of resized tile rasters with a byte-size capacity.
///
/// The total of `raster.as_raw().len()` over all entries never exceeds the
/// capacity once a `put` returns. A capacity of zero disables caching.
pub struct TileCache {
    state: Option<Mutex<CacheState>>,
    max_size: usize,
}

impl TileCache {
    /// Create a cache with the default capacity (100MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Create a cache holding at most `max_size` bytes of raster data.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache bounded by both total bytes and entry count.
    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let state = match (max_size, NonZeroUsize::new(max_entries)) {
            (0, _) | (_, None) => None,
            (_, Some(entries)) => Some(Mutex::new(CacheState {
                entries: LruCache::new(entries),
                current_size: 0,
            })),
        };
        Self { state, max_size }
    }

    fn lock(&self) -> Option<MutexGuard<'_, CacheState>> {
        self.state.as_ref().map(|m| match m.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        })
    }

    /// Get a raster, marking it as recently used.
    pub fn get(&self, key: &TileCacheKey) -> Option<Arc<RgbImage>> {
        self.lock()?.entries.get(key).cloned()
    }

    /// Check for a raster without updating LRU order.
    pub fn contains(&self, key: &TileCacheKey) -> bool {
        self.lock().is_some_and(|state| state.entries.contains(key))
    }

    /// Store a raster.
    ///
    /// Least-recently-used entries are evicted until the total size is within
    /// capacity. A raster larger than the whole capacity is not retained.
    pub fn put(&self, key: TileCacheKey, raster: Arc<RgbImage>) {
        let Some(mut state) = self.lock() else {
            return;
        };
        let state = &mut *state;
        let raster_size = raster.as_raw().len();

        if let Some(old) = state.entries.peek(&key) {
            state.current_size = state.current_size.saturating_sub(old.as_raw().len());
        }

        // Entry-count eviction bypasses the size accounting, so settle it here
        if let Some((evicted_key, evicted)) = state.entries.push(key, raster) {
            if evicted_key != key {
                state.current_size = state.current_size.saturating_sub(evicted.as_raw().len());
            }
        }
        state.current_size += raster_size;

        while state.current_size > self.max_size {
            match state.entries.pop_lru() {
                Some((_, evicted)) => {
                    state.current_size =
                        state.current_size.saturating_sub(evicted.as_raw().len());
                }
                None => break,
            }
        }
    }

    /// Remove a raster, returning it if it was cached.
    pub fn remove(&self, key: &TileCacheKey) -> Option<Arc<RgbImage>> {
        let mut state = self.lock()?;
        let raster = state.entries.pop(key)?;
        state.current_size = state.current_size.saturating_sub(raster.as_raw().len());
        Some(raster)
    }

    /// Drop every cached raster.
    pub fn clear(&self) {
        if let Some(mut state) = self.lock() {
            state.entries.clear();
            state.current_size = 0;
        }
    }

    /// Number of cached rasters.
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |state| state.entries.len())
    }

    /// Whether the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes of cached raster data.
    pub fn size(&self) -> usize {
        self.lock().map_or(0, |state| state.current_size)
    }

    /// Maximum total bytes (zero when disabled).
    pub fn capacity(&self) -> usize {
        if self.state.is_some() {
            self.max_size
        } else {
            0
        }
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}
