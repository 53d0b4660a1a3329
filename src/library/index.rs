//! Static k-d tree over tile average colors.
//!
//! The tree is stored implicitly in a single array: for any subrange
//! `[lo, hi)` the median along the split axis sits at `lo + (hi - lo) / 2`,
//! the left subtree occupies `[lo, mid)` and the right subtree `[mid + 1, hi)`.
//! The split axis cycles R, G, B with depth.
//!
//! Build is `O(n log n)` (linear-time selection per level). Queries visit
//! `O(log n)` nodes in the expected case.
//!
//! # Tie-break
//!
//! When several colors are equidistant from the query, the one with the
//! lowest position in the input slice wins. The search descends into the far
//! side whenever the splitting plane is at distance `<=` the current best, so
//! every tied candidate is examined and the result does not depend on tree
//! shape.

use image::Rgb;

use super::color::distance_squared;

#[derive(Debug, Clone, Copy)]
struct Entry {
    color: Rgb<u8>,
    position: usize,
}

/// Immutable nearest-neighbor index over RGB colors.
///
/// Safe to query concurrently from any number of threads without locking.
#[derive(Debug, Clone, Default)]
pub struct ColorIndex {
    entries: Vec<Entry>,
}

#[derive(Debug, Clone, Copy)]
struct Best {
    distance: u32,
    position: usize,
}

impl ColorIndex {
    /// Build an index over `colors`. Query results are positions into this slice.
    pub fn build(colors: &[Rgb<u8>]) -> Self {
        let mut entries: Vec<Entry> = colors
            .iter()
            .enumerate()
            .map(|(position, &color)| Entry { color, position })
            .collect();

        build_subtree(&mut entries, 0);

        Self { entries }
    }

    /// Number of indexed colors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position of the color closest to `target`, or `None` if the index is empty.
    pub fn nearest(&self, target: Rgb<u8>) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }

        let mut best = Best {
            distance: u32::MAX,
            position: usize::MAX,
        };
        self.search(0, self.entries.len(), 0, target, &mut best);

        Some(best.position)
    }

    fn search(&self, lo: usize, hi: usize, depth: usize, target: Rgb<u8>, best: &mut Best) {
        if lo >= hi {
            return;
        }

        let mid = lo + (hi - lo) / 2;
        let entry = self.entries[mid];

        let distance = distance_squared(entry.color, target);
        if distance < best.distance || (distance == best.distance && entry.position < best.position)
        {
            best.distance = distance;
            best.position = entry.position;
        }

        let axis = depth % 3;
        let diff = i32::from(target[axis]) - i32::from(entry.color[axis]);

        let (near, far) = if diff < 0 {
            ((lo, mid), (mid + 1, hi))
        } else {
            ((mid + 1, hi), (lo, mid))
        };

        self.search(near.0, near.1, depth + 1, target, best);

        if ((diff * diff) as u32) <= best.distance {
            self.search(far.0, far.1, depth + 1, target, best);
        }
    }
}

fn build_subtree(entries: &mut [Entry], depth: usize) {
    if entries.len() <= 1 {
        return;
    }

    let axis = depth % 3;
    let mid = entries.len() / 2;

    entries.select_nth_unstable_by(mid, |a, b| {
        a.color[axis]
            .cmp(&b.color[axis])
            .then(a.position.cmp(&b.position))
    });

    let (left, rest) = entries.split_at_mut(mid);
    build_subtree(left, depth + 1);
    build_subtree(&mut rest[1..], depth + 1);
}
