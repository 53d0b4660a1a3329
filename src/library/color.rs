//! Color arithmetic for tile matching.
//!
//! Colors are plain 8-bit sRGB triples. No gamma correction or perceptual
//! color space is applied: matching is unweighted Euclidean distance in RGB.

use image::{Rgb, RgbImage};

/// Arithmetic mean of each channel over all pixels, truncated to integer.
///
/// Returns `None` for an image with no pixels.
pub fn average_color(image: &RgbImage) -> Option<Rgb<u8>> {
    let count = u64::from(image.width()) * u64::from(image.height());
    if count == 0 {
        return None;
    }

    let mut sums = [0u64; 3];
    for pixel in image.pixels() {
        sums[0] += u64::from(pixel[0]);
        sums[1] += u64::from(pixel[1]);
        sums[2] += u64::from(pixel[2]);
    }

    // Mean of u8 values always fits in u8
    Some(Rgb([
        (sums[0] / count) as u8,
        (sums[1] / count) as u8,
        (sums[2] / count) as u8,
    ]))
}

/// Squared Euclidean distance between two colors.
#[inline]
pub fn distance_squared(a: Rgb<u8>, b: Rgb<u8>) -> u32 {
    let dr = i32::from(a[0]) - i32::from(b[0]);
    let dg = i32::from(a[1]) - i32::from(b[1]);
    let db = i32::from(a[2]) - i32::from(b[2]);
    (dr * dr + dg * dg + db * db) as u32
}
