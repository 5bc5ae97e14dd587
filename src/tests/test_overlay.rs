use image::{Rgb, RgbImage};
use ndarray::Array2;

use crate::overlay::render_overlay;
use crate::palette;

#[test]
fn test_overlay_preserves_source_dimensions() {
    let image = RgbImage::from_pixel(512, 384, Rgb([100, 100, 100]));
    let grid = Array2::from_shape_fn((12, 16), |(r, c)| (r + c) % 3);
    let overlay = render_overlay(&image, &grid, 3).unwrap();
    assert_eq!(overlay.dimensions(), (512, 384));
}

#[test]
fn test_overlay_blend_math() {
    // Single-label grid over a constant image: every pixel is
    // round(0.6 * src + 0.4 * mask).
    let image = RgbImage::from_pixel(8, 8, Rgb([200, 100, 0]));
    let grid = Array2::from_elem((2, 2), 0usize);
    let overlay = render_overlay(&image, &grid, 1).unwrap();
    let mask = palette::color(0).unwrap();
    let expected = [
        (0.6 * 200.0 + 0.4 * mask[0] as f32).round() as u8,
        (0.6 * 100.0 + 0.4 * mask[1] as f32).round() as u8,
        (0.4 * mask[2] as f32).round() as u8,
    ];
    for p in overlay.pixels() {
        assert_eq!(p.0, expected);
    }
}

#[test]
fn test_overlay_nearest_keeps_hard_boundaries() {
    // Left half label 0, right half label 1; nearest-neighbor upscale must
    // produce exactly two colors, no smoothing at the boundary.
    let image = RgbImage::from_pixel(16, 8, Rgb([0, 0, 0]));
    let grid = Array2::from_shape_fn((2, 4), |(_, c)| usize::from(c >= 2));
    let overlay = render_overlay(&image, &grid, 2).unwrap();

    let distinct: std::collections::HashSet<[u8; 3]> =
        overlay.pixels().map(|p| p.0).collect();
    assert_eq!(distinct.len(), 2);
}

#[test]
fn test_overlay_deterministic() {
    let image = RgbImage::from_fn(32, 24, |x, y| Rgb([(x * 7) as u8, (y * 11) as u8, 128]));
    let grid = Array2::from_shape_fn((3, 4), |(r, c)| (r * 4 + c) % 5);
    let a = render_overlay(&image, &grid, 5).unwrap();
    let b = render_overlay(&image, &grid, 5).unwrap();
    assert_eq!(a.as_raw(), b.as_raw());
}

#[test]
fn test_overlay_rejects_out_of_range_label() {
    let image = RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]));
    let grid = Array2::from_elem((2, 2), 3usize);
    assert!(render_overlay(&image, &grid, 3).is_err());
}
