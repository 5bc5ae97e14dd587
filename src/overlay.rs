//! Spatial overlay renderer.
//!
//! Maps per-location labels back onto the source pixel grid: a (Hf, Wf)
//! color mask is built from the label grid, upscaled to the source
//! resolution with nearest-neighbor interpolation (hard cluster boundaries,
//! no smoothing), then alpha-blended 60% source / 40% mask. Pure and
//! stateless; identical inputs produce byte-identical output.

use image::{imageops, RgbImage};
use log::debug;
use ndarray::Array2;

use crate::error::{PatchsegError, Result};
use crate::palette;

const SOURCE_WEIGHT: f32 = 0.6;
const MASK_WEIGHT: f32 = 0.4;

/// Render the translucent cluster overlay at the source image's exact
/// pixel dimensions.
pub fn render_overlay(image: &RgbImage, grid: &Array2<usize>, k: usize) -> Result<RgbImage> {
    let (hf, wf) = grid.dim();
    if let Some(&bad) = grid.iter().find(|&&l| l >= k) {
        return Err(PatchsegError::InvalidInput(format!(
            "label {} out of range for k={}",
            bad, k
        )));
    }

    // Resolve every color up front so an over-capacity label id errors
    // instead of wrapping.
    let colors: Vec<[u8; 3]> = (0..k).map(palette::color).collect::<Result<_>>()?;

    let mut mask = RgbImage::new(wf as u32, hf as u32);
    for (y, row) in grid.rows().into_iter().enumerate() {
        for (x, &label) in row.iter().enumerate() {
            mask.put_pixel(x as u32, y as u32, image::Rgb(colors[label]));
        }
    }

    let (w, h) = image.dimensions();
    debug!("Upscaling {}x{} mask to {}x{}", wf, hf, w, h);
    let mask = imageops::resize(&mask, w, h, imageops::FilterType::Nearest);

    let blended = RgbImage::from_fn(w, h, |x, y| {
        let s = image.get_pixel(x, y);
        let m = mask.get_pixel(x, y);
        let mut px = [0u8; 3];
        for c in 0..3 {
            let v = SOURCE_WEIGHT * s[c] as f32 + MASK_WEIGHT * m[c] as f32;
            px[c] = v.round().clamp(0.0, 255.0) as u8;
        }
        image::Rgb(px)
    });
    Ok(blended)
}
