//! Shared resize/normalize configuration for the backbone.
//!
//! The offline training-sample extraction and the online inference path must
//! feed the backbone identically prepared pixels; any divergence silently
//! degrades cluster quality. The parameters therefore live in one named
//! configuration that is persisted inside every [`crate::model::ClusterModel`]
//! and checked against the extractor's own configuration at pipeline
//! construction.

use image::{imageops, RgbImage};
use log::debug;
use ndarray::Array3;
use serde::{Deserialize, Serialize};

/// Resize and per-channel normalization parameters.
///
/// The width is the resize anchor: images are scaled so their width equals
/// `target_width` with the aspect ratio preserved (height rounded to the
/// nearest integer). Mean and standard deviation are per-channel constants
/// matching the backbone's training distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    pub target_width: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            target_width: 512,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

impl PreprocessConfig {
    /// Height after anchoring the width, rounded to the nearest integer and
    /// clamped to at least one pixel.
    pub fn scaled_height(&self, width: u32, height: u32) -> u32 {
        let h = (self.target_width as f64 * height as f64 / width as f64).round() as u32;
        h.max(1)
    }

    /// Resize the source to the anchored dimensions. The input is not mutated.
    pub fn resize(&self, image: &RgbImage) -> RgbImage {
        let (w, h) = image.dimensions();
        let target_h = self.scaled_height(w, h);
        debug!(
            "Resizing {}x{} -> {}x{}",
            w, h, self.target_width, target_h
        );
        imageops::resize(image, self.target_width, target_h, imageops::FilterType::Triangle)
    }

    /// Convert a resized RGB raster into a normalized (3, H, W) tensor.
    pub fn normalize(&self, image: &RgbImage) -> Array3<f32> {
        let (w, h) = image.dimensions();
        Array3::from_shape_fn((3, h as usize, w as usize), |(c, y, x)| {
            let v = image.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
            (v - self.mean[c]) / self.std[c]
        })
    }
}
