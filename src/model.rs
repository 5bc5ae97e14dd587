//! Cluster model persistence and label assignment.
//!
//! A cluster model is the persisted triple of partitioner state (the K
//! cluster centers), per-feature mean and per-feature scale captured from the
//! training sample, plus the preprocessing parameters the sample was built
//! with. Standardization at inference time always uses these population
//! statistics; recomputing them per request would make cluster identities
//! drift between requests.
//!
//! Structural invariants are checked once at load so that a bad model fails
//! fast instead of producing garbage labels.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::{debug, info};
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PatchsegError, Result};
use crate::palette::PALETTE_SIZE;
use crate::preprocess::PreprocessConfig;

/// Current on-disk format version.
pub const MODEL_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterModel {
    pub version: u32,
    /// Number of clusters. Read from the model, never hardcoded downstream.
    pub k: usize,
    /// Feature dimension C the backbone must produce.
    pub feature_dim: usize,
    /// K cluster centers in standardized feature space, each of length C.
    pub centers: Vec<Vec<f32>>,
    /// Per-feature population mean from the training sample, length C.
    pub scaler_mean: Vec<f32>,
    /// Per-feature population scale from the training sample, length C.
    pub scaler_scale: Vec<f32>,
    /// Preprocessing the training sample was extracted with. The inference
    /// path must match it exactly.
    pub preprocess: PreprocessConfig,
}

impl ClusterModel {
    /// Load and validate a persisted model.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PatchsegError::ModelNotFound(path.to_path_buf()));
        }
        info!("Loading cluster model from {}", path.display());
        let file = File::open(path)?;
        let model: ClusterModel = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| PatchsegError::ModelCorrupt(e.to_string()))?;
        model.validate()?;
        debug!(
            "Model loaded: k={}, feature_dim={}",
            model.k, model.feature_dim
        );
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), self)
            .map_err(|e| PatchsegError::ModelCorrupt(e.to_string()))?;
        info!("Saved cluster model to {}", path.display());
        Ok(())
    }

    /// Structural consistency: mean/scale length == C == center length, K
    /// matches the center count and fits the palette.
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 || self.centers.len() != self.k {
            return Err(PatchsegError::ModelCorrupt(format!(
                "k={} but {} centers present",
                self.k,
                self.centers.len()
            )));
        }
        if self.k > PALETTE_SIZE {
            return Err(PatchsegError::ModelCorrupt(format!(
                "k={} exceeds the {}-color palette",
                self.k, PALETTE_SIZE
            )));
        }
        if self.scaler_mean.len() != self.feature_dim
            || self.scaler_scale.len() != self.feature_dim
        {
            return Err(PatchsegError::ModelCorrupt(format!(
                "scaler lengths {}/{} do not match feature_dim {}",
                self.scaler_mean.len(),
                self.scaler_scale.len(),
                self.feature_dim
            )));
        }
        if let Some(bad) = self.centers.iter().find(|c| c.len() != self.feature_dim) {
            return Err(PatchsegError::ModelCorrupt(format!(
                "center of length {} does not match feature_dim {}",
                bad.len(),
                self.feature_dim
            )));
        }
        if self.scaler_scale.iter().any(|&s| s == 0.0 || !s.is_finite()) {
            return Err(PatchsegError::ModelCorrupt(
                "scaler_scale contains zero or non-finite entries".into(),
            ));
        }
        Ok(())
    }

    /// Standardize each feature row with the persisted population statistics.
    pub fn standardize(&self, features: &Array2<f32>) -> Result<Array2<f32>> {
        let (_n, c) = features.dim();
        if c != self.feature_dim {
            return Err(PatchsegError::DimensionMismatch {
                expected: self.feature_dim,
                actual: c,
            });
        }
        let mut scaled = features.clone();
        for mut row in scaled.rows_mut() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = (*v - self.scaler_mean[j]) / self.scaler_scale[j];
            }
        }
        Ok(scaled)
    }

    /// Nearest-center assignment over already-standardized rows.
    /// Labels are stable integers in [0, K).
    pub fn assign_standardized(&self, scaled: &Array2<f32>) -> Vec<usize> {
        let rows: Vec<&[f32]> = scaled
            .rows()
            .into_iter()
            .map(|r| r.to_slice().expect("row-major feature matrix"))
            .collect();
        rows.par_iter()
            .map(|row| nearest_center(row, &self.centers).0)
            .collect()
    }

    /// Standardize then assign: the full adapter contract.
    pub fn assign(&self, features: &Array2<f32>) -> Result<Vec<usize>> {
        let scaled = self.standardize(features)?;
        Ok(self.assign_standardized(&scaled))
    }
}

/// Linear-scan nearest center: returns (index, squared distance).
pub(crate) fn nearest_center(row: &[f32], centers: &[Vec<f32>]) -> (usize, f32) {
    let mut best_idx = 0;
    let mut best_dist2 = f32::INFINITY;
    for (i, c) in centers.iter().enumerate() {
        let mut d2 = 0.0;
        for (a, b) in row.iter().zip(c.iter()) {
            let diff = a - b;
            d2 += diff * diff;
        }
        if d2 < best_dist2 {
            best_dist2 = d2;
            best_idx = i;
        }
    }
    (best_idx, best_dist2)
}
