//! Offline cluster-model training.
//!
//! A one-shot batch job, not part of the request path: a sample of feature
//! rows (drawn across a training image set) is standardized with population
//! statistics and partitioned with seeded k-means. The resulting centers,
//! scaler and preprocessing parameters are packaged into the persisted
//! [`ClusterModel`] the inference path consumes.

use log::{debug, info, warn};
use ndarray::Array2;
use smartcore::cluster::kmeans::{KMeans, KMeansParameters};
use smartcore::linalg::basic::arrays::Array2 as _;
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::{PatchsegError, Result};
use crate::model::{ClusterModel, MODEL_VERSION};
use crate::palette::PALETTE_SIZE;
use crate::preprocess::PreprocessConfig;
use crate::sampling;

#[derive(Debug, Clone)]
pub struct FitConfig {
    /// Number of clusters; 2 ..= palette size.
    pub k: usize,
    /// K-means iteration cap.
    pub max_iter: usize,
    /// Seed for the k-means initialization.
    pub seed: u64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            k: 6,
            max_iter: 100,
            seed: 0,
        }
    }
}

/// Draw a bounded per-image patch sample: `rate` of the rows, at least one,
/// without replacement. Used by the extraction job to assemble the training
/// sample across many images.
pub fn sample_patch_rows(features: &Array2<f32>, rate: f64, seed: u64) -> Array2<f32> {
    let n = features.nrows();
    let keep = ((rate * n as f64) as usize).clamp(1, n);
    let indices = sampling::sample_indices(n, keep, seed);
    Array2::from_shape_fn((indices.len(), features.ncols()), |(i, j)| {
        features[[indices[i], j]]
    })
}

/// Fit scaler + partitioner on the training sample and package the model.
pub fn fit_model(
    rows: &Array2<f32>,
    config: &FitConfig,
    preprocess: &PreprocessConfig,
) -> Result<ClusterModel> {
    let (n, c) = rows.dim();
    if config.k < 2 || config.k > PALETTE_SIZE {
        return Err(PatchsegError::InvalidInput(format!(
            "k must be in 2..={}, got {}",
            PALETTE_SIZE, config.k
        )));
    }
    if n < config.k {
        return Err(PatchsegError::InvalidInput(format!(
            "training sample of {} rows cannot support k={}",
            n, config.k
        )));
    }
    info!("Fitting cluster model: N={}, C={}, k={}", n, c, config.k);

    // Population statistics; zero spread falls back to unit scale so
    // standardization stays defined for constant features.
    let mut mean = vec![0.0f64; c];
    for row in rows.rows() {
        for (j, v) in row.iter().enumerate() {
            mean[j] += *v as f64;
        }
    }
    for m in &mut mean {
        *m /= n as f64;
    }
    let mut var = vec![0.0f64; c];
    for row in rows.rows() {
        for (j, v) in row.iter().enumerate() {
            let d = *v as f64 - mean[j];
            var[j] += d * d;
        }
    }
    let scale: Vec<f64> = var
        .iter()
        .map(|&v| {
            let s = (v / n as f64).sqrt();
            if s > 0.0 { s } else { 1.0 }
        })
        .collect();

    let scaled: Vec<f64> = rows
        .rows()
        .into_iter()
        .flat_map(|row| {
            row.iter()
                .enumerate()
                .map(|(j, v)| (*v as f64 - mean[j]) / scale[j])
                .collect::<Vec<f64>>()
        })
        .collect();
    let x: DenseMatrix<f64> = DenseMatrix::from_iterator(scaled.iter().copied(), n, c, 1);

    let params = KMeansParameters {
        k: config.k,
        max_iter: config.max_iter,
        seed: Some(config.seed),
    };
    let km = KMeans::fit(&x, params)
        .map_err(|e| PatchsegError::InvalidInput(format!("k-means fit failed: {e}")))?;
    let assignments: Vec<usize> = km
        .predict(&x)
        .map_err(|e| PatchsegError::InvalidInput(format!("k-means predict failed: {e}")))?;

    // Centers as per-cluster means of the standardized rows.
    let mut centers = vec![vec![0.0f64; c]; config.k];
    let mut counts = vec![0usize; config.k];
    for (i, &cluster) in assignments.iter().enumerate() {
        for j in 0..c {
            centers[cluster][j] += scaled[i * c + j];
        }
        counts[cluster] += 1;
    }
    for (cluster, count) in counts.iter().enumerate() {
        if *count == 0 {
            warn!("Cluster {} received no training rows", cluster);
            continue;
        }
        for v in &mut centers[cluster] {
            *v /= *count as f64;
        }
    }
    debug!("Cluster sizes after fit: {:?}", counts);

    let model = ClusterModel {
        version: MODEL_VERSION,
        k: config.k,
        feature_dim: c,
        centers: centers
            .into_iter()
            .map(|row| row.into_iter().map(|v| v as f32).collect())
            .collect(),
        scaler_mean: mean.into_iter().map(|v| v as f32).collect(),
        scaler_scale: scale.into_iter().map(|v| v as f32).collect(),
        preprocess: preprocess.clone(),
    };
    model.validate()?;
    Ok(model)
}
