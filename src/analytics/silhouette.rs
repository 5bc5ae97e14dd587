//! Silhouette analysis on the bounded sample.
//!
//! For each sampled location: a(i) is the mean distance to the other members
//! of its own cluster, b(i) the smallest mean distance to any other cluster,
//! and s(i) = (b - a) / max(a, b). Singleton clusters score 0. The step
//! requires at least two distinct labels in the sample; otherwise it is
//! skipped and reported as unavailable rather than failing the request.

use std::collections::HashSet;

use log::debug;
use ndarray::Array2;
use rayon::prelude::*;

use crate::error::{AnalyticsError, AnalyticsResult};

#[derive(Debug, Clone, PartialEq)]
pub struct SilhouetteReport {
    /// Average silhouette coefficient over the sample.
    pub average: f64,
    /// Per-sample silhouette values, aligned with the sample order.
    pub values: Vec<f64>,
}

pub fn silhouette(features: &Array2<f32>, labels: &[usize]) -> AnalyticsResult<SilhouetteReport> {
    let n = labels.len();
    let distinct: HashSet<usize> = labels.iter().copied().collect();
    if distinct.len() < 2 {
        return Err(AnalyticsError::Skipped(format!(
            "silhouette requires at least 2 distinct labels, sample has {}",
            distinct.len()
        )));
    }
    let k = labels.iter().copied().max().unwrap_or(0) + 1;

    let values: Vec<f64> = (0..n)
        .into_par_iter()
        .map(|i| {
            let row_i = features.row(i);
            // Mean distance from i to every cluster.
            let mut dist_sum = vec![0.0f64; k];
            let mut count = vec![0usize; k];
            for j in 0..n {
                if j == i {
                    continue;
                }
                let d2: f64 = row_i
                    .iter()
                    .zip(features.row(j).iter())
                    .map(|(a, b)| {
                        let diff = (*a - *b) as f64;
                        diff * diff
                    })
                    .sum();
                dist_sum[labels[j]] += d2.sqrt();
                count[labels[j]] += 1;
            }

            let own = labels[i];
            if count[own] == 0 {
                // Singleton cluster.
                return 0.0;
            }
            let a = dist_sum[own] / count[own] as f64;
            let b = (0..k)
                .filter(|&c| c != own && count[c] > 0)
                .map(|c| dist_sum[c] / count[c] as f64)
                .fold(f64::INFINITY, f64::min);
            let denom = a.max(b);
            if denom > 0.0 { (b - a) / denom } else { 0.0 }
        })
        .collect();

    let average = values.iter().sum::<f64>() / n as f64;
    debug!(
        "Silhouette over {} samples, {} clusters: avg={:.4}",
        n,
        distinct.len(),
        average
    );
    Ok(SilhouetteReport { average, values })
}
