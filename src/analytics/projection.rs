//! Two-dimensional projections of the sampled feature rows.
//!
//! Two independent reductions are produced for each report:
//! - a linear, orthogonal-variance-maximizing projection (top two principal
//!   components, computed through the Gram matrix so the cost scales with
//!   the sample size rather than the feature dimension), and
//! - a nonlinear neighbor embedding (exact t-distributed stochastic neighbor
//!   embedding with a fixed perplexity, principal-component initialization
//!   and gradient descent with momentum and adaptive gains).
//!
//! A k-nearest-neighbor classifier fitted on the projected points backs the
//! filled decision regions in the rendered charts. It is diagnostic only and
//! has no effect on the cluster assignment.

use std::collections::HashMap;

use log::debug;
use ndarray::Array2;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::error::{AnalyticsError, AnalyticsResult};

/// Points of one 2-D projection, aligned with the sample order.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection2d {
    pub points: Vec<[f64; 2]>,
}

impl Projection2d {
    pub fn bounds(&self) -> ([f64; 2], [f64; 2]) {
        let mut min = [f64::INFINITY; 2];
        let mut max = [f64::NEG_INFINITY; 2];
        for p in &self.points {
            for d in 0..2 {
                min[d] = min[d].min(p[d]);
                max[d] = max[d].max(p[d]);
            }
        }
        (min, max)
    }
}

// ---------------------------------------------------------------------------
// Linear projection
// ---------------------------------------------------------------------------

const POWER_ITERATIONS: usize = 200;
const POWER_TOLERANCE: f64 = 1e-12;
const POWER_SEED: u64 = 7;

/// Top-two principal-component scores of the sample.
///
/// Works on the centered Gram matrix G = Xc·Xcᵀ (n × n): if G = U·S²·Uᵀ then
/// the component scores are U·S, so two power-iteration passes with deflation
/// recover both columns without forming the C × C covariance.
pub fn pca_2d(features: &Array2<f32>) -> AnalyticsResult<Projection2d> {
    let (n, c) = features.dim();
    if n < 3 {
        return Err(AnalyticsError::Skipped(format!(
            "projection requires at least 3 samples, got {n}"
        )));
    }

    // Column means, then centered rows in f64.
    let mut mean = vec![0.0f64; c];
    for row in features.rows() {
        for (j, v) in row.iter().enumerate() {
            mean[j] += *v as f64;
        }
    }
    for m in &mut mean {
        *m /= n as f64;
    }
    let centered: Vec<Vec<f64>> = features
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(j, v)| *v as f64 - mean[j])
                .collect()
        })
        .collect();

    let mut gram: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            (0..n)
                .map(|j| {
                    centered[i]
                        .iter()
                        .zip(&centered[j])
                        .map(|(a, b)| a * b)
                        .sum()
                })
                .collect()
        })
        .collect();

    let (l1, u1) = power_iteration(&gram, POWER_SEED)?;
    if l1 < 1e-9 {
        return Err(AnalyticsError::Numeric(
            "sample variance is degenerate".into(),
        ));
    }
    // Deflate the top component and repeat.
    for i in 0..n {
        for j in 0..n {
            gram[i][j] -= l1 * u1[i] * u1[j];
        }
    }
    let (l2, u2) = power_iteration(&gram, POWER_SEED.wrapping_add(1))?;

    let s1 = l1.max(0.0).sqrt();
    let s2 = l2.max(0.0).sqrt();
    let points = (0..n).map(|i| [u1[i] * s1, u2[i] * s2]).collect();
    debug!("PCA projection: eigenvalues {:.4e}, {:.4e}", l1, l2);
    Ok(Projection2d { points })
}

/// Dominant eigenpair of a symmetric matrix by power iteration with a seeded
/// random start (a constant start vector lies in the null space of a centered
/// Gram matrix).
fn power_iteration(matrix: &[Vec<f64>], seed: u64) -> AnalyticsResult<(f64, Vec<f64>)> {
    let n = matrix.len();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut v: Vec<f64> = (0..n).map(|_| rng.random_range(-1.0..1.0)).collect();
    normalize(&mut v)?;

    let mut eigval = 0.0;
    for _ in 0..POWER_ITERATIONS {
        let mut next: Vec<f64> = matrix
            .par_iter()
            .map(|row| row.iter().zip(&v).map(|(a, b)| a * b).sum())
            .collect();
        eigval = next.iter().zip(&v).map(|(a, b)| a * b).sum();
        let norm = normalize(&mut next);
        if norm.is_err() {
            // Matrix annihilated the vector: eigenvalue is zero.
            return Ok((0.0, v));
        }
        let delta: f64 = next
            .iter()
            .zip(&v)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        v = next;
        if delta < POWER_TOLERANCE {
            break;
        }
    }
    Ok((eigval, v))
}

fn normalize(v: &mut [f64]) -> AnalyticsResult<()> {
    let norm: f64 = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm < 1e-300 {
        return Err(AnalyticsError::Numeric("zero vector in iteration".into()));
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Neighbor embedding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingParams {
    /// Effective neighborhood size.
    pub perplexity: f64,
    /// Gradient-descent iterations.
    pub iterations: usize,
    /// Learning rate; 0 derives one from the sample size.
    pub learning_rate: f64,
}

impl Default for EmbeddingParams {
    fn default() -> Self {
        Self {
            perplexity: 30.0,
            iterations: 1000,
            learning_rate: 0.0,
        }
    }
}

const EARLY_EXAGGERATION: f64 = 12.0;
const EXAGGERATION_ITERS: usize = 250;
const INITIAL_MOMENTUM: f64 = 0.5;
const FINAL_MOMENTUM: f64 = 0.8;

/// Exact neighbor embedding of the sample into two dimensions.
pub fn tsne_2d(features: &Array2<f32>, params: &EmbeddingParams) -> AnalyticsResult<Projection2d> {
    let n = features.nrows();
    if (n as f64) <= params.perplexity {
        return Err(AnalyticsError::Skipped(format!(
            "perplexity {} requires more than {} samples",
            params.perplexity, n
        )));
    }

    let p = joint_probabilities(features, params.perplexity);

    // Principal-component initialization, rescaled so the first axis has
    // standard deviation 1e-4.
    let init = pca_2d(features)?;
    let std0 = column_std(&init.points, 0);
    if std0 < 1e-300 {
        return Err(AnalyticsError::Numeric(
            "degenerate initialization for the embedding".into(),
        ));
    }
    let mut y: Vec<[f64; 2]> = init
        .points
        .iter()
        .map(|pt| [pt[0] / std0 * 1e-4, pt[1] / std0 * 1e-4])
        .collect();

    let lr = if params.learning_rate > 0.0 {
        params.learning_rate
    } else {
        (n as f64 / (EARLY_EXAGGERATION * 4.0)).max(50.0)
    };

    let mut inc = vec![[0.0f64; 2]; n];
    let mut gains = vec![[1.0f64; 2]; n];

    for iter in 0..params.iterations {
        let exaggeration = if iter < EXAGGERATION_ITERS {
            EARLY_EXAGGERATION
        } else {
            1.0
        };
        let momentum = if iter < EXAGGERATION_ITERS {
            INITIAL_MOMENTUM
        } else {
            FINAL_MOMENTUM
        };

        // Student-t affinities in the embedding space.
        let weights: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| {
                (0..n)
                    .map(|j| {
                        if i == j {
                            0.0
                        } else {
                            let dx = y[i][0] - y[j][0];
                            let dy = y[i][1] - y[j][1];
                            1.0 / (1.0 + dx * dx + dy * dy)
                        }
                    })
                    .collect()
            })
            .collect();
        let z: f64 = weights.iter().map(|row| row.iter().sum::<f64>()).sum();

        let grad: Vec<[f64; 2]> = (0..n)
            .into_par_iter()
            .map(|i| {
                let mut g = [0.0f64; 2];
                for j in 0..n {
                    if i == j {
                        continue;
                    }
                    let q = (weights[i][j] / z).max(1e-12);
                    let coeff = 4.0 * (exaggeration * p[i][j] - q) * weights[i][j];
                    g[0] += coeff * (y[i][0] - y[j][0]);
                    g[1] += coeff * (y[i][1] - y[j][1]);
                }
                g
            })
            .collect();

        for i in 0..n {
            for d in 0..2 {
                gains[i][d] = if grad[i][d].signum() != inc[i][d].signum() {
                    gains[i][d] + 0.2
                } else {
                    (gains[i][d] * 0.8).max(0.01)
                };
                inc[i][d] = momentum * inc[i][d] - lr * gains[i][d] * grad[i][d];
                y[i][d] += inc[i][d];
            }
        }

        // Keep the embedding centered.
        let mut mean = [0.0f64; 2];
        for pt in &y {
            mean[0] += pt[0];
            mean[1] += pt[1];
        }
        mean[0] /= n as f64;
        mean[1] /= n as f64;
        for pt in &mut y {
            pt[0] -= mean[0];
            pt[1] -= mean[1];
        }
    }

    if y.iter().any(|pt| !pt[0].is_finite() || !pt[1].is_finite()) {
        return Err(AnalyticsError::Numeric("embedding diverged".into()));
    }
    debug!("Embedding converged over {} iterations", params.iterations);
    Ok(Projection2d { points: y })
}

/// Symmetrized input affinities with per-row precision found by binary
/// search so each conditional distribution hits the target perplexity.
fn joint_probabilities(features: &Array2<f32>, perplexity: f64) -> Vec<Vec<f64>> {
    let n = features.nrows();
    let d2: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            (0..n)
                .map(|j| {
                    features
                        .row(i)
                        .iter()
                        .zip(features.row(j).iter())
                        .map(|(a, b)| {
                            let diff = (*a - *b) as f64;
                            diff * diff
                        })
                        .sum()
                })
                .collect()
        })
        .collect();

    let target = perplexity.ln();
    let conditional: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            let mut beta = 1.0f64;
            let mut beta_min = f64::NEG_INFINITY;
            let mut beta_max = f64::INFINITY;
            let mut row = vec![0.0f64; n];
            for _ in 0..50 {
                let mut sum = 0.0;
                for j in 0..n {
                    row[j] = if i == j {
                        0.0
                    } else {
                        (-beta * d2[i][j]).exp()
                    };
                    sum += row[j];
                }
                if sum < 1e-300 {
                    // All mass collapsed; relax the precision.
                    beta /= 2.0;
                    continue;
                }
                // Shannon entropy of the conditional distribution.
                let mut entropy = 0.0;
                for j in 0..n {
                    let pj = row[j] / sum;
                    if pj > 1e-300 {
                        entropy -= pj * pj.ln();
                    }
                }
                let diff = entropy - target;
                if diff.abs() < 1e-5 {
                    break;
                }
                if diff > 0.0 {
                    beta_min = beta;
                    beta = if beta_max.is_finite() {
                        (beta + beta_max) / 2.0
                    } else {
                        beta * 2.0
                    };
                } else {
                    beta_max = beta;
                    beta = if beta_min.is_finite() {
                        (beta + beta_min) / 2.0
                    } else {
                        beta / 2.0
                    };
                }
            }
            let sum: f64 = row.iter().sum();
            if sum > 0.0 {
                for v in &mut row {
                    *v /= sum;
                }
            }
            row
        })
        .collect();

    let mut joint = vec![vec![0.0f64; n]; n];
    for i in 0..n {
        for j in 0..n {
            joint[i][j] = ((conditional[i][j] + conditional[j][i]) / (2.0 * n as f64)).max(1e-12);
        }
    }
    joint
}

fn column_std(points: &[[f64; 2]], d: usize) -> f64 {
    let n = points.len() as f64;
    let mean: f64 = points.iter().map(|p| p[d]).sum::<f64>() / n;
    (points.iter().map(|p| (p[d] - mean).powi(2)).sum::<f64>() / n).sqrt()
}

// ---------------------------------------------------------------------------
// Decision regions
// ---------------------------------------------------------------------------

/// Nearest-neighbor classifier over projected points; used only to fill the
/// background regions of the projection charts.
#[derive(Debug, Clone)]
pub struct RegionClassifier {
    points: Vec<[f64; 2]>,
    labels: Vec<usize>,
    k: usize,
}

impl RegionClassifier {
    pub fn fit(points: &[[f64; 2]], labels: &[usize], k: usize) -> Self {
        Self {
            points: points.to_vec(),
            labels: labels.to_vec(),
            k: k.max(1).min(points.len()),
        }
    }

    /// Majority label of the k nearest training points; ties resolve to the
    /// smaller label id for determinism.
    pub fn predict(&self, p: [f64; 2]) -> usize {
        let mut dists: Vec<(f64, usize)> = self
            .points
            .iter()
            .zip(&self.labels)
            .map(|(pt, &l)| {
                let dx = pt[0] - p[0];
                let dy = pt[1] - p[1];
                (dx * dx + dy * dy, l)
            })
            .collect();
        dists.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut votes: HashMap<usize, usize> = HashMap::new();
        for &(_, l) in dists.iter().take(self.k) {
            *votes.entry(l).or_insert(0) += 1;
        }
        votes
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
            .map(|(l, _)| l)
            .unwrap_or(0)
    }
}
