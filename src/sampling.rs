//! Bounded sampling for the expensive analytics.
//!
//! Silhouette and both projections are O(n²) or worse in the number of
//! locations, so they run on a bounded random sample (cap 1000 rows, drawn
//! without replacement). All random draws are seeded: identical requests
//! produce identical diagnostic charts, and the seed is recorded in the
//! report.

use log::debug;
use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Row cap for every sample-based analytic.
pub const SAMPLE_CAP: usize = 1000;

/// Default sampling seed, recorded in each report.
pub const DEFAULT_SEED: u64 = 128;

/// Uniform sample of `cap` indices out of `n` without replacement.
/// Returns all indices when `n <= cap`.
pub fn sample_indices(n: usize, cap: usize, seed: u64) -> Vec<usize> {
    if n <= cap {
        return (0..n).collect();
    }
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut idxs: Vec<usize> = (0..n).collect();
    idxs.shuffle(&mut rng);
    idxs.truncate(cap);
    debug!("Sampled {} of {} rows (seed {})", cap, n, seed);
    idxs
}

/// Materialize the sampled feature rows and their labels.
pub fn take_rows(
    features: &Array2<f32>,
    labels: &[usize],
    indices: &[usize],
) -> (Array2<f32>, Vec<usize>) {
    let c = features.ncols();
    let sampled = Array2::from_shape_fn((indices.len(), c), |(i, j)| features[[indices[i], j]]);
    let sampled_labels = indices.iter().map(|&i| labels[i]).collect();
    (sampled, sampled_labels)
}
