use std::collections::HashSet;

use ndarray::Array2;

use crate::sampling::{sample_indices, take_rows, SAMPLE_CAP};

#[test]
fn test_sample_respects_cap() {
    let indices = sample_indices(5000, SAMPLE_CAP, 128);
    assert_eq!(indices.len(), SAMPLE_CAP);
    assert!(indices.iter().all(|&i| i < 5000));
}

#[test]
fn test_sample_without_replacement() {
    let indices = sample_indices(2000, 1000, 7);
    let unique: HashSet<usize> = indices.iter().copied().collect();
    assert_eq!(unique.len(), indices.len());
}

#[test]
fn test_sample_small_population_is_identity() {
    let indices = sample_indices(40, SAMPLE_CAP, 128);
    assert_eq!(indices, (0..40).collect::<Vec<_>>());
}

#[test]
fn test_sample_deterministic_per_seed() {
    assert_eq!(sample_indices(5000, 100, 42), sample_indices(5000, 100, 42));
    assert_ne!(sample_indices(5000, 100, 42), sample_indices(5000, 100, 43));
}

#[test]
fn test_take_rows_aligns_features_and_labels() {
    let features = Array2::from_shape_fn((10, 3), |(i, j)| (i * 10 + j) as f32);
    let labels: Vec<usize> = (0..10).map(|i| i % 2).collect();
    let indices = vec![7, 2, 9];
    let (sampled, sampled_labels) = take_rows(&features, &labels, &indices);
    assert_eq!(sampled.dim(), (3, 3));
    assert_eq!(sampled[[0, 0]], 70.0);
    assert_eq!(sampled[[1, 2]], 22.0);
    assert_eq!(sampled_labels, vec![1, 0, 1]);
}
