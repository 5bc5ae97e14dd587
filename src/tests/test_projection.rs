use ndarray::Array2;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::analytics::projection::{
    pca_2d, tsne_2d, EmbeddingParams, RegionClassifier,
};
use crate::error::AnalyticsError;
use crate::tests::test_data::two_blobs;

/// Anisotropic cloud: wide along axis 0, narrow along axis 1.
fn anisotropic_cloud(n: usize, seed: u64) -> Array2<f32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::from_shape_fn((n, 4), |(_, j)| match j {
        0 => rng.random_range(-10.0..10.0),
        1 => rng.random_range(-1.0..1.0),
        _ => 0.0,
    })
}

#[test]
fn test_pca_orders_components_by_variance() {
    let data = anisotropic_cloud(200, 11);
    let projection = pca_2d(&data).unwrap();

    let var = |d: usize| {
        let mean: f64 = projection.points.iter().map(|p| p[d]).sum::<f64>() / 200.0;
        projection
            .points
            .iter()
            .map(|p| (p[d] - mean).powi(2))
            .sum::<f64>()
            / 200.0
    };
    assert!(
        var(0) > var(1) * 5.0,
        "component 1 should dominate: {} vs {}",
        var(0),
        var(1)
    );
}

#[test]
fn test_pca_deterministic() {
    let data = anisotropic_cloud(100, 4);
    let a = pca_2d(&data).unwrap();
    let b = pca_2d(&data).unwrap();
    assert_eq!(a.points, b.points);
}

#[test]
fn test_pca_too_few_samples_is_skipped() {
    let data = Array2::<f32>::zeros((2, 4));
    assert!(matches!(
        pca_2d(&data).unwrap_err(),
        AnalyticsError::Skipped(_)
    ));
}

#[test]
fn test_pca_constant_data_is_degenerate() {
    let data = Array2::<f32>::ones((50, 4));
    assert!(matches!(
        pca_2d(&data).unwrap_err(),
        AnalyticsError::Numeric(_)
    ));
}

#[test]
fn test_tsne_requires_enough_samples_for_perplexity() {
    let (features, _) = two_blobs(10, 1);
    let params = EmbeddingParams::default(); // perplexity 30 > 20 samples
    assert!(matches!(
        tsne_2d(&features, &params).unwrap_err(),
        AnalyticsError::Skipped(_)
    ));
}

#[test]
fn test_tsne_keeps_blobs_apart() {
    let (features, labels) = two_blobs(40, 21);
    let params = EmbeddingParams {
        perplexity: 10.0,
        iterations: 300,
        learning_rate: 0.0,
    };
    let projection = tsne_2d(&features, &params).unwrap();
    assert_eq!(projection.points.len(), 80);
    assert!(projection
        .points
        .iter()
        .all(|p| p[0].is_finite() && p[1].is_finite()));

    // Mean within-cluster distance should stay below the distance between
    // the two cluster means.
    let mean_of = |cluster: usize| {
        let pts: Vec<&[f64; 2]> = projection
            .points
            .iter()
            .zip(&labels)
            .filter(|(_, &l)| l == cluster)
            .map(|(p, _)| p)
            .collect();
        let n = pts.len() as f64;
        [
            pts.iter().map(|p| p[0]).sum::<f64>() / n,
            pts.iter().map(|p| p[1]).sum::<f64>() / n,
        ]
    };
    let (m0, m1) = (mean_of(0), mean_of(1));
    let between = ((m0[0] - m1[0]).powi(2) + (m0[1] - m1[1]).powi(2)).sqrt();

    let spread: f64 = projection
        .points
        .iter()
        .zip(&labels)
        .map(|(p, &l)| {
            let m = if l == 0 { m0 } else { m1 };
            ((p[0] - m[0]).powi(2) + (p[1] - m[1]).powi(2)).sqrt()
        })
        .sum::<f64>()
        / projection.points.len() as f64;

    assert!(
        between > spread,
        "clusters should separate: between={between}, spread={spread}"
    );
}

#[test]
fn test_region_classifier_reproduces_training_labels() {
    let points: Vec<[f64; 2]> = (0..30)
        .map(|i| {
            let cluster = i / 10;
            let offset = (i % 10) as f64 * 0.05;
            [cluster as f64 * 10.0 + offset, cluster as f64 * -5.0 + offset]
        })
        .collect();
    let labels: Vec<usize> = (0..30).map(|i| i / 10).collect();
    let classifier = RegionClassifier::fit(&points, &labels, 5);
    for (p, &l) in points.iter().zip(&labels) {
        assert_eq!(classifier.predict(*p), l);
    }
}

#[test]
fn test_region_classifier_tie_breaks_to_smaller_label() {
    // Two points per label at symmetric positions around the query.
    let points = vec![[-1.0, 0.0], [-2.0, 0.0], [1.0, 0.0], [2.0, 0.0]];
    let labels = vec![1, 1, 0, 0];
    let classifier = RegionClassifier::fit(&points, &labels, 4);
    assert_eq!(classifier.predict([0.0, 0.0]), 0);
}
