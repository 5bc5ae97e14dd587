use crate::analytics::silhouette::silhouette;
use crate::error::AnalyticsError;
use crate::tests::test_data::two_blobs;

#[test]
fn test_silhouette_separated_blobs_scores_high() {
    let (features, labels) = two_blobs(40, 3);
    let report = silhouette(&features, &labels).unwrap();
    assert!(
        report.average > 0.5,
        "well-separated blobs should score above 0.5, got {}",
        report.average
    );
    assert_eq!(report.values.len(), labels.len());
    assert!(report.values.iter().all(|v| (-1.0..=1.0).contains(v)));
}

#[test]
fn test_silhouette_single_label_is_skipped() {
    let (features, _) = two_blobs(20, 5);
    let labels = vec![0usize; features.nrows()];
    match silhouette(&features, &labels).unwrap_err() {
        AnalyticsError::Skipped(_) => {}
        other => panic!("expected skip, got {other:?}"),
    }
}

#[test]
fn test_silhouette_average_matches_values() {
    let (features, labels) = two_blobs(25, 9);
    let report = silhouette(&features, &labels).unwrap();
    let mean = report.values.iter().sum::<f64>() / report.values.len() as f64;
    approx::assert_abs_diff_eq!(report.average, mean, epsilon = 1e-12);
}
