use std::fs;
use std::path::Path;

use ndarray::Array2;
use tempfile::TempDir;

use crate::error::PatchsegError;
use crate::model::ClusterModel;
use crate::tests::test_data::axis_model;

#[test]
fn test_load_missing_model() {
    let err = ClusterModel::load(Path::new("/nonexistent/clusters.json")).unwrap_err();
    assert!(matches!(err, PatchsegError::ModelNotFound(_)));
}

#[test]
fn test_load_corrupt_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clusters.json");
    fs::write(&path, "{ not json").unwrap();
    let err = ClusterModel::load(&path).unwrap_err();
    assert!(matches!(err, PatchsegError::ModelCorrupt(_)));
}

#[test]
fn test_save_load_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clusters.json");
    let model = axis_model(4, 6);
    model.save(&path).unwrap();
    let loaded = ClusterModel::load(&path).unwrap();
    assert_eq!(loaded.k, 4);
    assert_eq!(loaded.feature_dim, 6);
    assert_eq!(loaded.centers, model.centers);
    assert_eq!(loaded.preprocess, model.preprocess);
}

#[test]
fn test_validate_scaler_length_mismatch() {
    let mut model = axis_model(3, 5);
    model.scaler_mean.pop();
    assert!(matches!(
        model.validate().unwrap_err(),
        PatchsegError::ModelCorrupt(_)
    ));
}

#[test]
fn test_validate_center_length_mismatch() {
    let mut model = axis_model(3, 5);
    model.centers[1].push(0.0);
    assert!(matches!(
        model.validate().unwrap_err(),
        PatchsegError::ModelCorrupt(_)
    ));
}

#[test]
fn test_validate_rejects_k_beyond_palette() {
    let mut model = axis_model(10, 16);
    model.k = 11;
    model.centers.push(vec![0.0; 16]);
    assert!(matches!(
        model.validate().unwrap_err(),
        PatchsegError::ModelCorrupt(_)
    ));
}

#[test]
fn test_validate_rejects_zero_scale() {
    let mut model = axis_model(3, 5);
    model.scaler_scale[2] = 0.0;
    assert!(matches!(
        model.validate().unwrap_err(),
        PatchsegError::ModelCorrupt(_)
    ));
}

#[test]
fn test_standardize_dimension_mismatch() {
    let model = axis_model(3, 5);
    let features = Array2::<f32>::zeros((4, 7));
    match model.standardize(&features).unwrap_err() {
        PatchsegError::DimensionMismatch { expected, actual } => {
            assert_eq!(expected, 5);
            assert_eq!(actual, 7);
        }
        other => panic!("expected dimension mismatch, got {other:?}"),
    }
}

#[test]
fn test_standardize_uses_persisted_statistics() {
    let mut model = axis_model(2, 3);
    model.scaler_mean = vec![1.0, 2.0, 3.0];
    model.scaler_scale = vec![2.0, 4.0, 0.5];
    let features = Array2::from_shape_vec((1, 3), vec![3.0, 2.0, 4.0]).unwrap();
    let scaled = model.standardize(&features).unwrap();
    assert_eq!(scaled[[0, 0]], 1.0);
    assert_eq!(scaled[[0, 1]], 0.0);
    assert_eq!(scaled[[0, 2]], 2.0);
}

#[test]
fn test_assign_labels_in_range() {
    let model = axis_model(4, 4);
    let features = Array2::from_shape_fn((40, 4), |(i, j)| if i % 4 == j { 5.0 } else { 0.1 });
    let labels = model.assign(&features).unwrap();
    assert_eq!(labels.len(), 40);
    assert!(labels.iter().all(|&l| l < 4));
    // One-hot rows land on the matching axis center.
    for (i, &l) in labels.iter().enumerate() {
        assert_eq!(l, i % 4);
    }
}
