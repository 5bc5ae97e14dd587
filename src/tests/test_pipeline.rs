use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{Rgb, RgbImage};
use ndarray::Array3;
use serial_test::serial;
use tempfile::TempDir;

use crate::analytics::{AnalyticsConfig, EmbeddingParams};
use crate::backbone::FeatureSource;
use crate::error::{PatchsegError, Result};
use crate::pipeline::{run_inference, Pipeline};
use crate::preprocess::PreprocessConfig;
use crate::tests::test_data::axis_model;
use crate::tests::init;

/// Reduced embedding workload for the end-to-end runs.
fn fast_analytics() -> AnalyticsConfig {
    AnalyticsConfig {
        embedding: EmbeddingParams {
            perplexity: 10.0,
            iterations: 250,
            learning_rate: 0.0,
        },
        ..AnalyticsConfig::default()
    }
}

/// Stand-in backbone: stride-32 grid, C channels, label-shaped one-hot
/// features so the axis model assigns location n to cluster n % 6.
struct SyntheticSource {
    channels: usize,
    preprocess: PreprocessConfig,
    calls: AtomicUsize,
}

impl SyntheticSource {
    fn new(channels: usize) -> Self {
        Self {
            channels,
            preprocess: PreprocessConfig::default(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl FeatureSource for SyntheticSource {
    fn extract(&self, image: &RgbImage) -> Result<Array3<f32>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let resized = self.preprocess.resize(image);
        let (w, h) = resized.dimensions();
        let (hf, wf) = ((h / 32) as usize, (w / 32) as usize);
        Ok(Array3::from_shape_fn(
            (self.channels, hf, wf),
            move |(c, r, col)| {
                let idx = (r * wf + col) % 6;
                if c == idx { 3.0 } else { 0.0 }
            },
        ))
    }

    fn preprocess(&self) -> &PreprocessConfig {
        &self.preprocess
    }
}

fn write_test_image(path: &Path, w: u32, h: u32) {
    let img = RgbImage::from_fn(w, h, |x, y| Rgb([(x % 251) as u8, (y % 241) as u8, 60]));
    img.save(path).unwrap();
}

#[test]
#[serial]
fn test_full_run_on_512x384_image() {
    init();
    let dir = TempDir::new().unwrap();
    let image_path = dir.path().join("input.png");
    write_test_image(&image_path, 512, 384);

    let model = Arc::new(axis_model(6, 8));
    let source = Arc::new(SyntheticSource::new(8));
    let pipeline = Pipeline::new(source, model)
        .unwrap()
        .with_analytics(fast_analytics());

    let out_path = dir.path().join("req1_output.png");
    let outcome = pipeline.run(&image_path, &out_path).unwrap();

    // Stride-32 grid for a 512x384 source.
    assert_eq!(outcome.grid_shape, (12, 16));
    assert_eq!(outcome.report.distribution.total, 192);
    assert_eq!(outcome.report.distribution.counts.iter().sum::<usize>(), 192);
    // idx = n % 6 spreads the 192 locations evenly.
    assert_eq!(outcome.report.distribution.counts, vec![32; 6]);

    let overlay = image::open(&out_path).unwrap().to_rgb8();
    assert_eq!(overlay.dimensions(), (512, 384));

    let metrics = std::fs::read_to_string(outcome.paths.metrics()).unwrap();
    assert!(metrics.contains("Number of Clusters: 6"));
    assert!(metrics.contains("Total Pixels/Patches: 192"));

    let stats_raw = std::fs::read_to_string(outcome.paths.stats()).unwrap();
    let stats: Vec<crate::analytics::ClusterStat> = serde_json::from_str(&stats_raw).unwrap();
    assert_eq!(stats.len(), 6);
    let pct_sum: f64 = stats.iter().map(|s| s.percentage).sum();
    assert!((pct_sum - 100.0).abs() <= 0.1 * 6.0, "stats sum {pct_sum}");

    // Chart artifacts landed next to the overlay.
    assert!(outcome.paths.legend().exists());
    assert!(outcome.paths.distribution().exists());
    assert!(outcome.paths.pie().exists());
    assert!(outcome.paths.heatmap().exists());
}

#[test]
#[serial]
fn test_rerun_reproduces_full_population_numbers() {
    init();
    let dir = TempDir::new().unwrap();
    let image_path = dir.path().join("input.png");
    write_test_image(&image_path, 256, 256);

    let model = Arc::new(axis_model(6, 8));
    let source = Arc::new(SyntheticSource::new(8));
    let pipeline = Pipeline::new(source, model)
        .unwrap()
        .with_analytics(fast_analytics());

    let a = pipeline
        .run(&image_path, &dir.path().join("a_output.png"))
        .unwrap();
    let b = pipeline
        .run(&image_path, &dir.path().join("b_output.png"))
        .unwrap();
    assert_eq!(a.report.distribution, b.report.distribution);
    assert_eq!(a.stats, b.stats);
}

#[test]
fn test_missing_model_fails_before_extraction() {
    let dir = TempDir::new().unwrap();
    let image_path = dir.path().join("input.png");
    write_test_image(&image_path, 64, 64);

    let source = Arc::new(SyntheticSource::new(8));
    let out_path = dir.path().join("x_output.png");
    let err = run_inference(
        &image_path,
        Path::new("/nonexistent/clusters.json"),
        &out_path,
        source.clone(),
    )
    .unwrap_err();

    assert!(matches!(err, PatchsegError::ModelNotFound(_)));
    assert_eq!(source.calls.load(Ordering::Relaxed), 0);
    assert!(!out_path.exists());
}

#[test]
#[serial]
fn test_dimension_mismatch_writes_nothing() {
    init();
    let dir = TempDir::new().unwrap();
    let image_path = dir.path().join("input.png");
    write_test_image(&image_path, 128, 128);

    // Model trained for 5 features, backbone emits 8.
    let model = Arc::new(axis_model(5, 5));
    let source = Arc::new(SyntheticSource::new(8));
    let pipeline = Pipeline::new(source, model).unwrap();

    let out_path = dir.path().join("bad_output.png");
    let err = pipeline.run(&image_path, &out_path).unwrap_err();
    assert!(matches!(
        err,
        PatchsegError::DimensionMismatch {
            expected: 5,
            actual: 8
        }
    ));
    assert!(!out_path.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1); // only input.png
}

#[test]
fn test_pipeline_rejects_preprocess_divergence() {
    let mut model = axis_model(4, 8);
    model.preprocess.target_width = 448;
    let source = Arc::new(SyntheticSource::new(8));
    let err = Pipeline::new(source, Arc::new(model)).unwrap_err();
    assert!(matches!(err, PatchsegError::Configuration(_)));
}
