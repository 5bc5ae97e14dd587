//! Inference orchestration for one request.
//!
//! Linear state machine, no branching beyond failure paths:
//! load image → extract features → flatten → standardize + assign →
//! render overlay → run analytics → write artifacts → return summary.
//!
//! Everything before the analytics stage fails fast and writes nothing;
//! inside analytics each artifact is independently recoverable. The pipeline
//! holds explicit shared handles (injected feature source, read-only loaded
//! model) instead of module-level singletons, so concurrent callers with
//! distinct output bases can invoke it re-entrantly.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use ndarray::Array2;

use crate::analytics::charts::{self, ChartSet};
use crate::analytics::{self, AnalyticsConfig, AnalyticsReport, ClusterStat};
use crate::backbone::{BackboneExtractor, FeatureSource};
use crate::error::{PatchsegError, Result};
use crate::features::{flatten_features, label_grid};
use crate::model::ClusterModel;
use crate::overlay::render_overlay;
use crate::store::ArtifactPaths;

/// Everything one inference call produced.
#[derive(Debug)]
pub struct InferenceOutcome {
    /// Canonical per-cluster summary, also persisted as `_stats.json`.
    pub stats: Vec<ClusterStat>,
    pub report: AnalyticsReport,
    pub charts: ChartSet,
    pub paths: ArtifactPaths,
    /// (Hf, Wf) of the label grid.
    pub grid_shape: (usize, usize),
}

pub struct Pipeline {
    source: Arc<dyn FeatureSource>,
    model: Arc<ClusterModel>,
    analytics: AnalyticsConfig,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Wire the pipeline. Fails when the model is structurally invalid or
    /// when the source's preprocessing diverges from the configuration the
    /// model was trained with.
    pub fn new(source: Arc<dyn FeatureSource>, model: Arc<ClusterModel>) -> Result<Self> {
        model.validate()?;
        if source.preprocess() != &model.preprocess {
            return Err(PatchsegError::Configuration(
                "feature source preprocessing differs from the model's training configuration"
                    .into(),
            ));
        }
        Ok(Self {
            source,
            model,
            analytics: AnalyticsConfig::default(),
        })
    }

    pub fn with_analytics(mut self, analytics: AnalyticsConfig) -> Self {
        self.analytics = analytics;
        self
    }

    pub fn model(&self) -> &ClusterModel {
        &self.model
    }

    /// Run one inference. `out_path` is the overlay location
    /// (e.g. `static/<id>_output.png`); every other artifact derives from it
    /// by a fixed suffix.
    pub fn run(&self, image_path: &Path, out_path: &Path) -> Result<InferenceOutcome> {
        info!("Processing image {}", image_path.display());
        let image = BackboneExtractor::load_rgb(image_path)?;

        info!("Extracting features");
        let tensor = self.source.extract(&image)?;
        let (c, hf, wf) = tensor.dim();
        debug!("Feature tensor: C={}, Hf={}, Wf={}", c, hf, wf);

        let flat = flatten_features(&tensor);
        drop(tensor);

        info!("Predicting clusters");
        let scaled: Array2<f32> = self.model.standardize(&flat)?;
        let labels = self.model.assign_standardized(&scaled);
        let grid = label_grid(&labels, hf, wf)?;

        let overlay = render_overlay(&image, &grid, self.model.k)?;

        info!("Running analytics");
        let report = analytics::compute(&scaled, &labels, &self.model, &self.analytics)?;

        let paths = ArtifactPaths::from_overlay(out_path);
        info!("Writing artifacts under {}", paths.overlay().display());
        overlay
            .save(paths.overlay())
            .map_err(|e| PatchsegError::Artifact(e.to_string()))?;
        let charts = charts::render_all(&report, &self.model, &paths);
        fs::write(paths.metrics(), &report.metrics_text)?;
        let stats_json = serde_json::to_string(&report.stats)
            .map_err(|e| PatchsegError::Artifact(e.to_string()))?;
        fs::write(paths.stats(), stats_json)?;

        Ok(InferenceOutcome {
            stats: report.stats.clone(),
            report,
            charts,
            paths,
            grid_shape: (hf, wf),
        })
    }
}

/// One-call contract: load the model from `model_path`, run the pipeline,
/// return the per-cluster summary records. The model is loaded (and can
/// fail) before any image or feature work starts.
pub fn run_inference(
    image_path: &Path,
    model_path: &Path,
    out_path: &Path,
    source: Arc<dyn FeatureSource>,
) -> Result<Vec<ClusterStat>> {
    let model = Arc::new(ClusterModel::load(model_path)?);
    let pipeline = Pipeline::new(source, model)?;
    let outcome = pipeline.run(image_path, out_path)?;
    Ok(outcome.stats)
}
