//! Analytics reporting over one cluster assignment.
//!
//! Given the full label assignment and the standardized feature matrix, this
//! module produces the diagnostic report: full-population distribution and
//! percentages, silhouette analysis, two independent 2-D projections, and
//! the canonical per-cluster summary records. Each expensive sub-analysis
//! runs on one shared bounded sample and is independently fault-tolerant:
//! its report field carries a `Result` so a failure is structurally visible
//! without aborting the others.
//!
//! Chart rendering lives in [`charts`]; this module owns the numbers.

pub mod charts;
pub mod projection;
pub mod silhouette;

use std::fmt::Write as _;

use log::{info, warn};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, AnalyticsResult, Result};
use crate::model::ClusterModel;
use crate::palette;
use crate::sampling::{self, DEFAULT_SEED, SAMPLE_CAP};

pub use projection::{EmbeddingParams, Projection2d, RegionClassifier};
pub use silhouette::SilhouetteReport;

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsConfig {
    /// Row cap for the shared sample behind silhouette and the projections.
    pub sample_cap: usize,
    /// Seed for the sample draw; recorded in the report.
    pub seed: u64,
    pub embedding: EmbeddingParams,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            sample_cap: SAMPLE_CAP,
            seed: DEFAULT_SEED,
            embedding: EmbeddingParams::default(),
        }
    }
}

/// Canonical per-cluster summary record, persisted as `_stats.json` and
/// returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStat {
    pub label: String,
    pub percentage: f64,
    pub color: String,
}

/// Full-population label counts. The only statistic that never samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    /// Count per label id, length K (absent labels hold zero).
    pub counts: Vec<usize>,
    pub total: usize,
}

impl Distribution {
    pub fn from_labels(labels: &[usize], k: usize) -> Self {
        let mut counts = vec![0usize; k];
        for &l in labels {
            counts[l] += 1;
        }
        Self {
            counts,
            total: labels.len(),
        }
    }

    pub fn percentage(&self, label: usize) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.counts[label] as f64 / self.total as f64 * 100.0
    }

    /// Labels with at least one location, with their counts.
    pub fn present(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, &c)| c > 0)
            .map(|(l, &c)| (l, c))
    }
}

/// Typed partial-result report for one inference.
#[derive(Debug, Clone)]
pub struct AnalyticsReport {
    pub distribution: Distribution,
    /// Canonical summary: one record per present label.
    pub stats: Vec<ClusterStat>,
    pub silhouette: AnalyticsResult<SilhouetteReport>,
    pub pca: AnalyticsResult<Projection2d>,
    pub embedding: AnalyticsResult<Projection2d>,
    /// Labels of the sampled rows, aligned with both projections and the
    /// per-sample silhouette values.
    pub sample_labels: Vec<usize>,
    pub sample_seed: u64,
    /// Human-readable metrics block, persisted as `_metrics.txt`.
    pub metrics_text: String,
}

/// Run the full analytic battery. `features` is the standardized matrix the
/// labels were assigned from; distribution and percentages cover all N rows,
/// everything else the bounded sample.
pub fn compute(
    features: &Array2<f32>,
    labels: &[usize],
    model: &ClusterModel,
    config: &AnalyticsConfig,
) -> Result<AnalyticsReport> {
    let n = labels.len();
    info!(
        "Analytics over {} locations, k={} (sample cap {})",
        n, model.k, config.sample_cap
    );

    let distribution = Distribution::from_labels(labels, model.k);
    let stats = cluster_stats(&distribution)?;

    let indices = sampling::sample_indices(n, config.sample_cap, config.seed);
    let (sample, sample_labels) = sampling::take_rows(features, labels, &indices);

    let silhouette = silhouette::silhouette(&sample, &sample_labels);
    if let Err(e) = &silhouette {
        warn!("Silhouette unavailable: {}", e);
    }
    let pca = projection::pca_2d(&sample);
    if let Err(e) = &pca {
        warn!("Linear projection unavailable: {}", e);
    }
    let embedding = projection::tsne_2d(&sample, &config.embedding);
    if let Err(e) = &embedding {
        warn!("Neighbor embedding unavailable: {}", e);
    }

    let metrics_text = metrics_text(model.k, &distribution, &silhouette);

    Ok(AnalyticsReport {
        distribution,
        stats,
        silhouette,
        pca,
        embedding,
        sample_labels,
        sample_seed: config.seed,
        metrics_text,
    })
}

/// One record per present label; percentages rounded to one decimal place,
/// colors from the shared palette.
fn cluster_stats(distribution: &Distribution) -> Result<Vec<ClusterStat>> {
    distribution
        .present()
        .map(|(label, _)| {
            Ok(ClusterStat {
                label: format!("Cluster {label}"),
                percentage: (distribution.percentage(label) * 10.0).round() / 10.0,
                color: palette::hex(label)?,
            })
        })
        .collect()
}

fn metrics_text(
    k: usize,
    distribution: &Distribution,
    silhouette: &AnalyticsResult<SilhouetteReport>,
) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "Number of Clusters: {k}");
    let _ = writeln!(text, "Total Pixels/Patches: {}", distribution.total);
    if let Ok(s) = silhouette {
        let _ = writeln!(text, "Silhouette Score (Sampled): {:.4}", s.average);
    }
    let _ = writeln!(text);
    let _ = writeln!(text, "Cluster Distribution:");
    for (label, count) in distribution.present() {
        let _ = writeln!(
            text,
            "Cluster {}: {} ({:.1}%)",
            label,
            count,
            distribution.percentage(label)
        );
    }
    text
}

/// Convenience used by the charts: map a chart failure into the typed error.
pub(crate) fn chart_err(e: impl std::fmt::Display) -> AnalyticsError {
    AnalyticsError::Chart(e.to_string())
}
