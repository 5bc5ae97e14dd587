//! patchseg: unsupervised region segmentation over deep convolutional
//! features.
//!
//! Given one RGB image and one pre-trained cluster model, the crate extracts
//! per-spatial-location feature vectors from a truncated convolutional
//! backbone, classifies every location into one of K clusters, renders a
//! pixel-aligned translucent overlay, and computes a fixed battery of
//! diagnostic artifacts (distribution, silhouette, two 2-D projections,
//! cluster-center heatmap, textual and JSON metrics) from the same
//! assignment.
//!
//! Pipeline shape:
//!
//! ```text
//! image -> backbone -> (C, Hf, Wf) tensor -> (N, C) matrix -> labels
//!                                              |                 |
//!                                              v                 v
//!                                         analytics          overlay
//! ```
//!
//! Design points:
//! - One feature matrix invariant: rows are raster-ordered over the feature
//!   grid, and the label reshape uses the identical order.
//! - Standardization always uses the population statistics persisted with
//!   the model; they are never recomputed at inference time.
//! - Expensive analytics run on one shared, seeded, bounded sample; each
//!   sub-analysis is independently recoverable and its failure is recorded
//!   in the typed report instead of aborting the request.
//! - The fixed categorical palette is the single color authority for the
//!   overlay and every chart of a report.

pub mod analytics;
pub mod backbone;
pub mod error;
pub mod features;
pub mod fit;
pub mod model;
pub mod overlay;
pub mod palette;
pub mod pipeline;
pub mod preprocess;
pub mod sampling;
pub mod store;

#[cfg(test)]
mod tests;

pub use analytics::{AnalyticsConfig, AnalyticsReport, ClusterStat};
pub use backbone::{BackboneConfig, BackboneExtractor, FeatureSource};
pub use error::{AnalyticsError, PatchsegError, Result};
pub use model::ClusterModel;
pub use pipeline::{run_inference, InferenceOutcome, Pipeline};
pub use preprocess::PreprocessConfig;
pub use store::{ArtifactPaths, ArtifactStore};
