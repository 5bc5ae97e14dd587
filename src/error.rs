//! Error taxonomy for the inference pipeline.
//!
//! Two layers:
//! - `PatchsegError`: fatal, request-aborting failures. Every stage up to and
//!   including cluster assignment propagates these; the caller reports a
//!   request-level failure and no artifacts are written.
//! - `AnalyticsError`: per-artifact failures inside the analytics stage. A
//!   failed chart or score is recorded in the report instead of aborting the
//!   request, so partial results stay structurally visible.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchsegError {
    /// Backbone runtime or model file unavailable. Raised before any
    /// request-scoped file I/O; never retried.
    #[error("backbone unavailable: {0}")]
    Configuration(String),

    #[error("cluster model not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    /// Persisted model is unreadable or internally inconsistent
    /// (missing fields, mismatched scaler/center dimensions, K out of range).
    #[error("cluster model corrupt: {0}")]
    ModelCorrupt(String),

    #[error("image decode failed: {0}")]
    ImageDecode(String),

    /// Backbone channel count does not match the model's feature dimension.
    #[error("feature dimension mismatch: model expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Label id outside the fixed categorical palette.
    #[error("label {label} exceeds palette capacity {capacity}")]
    Palette { label: usize, capacity: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Mandatory artifact (overlay, metrics, stats) could not be written.
    #[error("artifact write failed: {0}")]
    Artifact(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PatchsegError>;

/// Failure of a single analytic artifact. The orchestrator never aborts on
/// these; the corresponding report field carries the error instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalyticsError {
    /// Preconditions not met (e.g. fewer than two labels in the sample).
    #[error("skipped: {0}")]
    Skipped(String),

    /// Numeric routine failed to produce a usable result.
    #[error("numeric failure: {0}")]
    Numeric(String),

    /// Chart backend failed while rendering.
    #[error("chart render failed: {0}")]
    Chart(String),
}

pub type AnalyticsResult<T> = std::result::Result<T, AnalyticsError>;
