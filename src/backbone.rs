//! Backbone feature extraction.
//!
//! The backbone is a fixed, pre-trained convolutional network truncated to
//! its spatial feature-map output and exported to ONNX; only the feature map
//! is used, never a classification head. `BackboneExtractor` wraps an ONNX
//! Runtime session and turns an arbitrary-size RGB image into a (C, Hf, Wf)
//! tensor of per-location feature vectors.
//!
//! The session is process-wide state: when the runtime offers a single
//! accelerator context, concurrent extractions must not interleave tensor
//! state, so the session sits behind a mutex and calls serialize on it.
//! Pure-CPU execution pays only the lock.
//!
//! The [`FeatureSource`] trait is the seam the orchestrator depends on, so a
//! synthetic source can stand in for the network under test.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::RgbImage;
use log::{debug, info};
use ndarray::Array3;
use ort::session::{Session, SessionInputs};
use ort::value::TensorRef;

use crate::error::{PatchsegError, Result};
use crate::preprocess::PreprocessConfig;

/// Anything that can produce a per-location feature tensor for an image.
pub trait FeatureSource: Send + Sync {
    /// Extract a (C, Hf, Wf) feature tensor. Must not mutate the input.
    fn extract(&self, image: &RgbImage) -> Result<Array3<f32>>;

    /// Preprocessing the source applies, for consistency checks against the
    /// cluster model's persisted configuration.
    fn preprocess(&self) -> &PreprocessConfig;
}

#[derive(Debug, Clone)]
pub struct BackboneConfig {
    /// Path to the truncated backbone exported as ONNX.
    pub onnx_path: PathBuf,
    /// Intra-op threads for the session; 0 lets the runtime decide.
    pub intra_threads: usize,
}

impl BackboneConfig {
    pub fn new(onnx_path: impl Into<PathBuf>) -> Self {
        Self {
            onnx_path: onnx_path.into(),
            intra_threads: 0,
        }
    }
}

pub struct BackboneExtractor {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    preprocess: PreprocessConfig,
}

impl BackboneExtractor {
    /// Build the session. Any runtime or model-file problem surfaces here as
    /// `Configuration`, before the caller touches request files.
    pub fn new(config: &BackboneConfig, preprocess: PreprocessConfig) -> Result<Self> {
        if !config.onnx_path.exists() {
            return Err(PatchsegError::Configuration(format!(
                "backbone model not found: {}",
                config.onnx_path.display()
            )));
        }

        let mut builder =
            Session::builder().map_err(|e| PatchsegError::Configuration(e.to_string()))?;
        if config.intra_threads > 0 {
            builder = builder
                .with_intra_threads(config.intra_threads)
                .map_err(|e| PatchsegError::Configuration(e.to_string()))?;
        }
        let session = builder
            .commit_from_file(&config.onnx_path)
            .map_err(|e| PatchsegError::Configuration(e.to_string()))?;

        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .ok_or_else(|| {
                PatchsegError::Configuration("backbone model declares no inputs".into())
            })?;
        let output_name = session
            .outputs()
            .first()
            .map(|o| o.name().to_string())
            .ok_or_else(|| {
                PatchsegError::Configuration("backbone model declares no outputs".into())
            })?;

        info!(
            "Backbone session ready: {} ({} -> {})",
            config.onnx_path.display(),
            input_name,
            output_name
        );
        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            preprocess,
        })
    }

    /// Decode helper shared by callers: open a file as RGB.
    pub fn load_rgb(path: &Path) -> Result<RgbImage> {
        let img = image::open(path).map_err(|e| PatchsegError::ImageDecode(e.to_string()))?;
        Ok(img.to_rgb8())
    }
}

impl FeatureSource for BackboneExtractor {
    fn extract(&self, image: &RgbImage) -> Result<Array3<f32>> {
        let resized = self.preprocess.resize(image);
        let tensor = self.preprocess.normalize(&resized);
        let (ch, h, w) = tensor.dim();

        let input_dims: Vec<i64> = vec![1, ch as i64, h as i64, w as i64];
        let input_data = tensor.as_slice().ok_or_else(|| {
            PatchsegError::Configuration("input tensor is not contiguous in memory".into())
        })?;
        let input_tensor = TensorRef::from_array_view((input_dims, input_data))
            .map_err(|e| PatchsegError::Configuration(e.to_string()))?;

        let inputs = ort::inputs![self.input_name.as_str() => input_tensor];

        let mut session = self
            .session
            .lock()
            .map_err(|_| PatchsegError::Configuration("backbone session lock poisoned".into()))?;
        let outputs = session
            .run(SessionInputs::<0>::ValueMap(inputs))
            .map_err(|e| PatchsegError::Configuration(e.to_string()))?;

        let (out_shape, out_data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| PatchsegError::Configuration(e.to_string()))?;
        let dims: Vec<usize> = out_shape.iter().map(|&d| d as usize).collect();
        if dims.len() != 4 || dims[0] != 1 {
            return Err(PatchsegError::Configuration(format!(
                "expected feature map of shape [1, C, Hf, Wf], got {:?}",
                dims
            )));
        }
        let (c, hf, wf) = (dims[1], dims[2], dims[3]);
        debug!("Extracted feature map: C={}, Hf={}, Wf={}", c, hf, wf);

        Array3::from_shape_vec((c, hf, wf), out_data.to_vec()).map_err(|e| {
            PatchsegError::Configuration(format!("feature map reshape failed: {e}"))
        })
    }

    fn preprocess(&self) -> &PreprocessConfig {
        &self.preprocess
    }
}
