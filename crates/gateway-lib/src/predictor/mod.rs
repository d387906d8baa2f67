//! In-memory predictors built from loaded model artifacts

mod linear;
mod onnx;

pub use linear::{LinearArtifact, LinearModel, Task};
pub use onnx::OnnxModel;

use crate::error::PredictError;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// A loaded model that can evaluate one feature row
pub trait Model: Send + Sync {
    /// Evaluate a single row; the caller has already checked its length
    fn evaluate(&self, features: &[f64]) -> Result<Vec<f64>>;
}

/// On-disk format of a model artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactFormat {
    LinearJson,
    Onnx,
}

impl ArtifactFormat {
    /// Resolve the format from a file extension, `None` for non-artifacts
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(ArtifactFormat::LinearJson),
            "onnx" => Some(ArtifactFormat::Onnx),
            _ => None,
        }
    }
}

/// Metadata about the artifact a predictor was built from
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub version: String,
    pub path: PathBuf,
    pub format: ArtifactFormat,
    pub modified_at: DateTime<Utc>,
    pub checksum: String,
    pub feature_dim: usize,
}

/// Immutable, shareable wrapper around one loaded artifact
pub struct Predictor {
    model: Box<dyn Model>,
    info: ModelInfo,
}

impl Predictor {
    pub fn new(model: Box<dyn Model>, info: ModelInfo) -> Self {
        Self { model, info }
    }

    /// Predict for one feature row of exactly `feature_dim` values
    pub fn predict(&self, features: &[f64]) -> Result<Vec<f64>, PredictError> {
        if features.len() != self.info.feature_dim {
            return Err(PredictError::Shape {
                expected: self.info.feature_dim,
                actual: features.len(),
            });
        }

        self.model
            .evaluate(features)
            .map_err(|e| PredictError::Model(format!("{:#}", e)))
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    pub fn version(&self) -> &str {
        &self.info.version
    }

    pub fn feature_dim(&self) -> usize {
        self.info.feature_dim
    }
}

impl std::fmt::Debug for Predictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predictor").field("info", &self.info).finish()
    }
}
