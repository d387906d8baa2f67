//! ONNX inference using tract
//!
//! Graphs are parsed, optimized and turned into a runnable plan once at
//! load time; evaluation only runs the plan.

use super::Model;
use anyhow::{Context, Result};
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Evaluation latency above which a warning is logged
const SLOW_INFERENCE_MS: u128 = 50;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX graph with a fixed `[1, feature_dim]` f32 input
pub struct OnnxModel {
    plan: TractModel,
    feature_dim: usize,
}

impl OnnxModel {
    /// Load and optimize an ONNX model from bytes
    pub fn from_bytes(model_bytes: &[u8], feature_dim: usize) -> Result<Self> {
        let plan = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?
            .with_input_fact(0, f32::fact([1, feature_dim]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;

        Ok(Self { plan, feature_dim })
    }
}

impl Model for OnnxModel {
    fn evaluate(&self, features: &[f64]) -> Result<Vec<f64>> {
        let start = Instant::now();

        let data: Vec<f32> = features.iter().map(|v| *v as f32).collect();
        let input: Tensor = tract_ndarray::Array2::from_shape_vec((1, self.feature_dim), data)
            .context("Failed to shape input tensor")?
            .into();

        let result = self.plan.run(tvec!(input.into()))?;
        let output = result.first().context("No output from model")?;

        // Classifiers commonly emit integer labels
        let output = output.cast_to::<f32>()?;
        let values: Vec<f64> = output
            .to_array_view::<f32>()?
            .iter()
            .map(|v| *v as f64)
            .collect();

        let elapsed = start.elapsed();
        if elapsed.as_millis() > SLOW_INFERENCE_MS {
            warn!(elapsed_ms = elapsed.as_millis(), "Inference exceeded {}ms", SLOW_INFERENCE_MS);
        } else {
            debug!(elapsed_us = elapsed.as_micros(), "Inference completed");
        }

        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_graph() {
        let result = OnnxModel::from_bytes(b"definitely not protobuf", 4);
        assert!(result.is_err());
    }
}
