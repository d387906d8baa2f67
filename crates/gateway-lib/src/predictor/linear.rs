//! Linear models serialized as JSON documents
//!
//! Covers both the regression case (one output per coefficient row) and
//! the one-vs-rest classification case (argmax over per-class scores).

use super::Model;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Kind of linear model stored in the artifact
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    #[default]
    Regression,
    Classification,
}

/// On-disk representation of a linear model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearArtifact {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub task: Task,
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
    #[serde(default)]
    pub classes: Option<Vec<f64>>,
}

/// Validated linear model ready for evaluation
#[derive(Debug, Clone)]
pub struct LinearModel {
    task: Task,
    coefficients: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
    classes: Option<Vec<f64>>,
}

impl LinearModel {
    /// Parse and validate a JSON artifact against the deployment's feature dimension
    ///
    /// Returns the model together with the version label embedded in the
    /// artifact, if any.
    pub fn from_json(bytes: &[u8], feature_dim: usize) -> Result<(Self, Option<String>)> {
        let artifact: LinearArtifact =
            serde_json::from_slice(bytes).context("Failed to parse linear model JSON")?;
        let version = artifact.version.clone();
        Ok((Self::from_artifact(artifact, feature_dim)?, version))
    }

    pub fn from_artifact(artifact: LinearArtifact, feature_dim: usize) -> Result<Self> {
        if artifact.coefficients.is_empty() {
            anyhow::bail!("Linear model has no coefficient rows");
        }

        if let Some((row, coef)) = artifact
            .coefficients
            .iter()
            .enumerate()
            .find(|(_, c)| c.len() != feature_dim)
        {
            anyhow::bail!(
                "Coefficient row {} has {} values, expected {}",
                row,
                coef.len(),
                feature_dim
            );
        }

        if artifact.intercepts.len() != artifact.coefficients.len() {
            anyhow::bail!(
                "Model has {} intercepts for {} coefficient rows",
                artifact.intercepts.len(),
                artifact.coefficients.len()
            );
        }

        if let Some(classes) = &artifact.classes {
            if artifact.task != Task::Classification {
                anyhow::bail!("Class labels are only valid for classification models");
            }
            if classes.len() != artifact.coefficients.len() {
                anyhow::bail!(
                    "Model has {} class labels for {} coefficient rows",
                    classes.len(),
                    artifact.coefficients.len()
                );
            }
        }

        let all_finite = artifact
            .coefficients
            .iter()
            .flatten()
            .chain(artifact.intercepts.iter())
            .all(|v| v.is_finite());
        if !all_finite {
            anyhow::bail!("Model weights contain non-finite values");
        }

        Ok(Self {
            task: artifact.task,
            coefficients: artifact.coefficients,
            intercepts: artifact.intercepts,
            classes: artifact.classes,
        })
    }

    fn scores<'a>(&'a self, features: &'a [f64]) -> impl Iterator<Item = f64> + 'a {
        self.coefficients
            .iter()
            .zip(&self.intercepts)
            .map(move |(coef, intercept)| {
                coef.iter().zip(features).map(|(w, x)| w * x).sum::<f64>() + intercept
            })
    }
}

impl Model for LinearModel {
    fn evaluate(&self, features: &[f64]) -> Result<Vec<f64>> {
        match self.task {
            Task::Regression => Ok(self.scores(features).collect()),
            Task::Classification => {
                let best = self
                    .scores(features)
                    .enumerate()
                    .fold(None, |best: Option<(usize, f64)>, (idx, score)| match best {
                        Some((_, top)) if top >= score => best,
                        _ => Some((idx, score)),
                    })
                    .map(|(idx, _)| idx)
                    .context("Classifier produced no scores")?;

                let label = match &self.classes {
                    Some(classes) => classes[best],
                    None => best as f64,
                };
                Ok(vec![label])
            }
        }
    }
}
