//! Artifact store: locates and loads the newest model artifact
//!
//! Artifacts are immutable files written by the external trainer. The
//! store never writes; it lists the directory, picks the newest file by
//! modification time and builds a [`Predictor`] from it.

use crate::error::ArtifactError;
use crate::predictor::{ArtifactFormat, LinearModel, Model, ModelInfo, OnnxModel, Predictor};
use anyhow::Context;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

/// A candidate artifact file found in the store directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFile {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub format: ArtifactFormat,
}

/// Read-only view over the artifact directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    feature_dim: usize,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, feature_dim: usize) -> Self {
        Self {
            dir: dir.into(),
            feature_dim,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn dir_exists(&self) -> bool {
        self.dir.is_dir()
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// List every artifact file in the directory
    pub fn list(&self) -> Result<Vec<ArtifactFile>, ArtifactError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ArtifactError::NotFound {
                    dir: self.dir.clone(),
                })
            }
            Err(e) => {
                return Err(ArtifactError::Load {
                    path: self.dir.clone(),
                    source: anyhow::Error::new(e).context("Failed to list artifact directory"),
                })
            }
        };

        let mut artifacts = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(format) = path
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(ArtifactFormat::from_extension)
            else {
                continue;
            };

            let metadata = match entry.metadata() {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };

            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            artifacts.push(ArtifactFile {
                path,
                modified,
                format,
            });
        }

        Ok(artifacts)
    }

    /// Newest artifact by modification time, ties broken by path
    pub fn latest(&self) -> Result<ArtifactFile, ArtifactError> {
        self.list()?
            .into_iter()
            .max_by(|a, b| {
                a.modified
                    .cmp(&b.modified)
                    .then_with(|| a.path.cmp(&b.path))
            })
            .ok_or_else(|| ArtifactError::NotFound {
                dir: self.dir.clone(),
            })
    }

    /// Load the newest artifact into a predictor
    pub fn load_latest(&self) -> Result<Predictor, ArtifactError> {
        let artifact = self.latest()?;
        debug!(path = %artifact.path.display(), "Selected newest artifact");
        self.load(&artifact)
    }

    /// Load a specific artifact into a predictor
    pub fn load(&self, artifact: &ArtifactFile) -> Result<Predictor, ArtifactError> {
        let to_load_error = |source: anyhow::Error| ArtifactError::Load {
            path: artifact.path.clone(),
            source,
        };

        let bytes = fs::read(&artifact.path)
            .with_context(|| format!("Failed to read artifact {:?}", artifact.path))
            .map_err(to_load_error)?;

        let (model, embedded_version): (Box<dyn Model>, Option<String>) = match artifact.format {
            ArtifactFormat::LinearJson => {
                let (model, version) =
                    LinearModel::from_json(&bytes, self.feature_dim).map_err(to_load_error)?;
                (Box::new(model) as Box<dyn Model>, version)
            }
            ArtifactFormat::Onnx => {
                let model =
                    OnnxModel::from_bytes(&bytes, self.feature_dim).map_err(to_load_error)?;
                (Box::new(model) as Box<dyn Model>, None)
            }
        };

        let version = embedded_version.unwrap_or_else(|| file_stem(&artifact.path));
        let info = ModelInfo {
            version,
            path: artifact.path.clone(),
            format: artifact.format,
            modified_at: DateTime::<Utc>::from(artifact.modified),
            checksum: compute_checksum(&bytes),
            feature_dim: self.feature_dim,
        };

        info!(
            path = %info.path.display(),
            version = %info.version,
            checksum = %info.checksum,
            "Loaded model artifact"
        );

        Ok(Predictor::new(model, info))
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
