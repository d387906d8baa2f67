//! Error taxonomy shared by the gateway components

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;
use tracing::error;

/// Failures while locating or loading a model artifact
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Directory missing or holding no artifact files
    #[error("no model artifact found in {}", .dir.display())]
    NotFound { dir: PathBuf },

    /// Artifact present but could not be read or deserialized
    #[error("failed to load artifact {}: {source:#}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

/// Failures of a single prediction call
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("expected {expected} features, got {actual}")]
    Shape { expected: usize, actual: usize },

    #[error("model evaluation failed: {0}")]
    Model(String),
}

/// Reasons a retrain request is refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetrainRejection {
    #[error("unauthorized")]
    Unauthorized,

    #[error("retraining already in progress")]
    Conflict { start_time: DateTime<Utc> },
}

/// The external trainer could not be run at all
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("failed to spawn trainer: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("trainer i/o failed: {0}")]
    Io(#[source] std::io::Error),
}

/// Request-path errors, mapped to HTTP at the gateway boundary
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("model not loaded")]
    ModelUnavailable,

    #[error("unauthorized")]
    Unauthorized,

    #[error("retraining already in progress")]
    Conflict { start_time: DateTime<Utc> },

    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RetrainRejection> for ApiError {
    fn from(rejection: RetrainRejection) -> Self {
        match rejection {
            RetrainRejection::Unauthorized => ApiError::Unauthorized,
            RetrainRejection::Conflict { start_time } => ApiError::Conflict { start_time },
        }
    }
}

impl From<PredictError> for ApiError {
    fn from(err: PredictError) -> Self {
        match err {
            PredictError::Shape { .. } => ApiError::Validation(err.to_string()),
            PredictError::Model(_) => ApiError::Internal(err.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            ApiError::Validation(details) => json!({
                "error": "invalid input",
                "details": details,
            }),
            ApiError::ModelUnavailable => json!({ "error": "model not loaded" }),
            ApiError::Unauthorized => json!({ "error": "unauthorized" }),
            ApiError::Conflict { start_time } => json!({
                "error": "retraining already in progress",
                "start_time": start_time,
            }),
            ApiError::Internal(err) => {
                // Full detail stays in the logs
                error!(error = ?err, "Request failed with internal error");
                json!({ "error": "internal error" })
            }
        };

        (status, Json(body)).into_response()
    }
}
