//! Model serving gateway library
//!
//! This crate provides the core functionality for:
//! - Locating and loading trained model artifacts
//! - Serving predictions from the active model
//! - Coordinated background retraining with atomic model hot-swap
//! - The HTTP surface, health checks and observability

pub mod api;
pub mod artifact;
pub mod error;
pub mod health;
pub mod observability;
pub mod predictor;
pub mod registry;
pub mod retrain;

pub use artifact::{ArtifactFile, ArtifactStore};
pub use error::{ApiError, ArtifactError, PredictError, RetrainRejection, TrainerError};
pub use health::{ComponentHealth, ComponentStatus, HealthRegistry, ReadinessResponse};
pub use observability::{GatewayMetrics, StructuredLogger};
pub use predictor::{ModelInfo, Predictor};
pub use registry::ModelRegistry;
pub use retrain::{
    CommandTrainer, RetrainConfig, RetrainCoordinator, RetrainJob, RetrainTrigger, Trainer,
};
