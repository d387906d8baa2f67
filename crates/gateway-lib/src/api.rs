//! HTTP surface: prediction, retrain control, health and Prometheus metrics

use crate::artifact::ArtifactStore;
use crate::error::ApiError;
use crate::health::{compute_status, ComponentHealth, ComponentStatus, HealthRegistry};
use crate::observability::{GatewayMetrics, PredictOutcome, StructuredLogger};
use crate::registry::ModelRegistry;
use crate::retrain::{JobOutcome, RetrainCoordinator, RetrainJob, RetrainTrigger};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, TimeZone, Utc};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Header carrying the retrain token
pub const RETRAIN_TOKEN_HEADER: &str = "x-retrain-token";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: ModelRegistry,
    pub store: ArtifactStore,
    pub coordinator: RetrainCoordinator,
    pub health: HealthRegistry,
    pub metrics: GatewayMetrics,
    pub logger: StructuredLogger,
}

impl AppState {
    pub fn new(
        coordinator: RetrainCoordinator,
        health: HealthRegistry,
        metrics: GatewayMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            registry: coordinator.registry().clone(),
            store: coordinator.store().clone(),
            coordinator,
            health,
            metrics,
            logger,
        }
    }

    fn feature_dim(&self) -> usize {
        self.store.feature_dim()
    }
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub features: Vec<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: Vec<f64>,
    pub model_version: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RetrainRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RetrainStarted {
    pub status: String,
    pub job_id: u64,
    pub start_time: DateTime<Utc>,
}

/// Snapshot served by `/retrain/status`
#[derive(Debug, Serialize)]
pub struct RetrainStatusResponse {
    pub running: bool,
    pub job_id: Option<u64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub message: Option<String>,
    pub outcome: Option<JobOutcome>,
    pub trigger: Option<RetrainTrigger>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub last_retrain_timestamp: i64,
    pub last_retrain_time: Option<DateTime<Utc>>,
}

impl RetrainStatusResponse {
    fn new(job: RetrainJob, last_retrain_timestamp: i64) -> Self {
        let last_retrain_time = if last_retrain_timestamp > 0 {
            Utc.timestamp_opt(last_retrain_timestamp, 0).single()
        } else {
            None
        };

        Self {
            running: job.is_running(),
            job_id: (job.id > 0).then_some(job.id),
            success: job.success(),
            start_time: job.start_time,
            end_time: job.end_time,
            message: job.message,
            outcome: job.outcome,
            trigger: job.trigger,
            stdout: job.stdout,
            stderr: job.stderr,
            last_retrain_timestamp,
            last_retrain_time,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RetrainHistoryResponse {
    pub jobs: Vec<RetrainJob>,
}

/// Informational health report; always served with 200
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    pub model_dir_exists: bool,
    pub model_path: Option<String>,
    pub model_version: Option<String>,
    pub model_checksum: Option<String>,
    pub feature_dim: usize,
    pub overall: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
    pub timestamp: DateTime<Utc>,
}

/// Score one feature vector with the current model
async fn predict(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let started = Instant::now();

    let result = run_prediction(&state, &body);
    let outcome = match &result {
        Ok(_) => PredictOutcome::Ok,
        Err(ApiError::Validation(_)) => PredictOutcome::Invalid,
        Err(ApiError::ModelUnavailable) => PredictOutcome::Unavailable,
        Err(_) => PredictOutcome::Internal,
    };
    state.metrics.record_predict(outcome);

    let response = result?;
    state
        .metrics
        .observe_prediction_latency(started.elapsed().as_secs_f64());
    Ok(Json(response))
}

fn run_prediction(state: &AppState, body: &[u8]) -> Result<PredictResponse, ApiError> {
    let request: PredictRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::Validation(format!("expected {{\"features\": [number]}}: {}", e)))?;

    let expected = state.feature_dim();
    if request.features.len() != expected {
        return Err(ApiError::Validation(format!(
            "expected {} features, got {}",
            expected,
            request.features.len()
        )));
    }
    if let Some(pos) = request.features.iter().position(|v| !v.is_finite()) {
        return Err(ApiError::Validation(format!(
            "feature at index {} is not a finite number",
            pos
        )));
    }

    let predictor = state.registry.current().ok_or(ApiError::ModelUnavailable)?;

    let prediction = predictor.predict(&request.features).map_err(|e| {
        state
            .logger
            .log_prediction_failed(Some(predictor.version()), &e.to_string());
        ApiError::from(e)
    })?;

    Ok(PredictResponse {
        prediction,
        model_version: predictor.version().to_string(),
    })
}

/// Schedule a background retrain
async fn retrain(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let token = headers
        .get(RETRAIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    // The body is optional; anything unparseable is treated as no reason
    let request: RetrainRequest = if body.is_empty() {
        RetrainRequest::default()
    } else {
        serde_json::from_slice(&body).unwrap_or_default()
    };

    let accepted = state.coordinator.start_retrain(
        token,
        RetrainTrigger::Api {
            reason: request.reason,
        },
    )?;

    Ok((
        StatusCode::OK,
        Json(RetrainStarted {
            status: "started".to_string(),
            job_id: accepted.job_id,
            start_time: accepted.start_time,
        }),
    ))
}

async fn retrain_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Job first: a published model is always visible once the job reads as finished
    let job = state.coordinator.status();
    let registry = state.registry.snapshot();
    Json(RetrainStatusResponse::new(job, registry.last_retrain_timestamp))
}

async fn retrain_history(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(RetrainHistoryResponse {
        jobs: state.coordinator.history(),
    })
}

/// Health report; informational, so always 200
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let predictor = state.registry.current();
    let components = state.health.components().await;
    let info = predictor.as_ref().map(|p| p.info());

    Json(HealthResponse {
        status: "healthy",
        model_loaded: predictor.is_some(),
        model_dir_exists: state.store.dir_exists(),
        model_path: info.map(|i| i.path.display().to_string()),
        model_version: info.map(|i| i.version.clone()),
        model_checksum: info.map(|i| i.checksum.clone()),
        feature_dim: state.feature_dim(),
        overall: compute_status(&components),
        components,
        timestamp: Utc::now(),
    })
}

/// Readiness probe - 200 once a model is serving, 503 otherwise
async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health.readiness(state.registry.is_loaded()).await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::Internal(e.into()))?;

    Ok((
        StatusCode::OK,
        [("content-type", encoder.format_type().to_string())],
        buffer,
    ))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/retrain", post(retrain))
        .route("/retrain/status", get(retrain_status))
        .route("/retrain/history", get(retrain_history))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server, returning once `shutdown` resolves
pub async fn serve<F>(addr: SocketAddr, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_response_before_any_job() {
        let response = RetrainStatusResponse::new(RetrainJob::idle(), 0);
        assert!(!response.running);
        assert_eq!(response.job_id, None);
        assert_eq!(response.success, None);
        assert_eq!(response.last_retrain_time, None);
    }

    #[test]
    fn test_status_response_converts_timestamp() {
        let response = RetrainStatusResponse::new(RetrainJob::idle(), 1_700_000_000);
        assert_eq!(
            response.last_retrain_time.map(|t| t.timestamp()),
            Some(1_700_000_000)
        );
    }
}
