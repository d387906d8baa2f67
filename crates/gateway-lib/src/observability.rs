//! Observability infrastructure for the model gateway
//!
//! Provides:
//! - Prometheus metrics (prediction outcomes and latency, retrain requests and jobs, model state)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<GatewayMetricsInner> = OnceLock::new();

/// Outcome label of a `/predict` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictOutcome {
    Ok,
    Invalid,
    Unavailable,
    Internal,
}

impl PredictOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictOutcome::Ok => "ok",
            PredictOutcome::Invalid => "invalid",
            PredictOutcome::Unavailable => "unavailable",
            PredictOutcome::Internal => "internal",
        }
    }
}

/// Inner metrics structure that holds the actual Prometheus metrics
struct GatewayMetricsInner {
    predict_requests: IntCounterVec,
    prediction_errors: IntCounter,
    prediction_latency_seconds: Histogram,
    retrain_requests: IntCounterVec,
    retrain_jobs: IntCounterVec,
    retrain_running: IntGauge,
    model_loaded: IntGauge,
    model_last_retrain_timestamp: IntGauge,
    model_version_info: GaugeVec,
}

impl GatewayMetricsInner {
    fn new() -> Self {
        Self {
            predict_requests: register_int_counter_vec!(
                "gateway_predict_requests_total",
                "Prediction requests by outcome",
                &["outcome"]
            )
            .expect("Failed to register predict_requests_total"),

            prediction_errors: register_int_counter!(
                "gateway_prediction_errors_total",
                "Total number of failed prediction requests"
            )
            .expect("Failed to register prediction_errors_total"),

            prediction_latency_seconds: register_histogram!(
                "gateway_prediction_latency_seconds",
                "Time spent serving a successful prediction",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            retrain_requests: register_int_counter_vec!(
                "gateway_retrain_requests_total",
                "Retrain requests by result",
                &["result"]
            )
            .expect("Failed to register retrain_requests_total"),

            retrain_jobs: register_int_counter_vec!(
                "gateway_retrain_jobs_total",
                "Finished retrain jobs by outcome",
                &["outcome"]
            )
            .expect("Failed to register retrain_jobs_total"),

            retrain_running: register_int_gauge!(
                "gateway_retrain_running",
                "1 while a retrain job is running"
            )
            .expect("Failed to register retrain_running"),

            model_loaded: register_int_gauge!(
                "gateway_model_loaded",
                "1 when a model is loaded and serving"
            )
            .expect("Failed to register model_loaded"),

            model_last_retrain_timestamp: register_int_gauge!(
                "gateway_model_last_retrain_timestamp",
                "Unix timestamp of the last successful model (re)load"
            )
            .expect("Failed to register model_last_retrain_timestamp"),

            model_version_info: register_gauge_vec!(
                "gateway_model_version_info",
                "Information about the currently loaded model",
                &["version"]
            )
            .expect("Failed to register model_version_info"),
        }
    }
}

/// Gateway metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct GatewayMetrics {
    _private: (),
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(GatewayMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &GatewayMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Count one `/predict` request; failures also count as prediction errors
    pub fn record_predict(&self, outcome: PredictOutcome) {
        self.inner()
            .predict_requests
            .with_label_values(&[outcome.as_str()])
            .inc();
        if outcome != PredictOutcome::Ok {
            self.inner().prediction_errors.inc();
        }
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    /// Count a retrain request (`accepted`, `conflict`, `unauthorized`)
    pub fn record_retrain_request(&self, result: &str) {
        self.inner()
            .retrain_requests
            .with_label_values(&[result])
            .inc();
    }

    /// Count a finished retrain job by outcome
    pub fn record_retrain_job(&self, outcome: &str) {
        self.inner().retrain_jobs.with_label_values(&[outcome]).inc();
    }

    pub fn set_retrain_running(&self, running: bool) {
        self.inner().retrain_running.set(i64::from(running));
    }

    /// Update model gauges after a successful (re)load
    pub fn set_model_loaded(&self, version: &str, last_retrain_timestamp: i64) {
        self.inner().model_loaded.set(1);
        self.inner()
            .model_last_retrain_timestamp
            .set(last_retrain_timestamp);
        // Reset previous version
        self.inner().model_version_info.reset();
        self.inner()
            .model_version_info
            .with_label_values(&[version])
            .set(1.0);
    }
}

/// Structured logger for gateway events
///
/// Provides consistent JSON-formatted logging for model loads,
/// retrain lifecycle and other significant events.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log gateway startup
    pub fn log_startup(&self, version: &str, model_dir: &str, model_loaded: bool) {
        info!(
            event = "gateway_started",
            instance = %self.instance,
            gateway_version = %version,
            model_dir = %model_dir,
            model_loaded = model_loaded,
            "Model gateway started"
        );
    }

    /// Log gateway shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "gateway_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Model gateway shutting down"
        );
    }

    /// Log a model becoming active
    pub fn log_model_loaded(&self, version: &str, path: &str, source: &str) {
        info!(
            event = "model_loaded",
            instance = %self.instance,
            model_version = %version,
            path = %path,
            source = %source,
            "Model is now serving"
        );
    }

    /// Log a failed initial model load
    pub fn log_model_unavailable(&self, reason: &str) {
        warn!(
            event = "model_unavailable",
            instance = %self.instance,
            reason = %reason,
            "No model loaded, predictions will be rejected until one is"
        );
    }

    /// Log the start of a retrain job
    pub fn log_retrain_started(&self, job_id: u64, trigger: &str) {
        info!(
            event = "retrain_started",
            instance = %self.instance,
            job_id = job_id,
            trigger = %trigger,
            "Retrain job started"
        );
    }

    /// Log the end of a retrain job
    pub fn log_retrain_finished(
        &self,
        job_id: u64,
        outcome: &str,
        success: bool,
        duration_secs: f64,
        message: &str,
    ) {
        if success {
            info!(
                event = "retrain_finished",
                instance = %self.instance,
                job_id = job_id,
                outcome = %outcome,
                duration_secs = duration_secs,
                message = %message,
                "Retrain job succeeded"
            );
        } else {
            error!(
                event = "retrain_finished",
                instance = %self.instance,
                job_id = job_id,
                outcome = %outcome,
                duration_secs = duration_secs,
                message = %message,
                "Retrain job failed, previous model keeps serving"
            );
        }
    }

    /// Log a prediction that failed for a reason other than bad input
    pub fn log_prediction_failed(&self, model_version: Option<&str>, reason: &str) {
        warn!(
            event = "prediction_failed",
            instance = %self.instance,
            model_version = ?model_version,
            reason = %reason,
            "Prediction failed"
        );
    }
}
