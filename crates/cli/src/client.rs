//! API client for communicating with the model gateway

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use url::Url;

/// Header carrying the retrain token
pub const RETRAIN_TOKEN_HEADER: &str = "X-RETRAIN-TOKEN";

/// Non-success answer from the gateway
#[derive(Debug, Error)]
pub enum ApiFailure {
    #[error("{message} ({status}): {details}")]
    Detailed {
        status: StatusCode,
        message: String,
        details: String,
    },
    #[error("{message} ({status})")]
    Plain { status: StatusCode, message: String },
}

impl ApiFailure {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiFailure::Detailed { status, .. } | ApiFailure::Plain { status, .. } => *status,
        }
    }
}

/// API client for the model gateway
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let mut base_url = Url::parse(base_url).context("Invalid API URL")?;
        // Url::join replaces the last segment unless the path ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;
        Self::send(self.client.get(url)).await
    }

    /// Make a POST request with JSON body and extra headers
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        headers: &[(&str, &str)],
    ) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        Self::send(request).await
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let response = request.send().await.context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(failure_from_body(status, &body).into());
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn predict(&self, features: &[f64]) -> Result<PredictResponse> {
        self.post("predict", &PredictRequest { features }, &[]).await
    }

    pub async fn retrain(
        &self,
        token: Option<&str>,
        reason: Option<String>,
    ) -> Result<RetrainStarted> {
        let headers: Vec<(&str, &str)> = token
            .map(|t| vec![(RETRAIN_TOKEN_HEADER, t)])
            .unwrap_or_default();
        self.post("retrain", &RetrainRequest { reason }, &headers)
            .await
    }

    pub async fn retrain_status(&self) -> Result<RetrainStatus> {
        self.get("retrain/status").await
    }

    pub async fn retrain_history(&self) -> Result<RetrainHistory> {
        self.get("retrain/history").await
    }

    pub async fn health(&self) -> Result<Health> {
        self.get("health").await
    }
}

fn failure_from_body(status: StatusCode, body: &str) -> ApiFailure {
    let Ok(err) = serde_json::from_str::<ErrorResponse>(body) else {
        let message = if body.is_empty() {
            "request failed".to_string()
        } else {
            body.to_string()
        };
        return ApiFailure::Plain { status, message };
    };

    let details = err
        .details
        .or_else(|| err.start_time.map(|t| format!("running since {}", t)));
    match details {
        Some(details) => ApiFailure::Detailed {
            status,
            message: err.error,
            details,
        },
        None => ApiFailure::Plain {
            status,
            message: err.error,
        },
    }
}

// API request and response types

#[derive(Debug, Serialize)]
pub struct PredictRequest<'a> {
    pub features: &'a [f64],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: Vec<f64>,
    pub model_version: String,
}

#[derive(Debug, Serialize)]
pub struct RetrainRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainStarted {
    pub status: String,
    pub job_id: u64,
    pub start_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Trigger {
    pub fn describe(&self) -> String {
        match (&self.reason, &self.path) {
            (Some(reason), _) => format!("{} ({})", self.source, reason),
            (None, Some(path)) => format!("{} ({})", self.source, path),
            (None, None) => self.source.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainStatus {
    pub running: bool,
    pub job_id: Option<u64>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub success: Option<bool>,
    pub message: Option<String>,
    pub outcome: Option<String>,
    pub trigger: Option<Trigger>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub last_retrain_timestamp: i64,
    pub last_retrain_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainJob {
    pub id: u64,
    pub status: String,
    pub trigger: Option<Trigger>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub message: Option<String>,
    pub outcome: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainHistory {
    pub jobs: Vec<RetrainJob>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub model_loaded: bool,
    pub model_dir_exists: bool,
    pub model_path: Option<String>,
    pub model_version: Option<String>,
    pub model_checksum: Option<String>,
    pub feature_dim: usize,
    #[serde(default)]
    pub components: HashMap<String, ComponentHealth>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
}
