//! Health check infrastructure for the model gateway
//!
//! Tracks per-component health for the informational `/health` report and
//! decides readiness for the `/ready` probe.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is functioning normally
    Healthy,
    /// Component is experiencing issues but still operational
    Degraded,
    /// Component has failed
    Unhealthy,
}

/// Information about a component's health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    pub fn healthy() -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: ComponentStatus::Degraded,
            message: Some(message.into()),
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: ComponentStatus::Unhealthy,
            message: Some(message.into()),
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Compute overall status from component statuses
pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
    let mut has_degraded = false;

    for health in components.values() {
        match health.status {
            ComponentStatus::Unhealthy => return ComponentStatus::Unhealthy,
            ComponentStatus::Degraded => has_degraded = true,
            ComponentStatus::Healthy => {}
        }
    }

    if has_degraded {
        ComponentStatus::Degraded
    } else {
        ComponentStatus::Healthy
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const MODEL: &str = "model";
    pub const RETRAIN: &str = "retrain";
}

/// Health registry for tracking component health
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            components: Arc::new(RwLock::new(HashMap::new())),
            ready: Arc::new(RwLock::new(false)),
        }
    }

    /// Register a component with initial healthy status
    pub async fn register(&self, name: &str) {
        let mut components = self.components.write().await;
        components.insert(name.to_string(), ComponentHealth::healthy());
    }

    /// Update component health status
    pub async fn update(&self, name: &str, health: ComponentHealth) {
        let mut components = self.components.write().await;
        components.insert(name.to_string(), health);
    }

    /// Mark component as healthy
    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    /// Mark component as degraded
    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    /// Mark component as unhealthy
    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Set readiness status
    pub async fn set_ready(&self, ready: bool) {
        let mut r = self.ready.write().await;
        *r = ready;
    }

    /// Snapshot of all component health entries
    pub async fn components(&self) -> HashMap<String, ComponentHealth> {
        self.components.read().await.clone()
    }

    /// Get readiness response
    ///
    /// Ready once startup finished and a model is serving.
    pub async fn readiness(&self, model_loaded: bool) -> ReadinessResponse {
        let ready = *self.ready.read().await;

        if !ready {
            ReadinessResponse {
                ready: false,
                reason: Some("Gateway not yet initialized".to_string()),
            }
        } else if !model_loaded {
            ReadinessResponse {
                ready: false,
                reason: Some("No model loaded".to_string()),
            }
        } else {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_registry_initial_state() {
        let registry = HealthRegistry::new();
        let snapshot = registry.components().await;

        assert_eq!(compute_status(&snapshot), ComponentStatus::Healthy);
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_health_registry_component_registration() {
        let registry = HealthRegistry::new();
        registry.register(components::MODEL).await;

        let snapshot = registry.components().await;
        assert_eq!(
            snapshot[components::MODEL].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_health_registry_degraded_status() {
        let registry = HealthRegistry::new();
        registry.register(components::MODEL).await;
        registry.register(components::RETRAIN).await;

        registry
            .set_degraded(components::RETRAIN, "Last retrain failed")
            .await;

        let snapshot = registry.components().await;
        assert_eq!(compute_status(&snapshot), ComponentStatus::Degraded);
        assert_eq!(
            snapshot[components::RETRAIN].message.as_deref(),
            Some("Last retrain failed")
        );
    }

    #[tokio::test]
    async fn test_health_registry_unhealthy_status() {
        let registry = HealthRegistry::new();
        registry.register(components::MODEL).await;
        registry.register(components::RETRAIN).await;

        registry
            .set_unhealthy(components::MODEL, "Artifact directory unreadable")
            .await;

        let snapshot = registry.components().await;
        assert_eq!(compute_status(&snapshot), ComponentStatus::Unhealthy);
        assert_eq!(
            snapshot[components::MODEL].status,
            ComponentStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn test_readiness_not_ready_initially() {
        let registry = HealthRegistry::new();
        let readiness = registry.readiness(true).await;

        assert!(!readiness.ready);
        assert!(readiness.reason.is_some());
    }

    #[tokio::test]
    async fn test_readiness_requires_model() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;

        let readiness = registry.readiness(false).await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("No model loaded"));

        let readiness = registry.readiness(true).await;
        assert!(readiness.ready);
    }
}
