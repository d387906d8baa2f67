//! Model Gateway - serves predictions and coordinates hot-reloading retrains
//!
//! Loads the newest artifact from the model directory, serves it over HTTP,
//! and swaps in a fresh model whenever a background retrain succeeds.

use anyhow::Result;
use chrono::{DateTime, Utc};
use gateway_lib::{
    api::{self, AppState},
    artifact::ArtifactStore,
    error::ArtifactError,
    health::{components, HealthRegistry},
    observability::{GatewayMetrics, StructuredLogger},
    registry::ModelRegistry,
    retrain::{CommandTrainer, DataDirWatcher, RetrainCoordinator},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const GATEWAY_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting model-gateway");

    let config = config::GatewayConfig::load()?;
    info!(
        model_dir = %config.model_dir.display(),
        feature_dim = config.feature_dim,
        trainer = %config.trainer_program,
        token_required = config.retrain_token().is_some(),
        "Gateway configured"
    );

    let health = HealthRegistry::new();
    health.register(components::MODEL).await;
    health.register(components::RETRAIN).await;

    let metrics = GatewayMetrics::new();
    metrics.set_retrain_running(false);
    let logger = StructuredLogger::new(&config.instance);

    let store = ArtifactStore::new(&config.model_dir, config.feature_dim);
    let registry = ModelRegistry::new();
    initial_load(&store, &registry, &health, &metrics, &logger).await;

    let mut trainer = CommandTrainer::new(&config.trainer_program)
        .args(config.trainer_args.iter().cloned())
        .env("MODEL_DIR", config.model_dir.display().to_string())
        .env("FEATURE_DIM", config.feature_dim.to_string());
    if let Some(dir) = &config.trainer_workdir {
        trainer = trainer.workdir(dir);
    }

    let coordinator = RetrainCoordinator::new(
        config.retrain_config(),
        Arc::new(trainer),
        store,
        registry.clone(),
        health.clone(),
        metrics.clone(),
        logger.clone(),
    );

    // Kept alive for the lifetime of the server
    let _watcher = match &config.watch_dir {
        Some(dir) => Some(
            DataDirWatcher::new(
                dir,
                Duration::from_secs(config.watch_debounce_secs),
                config.retrain_token().map(str::to_string),
                coordinator.clone(),
            )
            .start()
            .await?,
        ),
        None => None,
    };

    let app_state = Arc::new(AppState::new(
        coordinator,
        health.clone(),
        metrics,
        logger.clone(),
    ));

    health.set_ready(true).await;
    logger.log_startup(
        GATEWAY_VERSION,
        &config.model_dir.display().to_string(),
        registry.is_loaded(),
    );

    let addr = config.listen_addr()?;
    let shutdown_logger = logger.clone();
    api::serve(addr, app_state, async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        shutdown_logger.log_shutdown("SIGINT received");
    })
    .await?;

    info!("Shutting down");
    Ok(())
}

/// Best-effort startup load; the gateway serves 503 on `/predict` until a model exists
async fn initial_load(
    store: &ArtifactStore,
    registry: &ModelRegistry,
    health: &HealthRegistry,
    metrics: &GatewayMetrics,
    logger: &StructuredLogger,
) {
    let loader = store.clone();
    let loaded = tokio::task::spawn_blocking(move || loader.load_latest()).await;

    match loaded {
        Ok(Ok(predictor)) => {
            let modified: DateTime<Utc> = predictor.info().modified_at;
            let timestamp = modified.timestamp();
            let predictor = registry.publish(predictor, timestamp);
            metrics.set_model_loaded(predictor.version(), timestamp);
            logger.log_model_loaded(
                predictor.version(),
                &predictor.info().path.display().to_string(),
                "startup",
            );
        }
        Ok(Err(e @ ArtifactError::NotFound { .. })) => {
            logger.log_model_unavailable(&e.to_string());
            health.set_degraded(components::MODEL, e.to_string()).await;
        }
        Ok(Err(e)) => {
            logger.log_model_unavailable(&e.to_string());
            health.set_unhealthy(components::MODEL, e.to_string()).await;
        }
        Err(e) => {
            logger.log_model_unavailable(&e.to_string());
            health.set_unhealthy(components::MODEL, e.to_string()).await;
        }
    }
}
