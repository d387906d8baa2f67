//! Retrain coordinator
//!
//! Owns the retrain state machine (`Idle → Running → Succeeded | Failed`),
//! guarantees at most one running job, drives the external trainer with a
//! timeout and publishes the reloaded predictor on success. Completion is
//! only ever reported through the job record.

use super::job::{JobOutcome, JobReport, RetrainJob, RetrainTrigger};
use super::trainer::Trainer;
use crate::artifact::ArtifactStore;
use crate::error::RetrainRejection;
use crate::health::{components, HealthRegistry};
use crate::observability::{GatewayMetrics, StructuredLogger};
use crate::registry::ModelRegistry;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default bound on a single trainer run
pub const DEFAULT_TRAINER_TIMEOUT: Duration = Duration::from_secs(600);

/// Default number of finished jobs kept for `/retrain/history`
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Configuration for the retrain coordinator
#[derive(Debug, Clone)]
pub struct RetrainConfig {
    /// Maximum wall time of one trainer run
    pub trainer_timeout: Duration,
    /// Finished jobs retained in history
    pub history_limit: usize,
    /// Token required to start a retrain; empty or `None` disables the check
    pub expected_token: Option<String>,
}

impl Default for RetrainConfig {
    fn default() -> Self {
        Self {
            trainer_timeout: DEFAULT_TRAINER_TIMEOUT,
            history_limit: DEFAULT_HISTORY_LIMIT,
            expected_token: None,
        }
    }
}

/// A retrain that was scheduled
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Accepted {
    pub job_id: u64,
    pub start_time: DateTime<Utc>,
}

struct CoordinatorState {
    current: RetrainJob,
    history: VecDeque<RetrainJob>,
    next_id: u64,
}

struct Inner {
    config: RetrainConfig,
    token_digest: Option<Vec<u8>>,
    trainer: Arc<dyn Trainer>,
    store: ArtifactStore,
    registry: ModelRegistry,
    health: HealthRegistry,
    metrics: GatewayMetrics,
    logger: StructuredLogger,
    state: Mutex<CoordinatorState>,
}

/// Handle to the retrain state machine; clones share the same state
#[derive(Clone)]
pub struct RetrainCoordinator {
    inner: Arc<Inner>,
}

impl RetrainCoordinator {
    pub fn new(
        config: RetrainConfig,
        trainer: Arc<dyn Trainer>,
        store: ArtifactStore,
        registry: ModelRegistry,
        health: HealthRegistry,
        metrics: GatewayMetrics,
        logger: StructuredLogger,
    ) -> Self {
        let token_digest = config
            .expected_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .map(|token| Sha256::digest(token.as_bytes()).to_vec());

        Self {
            inner: Arc::new(Inner {
                config,
                token_digest,
                trainer,
                store,
                registry,
                health,
                metrics,
                logger,
                state: Mutex::new(CoordinatorState {
                    current: RetrainJob::idle(),
                    history: VecDeque::new(),
                    next_id: 1,
                }),
            }),
        }
    }

    /// Start a retrain in the background
    ///
    /// Returns as soon as the job is scheduled. Must be called from within
    /// a Tokio runtime.
    pub fn start_retrain(
        &self,
        token: Option<&str>,
        trigger: RetrainTrigger,
    ) -> Result<Accepted, RetrainRejection> {
        if !self.inner.authorize(token) {
            self.inner.metrics.record_retrain_request("unauthorized");
            return Err(RetrainRejection::Unauthorized);
        }

        let accepted = {
            let mut state = self.inner.state.lock();
            if state.current.is_running() {
                let start_time = state.current.start_time.unwrap_or_else(Utc::now);
                drop(state);
                self.inner.metrics.record_retrain_request("conflict");
                return Err(RetrainRejection::Conflict { start_time });
            }

            let job_id = state.next_id;
            state.next_id += 1;
            let start_time = Utc::now();
            state.current = RetrainJob::running(job_id, trigger.clone(), start_time);
            // Gauge follows the job record under the same lock
            self.inner.metrics.set_retrain_running(true);
            Accepted { job_id, start_time }
        };

        self.inner.metrics.record_retrain_request("accepted");
        self.inner
            .logger
            .log_retrain_started(accepted.job_id, trigger.label());

        let inner = Arc::clone(&self.inner);
        let job_id = accepted.job_id;
        tokio::spawn(async move {
            inner.run_job(job_id).await;
        });

        Ok(accepted)
    }

    /// Snapshot of the current (or last) job record
    pub fn status(&self) -> RetrainJob {
        self.inner.state.lock().current.clone()
    }

    /// Finished jobs, newest first
    pub fn history(&self) -> Vec<RetrainJob> {
        self.inner.state.lock().history.iter().cloned().collect()
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().current.is_running()
    }

    /// Whether a retrain token is required
    pub fn requires_token(&self) -> bool {
        self.inner.token_digest.is_some()
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.inner.registry
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.inner.store
    }
}

impl Inner {
    /// Compare SHA-256 digests so the comparison time does not depend on the token
    fn authorize(&self, token: Option<&str>) -> bool {
        let Some(expected) = &self.token_digest else {
            return true;
        };
        let Some(token) = token else {
            return false;
        };

        let supplied = Sha256::digest(token.as_bytes());
        supplied
            .iter()
            .zip(expected.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    async fn run_job(self: Arc<Self>, job_id: u64) {
        let started = Instant::now();
        debug!(job_id, trainer = %self.trainer.describe(), "Running trainer");

        let report = self.train_and_reload().await;
        self.finish(job_id, report, started.elapsed()).await;
    }

    async fn train_and_reload(&self) -> JobReport {
        let trainer = Arc::clone(&self.trainer);
        // Own task so a panicking trainer cannot leave the job stuck
        let mut task = tokio::spawn(async move { trainer.run().await });

        let output = match tokio::time::timeout(self.config.trainer_timeout, &mut task).await {
            Err(_) => {
                task.abort();
                return JobReport::new(
                    JobOutcome::TimedOut,
                    format!(
                        "Training timed out after {}s",
                        self.config.trainer_timeout.as_secs_f64()
                    ),
                );
            }
            Ok(Err(join_err)) => {
                return JobReport::new(
                    JobOutcome::TrainerRaised,
                    format!("Trainer task failed: {}", join_err),
                );
            }
            Ok(Ok(Err(e))) => {
                return JobReport::new(
                    JobOutcome::TrainerRaised,
                    format!("Unexpected error during retraining: {}", e),
                );
            }
            Ok(Ok(Ok(output))) => output,
        };

        if !output.success() {
            let code = output
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none (terminated by signal)".to_string());
            return JobReport::new(
                JobOutcome::TrainerExitedNonZero,
                format!("Training failed with exit code {}", code),
            )
            .with_output(&output.stdout, &output.stderr);
        }

        let store = self.store.clone();
        let loaded = tokio::task::spawn_blocking(move || store.load_latest()).await;

        let predictor = match loaded {
            Ok(Ok(predictor)) => predictor,
            Ok(Err(e)) => {
                return JobReport::new(
                    JobOutcome::ReloadFailed,
                    format!("training succeeded but reload failed: {}", e),
                )
                .with_output(&output.stdout, &output.stderr);
            }
            Err(join_err) => {
                return JobReport::new(
                    JobOutcome::ReloadFailed,
                    format!("training succeeded but reload failed: {}", join_err),
                )
                .with_output(&output.stdout, &output.stderr);
            }
        };

        let now = Utc::now().timestamp();
        let predictor = self.registry.publish(predictor, now);
        self.metrics.set_model_loaded(predictor.version(), now);
        self.health.set_healthy(components::MODEL).await;
        self.logger.log_model_loaded(
            predictor.version(),
            &predictor.info().path.display().to_string(),
            "retrain",
        );

        JobReport::new(
            JobOutcome::Succeeded,
            format!(
                "Model retrained and loaded successfully (version {})",
                predictor.version()
            ),
        )
        .with_output(&output.stdout, &output.stderr)
    }

    async fn finish(&self, job_id: u64, report: JobReport, elapsed: Duration) {
        let outcome = report.outcome;
        if outcome.is_success() {
            self.health.set_healthy(components::RETRAIN).await;
        } else {
            self.health
                .set_degraded(
                    components::RETRAIN,
                    format!("Last retrain failed: {}", report.message),
                )
                .await;
        }

        let finished = {
            let mut state = self.state.lock();
            if state.current.id != job_id {
                warn!(
                    job_id,
                    current = state.current.id,
                    "Finished job is not the current job"
                );
                return;
            }
            state.current.complete(report, Utc::now());
            self.metrics.set_retrain_running(false);
            let finished = state.current.clone();
            state.history.push_front(finished.clone());
            state.history.truncate(self.config.history_limit);
            finished
        };

        self.metrics.record_retrain_job(outcome.as_str());
        self.logger.log_retrain_finished(
            job_id,
            outcome.as_str(),
            outcome.is_success(),
            elapsed.as_secs_f64(),
            finished.message.as_deref().unwrap_or_default(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrainerError;
    use crate::retrain::job::JobStatus;
    use crate::retrain::trainer::TrainerOutput;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Writes a versioned artifact then exits with the configured code
    struct StubTrainer {
        dir: PathBuf,
        exit_code: i32,
        delay: Duration,
        write_body: Option<String>,
        runs: AtomicUsize,
    }

    impl StubTrainer {
        fn succeeding(dir: &Path, version: &str, weight: f64) -> Self {
            Self {
                dir: dir.to_path_buf(),
                exit_code: 0,
                delay: Duration::from_millis(10),
                write_body: Some(artifact_json(version, weight)),
                runs: AtomicUsize::new(0),
            }
        }

        fn failing(dir: &Path) -> Self {
            Self {
                dir: dir.to_path_buf(),
                exit_code: 2,
                delay: Duration::from_millis(10),
                write_body: None,
                runs: AtomicUsize::new(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn with_body(mut self, body: &str) -> Self {
            self.write_body = Some(body.to_string());
            self
        }
    }

    #[async_trait]
    impl Trainer for StubTrainer {
        async fn run(&self) -> Result<TrainerOutput, TrainerError> {
            tokio::time::sleep(self.delay).await;
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            if let Some(body) = &self.write_body {
                let path = self.dir.join(format!("model_{:04}.json", run + 100));
                std::fs::write(path, body).map_err(TrainerError::Io)?;
            }
            Ok(TrainerOutput {
                exit_code: Some(self.exit_code),
                stdout: "training complete".to_string(),
                stderr: if self.exit_code == 0 {
                    String::new()
                } else {
                    "ValueError: bad input data".to_string()
                },
            })
        }
    }

    struct PanickingTrainer;

    #[async_trait]
    impl Trainer for PanickingTrainer {
        async fn run(&self) -> Result<TrainerOutput, TrainerError> {
            panic!("trainer blew up");
        }
    }

    fn artifact_json(version: &str, weight: f64) -> String {
        format!(
            r#"{{"version": "{}", "coefficients": [[{}]], "intercepts": [0.0]}}"#,
            version, weight
        )
    }

    fn coordinator(
        dir: &Path,
        trainer: Arc<dyn Trainer>,
        config: RetrainConfig,
    ) -> RetrainCoordinator {
        RetrainCoordinator::new(
            config,
            trainer,
            ArtifactStore::new(dir, 1),
            ModelRegistry::new(),
            HealthRegistry::new(),
            GatewayMetrics::new(),
            StructuredLogger::new("test"),
        )
    }

    fn api_trigger() -> RetrainTrigger {
        RetrainTrigger::Api { reason: None }
    }

    async fn wait_until_finished(coordinator: &RetrainCoordinator) -> RetrainJob {
        for _ in 0..400 {
            let status = coordinator.status();
            if !status.is_running() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("retrain job did not finish in time");
    }

    #[tokio::test]
    async fn test_successful_retrain_publishes_new_model() {
        let temp_dir = TempDir::new().unwrap();
        let trainer = Arc::new(StubTrainer::succeeding(temp_dir.path(), "v2", 5.0));
        let coordinator = coordinator(temp_dir.path(), trainer, RetrainConfig::default());

        assert_eq!(coordinator.status().status, JobStatus::Idle);

        let accepted = coordinator.start_retrain(None, api_trigger()).unwrap();
        assert_eq!(accepted.job_id, 1);
        assert!(coordinator.is_running());

        let status = wait_until_finished(&coordinator).await;
        assert_eq!(status.status, JobStatus::Succeeded);
        assert_eq!(status.success(), Some(true));
        assert_eq!(status.outcome, Some(JobOutcome::Succeeded));
        assert_eq!(status.start_time, Some(accepted.start_time));
        assert_eq!(status.stdout.as_deref(), Some("training complete"));

        let predictor = coordinator.registry().current().unwrap();
        assert_eq!(predictor.version(), "v2");
        assert_eq!(predictor.predict(&[2.0]).unwrap(), vec![10.0]);
        assert!(coordinator.registry().snapshot().last_retrain_timestamp > 0);
    }

    #[tokio::test]
    async fn test_failed_retrain_keeps_previous_model() {
        let temp_dir = TempDir::new().unwrap();
        let initial_path = temp_dir.path().join("model_0001.json");
        std::fs::write(initial_path, artifact_json("v1", 1.0)).unwrap();

        let trainer = Arc::new(StubTrainer::failing(temp_dir.path()));
        let coordinator = coordinator(temp_dir.path(), trainer, RetrainConfig::default());
        let initial = coordinator.store().load_latest().unwrap();
        coordinator.registry().publish(initial, 42);

        coordinator.start_retrain(None, api_trigger()).unwrap();
        let status = wait_until_finished(&coordinator).await;

        assert_eq!(status.success(), Some(false));
        assert_eq!(status.outcome, Some(JobOutcome::TrainerExitedNonZero));
        assert!(status.message.unwrap().contains("exit code 2"));
        assert!(status.stderr.unwrap().contains("ValueError"));

        let predictor = coordinator.registry().current().unwrap();
        assert_eq!(predictor.version(), "v1");
        assert_eq!(coordinator.registry().snapshot().last_retrain_timestamp, 42);
    }

    #[tokio::test]
    async fn test_reload_failure_keeps_previous_model() {
        let temp_dir = TempDir::new().unwrap();
        let initial_path = temp_dir.path().join("model_0001.json");
        std::fs::write(initial_path, artifact_json("v1", 1.0)).unwrap();

        let trainer = Arc::new(
            StubTrainer::succeeding(temp_dir.path(), "unused", 0.0).with_body("{ not a model"),
        );
        let coordinator = coordinator(temp_dir.path(), trainer, RetrainConfig::default());
        let initial = coordinator.store().load_latest().unwrap();
        coordinator.registry().publish(initial, 42);

        // Make sure the corrupt artifact is strictly newer
        tokio::time::sleep(Duration::from_millis(20)).await;
        coordinator.start_retrain(None, api_trigger()).unwrap();
        let status = wait_until_finished(&coordinator).await;

        assert_eq!(status.status, JobStatus::Failed);
        assert_eq!(status.outcome, Some(JobOutcome::ReloadFailed));
        assert!(status
            .message
            .unwrap()
            .starts_with("training succeeded but reload failed"));
        assert_eq!(coordinator.registry().current().unwrap().version(), "v1");
    }

    #[tokio::test]
    async fn test_timeout_marks_job_failed() {
        let temp_dir = TempDir::new().unwrap();
        let trainer = Arc::new(
            StubTrainer::succeeding(temp_dir.path(), "late", 1.0)
                .with_delay(Duration::from_secs(30)),
        );
        let config = RetrainConfig {
            trainer_timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let coordinator = coordinator(temp_dir.path(), trainer, config);

        coordinator.start_retrain(None, api_trigger()).unwrap();
        let status = wait_until_finished(&coordinator).await;

        assert_eq!(status.status, JobStatus::Failed);
        assert_eq!(status.outcome, Some(JobOutcome::TimedOut));
        assert!(coordinator.registry().current().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timed_out_trainer_process_is_killed() {
        let temp_dir = TempDir::new().unwrap();
        let workdir = TempDir::new().unwrap();
        let trainer = Arc::new(
            crate::retrain::CommandTrainer::new("sh")
                .args(["-c", "sleep 2; touch marker"])
                .workdir(workdir.path()),
        );
        let config = RetrainConfig {
            trainer_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let coordinator = coordinator(temp_dir.path(), trainer, config);

        coordinator.start_retrain(None, api_trigger()).unwrap();
        let status = wait_until_finished(&coordinator).await;
        assert_eq!(status.outcome, Some(JobOutcome::TimedOut));

        // A surviving child would create the marker once its sleep ends
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!workdir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn test_panicking_trainer_is_recorded() {
        let temp_dir = TempDir::new().unwrap();
        let coordinator = coordinator(
            temp_dir.path(),
            Arc::new(PanickingTrainer),
            RetrainConfig::default(),
        );

        coordinator.start_retrain(None, api_trigger()).unwrap();
        let status = wait_until_finished(&coordinator).await;

        assert_eq!(status.outcome, Some(JobOutcome::TrainerRaised));
        assert_eq!(status.success(), Some(false));
    }

    #[tokio::test]
    async fn test_second_start_while_running_conflicts() {
        let temp_dir = TempDir::new().unwrap();
        let trainer = Arc::new(
            StubTrainer::succeeding(temp_dir.path(), "v1", 1.0)
                .with_delay(Duration::from_millis(300)),
        );
        let coordinator = coordinator(temp_dir.path(), trainer, RetrainConfig::default());

        let accepted = coordinator.start_retrain(None, api_trigger()).unwrap();
        let err = coordinator.start_retrain(None, api_trigger()).unwrap_err();
        assert_eq!(
            err,
            RetrainRejection::Conflict {
                start_time: accepted.start_time
            }
        );

        wait_until_finished(&coordinator).await;

        // Eligible again after the job finished
        let next = coordinator.start_retrain(None, api_trigger()).unwrap();
        assert_eq!(next.job_id, 2);
        wait_until_finished(&coordinator).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_starts_admit_exactly_one() {
        let temp_dir = TempDir::new().unwrap();
        let trainer = Arc::new(
            StubTrainer::succeeding(temp_dir.path(), "v1", 1.0)
                .with_delay(Duration::from_millis(500)),
        );
        let coordinator = coordinator(temp_dir.path(), trainer, RetrainConfig::default());

        let attempts: Vec<_> = (0..16)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.start_retrain(None, api_trigger()) })
            })
            .collect();

        let mut accepted = 0;
        let mut conflicts = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(RetrainRejection::Conflict { .. }) => conflicts += 1,
                Err(other) => panic!("unexpected rejection: {:?}", other),
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(conflicts, 15);
        wait_until_finished(&coordinator).await;
    }

    #[tokio::test]
    async fn test_token_is_enforced() {
        let temp_dir = TempDir::new().unwrap();
        let trainer = Arc::new(StubTrainer::succeeding(temp_dir.path(), "v1", 1.0));
        let config = RetrainConfig {
            expected_token: Some("s3cret".to_string()),
            ..Default::default()
        };
        let coordinator = coordinator(temp_dir.path(), trainer, config);
        assert!(coordinator.requires_token());

        assert_eq!(
            coordinator.start_retrain(None, api_trigger()).unwrap_err(),
            RetrainRejection::Unauthorized
        );
        assert_eq!(
            coordinator
                .start_retrain(Some("wrong"), api_trigger())
                .unwrap_err(),
            RetrainRejection::Unauthorized
        );
        assert_eq!(coordinator.status().status, JobStatus::Idle);

        coordinator
            .start_retrain(Some("s3cret"), api_trigger())
            .unwrap();
        wait_until_finished(&coordinator).await;
    }

    #[tokio::test]
    async fn test_empty_token_disables_auth() {
        let temp_dir = TempDir::new().unwrap();
        let trainer = Arc::new(StubTrainer::succeeding(temp_dir.path(), "v1", 1.0));
        let config = RetrainConfig {
            expected_token: Some(String::new()),
            ..Default::default()
        };
        let coordinator = coordinator(temp_dir.path(), trainer, config);

        assert!(!coordinator.requires_token());
        coordinator.start_retrain(None, api_trigger()).unwrap();
        wait_until_finished(&coordinator).await;
    }

    #[tokio::test]
    async fn test_history_is_bounded_and_newest_first() {
        let temp_dir = TempDir::new().unwrap();
        let trainer = Arc::new(StubTrainer::failing(temp_dir.path()));
        let config = RetrainConfig {
            history_limit: 2,
            ..Default::default()
        };
        let coordinator = coordinator(temp_dir.path(), trainer, config);

        for _ in 0..3 {
            coordinator.start_retrain(None, api_trigger()).unwrap();
            wait_until_finished(&coordinator).await;
        }

        let history = coordinator.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, 3);
        assert_eq!(history[1].id, 2);
    }
}
