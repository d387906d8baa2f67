//! Data directory watcher
//!
//! Starts a retrain when new training data lands in a directory. Bursts of
//! filesystem events are collapsed into a single retrain request. Changes
//! under the model directory are ignored, since each successful retrain
//! writes an artifact there.

use super::coordinator::RetrainCoordinator;
use super::job::RetrainTrigger;
use crate::error::RetrainRejection;
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Watches a data directory and triggers retrains on changes
pub struct DataDirWatcher {
    dir: PathBuf,
    /// Artifact directory of the coordinator's store
    model_dir: PathBuf,
    debounce: Duration,
    token: Option<String>,
    coordinator: RetrainCoordinator,
}

impl DataDirWatcher {
    pub fn new(
        dir: impl Into<PathBuf>,
        debounce: Duration,
        token: Option<String>,
        coordinator: RetrainCoordinator,
    ) -> Self {
        Self {
            dir: dir.into(),
            model_dir: resolve_dir(coordinator.store().dir()),
            debounce,
            token,
            coordinator,
        }
    }

    /// Start watching
    /// Returns a handle that stops watching when dropped
    pub async fn start(self) -> Result<WatcherHandle> {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => warn!(error = %e, "Filesystem watcher error"),
            },
            notify::Config::default(),
        )
        .context("Failed to create filesystem watcher")?;

        // Event paths are reported relative to the watched path, so watch the
        // resolved form to make them comparable with `model_dir`
        let dir = std::fs::canonicalize(&self.dir)
            .with_context(|| format!("Failed to resolve {}", self.dir.display()))?;
        watcher
            .watch(&dir, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;
        info!(
            path = %dir.display(),
            ignored = %self.model_dir.display(),
            debounce_secs = self.debounce.as_secs_f64(),
            "Watching data directory"
        );

        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(mut changed) = relevant_path(&event, &self.model_dir) else {
                    continue;
                };

                // Quiet period: keep absorbing events until none arrive for `debounce`
                loop {
                    match tokio::time::timeout(self.debounce, rx.recv()).await {
                        Ok(Some(event)) => {
                            if let Some(path) = relevant_path(&event, &self.model_dir) {
                                changed = path;
                            }
                        }
                        Ok(None) => return,
                        Err(_) => break,
                    }
                }

                self.trigger(&changed);
            }
            debug!("Watcher channel closed");
        });

        Ok(WatcherHandle {
            _watcher: watcher,
            task,
        })
    }

    fn trigger(&self, changed: &Path) {
        let trigger = RetrainTrigger::Watcher {
            path: changed.display().to_string(),
        };

        match self.coordinator.start_retrain(self.token.as_deref(), trigger) {
            Ok(accepted) => {
                info!(
                    job_id = accepted.job_id,
                    path = %changed.display(),
                    "Data change triggered retrain"
                );
            }
            Err(RetrainRejection::Conflict { start_time }) => {
                debug!(
                    running_since = %start_time,
                    "Retrain already running, ignoring data change"
                );
            }
            Err(RetrainRejection::Unauthorized) => {
                warn!("Watcher retrain rejected: configured token does not match");
            }
        }
    }
}

/// First changed path of a create/modify event that lies outside `ignored`
fn relevant_path(event: &Event, ignored: &Path) -> Option<PathBuf> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => event
            .paths
            .iter()
            .find(|path| !path.starts_with(ignored))
            .cloned(),
        _ => None,
    }
}

/// Absolute, symlink-free form of a directory that may not exist yet
///
/// Falls back to resolving the parent when the directory itself is missing,
/// and to joining the working directory when nothing resolves.
pub fn resolve_dir(dir: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(dir) {
        return resolved;
    }

    if let (Some(parent), Some(name)) = (dir.parent(), dir.file_name()) {
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Ok(parent) = std::fs::canonicalize(parent) {
            return parent.join(name);
        }
    }

    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(dir))
            .unwrap_or_else(|_| dir.to_path_buf())
    }
}

/// Handle to a running watcher
/// Stops watching when dropped
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
