//! Retraining: job records, the trainer collaborator, the coordinator that
//! serializes retrains and the optional data-directory watcher.

mod coordinator;
mod job;
mod trainer;
mod watcher;

pub use coordinator::{
    Accepted, RetrainConfig, RetrainCoordinator, DEFAULT_HISTORY_LIMIT, DEFAULT_TRAINER_TIMEOUT,
};
pub use job::{
    truncate_tail, JobOutcome, JobReport, JobStatus, RetrainJob, RetrainTrigger,
    MAX_CAPTURED_OUTPUT,
};
pub use trainer::{CommandTrainer, Trainer, TrainerOutput};
pub use watcher::{resolve_dir, DataDirWatcher, WatcherHandle};
