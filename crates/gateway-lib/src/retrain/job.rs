//! Retrain job records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound on captured trainer stdout/stderr kept per job
pub const MAX_CAPTURED_OUTPUT: usize = 16 * 1024;

/// Lifecycle state of a retrain job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Classification of how a finished job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded,
    TimedOut,
    TrainerExitedNonZero,
    TrainerRaised,
    ReloadFailed,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Succeeded => "succeeded",
            JobOutcome::TimedOut => "timed_out",
            JobOutcome::TrainerExitedNonZero => "trainer_exited_non_zero",
            JobOutcome::TrainerRaised => "trainer_raised",
            JobOutcome::ReloadFailed => "reload_failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded)
    }
}

/// What asked for the retrain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum RetrainTrigger {
    /// Operator request through the HTTP API
    Api {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Change detected in the watched data directory
    Watcher { path: String },
}

impl RetrainTrigger {
    pub fn label(&self) -> &'static str {
        match self {
            RetrainTrigger::Api { .. } => "api",
            RetrainTrigger::Watcher { .. } => "watcher",
        }
    }
}

/// Result of a job body, applied to the record when the job finishes
#[derive(Debug, Clone)]
pub struct JobReport {
    pub outcome: JobOutcome,
    pub message: String,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl JobReport {
    pub fn new(outcome: JobOutcome, message: impl Into<String>) -> Self {
        Self {
            outcome,
            message: message.into(),
            stdout: None,
            stderr: None,
        }
    }

    /// Attach captured trainer output, keeping only the tail of each stream
    pub fn with_output(mut self, stdout: &str, stderr: &str) -> Self {
        self.stdout = non_empty_tail(stdout);
        self.stderr = non_empty_tail(stderr);
        self
    }
}

/// One retrain attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrainJob {
    /// Monotonic job id, 0 before the first job
    pub id: u64,
    pub status: JobStatus,
    pub trigger: Option<RetrainTrigger>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub outcome: Option<JobOutcome>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl RetrainJob {
    /// Record used before any job has run
    pub fn idle() -> Self {
        Self {
            id: 0,
            status: JobStatus::Idle,
            trigger: None,
            start_time: None,
            end_time: None,
            message: None,
            outcome: None,
            stdout: None,
            stderr: None,
        }
    }

    pub fn running(id: u64, trigger: RetrainTrigger, start_time: DateTime<Utc>) -> Self {
        Self {
            id,
            status: JobStatus::Running,
            trigger: Some(trigger),
            start_time: Some(start_time),
            end_time: None,
            message: Some("Retraining in progress".to_string()),
            outcome: None,
            stdout: None,
            stderr: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }

    /// `Some(true/false)` once finished, `None` while idle or running
    pub fn success(&self) -> Option<bool> {
        match self.status {
            JobStatus::Succeeded => Some(true),
            JobStatus::Failed => Some(false),
            JobStatus::Idle | JobStatus::Running => None,
        }
    }

    /// Apply the final report to a running job
    pub fn complete(&mut self, report: JobReport, end_time: DateTime<Utc>) {
        self.status = if report.outcome.is_success() {
            JobStatus::Succeeded
        } else {
            JobStatus::Failed
        };
        self.outcome = Some(report.outcome);
        self.message = Some(report.message);
        self.stdout = report.stdout;
        self.stderr = report.stderr;
        self.end_time = Some(end_time);
    }
}

fn non_empty_tail(output: &str) -> Option<String> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(truncate_tail(trimmed, MAX_CAPTURED_OUTPUT))
    }
}

/// Keep at most `max_bytes` from the end of `s`, on a char boundary
pub fn truncate_tail(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }

    let mut start = s.len() - max_bytes;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &s[start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_record() {
        let job = RetrainJob::idle();
        assert!(!job.is_running());
        assert_eq!(job.success(), None);
        assert_eq!(job.id, 0);
    }

    #[test]
    fn test_complete_success() {
        let mut job = RetrainJob::running(1, RetrainTrigger::Api { reason: None }, Utc::now());
        assert!(job.is_running());
        assert_eq!(job.success(), None);

        job.complete(
            JobReport::new(JobOutcome::Succeeded, "loaded").with_output("epoch 1\n", ""),
            Utc::now(),
        );

        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.success(), Some(true));
        assert_eq!(job.stdout.as_deref(), Some("epoch 1"));
        assert!(job.stderr.is_none());
        assert!(job.end_time.is_some());
    }

    #[test]
    fn test_complete_failure() {
        let mut job = RetrainJob::running(
            2,
            RetrainTrigger::Watcher {
                path: "/data/new.csv".to_string(),
            },
            Utc::now(),
        );
        job.complete(
            JobReport::new(JobOutcome::TimedOut, "Training timed out"),
            Utc::now(),
        );

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.success(), Some(false));
        assert_eq!(job.outcome, Some(JobOutcome::TimedOut));
    }

    #[test]
    fn test_truncate_tail_keeps_end() {
        let s = "a".repeat(10) + "tail";
        assert_eq!(truncate_tail(&s, 4), "...tail");
        assert_eq!(truncate_tail("short", 64), "short");
    }

    #[test]
    fn test_truncate_tail_respects_char_boundary() {
        let s = "ééé";
        // Each é is two bytes; cutting at 3 bytes lands mid-char
        assert_eq!(truncate_tail(s, 3), "...é");
    }

    #[test]
    fn test_trigger_serialization() {
        let json = serde_json::to_value(RetrainTrigger::Api {
            reason: Some("new data".to_string()),
        })
        .unwrap();
        assert_eq!(json["source"], "api");
        assert_eq!(json["reason"], "new data");

        let json = serde_json::to_value(RetrainTrigger::Api { reason: None }).unwrap();
        assert!(json.get("reason").is_none());
    }
}
