//! External trainer collaborator
//!
//! The gateway treats training as a black box: something that runs, exits
//! with a status and leaves a new artifact in the model directory.

use crate::error::TrainerError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Captured result of one trainer run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrainerOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl TrainerOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Produces a new artifact in the model directory
#[async_trait]
pub trait Trainer: Send + Sync {
    async fn run(&self) -> Result<TrainerOutput, TrainerError>;

    /// Human-readable description for logs
    fn describe(&self) -> String {
        "trainer".to_string()
    }
}

/// Runs training as a child process
///
/// The child is killed if the future driving it is dropped, which is how
/// the coordinator's timeout terminates a hung trainer.
#[derive(Debug, Clone)]
pub struct CommandTrainer {
    program: String,
    args: Vec<String>,
    workdir: Option<PathBuf>,
    envs: Vec<(String, String)>,
}

impl CommandTrainer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: None,
            envs: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

#[async_trait]
impl Trainer for CommandTrainer {
    async fn run(&self) -> Result<TrainerOutput, TrainerError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        debug!(trainer = %self.describe(), "Spawning trainer process");
        let child = cmd.spawn().map_err(TrainerError::Spawn)?;
        let output = child.wait_with_output().await.map_err(TrainerError::Io)?;

        Ok(TrainerOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn describe(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}
