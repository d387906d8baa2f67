//! Gateway configuration

use anyhow::{bail, Context, Result};
use gateway_lib::retrain::{resolve_dir, RetrainConfig};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable prefix for all settings
pub const ENV_PREFIX: &str = "GATEWAY";

/// Environment variable naming an optional config file
pub const CONFIG_FILE_ENV: &str = "GATEWAY_CONFIG";

/// Gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listen address
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding model artifacts
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Required input vector length
    #[serde(default = "default_feature_dim")]
    pub feature_dim: usize,

    /// Token required by `POST /retrain`; unset or empty disables the check
    #[serde(default)]
    pub retrain_token: Option<String>,

    /// Trainer executable
    pub trainer_program: String,

    #[serde(default)]
    pub trainer_args: Vec<String>,

    #[serde(default)]
    pub trainer_workdir: Option<PathBuf>,

    #[serde(default = "default_trainer_timeout")]
    pub trainer_timeout_secs: u64,

    /// Finished retrain jobs kept in history
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Data directory that triggers a retrain on change
    #[serde(default)]
    pub watch_dir: Option<PathBuf>,

    #[serde(default = "default_watch_debounce")]
    pub watch_debounce_secs: u64,

    /// Instance name used in structured logs
    #[serde(default = "default_instance")]
    pub instance: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("model")
}

fn default_feature_dim() -> usize {
    8
}

fn default_trainer_timeout() -> u64 {
    600
}

fn default_history_limit() -> usize {
    20
}

fn default_watch_debounce() -> u64 {
    5
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "model-gateway".to_string())
}

impl GatewayConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from);
        Self::from_sources(file, environment())
    }

    fn from_sources(file: Option<PathBuf>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }

        let config: Self = builder
            .add_source(env)
            .build()
            .context("Failed to read gateway configuration")?
            .try_deserialize()
            .context("Invalid gateway configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.feature_dim == 0 {
            bail!("feature_dim must be greater than zero");
        }
        if self.trainer_timeout_secs == 0 {
            bail!("trainer_timeout_secs must be greater than zero");
        }
        if self.trainer_program.trim().is_empty() {
            bail!("trainer_program must not be empty");
        }
        if let Some(watch_dir) = &self.watch_dir {
            // Every retrain writes into model_dir, which would retrigger the watcher
            if resolve_dir(&self.model_dir).starts_with(resolve_dir(watch_dir)) {
                bail!(
                    "watch_dir {} must not contain model_dir {}",
                    watch_dir.display(),
                    self.model_dir.display()
                );
            }
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }

    /// Non-empty retrain token, if any
    pub fn retrain_token(&self) -> Option<&str> {
        self.retrain_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn retrain_config(&self) -> RetrainConfig {
        RetrainConfig {
            trainer_timeout: Duration::from_secs(self.trainer_timeout_secs),
            history_limit: self.history_limit,
            expected_token: self.retrain_token().map(str::to_string),
        }
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .list_separator(" ")
        .with_list_parse_key("trainer_args")
}
