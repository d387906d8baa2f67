//! Model Gateway CLI
//!
//! A command-line tool for scoring feature vectors, triggering retrains
//! and inspecting a running model gateway.

mod client;
mod commands;
mod output;

use clap::{Parser, Subcommand};
use commands::{model, retrain};
use std::process::ExitCode;

/// Model Gateway CLI
#[derive(Parser)]
#[command(name = "mgw")]
#[command(author, version, about = "CLI for the Model Gateway", long_about = None)]
pub struct Cli {
    /// Gateway URL (can also be set via MGW_API_URL env var)
    #[arg(long, env = "MGW_API_URL", default_value = "http://localhost:5000")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Score one feature vector
    Predict {
        /// Comma-separated feature values, e.g. 0.1,2.5,-3
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true, required = true)]
        features: Vec<f64>,
    },

    /// Start a background retrain
    Retrain {
        /// Retrain token (can also be set via MGW_RETRAIN_TOKEN env var)
        #[arg(long, env = "MGW_RETRAIN_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Reason recorded with the job
        #[arg(long)]
        reason: Option<String>,
    },

    /// Show the current or last retrain job
    Status,

    /// Show recently finished retrain jobs
    History,

    /// Show gateway health
    Health,
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Predict { features } => {
            model::predict(&client, &features, cli.format).await?;
        }
        Commands::Retrain { token, reason } => {
            retrain::start(&client, token.as_deref(), reason, cli.format).await?;
        }
        Commands::Status => {
            retrain::show_status(&client, cli.format).await?;
        }
        Commands::History => {
            retrain::show_history(&client, cli.format).await?;
        }
        Commands::Health => {
            model::show_health(&client, cli.format).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            if let Some(failure) = e.downcast_ref::<client::ApiFailure>() {
                if failure.status() == reqwest::StatusCode::UNAUTHORIZED {
                    output::print_info("Pass the retrain token with --token or MGW_RETRAIN_TOKEN");
                }
            }
            ExitCode::FAILURE
        }
    }
}
