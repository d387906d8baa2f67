//! Retrain control CLI commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, RetrainJob};
use crate::output::{
    color_status, format_optional_timestamp, format_timestamp, print_heading, print_info,
    print_json, print_success, print_warning, OutputFormat,
};

/// Row for the retrain history table
#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "Job")]
    id: u64,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Trigger")]
    trigger: String,
    #[tabled(rename = "Started")]
    start_time: String,
    #[tabled(rename = "Finished")]
    end_time: String,
    #[tabled(rename = "Message")]
    message: String,
}

impl From<&RetrainJob> for JobRow {
    fn from(job: &RetrainJob) -> Self {
        Self {
            id: job.id,
            status: color_status(&job.status),
            outcome: job.outcome.clone().unwrap_or_else(|| "-".to_string()),
            trigger: job
                .trigger
                .as_ref()
                .map(|t| t.describe())
                .unwrap_or_else(|| "-".to_string()),
            start_time: format_optional_timestamp(job.start_time.as_deref()),
            end_time: format_optional_timestamp(job.end_time.as_deref()),
            message: job.message.clone().unwrap_or_default(),
        }
    }
}

/// Start a background retrain
pub async fn start(
    client: &ApiClient,
    token: Option<&str>,
    reason: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let started = client.retrain(token, reason).await?;

    match format {
        OutputFormat::Json => print_json(&started)?,
        OutputFormat::Table => {
            print_success(&format!(
                "Retrain job {} started at {}",
                started.job_id,
                format_timestamp(&started.start_time)
            ));
            print_info("Follow progress with: mgw status");
        }
    }

    Ok(())
}

/// Show the current or last retrain job
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status = client.retrain_status().await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            print_heading("Retrain Status", 60);

            let Some(job_id) = status.job_id else {
                print_info("No retrain has run since the gateway started");
                println!(
                    "Last Model Load:  {}",
                    format_optional_timestamp(status.last_retrain_time.as_deref())
                );
                return Ok(());
            };

            let state = match (status.running, status.success) {
                (true, _) => "running",
                (false, Some(true)) => "succeeded",
                (false, Some(false)) => "failed",
                (false, None) => "idle",
            };

            println!("Job:              {}", job_id.to_string().cyan());
            println!("State:            {}", color_status(state));
            if let Some(outcome) = &status.outcome {
                println!("Outcome:          {}", outcome);
            }
            if let Some(trigger) = &status.trigger {
                println!("Trigger:          {}", trigger.describe());
            }
            println!(
                "Started:          {}",
                format_optional_timestamp(status.start_time.as_deref())
            );
            println!(
                "Finished:         {}",
                format_optional_timestamp(status.end_time.as_deref())
            );
            println!(
                "Last Model Load:  {}",
                format_optional_timestamp(status.last_retrain_time.as_deref())
            );
            if let Some(message) = &status.message {
                println!("Message:          {}", message);
            }

            if let Some(stderr) = &status.stderr {
                println!();
                println!("{}", "Trainer stderr".bold());
                println!("{}", "-".repeat(60));
                println!("{}", stderr);
            }
        }
    }

    Ok(())
}

/// Show recently finished retrain jobs
pub async fn show_history(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let history = client.retrain_history().await?;

    match format {
        OutputFormat::Json => print_json(&history)?,
        OutputFormat::Table => {
            if history.jobs.is_empty() {
                print_warning("No finished retrain jobs");
                return Ok(());
            }

            let rows: Vec<JobRow> = history.jobs.iter().map(JobRow::from).collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} jobs", history.jobs.len());
        }
    }

    Ok(())
}
