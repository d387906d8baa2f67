//! Prediction and health CLI commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_bool, color_status, format_prediction, format_timestamp, print_heading, print_json,
    print_warning, OutputFormat,
};

/// Row for the component health table
#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Score one feature vector
pub async fn predict(client: &ApiClient, features: &[f64], format: OutputFormat) -> Result<()> {
    let result = client.predict(features).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            println!("Prediction:     {}", format_prediction(&result.prediction).cyan());
            println!("Model Version:  {}", result.model_version);
        }
    }

    Ok(())
}

/// Show gateway health
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            print_heading("Gateway Health", 50);
            println!("Status:            {}", color_status(&health.status));
            println!("Model Loaded:      {}", color_bool(health.model_loaded));
            println!("Model Dir Exists:  {}", color_bool(health.model_dir_exists));
            println!("Feature Dim:       {}", health.feature_dim);
            println!(
                "Model Version:     {}",
                health.model_version.as_deref().unwrap_or("-")
            );
            println!(
                "Model Path:        {}",
                health.model_path.as_deref().unwrap_or("-")
            );
            if let Some(checksum) = &health.model_checksum {
                println!("Checksum:          {}", &checksum[..checksum.len().min(16)]);
            }
            println!("Checked At:        {}", format_timestamp(&health.timestamp));

            if !health.model_loaded {
                println!();
                print_warning(
                    "No model is loaded; /predict will answer 503 until a retrain succeeds",
                );
            }

            if !health.components.is_empty() {
                let mut rows: Vec<ComponentRow> = health
                    .components
                    .iter()
                    .map(|(name, c)| ComponentRow {
                        name: name.clone(),
                        status: color_status(&c.status),
                        message: c.message.clone().unwrap_or_default(),
                    })
                    .collect();
                rows.sort_by(|a, b| a.name.cmp(&b.name));

                println!();
                let table = tabled::Table::new(rows)
                    .with(tabled::settings::Style::rounded())
                    .to_string();
                println!("{}", table);
            }
        }
    }

    Ok(())
}
