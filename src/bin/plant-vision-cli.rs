// src/bin/plant-vision-cli.rs
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use plant_vision::client::{AnalysisClient, ClientOutcome};
use plant_vision::config::AppConfig;
use plant_vision::models::HistorySummary;
use plant_vision::services::{HistoryStore, SupabaseStore};

#[derive(Parser)]
#[command(name = "plant-vision-cli", version, about = "Diagnose plant diseases from photos")]
struct Cli {
    /// Analysis endpoint (defaults to PLANT_VISION_ENDPOINT or the hosted function)
    #[arg(long, env = "PLANT_VISION_ENDPOINT", global = true)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a plant photo
    Analyze {
        file: PathBuf,
        /// Do not record the detection in history
        #[arg(long)]
        no_save: bool,
        /// Print the result as JSON instead of a report
        #[arg(long)]
        json: bool,
    },
    /// List recent detections
    History {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Severity breakdown of recent detections
    Summary,
    /// Delete a detection from history
    Delete { id: Uuid },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("warn"));

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(endpoint) = cli.endpoint {
        config.client.endpoint_url = endpoint;
    }

    let store = config
        .store
        .clone()
        .map(|store| Arc::new(SupabaseStore::new(store)) as Arc<dyn HistoryStore>);

    match cli.command {
        Command::Analyze { file, no_save, json } => {
            let image = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let client = AnalysisClient::new(config.client, if no_save { None } else { store });
            let outcome = client.analyze_and_save(&image).await;

            eprintln!("{}", outcome.notice());
            match &outcome {
                ClientOutcome::Analyzed(result)
                | ClientOutcome::Inconclusive(result)
                | ClientOutcome::Failed(result) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(result)?);
                    } else {
                        print!("{}", result.report());
                    }
                }
                ClientOutcome::Rejected { .. } | ClientOutcome::InProgress => {
                    std::process::exit(2);
                }
            }
        }
        Command::History { limit } => {
            if let Some(limit) = limit {
                config.client.history_limit = limit;
            }
            let client = AnalysisClient::new(config.client, store);
            let records = client.history().await;
            if records.is_empty() {
                println!("No detections yet");
            }
            for record in records {
                println!(
                    "{}  {}  {:<6}  {:>3}%  {}",
                    record.id,
                    record.created_at.format("%Y-%m-%d %H:%M"),
                    record.severity,
                    record.confidence,
                    record.disease
                );
            }
        }
        Command::Summary => {
            let client = AnalysisClient::new(config.client, store);
            let summary = HistorySummary::from_records(&client.history().await);
            println!("Total scans: {}", summary.total);
            println!("Low risk:    {}", summary.low);
            println!("Medium risk: {}", summary.medium);
            println!("High risk:   {}", summary.high);
            if let Some(latest) = summary.most_recent {
                println!("Most recent scan: {}", latest.format("%Y-%m-%d"));
            }
        }
        Command::Delete { id } => {
            let client = AnalysisClient::new(config.client, store);
            if client.delete(&id).await {
                println!("Deleted {}", id);
            } else {
                eprintln!("Could not delete {}", id);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
