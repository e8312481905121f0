//! ML Analytics CLI
//!
//! A command-line tool for training and validating the analytics models
//! and checking on the service that hosts them.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use commands::{models, status};

/// ML Analytics CLI
#[derive(Parser)]
#[command(name = "mla")]
#[command(author, version, about = "CLI for the ML Analytics Service", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via MLA_API_URL env var)
    #[arg(long, env = "MLA_API_URL", default_value = "http://localhost:5001")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Model kinds served by the analytics service
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelArg {
    Forecaster,
    Anomaly,
    Recommender,
}

impl ModelArg {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelArg::Forecaster => "forecaster",
            ModelArg::Anomaly => "anomaly",
            ModelArg::Recommender => "recommender",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train a model on the training partition and persist it
    Train {
        /// Model to train
        #[arg(value_enum)]
        model: ModelArg,
    },

    /// Validate a persisted model against the test partition
    Validate {
        /// Model to validate
        #[arg(value_enum)]
        model: ModelArg,

        /// Maximum number of detail rows to print in table mode
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Check that the telemetry source is reachable and populated
    Probe,

    /// Show service health and readiness
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let client = client::ApiClient::new(&cli.api_url)?;

    if cli.verbose {
        output::print_info(&format!("Using API endpoint {}", cli.api_url));
    }

    match cli.command {
        Commands::Train { model } => models::train(&client, model, cli.format).await,
        Commands::Validate { model, limit } => {
            models::validate(&client, model, limit, cli.format).await
        }
        Commands::Probe => status::probe(&client, cli.format).await,
        Commands::Health => status::health(&client, cli.format).await,
    }
}
