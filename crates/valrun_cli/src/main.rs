//! Valrun CLI - Command Line Operations for Valuation Runs
//!
//! This is the operational entry point for running valuations without a
//! server: it hosts the whole engine in-process over the in-memory store.
//!
//! # Commands
//!
//! - `valrun run --market <file> --positions <file>` - Execute a valuation run
//! - `valrun demo` - Run a synthetic end-to-end demonstration
//! - `valrun check` - Check capabilities and configuration

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod error;

pub use error::{CliError, Result};

/// Valrun valuation engine CLI
#[derive(Parser)]
#[command(name = "valrun")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a valuation run over snapshot files
    Run {
        /// Path to the market snapshot file (JSON)
        #[arg(short, long)]
        market: String,

        /// Path to the position snapshot file (JSON)
        #[arg(short, long)]
        positions: String,

        /// Path to a scenario catalog file (JSON array of definitions)
        #[arg(short, long)]
        scenarios: Option<String>,

        /// Scenario ids to value under (defaults to BASE)
        #[arg(long = "scenario", value_name = "ID")]
        scenario_ids: Vec<String>,

        /// Measures to compute
        #[arg(long = "measure", value_name = "NAME", default_values = ["PV"])]
        measures: Vec<String>,

        /// Number of in-process workers
        #[arg(short, long, default_value = "4")]
        workers: u32,
    },

    /// Run a synthetic end-to-end demonstration
    Demo {
        /// Number of synthetic positions
        #[arg(short, long, default_value = "10")]
        positions: usize,
    },

    /// Check capabilities and configuration
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    match cli.command {
        Commands::Run {
            market,
            positions,
            scenarios,
            scenario_ids,
            measures,
            workers,
        } => {
            commands::run::run(
                &market,
                &positions,
                scenarios.as_deref(),
                &scenario_ids,
                &measures,
                workers,
            )
            .await
        }
        Commands::Demo { positions } => commands::demo::run(positions).await,
        Commands::Check => commands::check::run(),
    }
}
