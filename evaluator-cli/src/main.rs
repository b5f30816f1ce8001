// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Evaluator CLI
//!
//! Benchmarks a served model across EC2 instance types and reports the
//! latency and cost per inference of each.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod aws;
mod commands;
mod http;

/// Evaluator - inference latency and cost across cloud instance types
#[derive(Parser)]
#[command(name = "evaluator")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "evaluator.yaml")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Benchmark every configured instance type once
    Run {
        /// Instance types to test, in order (overrides the config file)
        #[arg(long, num_args = 1..)]
        instances: Option<Vec<String>>,

        /// Number of inference runs per instance (overrides the config file)
        #[arg(long)]
        runs: Option<u32>,

        /// Directory for the JSON report
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Path of the SVG comparison chart
        #[arg(long)]
        chart: Option<PathBuf>,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: String,
    },

    /// List the configured price table
    Prices,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Dispatch to command handlers
    match cli.command {
        Commands::Run {
            instances,
            runs,
            output,
            chart,
        } => {
            let options = commands::run::RunOptions {
                instances,
                runs,
                output,
                chart,
            };
            if !commands::run::execute(&cli.config, options).await? {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Validate { file } => commands::validate::execute(&file).await,
        Commands::Prices => commands::prices::execute(&cli.config).await,
    }
}
