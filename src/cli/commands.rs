use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::simulate::{run_simulation, SimulationPlan};
use crate::config::KeiroConfig;
use crate::pool::PoolStrategy;

/// Command-line interface for keiro
///
/// Runs the worker pool against a built-in set of demo routes and inspects
/// the effective configuration.
#[derive(Debug, Parser)]
#[command(name = "keiro")]
#[command(about = "Worker-pool request dispatch", long_about = None)]
pub struct Cli {
    /// TOML configuration file, layered under `KEIRO_*` environment variables
    #[arg(short, long, global = true, env = "KEIRO_CONFIG")]
    pub config: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Drive a pool with generated traffic and print outcome counts and pool metrics
    Simulate {
        /// Pool strategy, overriding the configuration
        #[arg(long)]
        strategy: Option<PoolStrategy>,

        /// Worker count (fixed) or minimum idle workers (dynamic)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Total number of requests to send
        #[arg(short = 'n', long, default_value_t = 1000)]
        requests: usize,

        /// Number of caller coroutines sending requests at once
        #[arg(short = 'j', long, default_value_t = 8)]
        concurrency: usize,

        /// Size in bytes of each streamed response
        #[arg(long, default_value_t = 64 * 1024)]
        blob_size: usize,
    },
    /// Print the effective configuration as JSON
    Config,
}

/// Execute `cli` against an already loaded configuration.
pub fn run_cli(cli: Cli, mut config: KeiroConfig) -> anyhow::Result<()> {
    match cli.command {
        Commands::Simulate {
            strategy,
            workers,
            requests,
            concurrency,
            blob_size,
        } => {
            if let Some(strategy) = strategy {
                config.pool.strategy = strategy;
            }
            if let Some(workers) = workers {
                config.pool.workers = workers;
            }
            let plan = SimulationPlan {
                requests,
                concurrency: concurrency.max(1),
                blob_size,
            };
            let report = run_simulation(&config.pool, &plan)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
