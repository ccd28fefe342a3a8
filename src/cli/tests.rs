//! Unit tests for CLI argument parsing

#![allow(clippy::unwrap_used, clippy::panic)]

use crate::cli::{Cli, Commands};
use crate::pool::PoolStrategy;
use clap::Parser;

#[test]
fn test_simulate_defaults() {
    let cli = Cli::try_parse_from(["keiro", "simulate"]).unwrap();
    assert!(cli.config.is_none());
    match cli.command {
        Commands::Simulate {
            strategy,
            workers,
            requests,
            concurrency,
            blob_size,
        } => {
            assert_eq!(strategy, None);
            assert_eq!(workers, None);
            assert_eq!(requests, 1000);
            assert_eq!(concurrency, 8);
            assert_eq!(blob_size, 64 * 1024);
        }
        other => panic!("Expected Simulate command, got {other:?}"),
    }
}

#[test]
fn test_simulate_overrides() {
    let cli = Cli::try_parse_from([
        "keiro",
        "simulate",
        "--strategy",
        "dynamic",
        "-w",
        "3",
        "-n",
        "50",
        "-j",
        "5",
    ])
    .unwrap();
    match cli.command {
        Commands::Simulate {
            strategy,
            workers,
            requests,
            concurrency,
            ..
        } => {
            assert_eq!(strategy, Some(PoolStrategy::Dynamic));
            assert_eq!(workers, Some(3));
            assert_eq!(requests, 50);
            assert_eq!(concurrency, 5);
        }
        other => panic!("Expected Simulate command, got {other:?}"),
    }
}

#[test]
fn test_unknown_strategy_is_rejected() {
    assert!(Cli::try_parse_from(["keiro", "simulate", "--strategy", "elastic"]).is_err());
}

#[test]
fn test_config_flag_is_global() {
    let cli = Cli::try_parse_from(["keiro", "config", "--config", "keiro.toml"]).unwrap();
    assert!(matches!(cli.command, Commands::Config));
    assert_eq!(cli.config.unwrap().to_string_lossy(), "keiro.toml");
}
