// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # CLI Parser
//!
//! Command-line interface structure using clap. Security validation happens
//! afterward, in `validator`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Main CLI structure
#[derive(Parser, Debug, Clone)]
#[command(name = "logflow")]
#[command(about = concat!("In-process structured logging pipeline v", env!("CARGO_PKG_VERSION")))]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Pipeline graph + stage settings file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override worker thread count for the tokio runtime
    ///
    /// Default: number of logical CPUs.
    #[arg(long)]
    pub worker_threads: Option<usize>,

    /// Bounded queue depth for async stages when not overridden per-stage
    /// by the settings file.
    ///
    /// Controls backpressure between a sync producer and an async stage's
    /// dedicated worker thread.
    #[arg(long, default_value = "1024")]
    pub channel_depth: usize,
}

/// CLI subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the pipeline and run until a termination signal arrives
    Run {
        /// Pipeline graph + stage settings file (TOML); overrides --config
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Indexed log store file path
        #[arg(short, long)]
        store: PathBuf,

        /// Durability mode for the store: "robust" (fsync every commit) or
        /// "fast" (batched commits, WAL)
        #[arg(long, value_parser = parse_durability_mode)]
        durability: Option<String>,
    },

    /// Validate a pipeline graph + stage settings file without running it
    ValidateConfig {
        /// Pipeline graph + stage settings file (TOML)
        config: PathBuf,
    },

    /// Inspect records already written to a store
    Inspect {
        /// Indexed log store file path
        #[arg(short, long)]
        store: PathBuf,

        /// Only show records carrying this tag
        #[arg(long)]
        tag: Option<String>,

        /// Only show records at or above this level (e.g. warn, error)
        #[arg(long)]
        level: Option<String>,

        /// Number of most recent records to show
        #[arg(long, default_value = "50")]
        count: usize,
    },

    /// Print the store's record count and id range without dumping records
    Stats {
        /// Indexed log store file path
        #[arg(short, long)]
        store: PathBuf,
    },

    /// Force a prune cycle against a store
    Prune {
        /// Indexed log store file path
        #[arg(short, long)]
        store: PathBuf,

        /// Maximum number of records to retain
        #[arg(long)]
        max_count: Option<i64>,

        /// Maximum record age to retain, in days
        #[arg(long)]
        max_age_days: Option<u64>,

        /// Also reset the id counter (only valid when the prune would
        /// empty the store entirely)
        #[arg(long)]
        reset_ids: bool,
    },
}

/// Validates a `--durability` argument at parse time so a typo surfaces
/// immediately instead of after the store is opened.
fn parse_durability_mode(s: &str) -> Result<String, String> {
    match s.to_lowercase().as_str() {
        "robust" | "fast" => Ok(s.to_lowercase()),
        _ => Err(format!("invalid durability mode '{s}'. Valid options: robust, fast")),
    }
}

/// Parses CLI arguments via clap.
///
/// # Panics
/// Clap exits the process with a usage message if parsing fails, or prints
/// `--help`/`--version` and exits, per its normal behavior.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_durability_mode_accepts_known_values() {
        assert_eq!(parse_durability_mode("robust").unwrap(), "robust");
        assert_eq!(parse_durability_mode("FAST").unwrap(), "fast");
    }

    #[test]
    fn parse_durability_mode_rejects_unknown_values() {
        assert!(parse_durability_mode("eventual").is_err());
    }

    #[test]
    fn cli_parses_run_subcommand() {
        let cli = Cli::parse_from(["logflow", "run", "--store", "log.db"]);
        match cli.command {
            Commands::Run { store, .. } => assert_eq!(store, PathBuf::from("log.db")),
            other => panic!("expected Run, got {other:?}"),
        }
    }
}
