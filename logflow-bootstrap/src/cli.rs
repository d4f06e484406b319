// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface Module
//!
//! Bootstrap-layer CLI handling with security-first design.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  1. parser::parse_cli()             │  Parse CLI with clap
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  2. validate_cli()                  │  Security validation
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  3. ValidatedCli                    │  Safe, validated config
//! └─────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `parser` - CLI structure and clap parsing
//! - `validator` - Security validation layer

pub mod parser;
pub mod validator;

pub use parser::{parse_cli, Cli, Commands};
pub use validator::{ParseError, SecureArgParser};

use std::path::PathBuf;

/// Validated CLI configuration. All paths that must already exist have
/// been canonicalized; all numeric values are range-checked.
#[derive(Debug, Clone)]
pub struct ValidatedCli {
    pub command: ValidatedCommand,
    pub verbose: bool,
    pub config: Option<PathBuf>,
    pub worker_threads: Option<usize>,
    pub channel_depth: usize,
}

/// Validated command variants, one per `logflow` subcommand.
#[derive(Debug, Clone)]
pub enum ValidatedCommand {
    Run {
        config: Option<PathBuf>,
        store: PathBuf,
        durability: Option<String>,
    },
    ValidateConfig {
        config: PathBuf,
    },
    Inspect {
        store: PathBuf,
        tag: Option<String>,
        level: Option<String>,
        count: usize,
    },
    Stats {
        store: PathBuf,
    },
    Prune {
        store: PathBuf,
        max_count: Option<i64>,
        max_age_days: Option<u64>,
        reset_ids: bool,
    },
}

/// Parses CLI arguments with clap, then applies security validation.
///
/// # Errors
/// Returns `ParseError` if any value fails validation.
pub fn parse_and_validate() -> Result<ValidatedCli, ParseError> {
    let cli = parse_cli();
    validate_cli(cli)
}

/// Applies security validation to already-parsed CLI arguments.
fn validate_cli(cli: Cli) -> Result<ValidatedCli, ParseError> {
    let config = if let Some(ref path) = cli.config {
        Some(SecureArgParser::validate_path(&path.to_string_lossy())?)
    } else {
        None
    };

    if cli.channel_depth == 0 {
        return Err(ParseError::InvalidValue {
            arg: "channel-depth".to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }

    if let Some(threads) = cli.worker_threads {
        SecureArgParser::validate_range("worker-threads", threads, 1, 1024)?;
    }

    let command = match cli.command {
        Commands::Run { config, store, durability } => {
            let validated_config = config
                .as_ref()
                .map(|p| SecureArgParser::validate_path(&p.to_string_lossy()))
                .transpose()?;
            let validated_store = SecureArgParser::validate_new_path(&store.to_string_lossy())?;

            ValidatedCommand::Run {
                config: validated_config,
                store: validated_store,
                durability,
            }
        }
        Commands::ValidateConfig { config } => {
            let validated_config = SecureArgParser::validate_path(&config.to_string_lossy())?;
            ValidatedCommand::ValidateConfig { config: validated_config }
        }
        Commands::Inspect { store, tag, level, count } => {
            let validated_store = SecureArgParser::validate_path(&store.to_string_lossy())?;

            if let Some(ref t) = tag {
                SecureArgParser::validate_argument(t)?;
            }
            if let Some(ref l) = level {
                SecureArgParser::validate_argument(l)?;
            }
            let validated_count = SecureArgParser::validate_range("count", count, 1, 1_000_000)?;

            ValidatedCommand::Inspect {
                store: validated_store,
                tag,
                level,
                count: validated_count,
            }
        }
        Commands::Stats { store } => {
            let validated_store = SecureArgParser::validate_path(&store.to_string_lossy())?;
            ValidatedCommand::Stats { store: validated_store }
        }
        Commands::Prune {
            store,
            max_count,
            max_age_days,
            reset_ids,
        } => {
            let validated_store = SecureArgParser::validate_path(&store.to_string_lossy())?;

            if let Some(n) = max_count {
                if n < 0 {
                    return Err(ParseError::InvalidValue {
                        arg: "max-count".to_string(),
                        reason: "must not be negative".to_string(),
                    });
                }
            }

            ValidatedCommand::Prune {
                store: validated_store,
                max_count,
                max_age_days,
                reset_ids,
            }
        }
    };

    Ok(ValidatedCli {
        command,
        verbose: cli.verbose,
        config,
        worker_threads: cli.worker_threads,
        channel_depth: cli.channel_depth,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_channel_depth() {
        let cli = Cli {
            command: Commands::Stats {
                store: PathBuf::from("/tmp/does-not-exist.db"),
            },
            verbose: false,
            config: None,
            worker_threads: None,
            channel_depth: 0,
        };
        assert!(matches!(validate_cli(cli), Err(ParseError::InvalidValue { .. })));
    }

    #[test]
    fn rejects_out_of_range_worker_threads() {
        let cli = Cli {
            command: Commands::Stats {
                store: PathBuf::from("/tmp/does-not-exist.db"),
            },
            verbose: false,
            config: None,
            worker_threads: Some(99_999),
            channel_depth: 1024,
        };
        assert!(matches!(validate_cli(cli), Err(ParseError::InvalidValue { .. })));
    }

    #[test]
    fn run_accepts_a_store_path_that_does_not_exist_yet() {
        let cli = Cli {
            command: Commands::Run {
                config: None,
                store: PathBuf::from("/tmp/logflow-cli-test-new-store.db"),
                durability: Some("fast".to_string()),
            },
            verbose: false,
            config: None,
            worker_threads: None,
            channel_depth: 1024,
        };
        let validated = validate_cli(cli).expect("run with a fresh store path should validate");
        match validated.command {
            ValidatedCommand::Run { durability, .. } => assert_eq!(durability.as_deref(), Some("fast")),
            other => panic!("expected Run, got {other:?}"),
        }
    }
}
