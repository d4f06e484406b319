// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bootstrap Configuration
//!
//! `AppConfig` holds the bootstrap-phase knobs derived from the CLI and
//! environment, before the pipeline graph itself is loaded. The pipeline
//! graph, stage settings, and store durability mode live in
//! `logflow::infrastructure::config` — this structure only covers what the
//! process needs before it can even find that file: where it lives, how
//! verbose to be, and how long to wait during shutdown.
//!
//! ## Immutability
//!
//! `AppConfig` is immutable once built, so it can be shared across tasks
//! without synchronization.

use std::path::PathBuf;
use std::time::Duration;

/// Log level configuration, mapped onto `tracing::Level` at logger
/// construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl LogLevel {
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Bootstrap-phase application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    app_name: String,
    log_level: LogLevel,
    /// Path to the pipeline graph + stage settings TOML file.
    config_path: Option<PathBuf>,
    /// Path to the indexed log store file.
    store_path: Option<PathBuf>,
    /// Worker thread count for the tokio runtime (None = automatic).
    worker_threads: Option<usize>,
    verbose: bool,
    /// Grace period granted to stages during shutdown before the process
    /// gives up waiting and exits anyway.
    shutdown_grace_period: Duration,
}

impl AppConfig {
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn config_path(&self) -> Option<&PathBuf> {
        self.config_path.as_ref()
    }

    pub fn store_path(&self) -> Option<&PathBuf> {
        self.store_path.as_ref()
    }

    pub fn worker_threads(&self) -> Option<usize> {
        self.worker_threads
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn shutdown_grace_period(&self) -> Duration {
        self.shutdown_grace_period
    }
}

/// Builder for [`AppConfig`].
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    app_name: Option<String>,
    log_level: Option<LogLevel>,
    config_path: Option<PathBuf>,
    store_path: Option<PathBuf>,
    worker_threads: Option<usize>,
    verbose: bool,
    shutdown_grace_period: Option<Duration>,
}

impl AppConfigBuilder {
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    pub fn worker_threads(mut self, count: usize) -> Self {
        self.worker_threads = Some(count);
        self
    }

    pub fn verbose(mut self, enabled: bool) -> Self {
        self.verbose = enabled;
        self
    }

    pub fn shutdown_grace_period(mut self, period: Duration) -> Self {
        self.shutdown_grace_period = Some(period);
        self
    }

    /// Builds the configuration.
    ///
    /// # Panics
    /// Panics if `app_name` was not set.
    pub fn build(self) -> AppConfig {
        self.try_build().expect("app_name is required")
    }

    /// Fallible counterpart to [`AppConfigBuilder::build`].
    pub fn try_build(self) -> Result<AppConfig, String> {
        Ok(AppConfig {
            app_name: self.app_name.ok_or("app_name is required")?,
            log_level: self.log_level.unwrap_or_default(),
            config_path: self.config_path,
            store_path: self.store_path,
            worker_threads: self.worker_threads,
            verbose: self.verbose,
            shutdown_grace_period: self
                .shutdown_grace_period
                .unwrap_or_else(|| Duration::from_secs(crate::shutdown::DEFAULT_GRACE_PERIOD_SECS)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_minimal_applies_defaults() {
        let config = AppConfig::builder().app_name("logflow").build();

        assert_eq!(config.app_name(), "logflow");
        assert_eq!(config.log_level(), LogLevel::Info);
        assert!(config.config_path().is_none());
        assert!(config.store_path().is_none());
        assert!(config.worker_threads().is_none());
        assert!(!config.is_verbose());
        assert_eq!(config.shutdown_grace_period(), Duration::from_secs(5));
    }

    #[test]
    fn builder_full_round_trips_every_field() {
        let config = AppConfig::builder()
            .app_name("logflow")
            .log_level(LogLevel::Debug)
            .config_path("/etc/logflow/pipeline.toml")
            .store_path("/var/lib/logflow/log.db")
            .worker_threads(4)
            .verbose(true)
            .shutdown_grace_period(Duration::from_secs(30))
            .build();

        assert_eq!(config.log_level(), LogLevel::Debug);
        assert_eq!(
            config.config_path(),
            Some(&PathBuf::from("/etc/logflow/pipeline.toml"))
        );
        assert_eq!(config.store_path(), Some(&PathBuf::from("/var/lib/logflow/log.db")));
        assert_eq!(config.worker_threads(), Some(4));
        assert!(config.is_verbose());
        assert_eq!(config.shutdown_grace_period(), Duration::from_secs(30));
    }

    #[test]
    #[should_panic(expected = "app_name is required")]
    fn build_without_app_name_panics() {
        AppConfig::builder().build();
    }

    #[test]
    fn try_build_without_app_name_errs() {
        let result = AppConfig::builder().try_build();
        assert_eq!(result.unwrap_err(), "app_name is required");
    }

    #[test]
    fn log_level_maps_onto_tracing_level() {
        assert_eq!(LogLevel::Error.to_tracing_level(), tracing::Level::ERROR);
        assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
    }
}
