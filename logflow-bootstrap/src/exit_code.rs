// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Exit Code Management
//!
//! Provides standardized Unix exit codes following BSD `sysexits.h` conventions.
//!
//! ## Exit Code Conventions
//!
//! - **0**: Success
//! - **1**: General error
//! - **2**: Misuse of shell command (reserved by Bash)
//! - **64-78**: Specific error conditions (BSD sysexits.h)
//! - **126**: Command cannot execute
//! - **127**: Command not found
//! - **128+N**: Fatal signal N (e.g., 130 = SIGINT)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use logflow_bootstrap::exit_code::{result_to_exit_code};
//!
//! fn run_application() -> anyhow::Result<()> {
//!     Ok(())
//! }
//!
//! fn main() -> std::process::ExitCode {
//!     result_to_exit_code(run_application())
//! }
//! ```

use std::fmt;

/// Exit codes following Unix conventions (BSD sysexits.h)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful termination (0)
    #[default]
    Success = 0,

    /// General error (1)
    Error = 1,

    /// Command line usage error (64)
    UsageError = 64,

    /// Data format error (65)
    /// - Invalid input data, malformed configuration value, parse failure
    DataError = 65,

    /// Cannot open input (66)
    NoInput = 66,

    /// User does not exist (67)
    NoUser = 67,

    /// Host name unknown (68)
    NoHost = 68,

    /// Service unavailable (69)
    /// - A forwarder's downstream transport (log service, search cluster) is unreachable
    Unavailable = 69,

    /// Internal software error (70)
    Software = 70,

    /// System error (71)
    OsError = 71,

    /// Critical OS file missing (72)
    /// - The store file is missing or its directory does not exist
    OsFile = 72,

    /// Cannot create output file (73)
    CantCreate = 73,

    /// I/O error (74)
    /// - Store write/read failure, truncated file
    IoError = 74,

    /// Temporary failure, retry (75)
    TempFail = 75,

    /// Remote error in protocol (76)
    Protocol = 76,

    /// Permission denied (77)
    NoPerm = 77,

    /// Configuration error (78)
    /// - Invalid pipeline graph, unresolvable stage link, a setting fails its converter
    Config = 78,

    /// Interrupted by signal (SIGINT - Ctrl+C) (130)
    Interrupted = 130,

    /// Terminated by signal (SIGTERM) (143)
    Terminated = 143,
}

impl ExitCode {
    /// Convert to i32 for use with std::process::exit
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Maps a [`logflow_domain::PipelineError`] category string (from
    /// `PipelineError::category()`) to the exit code an operator's shell
    /// script should see. Kept string-keyed rather than depending on
    /// `logflow-domain` directly, since bootstrap sits below the domain
    /// crate in the dependency graph.
    pub fn from_category(category: &str) -> Self {
        match category {
            "config" | "invalid_configuration" | "version_not_supported" => ExitCode::Config,
            "stage_busy" => ExitCode::TempFail,
            "store_format" | "migration_required" => ExitCode::DataError,
            "file_too_large" => ExitCode::DataError,
            "write_failed" | "read_failed" | "io" => ExitCode::IoError,
            "transport" => ExitCode::Unavailable,
            "cancelled" => ExitCode::Interrupted,
            "not_found" => ExitCode::NoInput,
            "usage" => ExitCode::UsageError,
            "serialization" => ExitCode::DataError,
            _ => ExitCode::Software,
        }
    }

    /// Create ExitCode from an arbitrary error via pattern matching on its
    /// rendered message. Used for errors that never pass through
    /// `PipelineError` (CLI parsing, platform errors) and therefore have no
    /// `category()` to key off of.
    pub fn from_error(error: &dyn std::error::Error) -> Self {
        let error_string = error.to_string().to_lowercase();

        if error_string.contains("permission") || error_string.contains("access denied") {
            ExitCode::NoPerm
        } else if error_string.contains("not found") || error_string.contains("no such") {
            ExitCode::NoInput
        } else if error_string.contains("invalid") || error_string.contains("argument") {
            ExitCode::UsageError
        } else if error_string.contains("parse") || error_string.contains("format") {
            ExitCode::DataError
        } else if error_string.contains("io") || error_string.contains("read") || error_string.contains("write") {
            ExitCode::IoError
        } else if error_string.contains("config") {
            ExitCode::Config
        } else if error_string.contains("unavailable") || error_string.contains("not available") {
            ExitCode::Unavailable
        } else {
            ExitCode::Error
        }
    }

    /// Get human-readable description of exit code
    pub fn description(self) -> &'static str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::Error => "General error",
            ExitCode::UsageError => "Command line usage error",
            ExitCode::DataError => "Data format error",
            ExitCode::NoInput => "Cannot open input",
            ExitCode::NoUser => "User does not exist",
            ExitCode::NoHost => "Host name unknown",
            ExitCode::Unavailable => "Service unavailable",
            ExitCode::Software => "Internal software error",
            ExitCode::OsError => "System error",
            ExitCode::OsFile => "Critical OS file missing",
            ExitCode::CantCreate => "Cannot create output file",
            ExitCode::IoError => "I/O error",
            ExitCode::TempFail => "Temporary failure, retry",
            ExitCode::Protocol => "Remote error in protocol",
            ExitCode::NoPerm => "Permission denied",
            ExitCode::Config => "Configuration error",
            ExitCode::Interrupted => "Interrupted by signal (SIGINT)",
            ExitCode::Terminated => "Terminated by signal (SIGTERM)",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Success)
    }

    pub fn is_error(self) -> bool {
        !self.is_success()
    }

    pub fn is_signal(self) -> bool {
        matches!(self, ExitCode::Interrupted | ExitCode::Terminated)
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_i32())
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code.as_i32()
    }
}

/// Maps a boxed [`anyhow::Error`] to an [`ExitCode`]. If the error's chain
/// contains a `category()`-bearing string (the convention `logflow`'s
/// application layer uses when it wraps a `PipelineError` with
/// `.context("category:<name>")`), that takes precedence; otherwise falls
/// back to message sniffing via [`ExitCode::from_error`].
pub fn map_error_to_exit_code(error: &anyhow::Error) -> ExitCode {
    for cause in error.chain() {
        let text = cause.to_string();
        if let Some(category) = text.strip_prefix("category:") {
            return ExitCode::from_category(category);
        }
    }
    match error.chain().next() {
        Some(root) => root
            .downcast_ref::<std::io::Error>()
            .map(|e| ExitCode::from_error(e))
            .unwrap_or(ExitCode::Error),
        None => ExitCode::Error,
    }
}

/// Converts an application result into a process exit code, logging the
/// error (if any) through `tracing` before returning.
pub fn result_to_exit_code<T>(result: anyhow::Result<T>) -> std::process::ExitCode {
    match result {
        Ok(_) => std::process::ExitCode::from(ExitCode::Success.as_i32() as u8),
        Err(err) => {
            let code = map_error_to_exit_code(&err);
            tracing::error!(exit_code = code.as_i32(), "{err:#}");
            std::process::ExitCode::from(code.as_i32() as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_values_match_sysexits() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::Error.as_i32(), 1);
        assert_eq!(ExitCode::UsageError.as_i32(), 64);
        assert_eq!(ExitCode::Config.as_i32(), 78);
        assert_eq!(ExitCode::Interrupted.as_i32(), 130);
        assert_eq!(ExitCode::Terminated.as_i32(), 143);
    }

    #[test]
    fn is_success_and_is_error_are_opposites() {
        assert!(ExitCode::Success.is_success());
        assert!(!ExitCode::Success.is_error());
        assert!(ExitCode::Error.is_error());
    }

    #[test]
    fn is_signal_only_for_interrupted_and_terminated() {
        assert!(ExitCode::Interrupted.is_signal());
        assert!(ExitCode::Terminated.is_signal());
        assert!(!ExitCode::Success.is_signal());
    }

    #[test]
    fn display_includes_description_and_code() {
        let display = format!("{}", ExitCode::UsageError);
        assert!(display.contains("Command line usage error"));
        assert!(display.contains("64"));
    }

    #[test]
    fn from_category_maps_known_categories() {
        assert_eq!(ExitCode::from_category("config"), ExitCode::Config);
        assert_eq!(ExitCode::from_category("stage_busy"), ExitCode::TempFail);
        assert_eq!(ExitCode::from_category("transport"), ExitCode::Unavailable);
        assert_eq!(ExitCode::from_category("bogus"), ExitCode::Software);
    }

    #[test]
    fn map_error_to_exit_code_reads_category_prefix() {
        let err = anyhow::anyhow!("category:config");
        assert_eq!(map_error_to_exit_code(&err), ExitCode::Config);
    }

    #[test]
    fn result_to_exit_code_success_path_does_not_panic() {
        // std::process::ExitCode does not implement PartialEq, so this only
        // exercises the Ok branch rather than comparing the result.
        let result: anyhow::Result<()> = Ok(());
        let _code = result_to_exit_code(result);
    }
}
