// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! A single, hierarchical error type for the logging subsystem. Errors are
//! categorized so callers can decide whether to retry, surface to a user, or
//! just log and move on.

use thiserror::Error;

/// Domain-specific errors for the logging pipeline.
///
/// Each variant carries enough context (an identifier plus a message) that a
/// caller can report something actionable without needing the underlying
/// cause.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// A setting's converter rejected a string value, or two callers
    /// registered the same setting with different defaults.
    #[error("config error for '{name}': {message}")]
    ConfigError { name: String, message: String },

    /// A stage's settings were mutated after it left the `Detached` state.
    #[error("stage '{0}' is attached and cannot be reconfigured")]
    StageBusyError(String),

    /// Duplicate stage name, or a link would introduce a cycle.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The file opened is not a recognized store (bad magic, wrong shape).
    #[error("store format error: {0}")]
    StoreFormatError(String),

    /// The file's schema version is newer than this build supports, or older
    /// than the oldest supported version.
    #[error("store schema version {found} is not supported (supported: {min}..={max})")]
    VersionNotSupported { found: u32, min: u32, max: u32 },

    /// The file's record count exceeds the maximum addressable id.
    #[error("store file too large: {record_count} records exceeds the maximum of {max}")]
    FileTooLarge { record_count: u64, max: u64 },

    /// The file requires a migration but was opened read-only.
    #[error("store at '{0}' requires migration but was opened read-only")]
    MigrationRequired(String),

    /// A write transaction failed and was rolled back.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// A read failed (corrupt row, missing text row, dangling dictionary ref).
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// A forwarder's I/O with a remote endpoint failed.
    #[error("transport error: {0}")]
    TransportError(String),

    /// A blocking operation observed the shutdown token fire.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// A record, pipeline, or stage lookup found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller tried to mutate a record after it was published to the
    /// pipeline, released a record it doesn't own, or double-released one.
    #[error("usage error: {0}")]
    UsageError(String),

    #[error("io error: {0}")]
    IoError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl PipelineError {
    pub fn config(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigError {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn write_failed(msg: impl Into<String>) -> Self {
        Self::WriteFailed(msg.into())
    }

    pub fn read_failed(msg: impl Into<String>) -> Self {
        Self::ReadFailed(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Whether retrying the same operation might succeed without operator
    /// intervention.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::TransportError(_) | PipelineError::IoError(_) | PipelineError::Cancelled(_)
        )
    }

    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::ConfigError { .. } => "config",
            PipelineError::StageBusyError(_) => "config",
            PipelineError::InvalidConfiguration(_) => "config",
            PipelineError::StoreFormatError(_) => "store",
            PipelineError::VersionNotSupported { .. } => "store",
            PipelineError::FileTooLarge { .. } => "store",
            PipelineError::MigrationRequired(_) => "store",
            PipelineError::WriteFailed(_) => "store",
            PipelineError::ReadFailed(_) => "store",
            PipelineError::TransportError(_) => "transport",
            PipelineError::Cancelled(_) => "cancellation",
            PipelineError::NotFound(_) => "lookup",
            PipelineError::UsageError(_) => "usage",
            PipelineError::IoError(_) => "io",
            PipelineError::SerializationError(_) => "serialization",
            PipelineError::InternalError(_) => "internal",
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_covers_every_variant() {
        let errs = vec![
            PipelineError::config("x", "y"),
            PipelineError::StageBusyError("s".into()),
            PipelineError::invalid_config("c"),
            PipelineError::StoreFormatError("f".into()),
            PipelineError::VersionNotSupported { found: 9, min: 1, max: 3 },
            PipelineError::FileTooLarge { record_count: 1, max: 0 },
            PipelineError::MigrationRequired("p".into()),
            PipelineError::write_failed("w"),
            PipelineError::read_failed("r"),
            PipelineError::TransportError("t".into()),
            PipelineError::Cancelled("c".into()),
            PipelineError::NotFound("n".into()),
            PipelineError::UsageError("u".into()),
            PipelineError::internal("i"),
        ];
        for e in errs {
            assert!(!e.category().is_empty());
        }
    }

    #[test]
    fn transport_and_io_are_recoverable() {
        assert!(PipelineError::TransportError("x".into()).is_recoverable());
        assert!(PipelineError::IoError("x".into()).is_recoverable());
        assert!(!PipelineError::UsageError("x".into()).is_recoverable());
    }
}
