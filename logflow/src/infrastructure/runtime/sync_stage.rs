// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Sync Stage Runtime (§4.F)
//!
//! A sync stage runs on the producer thread with no suspension point:
//! `process_sync` returns a [`SyncOutcome`] that decides whether the record
//! continues to the stage's downstream links. Because there is no worker to
//! absorb latency, a sync stage must never block on I/O that could starve a
//! producer — durable writers belong in [`super::async_stage`] instead.

use logflow_domain::entities::record::PooledRecord;
use logflow_domain::error::PipelineError;
use logflow_domain::settings::proxy::SettingsProxy;

/// What `process_sync` decided for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Deliver the record to every downstream link.
    Forward,
    /// Consume the record here; downstream stages do not see it.
    Stop,
}

/// The contract a sync-stage adapter implements (console writer, the
/// splitter). Driven on the producer thread by
/// [`super::pipeline_runtime::RunningPipeline`].
pub trait SyncStageProcessor: Send + Sync {
    /// Called once, while the stage is `Initializing`, with its bound
    /// settings proxy. The default does nothing.
    fn on_initialize(&self, _settings: &SettingsProxy) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Processes one record on the calling (producer) thread.
    fn process_sync(&self, record: &PooledRecord) -> Result<SyncOutcome, PipelineError>;

    /// Called once while the stage is `ShuttingDown`. Must not fail in a
    /// way that aborts the shutdown walk (§4.E: "`onShutdown` must not
    /// throw") — an implementation that cannot clean up reports the
    /// failure to the system logger itself rather than returning `Err`.
    fn on_shutdown(&self) -> Result<(), PipelineError> {
        Ok(())
    }
}
