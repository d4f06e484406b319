// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # logflow
//!
//! Infrastructure layer for the `logflow` in-process structured logging
//! subsystem: the concurrent pipeline runtime, the SQLite-backed indexed
//! record store, the paged cache, and the filtered view. Builds on the
//! pure types and ports exposed by `logflow_domain`; has no knowledge of
//! CLI parsing, signal handling, or process lifecycle — those sit one
//! layer out, in `logflow-bootstrap`.
//!
//! ## Module Structure
//!
//! - [`infrastructure::runtime`] — the pipeline graph's lifecycle
//!   orchestration (§4.E), the sync stage contract (§4.F), and the
//!   dedicated-worker async stage runtime (§4.G).
//! - [`infrastructure::adapters`] — the concrete stages a pipeline is built
//!   from: the fan-out splitter, the console and text-file writers, the
//!   store-writer terminal stage, and the log-service/search-cluster
//!   forwarders.
//! - [`infrastructure::repositories`] — the store access engine (§4.H/§4.I)
//!   implementing `logflow_domain::RecordStore` against SQLite.
//! - [`infrastructure::cache`] — the bounded read-through page cache
//!   fronting a store for viewer scroll ranges (§4.J).
//! - [`infrastructure::view`] — the observable filtered projection with
//!   overview facets (§4.K).
//! - [`infrastructure::config`] — the pipeline graph TOML and the
//!   plain-text stage-settings file, including its change-watching task
//!   (§6).
//! - [`infrastructure::metrics`] — the `prometheus` gauges and counters
//!   the runtime and the store engine publish.

pub mod infrastructure;

pub use logflow_domain::{
    InternTable, Level, LevelSelector, NewRecord, Pipeline, PipelineError, PooledRecord, Record, RecordId,
    RecordPool, RecordRow, RecordStore, SettingConverter, SettingType, SettingValue, Stage, StageState, TagSet,
};

pub use infrastructure::adapters::splitter::Splitter;
pub use infrastructure::cache::PagedCache;
pub use infrastructure::repositories::{DurabilityMode, SqliteRecordStore, StorePurpose};
pub use infrastructure::runtime::async_stage::{AsyncStage, AsyncStageProcessor};
pub use infrastructure::runtime::pipeline_runtime::RunningPipeline;
pub use infrastructure::runtime::sync_stage::SyncStageProcessor;
pub use infrastructure::view::FilteredView;
