// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # logflow Domain
//!
//! Pure business logic for the logflow structured logging subsystem. This
//! crate has no knowledge of SQLite, tokio, tracing, or any transport — it
//! defines the shapes (records, tags, settings, pipeline graph) and the
//! ports (`RecordStore`) that the infrastructure crate implements.
//!
//! ## Module Structure
//!
//! - [`entities`] — the pooled [`entities::record::Record`] and the
//!   [`entities::stage::Stage`] node.
//! - [`value_objects`] — [`value_objects::tag::TagSet`],
//!   [`value_objects::level::Level`], identifiers, and setting values.
//! - [`aggregates`] — [`aggregates::pipeline::Pipeline`], the DAG of stages.
//! - [`settings`] — the stage-settings registry and its rebindable proxy.
//! - [`services`] — [`services::intern::InternTable`], the process-wide
//!   string interner.
//! - [`events`] — domain events raised by settings changes and pipeline
//!   lifecycle transitions.
//! - [`repositories`] — the [`repositories::record_store::RecordStore`] port
//!   implemented by the infrastructure crate's SQLite engine.
//! - [`error`] — [`error::PipelineError`], the single error type shared by
//!   every layer.

pub mod aggregates;
pub mod entities;
pub mod error;
pub mod events;
pub mod repositories;
pub mod services;
pub mod settings;
pub mod value_objects;

pub use aggregates::Pipeline;
pub use entities::record::{PooledRecord, Record, RecordPool};
pub use entities::stage::{Stage, StageState};
pub use error::PipelineError;
pub use events::*;
pub use repositories::record_store::{NewRecord, RecordRow, RecordStore};
pub use services::intern::InternTable;
pub use value_objects::ids::{PipelineId, RecordId};
pub use value_objects::level::{Level, LevelSelector};
pub use value_objects::setting_value::{SettingConverter, SettingType, SettingValue};
pub use value_objects::tag::TagSet;
