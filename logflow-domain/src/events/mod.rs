// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Events
//!
//! The two event families this subsystem raises: a setting's `changed`
//! notification (§4.D) and a stage's lifecycle transition (§4.E/§4.G.5).
//! Both carry a UUID, an RFC3339 occurrence timestamp, and enough identity
//! that a subscriber can act without a second lookup — the same shape as
//! the donor workspace's `PipelineEvent`, scaled down to what this
//! subsystem actually emits (no processing/chunk/security event family,
//! since file processing is not part of this domain).

use crate::entities::stage::StageState;
use crate::value_objects::setting_value::SettingValue;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Common event metadata, mirrored on every variant below.
pub trait DomainEvent {
    fn event_id(&self) -> Uuid;
    fn occurred_at(&self) -> chrono::DateTime<chrono::Utc>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    SettingChanged(SettingChangedEvent),
    StageTransitioned(StageTransitionedEvent),
}

/// Raised whenever [`crate::settings::registry::SettingsStore::set`]
/// upserts a value, after subscribers have been dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingChangedEvent {
    pub event_id: Uuid,
    pub stage_name: String,
    pub setting_name: String,
    pub new_value: SettingValue,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
}

impl DomainEvent for SettingChangedEvent {
    fn event_id(&self) -> Uuid {
        self.event_id
    }
    fn occurred_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.occurred_at
    }
}

/// Raised on every legal [`crate::entities::stage::Stage::transition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTransitionedEvent {
    pub event_id: Uuid,
    pub stage_name: String,
    pub from: StageStateDto,
    pub to: StageStateDto,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
}

impl DomainEvent for StageTransitionedEvent {
    fn event_id(&self) -> Uuid {
        self.event_id
    }
    fn occurred_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.occurred_at
    }
}

/// `StageState` is `Copy`/`repr(u8)` for the atomic state field; events
/// need a serializable, independent copy rather than borrowing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStateDto {
    Detached,
    Initializing,
    Attached,
    ShuttingDown,
}

impl From<StageState> for StageStateDto {
    fn from(s: StageState) -> Self {
        match s {
            StageState::Detached => StageStateDto::Detached,
            StageState::Initializing => StageStateDto::Initializing,
            StageState::Attached => StageStateDto::Attached,
            StageState::ShuttingDown => StageStateDto::ShuttingDown,
        }
    }
}

impl SettingChangedEvent {
    pub fn new(stage_name: impl Into<String>, setting_name: impl Into<String>, new_value: SettingValue) -> Self {
        SettingChangedEvent {
            event_id: Uuid::new_v4(),
            stage_name: stage_name.into(),
            setting_name: setting_name.into(),
            new_value,
            occurred_at: chrono::Utc::now(),
        }
    }
}

impl StageTransitionedEvent {
    pub fn new(stage_name: impl Into<String>, from: StageState, to: StageState) -> Self {
        StageTransitionedEvent {
            event_id: Uuid::new_v4(),
            stage_name: stage_name.into(),
            from: from.into(),
            to: to.into(),
            occurred_at: chrono::Utc::now(),
        }
    }
}
