// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage
//!
//! A node in the pipeline graph. `Stage` is the domain-level shape —
//! identity, links, and lifecycle state — used by [`crate::aggregates::pipeline`]
//! to build and validate the DAG. The runtime behavior (the worker thread,
//! the bounded queue, `processSync`/`processAsync` dispatch) lives in the
//! infrastructure crate, which holds one [`Stage`] per running node and
//! drives its `state` transitions through [`Stage::transition`].

use crate::error::PipelineError;
use crate::settings::proxy::SettingsProxy;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// The lifecycle a stage moves through exactly once per pipeline attach,
/// per §4.E and §4.G.5: `Detached → Initializing → Attached → ShuttingDown
/// → Detached`. Transitions are serialized by the owning pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum StageState {
    Detached = 0,
    Initializing = 1,
    Attached = 2,
    ShuttingDown = 3,
}

impl StageState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => StageState::Detached,
            1 => StageState::Initializing,
            2 => StageState::Attached,
            3 => StageState::ShuttingDown,
            _ => unreachable!("stage state is only ever written through transition()"),
        }
    }

    /// Whether moving from `self` to `next` is a legal single step.
    fn can_transition_to(self, next: StageState) -> bool {
        matches!(
            (self, next),
            (StageState::Detached, StageState::Initializing)
                | (StageState::Initializing, StageState::Attached)
                | (StageState::Initializing, StageState::Detached) // aborted init, rolled back
                | (StageState::Attached, StageState::ShuttingDown)
                | (StageState::ShuttingDown, StageState::Detached)
        )
    }
}

/// Whether a stage runs on the producer thread (§4.F) or owns a dedicated
/// worker with a bounded queue (§4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageKind {
    Sync,
    Async,
}

/// Overflow policy for an async stage's bounded queue (§4.G.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    Block,
    Drop,
}

/// A node in the pipeline DAG.
#[derive(Debug)]
pub struct Stage {
    name: String,
    kind: StageKind,
    downstream: Vec<String>,
    settings: SettingsProxy,
    state: AtomicU8,
}

impl Stage {
    pub fn new(name: impl Into<String>, kind: StageKind, settings: SettingsProxy) -> Self {
        Stage {
            name: name.into(),
            kind,
            downstream: Vec::new(),
            settings,
            state: AtomicU8::new(StageState::Detached as u8),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn downstream(&self) -> &[String] {
        &self.downstream
    }

    pub fn settings(&self) -> &SettingsProxy {
        &self.settings
    }

    pub fn state(&self) -> StageState {
        StageState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Adds a downstream link. Only legal while `Detached`, enforced by the
    /// owning [`crate::aggregates::pipeline::Pipeline`] at build time.
    pub fn link_downstream(&mut self, stage_name: impl Into<String>) {
        self.downstream.push(stage_name.into());
    }

    /// Drives the lifecycle state machine. Returns `StageBusyError` style
    /// usage error on an illegal transition — the pipeline should never
    /// attempt one, so this is a defensive fatal check, not a recoverable
    /// path.
    pub fn transition(&self, next: StageState) -> Result<(), PipelineError> {
        let current = self.state();
        if !current.can_transition_to(next) {
            return Err(PipelineError::InvalidConfiguration(format!(
                "stage '{}' cannot move from {current:?} to {next:?}",
                self.name
            )));
        }
        self.state.store(next as u8, Ordering::Release);
        Ok(())
    }

    /// Whether a fluent configuration method may still mutate this stage's
    /// settings (§4.E: "settings may be changed only while Detached").
    pub fn is_configurable(&self) -> bool {
        self.state() == StageState::Detached
    }

    pub fn require_configurable(&self) -> Result<(), PipelineError> {
        if self.is_configurable() {
            Ok(())
        } else {
            Err(PipelineError::StageBusyError(self.name.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::registry::SettingsStore;
    use std::sync::Arc;

    fn stage() -> Stage {
        let store = Arc::new(SettingsStore::new());
        let proxy = SettingsProxy::new(store);
        Stage::new("console", StageKind::Sync, proxy)
    }

    #[test]
    fn legal_lifecycle_walk() {
        let s = stage();
        assert_eq!(s.state(), StageState::Detached);
        s.transition(StageState::Initializing).unwrap();
        s.transition(StageState::Attached).unwrap();
        assert!(!s.is_configurable());
        s.transition(StageState::ShuttingDown).unwrap();
        s.transition(StageState::Detached).unwrap();
        assert!(s.is_configurable());
    }

    #[test]
    fn illegal_transition_rejected() {
        let s = stage();
        assert!(s.transition(StageState::Attached).is_err());
    }

    #[test]
    fn configuring_after_attach_is_stage_busy() {
        let s = stage();
        s.transition(StageState::Initializing).unwrap();
        s.transition(StageState::Attached).unwrap();
        let err = s.require_configurable().unwrap_err();
        assert!(matches!(err, PipelineError::StageBusyError(_)));
    }
}
