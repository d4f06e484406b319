// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Graph Definition
//!
//! The TOML shape a configuration swap replaces wholesale: stage names,
//! kind (sync/async), downstream links, and the initial value of every
//! registered setting. `GraphConfig` only describes the *shape*; turning
//! it into a running pipeline (binding concrete adapters behind each
//! stage) is the bootstrap layer's job, the same split the donor workspace
//! draws between its config loader and its pipeline builder.
//!
//! ```toml
//! name = "default"
//!
//! [[stage]]
//! name = "entry"
//! kind = "sync"
//! downstream = ["splitter"]
//!
//! [[stage]]
//! name = "splitter"
//! kind = "sync"
//! downstream = ["console", "file"]
//!
//! [[stage]]
//! name = "console"
//! kind = "sync"
//!
//! [[stage]]
//! name = "file"
//! kind = "async"
//! [stage.settings]
//! path = "/var/log/app.log"
//! queueCapacity = "1000"
//! ```

use logflow_domain::entities::stage::StageKind;
use logflow_domain::settings::proxy::SettingsProxy;
use logflow_domain::settings::registry::SettingsStore;
use logflow_domain::value_objects::setting_value::SettingValue;
use logflow_domain::{Pipeline, PipelineError, Stage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Mirrors [`StageKind`] with a `serde`-friendly, lowercase-in-TOML
/// representation; kept distinct from the domain type so the domain crate
/// never depends on `serde`'s derive conventions for this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKindDef {
    Sync,
    Async,
}

impl Default for StageKindDef {
    fn default() -> Self {
        StageKindDef::Sync
    }
}

impl From<StageKindDef> for StageKind {
    fn from(k: StageKindDef) -> Self {
        match k {
            StageKindDef::Sync => StageKind::Sync,
            StageKindDef::Async => StageKind::Async,
        }
    }
}

/// One `[[stage]]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDef {
    pub name: String,
    #[serde(default)]
    pub kind: StageKindDef,
    #[serde(default)]
    pub downstream: Vec<String>,
    /// Initial settings, applied to the graph's fresh
    /// [`SettingsStore`] before any stage attaches. Values are always
    /// stored in their string form; a stage's own `on_initialize`
    /// is what parses them against its expected [`SettingType`](logflow_domain::SettingType).
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

/// The parsed shape of one `pipeline.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    pub name: String,
    #[serde(rename = "stage", default)]
    pub stages: Vec<StageDef>,
}

impl GraphConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, PipelineError> {
        toml::from_str(text).map_err(|e| PipelineError::invalid_config(format!("pipeline graph TOML: {e}")))
    }

    pub async fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PipelineError::invalid_config(format!("reading '{}': {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, PipelineError> {
        toml::to_string_pretty(self).map_err(|e| PipelineError::invalid_config(format!("serializing graph: {e}")))
    }

    /// Builds a fresh [`SettingsStore`] seeded with every stage's initial
    /// settings, then the domain [`Stage`] list bound to proxies scoped
    /// into it, then the validated [`Pipeline`] DAG. This is the "building
    /// the graph is done once per configuration swap" step of §4.E: the
    /// caller rebinds every live stage's `SettingsProxy` (via
    /// `SettingsProxy::rebind`) to the returned store and swaps in the
    /// returned `Pipeline` as a unit.
    pub fn build(&self) -> Result<(Arc<Pipeline>, Arc<SettingsStore>), PipelineError> {
        let store = Arc::new(SettingsStore::new());
        for def in &self.stages {
            for (key, value) in &def.settings {
                store.set(&def.name, key, SettingValue::String(value.clone()))?;
            }
        }

        let stages: Vec<Stage> = self
            .stages
            .iter()
            .map(|def| {
                let mut stage = Stage::new(&def.name, def.kind.into(), SettingsProxy::new(store.clone()).scoped_to(&def.name));
                for downstream in &def.downstream {
                    stage.link_downstream(downstream.as_str());
                }
                stage
            })
            .collect();

        let pipeline = Pipeline::new(self.name.clone(), stages, store.clone())?;
        Ok((Arc::new(pipeline), store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        name = "default"

        [[stage]]
        name = "entry"
        kind = "sync"
        downstream = ["console"]

        [[stage]]
        name = "console"
        kind = "sync"

        [[stage]]
        name = "file"
        kind = "async"
        [stage.settings]
        path = "/var/log/app.log"
        queueCapacity = "2000"
    "#;

    #[test]
    fn parses_stage_kind_and_downstream_links() {
        let graph = GraphConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(graph.name, "default");
        assert_eq!(graph.stages.len(), 3);
        assert_eq!(graph.stages[0].downstream, vec!["console".to_string()]);
        assert_eq!(graph.stages[2].kind, StageKindDef::Async);
        assert_eq!(graph.stages[2].settings.get("path").unwrap(), "/var/log/app.log");
    }

    #[test]
    fn defaults_to_sync_with_no_downstream() {
        let graph = GraphConfig::from_toml_str(
            r#"
            name = "p"
            [[stage]]
            name = "solo"
            "#,
        )
        .unwrap();
        assert_eq!(graph.stages[0].kind, StageKindDef::Sync);
        assert!(graph.stages[0].downstream.is_empty());
    }

    #[test]
    fn build_produces_a_validated_pipeline_with_seeded_settings() {
        let graph = GraphConfig::from_toml_str(SAMPLE).unwrap();
        let (pipeline, store) = graph.build().unwrap();
        assert_eq!(pipeline.stages().len(), 3);
        assert_eq!(
            store.get("file", "path"),
            Some(SettingValue::String("/var/log/app.log".into()))
        );
    }

    #[test]
    fn build_rejects_a_cycle() {
        let graph = GraphConfig::from_toml_str(
            r#"
            name = "p"
            [[stage]]
            name = "a"
            downstream = ["b"]
            [[stage]]
            name = "b"
            downstream = ["a"]
            "#,
        )
        .unwrap();
        assert!(graph.build().is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let graph = GraphConfig::from_toml_str(SAMPLE).unwrap();
        let text = graph.to_toml_string().unwrap();
        let reparsed = GraphConfig::from_toml_str(&text).unwrap();
        assert_eq!(reparsed.stages.len(), graph.stages.len());
    }
}
