// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Graph (§4.E)
//!
//! `Pipeline` is the DAG shape: stage names, downstream links, and the
//! initialization/shutdown order derived from them. It owns its
//! [`SettingsStore`] generation — swapping configuration means building a
//! fresh `Pipeline` around a fresh store and rebinding every stage's
//! `SettingsProxy` to it (§9 "proxy rebinding").
//!
//! Building the graph validates at construction time, never at run time:
//! duplicate stage names and link cycles both fail `Pipeline::new` so a
//! caller cannot end up with a half-built graph (§4.E: "Stage names must be
//! unique; duplicates fail construction... loops are forbidden at build
//! time").

use crate::entities::stage::Stage;
use crate::error::PipelineError;
use crate::settings::registry::SettingsStore;
use crate::value_objects::ids::PipelineId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// The DAG of stages plus the settings generation they share.
pub struct Pipeline {
    id: PipelineId,
    name: String,
    stages: Vec<Stage>,
    settings: Arc<SettingsStore>,
}

impl Pipeline {
    /// Builds a pipeline from its stages, validating uniqueness and
    /// acyclicity before returning. `stages` must already carry settings
    /// proxies bound to `settings`.
    pub fn new(name: impl Into<String>, stages: Vec<Stage>, settings: Arc<SettingsStore>) -> Result<Self, PipelineError> {
        let mut seen = HashSet::new();
        for s in &stages {
            if !seen.insert(s.name().to_string()) {
                return Err(PipelineError::invalid_config(format!(
                    "duplicate stage name '{}'",
                    s.name()
                )));
            }
        }
        for s in &stages {
            for downstream in s.downstream() {
                if !seen.contains(downstream) {
                    return Err(PipelineError::invalid_config(format!(
                        "stage '{}' links to unknown downstream stage '{}'",
                        s.name(),
                        downstream
                    )));
                }
            }
        }
        let pipeline = Pipeline {
            id: PipelineId::new(),
            name: name.into(),
            stages,
            settings,
        };
        pipeline.detect_cycle()?;
        Ok(pipeline)
    }

    pub fn id(&self) -> &PipelineId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name() == name)
    }

    fn detect_cycle(&self) -> Result<(), PipelineError> {
        let by_name: HashMap<&str, &Stage> = self.stages.iter().map(|s| (s.name(), s)).collect();
        let mut visiting = HashSet::new();
        let mut done = HashSet::new();

        fn visit<'a>(
            name: &'a str,
            by_name: &HashMap<&'a str, &'a Stage>,
            visiting: &mut HashSet<&'a str>,
            done: &mut HashSet<&'a str>,
        ) -> Result<(), PipelineError> {
            if done.contains(name) {
                return Ok(());
            }
            if !visiting.insert(name) {
                return Err(PipelineError::invalid_config(format!(
                    "pipeline graph contains a cycle through stage '{name}'"
                )));
            }
            if let Some(stage) = by_name.get(name) {
                for downstream in stage.downstream() {
                    visit(downstream, by_name, visiting, done)?;
                }
            }
            visiting.remove(name);
            done.insert(name);
            Ok(())
        }

        for stage in &self.stages {
            visit(stage.name(), &by_name, &mut visiting, &mut done)?;
        }
        Ok(())
    }

    /// Leaves-first order: every stage's downstream links appear before it.
    /// `Initialize` walks this order so that by the time a stage's
    /// `onInitialize` runs, everything downstream of it is already
    /// `Attached` (§4.E).
    pub fn reverse_topological_order(&self) -> Vec<&Stage> {
        let mut order = self.topological_order();
        order.reverse();
        order
    }

    /// Roots-first order. `Shutdown` walks this order (§4.E).
    pub fn topological_order(&self) -> Vec<&Stage> {
        let by_name: HashMap<&str, &Stage> = self.stages.iter().map(|s| (s.name(), s)).collect();
        let mut visited = HashSet::new();
        let mut order = Vec::with_capacity(self.stages.len());

        fn visit<'a>(
            stage: &'a Stage,
            by_name: &HashMap<&'a str, &'a Stage>,
            visited: &mut HashSet<&'a str>,
            order: &mut Vec<&'a Stage>,
        ) {
            if !visited.insert(stage.name()) {
                return;
            }
            for downstream in stage.downstream() {
                if let Some(next) = by_name.get(downstream.as_str()) {
                    visit(next, by_name, visited, order);
                }
            }
            order.push(stage);
        }

        for stage in &self.stages {
            visit(stage, &by_name, &mut visited, &mut order);
        }
        // `visit` above produces leaves-first (post-order); roots-first is
        // its reverse.
        order.reverse();
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::stage::StageKind;
    use crate::settings::proxy::SettingsProxy;

    fn stage(name: &str, downstream: &[&str], store: &Arc<SettingsStore>) -> Stage {
        let mut s = Stage::new(name, StageKind::Sync, SettingsProxy::new(store.clone()).scoped_to(name));
        for d in downstream {
            s.link_downstream(*d);
        }
        s
    }

    #[test]
    fn rejects_duplicate_stage_names() {
        let store = Arc::new(SettingsStore::new());
        let stages = vec![stage("a", &[], &store), stage("a", &[], &store)];
        assert!(Pipeline::new("p", stages, store).is_err());
    }

    #[test]
    fn rejects_link_to_unknown_stage() {
        let store = Arc::new(SettingsStore::new());
        let stages = vec![stage("a", &["ghost"], &store)];
        assert!(Pipeline::new("p", stages, store).is_err());
    }

    #[test]
    fn rejects_cycles() {
        let store = Arc::new(SettingsStore::new());
        let stages = vec![stage("a", &["b"], &store), stage("b", &["a"], &store)];
        assert!(Pipeline::new("p", stages, store).is_err());
    }

    #[test]
    fn topological_orders_are_reverses_of_each_other() {
        let store = Arc::new(SettingsStore::new());
        // entry -> splitter -> {console, file}
        let stages = vec![
            stage("entry", &["splitter"], &store),
            stage("splitter", &["console", "file"], &store),
            stage("console", &[], &store),
            stage("file", &[], &store),
        ];
        let pipeline = Pipeline::new("p", stages, store).unwrap();
        let topo: Vec<&str> = pipeline.topological_order().iter().map(|s| s.name()).collect();
        let rev: Vec<&str> = pipeline.reverse_topological_order().iter().map(|s| s.name()).collect();
        assert_eq!(topo.first(), Some(&"entry"));
        assert_eq!(rev.last(), Some(&"entry"));
        let mut expect_rev = topo.clone();
        expect_rev.reverse();
        assert_eq!(rev, expect_rev);
    }
}
