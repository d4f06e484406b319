// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Plain-Text Stage-Settings File (§6)
//!
//! > Plain-text key/value form, keys are `stage-name/setting-name`. Values
//! > are the setting converter's string form. Writer names, level names,
//! > and tags must not contain CR or LF.
//!
//! Deliberately hand-parsed rather than routed through the `config` crate
//! (SPEC_FULL.md): the format is one flat list of `key = value` lines, not
//! a layered/hierarchical document, so a dedicated reader is simpler and
//! more direct than coercing `config`'s provider model to it. The `config`
//! and `toml` crates remain in the dependency graph for
//! [`super::graph::GraphConfig`], which *is* a structured document.

use logflow_domain::settings::registry::SettingsStore;
use logflow_domain::value_objects::setting_value::SettingValue;
use logflow_domain::PipelineError;
use std::path::Path;

/// One parsed `stage-name/setting-name = value` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingEntry {
    pub stage: String,
    pub name: String,
    pub value: String,
}

/// Parses the plain-text settings file format. Blank lines and lines
/// whose first non-whitespace character is `#` are ignored. Every other
/// line must be `stage-name/setting-name = value`; the key's slash
/// separates stage from setting name, matching §6 exactly. Because the
/// format is line-based, a value can never itself carry a literal CR or
/// LF, satisfying the "must not contain CR or LF" constraint on writer,
/// level, and tag names without a separate check.
pub fn parse(text: &str) -> Result<Vec<SettingEntry>, PipelineError> {
    let mut entries = Vec::new();
    for (lineno, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| {
            PipelineError::invalid_config(format!("line {}: expected 'key = value', got '{raw_line}'", lineno + 1))
        })?;
        let key = key.trim();
        let value = value.trim();
        let (stage, name) = key.split_once('/').ok_or_else(|| {
            PipelineError::invalid_config(format!(
                "line {}: key '{key}' is not of the form 'stage-name/setting-name'",
                lineno + 1
            ))
        })?;
        if stage.is_empty() || name.is_empty() {
            return Err(PipelineError::invalid_config(format!(
                "line {}: stage name and setting name must both be non-empty",
                lineno + 1
            )));
        }
        entries.push(SettingEntry {
            stage: stage.to_string(),
            name: name.to_string(),
            value: value.to_string(),
        });
    }
    Ok(entries)
}

/// Renders entries back into the plain-text form, in `stage/name = value`
/// order, one per line. Used by configuration tooling that round-trips
/// the file (and by the test below).
pub fn render(entries: &[SettingEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&format!("{}/{} = {}\n", entry.stage, entry.name, entry.value));
    }
    out
}

/// Applies every parsed entry to `store` via `set` (never `register`, per
/// §4.D: applying a file must not silently define a default a stage never
/// asked for). Each `set` call fires the store's own per-key `changed`
/// notification; callers that want a single post-reload notification
/// should use [`super::watcher::ConfigWatcher`] instead of calling this
/// directly on every file change.
pub fn apply(entries: &[SettingEntry], store: &SettingsStore) -> Result<(), PipelineError> {
    for entry in entries {
        store.set(&entry.stage, &entry.name, SettingValue::String(entry.value.clone()))?;
    }
    Ok(())
}

/// Reads `path`, parses it, and applies it to `store` in one call.
pub async fn load_and_apply(path: &Path, store: &SettingsStore) -> Result<Vec<SettingEntry>, PipelineError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| PipelineError::invalid_config(format!("reading '{}': {e}", path.display())))?;
    let entries = parse(&text)?;
    apply(&entries, store)?;
    Ok(entries)
}
