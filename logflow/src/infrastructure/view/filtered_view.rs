// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Filtered View (§4.K)
//!
//! An observable projection of the unfiltered record set through a
//! predicate composed of a timestamp interval, six per-field
//! include-by-selection filters (writers, levels, tags, applications,
//! process names, process ids), and a text substring match. The view owns
//! no I/O; it is fed rows via [`FilteredView::on_appended`] and
//! [`FilteredView::on_pruned`] by whatever stage or runtime observes the
//! store, matching how the donor keeps its repository-facing services free
//! of transport concerns.
//!
//! Matching happens entirely in-process against materialized
//! [`RecordRow`] values — there is no query string assembled anywhere, so
//! there is nothing for a substring filter to splice into.

use logflow_domain::repositories::record_store::RecordRow;
use logflow_domain::value_objects::ids::RecordId;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One candidate value in a per-field overview facet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverviewItem {
    pub value: String,
    pub group: Option<String>,
    pub selected: bool,
    /// Whether `value` currently appears in at least one record of the
    /// unfiltered set.
    pub value_used: bool,
}

struct OverviewEntry {
    group: Option<String>,
    selected: bool,
    use_count: u64,
}

/// An include-by-selection filter over one record field, backing one
/// overview facet (§4.K).
pub struct FieldFilter {
    /// When `false`, this field contributes no restriction regardless of
    /// selection state — every value passes.
    enabled: bool,
    accumulate_items: bool,
    disable_filter_on_reset: bool,
    unselect_items_on_reset: bool,
    entries: BTreeMap<String, OverviewEntry>,
}

impl FieldFilter {
    pub fn new(accumulate_items: bool, disable_filter_on_reset: bool, unselect_items_on_reset: bool) -> Self {
        FieldFilter {
            enabled: !disable_filter_on_reset,
            accumulate_items,
            disable_filter_on_reset,
            unselect_items_on_reset,
            entries: BTreeMap::new(),
        }
    }

    /// Records one more use of `value` (a record carrying it was added to
    /// the unfiltered set). New values are selected by default so they
    /// show up already-checked in a viewer.
    fn record_use(&mut self, value: &str, group: Option<&str>) {
        let entry = self.entries.entry(value.to_string()).or_insert_with(|| OverviewEntry {
            group: group.map(str::to_string),
            selected: true,
            use_count: 0,
        });
        entry.use_count += 1;
    }

    /// Records one fewer use of `value`. When the count reaches zero the
    /// entry is dropped unless `accumulate_items` keeps stale items around
    /// so a viewer's checkboxes do not disappear out from under the user.
    fn release_use(&mut self, value: &str) {
        if let Some(entry) = self.entries.get_mut(value) {
            entry.use_count = entry.use_count.saturating_sub(1);
            if entry.use_count == 0 && !self.accumulate_items {
                self.entries.remove(value);
            }
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_selected(&mut self, value: &str, selected: bool) {
        if let Some(entry) = self.entries.get_mut(value) {
            entry.selected = selected;
        }
    }

    /// Resets to the post-reset default: `disable_filter_on_reset`
    /// determines whether the field stays active, `unselect_items_on_reset`
    /// determines whether every candidate starts unselected.
    pub fn reset(&mut self) {
        self.enabled = !self.disable_filter_on_reset;
        if self.unselect_items_on_reset {
            for entry in self.entries.values_mut() {
                entry.selected = false;
            }
        }
    }

    /// Whether `value` passes this filter: always true when disabled,
    /// otherwise true only if `value` is a known, selected candidate.
    fn matches(&self, value: &str) -> bool {
        if !self.enabled {
            return true;
        }
        self.entries.get(value).map(|e| e.selected).unwrap_or(false)
    }

    pub fn items(&self) -> Vec<OverviewItem> {
        self.entries
            .iter()
            .map(|(value, entry)| OverviewItem {
                value: value.clone(),
                group: entry.group.clone(),
                selected: entry.selected,
                value_used: entry.use_count > 0,
            })
            .collect()
    }
}

/// The full predicate a [`FilteredView`] evaluates per record.
pub struct FilterPredicate {
    pub from: Option<chrono::DateTime<chrono::FixedOffset>>,
    pub to: Option<chrono::DateTime<chrono::FixedOffset>>,
    pub writers: FieldFilter,
    pub levels: FieldFilter,
    pub tags: FieldFilter,
    pub applications: FieldFilter,
    pub process_names: FieldFilter,
    pub process_ids: FieldFilter,
    pub text_substring: Option<String>,
}

impl FilterPredicate {
    pub fn new(accumulate_items: bool, disable_filter_on_reset: bool, unselect_items_on_reset: bool) -> Self {
        let field = || FieldFilter::new(accumulate_items, disable_filter_on_reset, unselect_items_on_reset);
        FilterPredicate {
            from: None,
            to: None,
            writers: field(),
            levels: field(),
            tags: field(),
            applications: field(),
            process_names: field(),
            process_ids: field(),
            text_substring: None,
        }
    }

    fn matches(&self, row: &RecordRow) -> bool {
        if let Some(from) = self.from {
            if row.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if row.timestamp > to {
                return false;
            }
        }
        if !self.writers.matches(&row.writer_name) {
            return false;
        }
        if !self.levels.matches(&row.level_name) {
            return false;
        }
        if !self.applications.matches(&row.app_name) {
            return false;
        }
        if !self.process_names.matches(&row.process_name) {
            return false;
        }
        if !self.process_ids.matches(&row.process_id.to_string()) {
            return false;
        }
        if self.tags.is_enabled() && !row.tags.iter().any(|t| self.tags.matches(t)) {
            return false;
        }
        if let Some(needle) = &self.text_substring {
            if !needle.is_empty() && !row.text.contains(needle.as_str()) {
                return false;
            }
        }
        true
    }

    fn record_use(&mut self, row: &RecordRow) {
        self.writers.record_use(&row.writer_name, None);
        self.levels.record_use(&row.level_name, None);
        self.applications.record_use(&row.app_name, None);
        self.process_names.record_use(&row.process_name, None);
        self.process_ids.record_use(&row.process_id.to_string(), None);
        for tag in row.tags.iter() {
            self.tags.record_use(tag, None);
        }
    }

    fn release_use(&mut self, row: &RecordRow) {
        self.writers.release_use(&row.writer_name);
        self.levels.release_use(&row.level_name);
        self.applications.release_use(&row.app_name);
        self.process_names.release_use(&row.process_name);
        self.process_ids.release_use(&row.process_id.to_string());
        for tag in row.tags.iter() {
            self.tags.release_use(tag);
        }
    }

    pub fn reset(&mut self) {
        self.from = None;
        self.to = None;
        self.writers.reset();
        self.levels.reset();
        self.tags.reset();
        self.applications.reset();
        self.process_names.reset();
        self.process_ids.reset();
        self.text_substring = None;
    }
}

/// Whether a prune's removal notification carries real rows or cheap
/// placeholders (the consumer is discarding them anyway).
#[derive(Debug, Clone)]
pub enum ViewChange {
    Added(Vec<RecordRow>),
    Removed { up_to: RecordId, rows: Option<Vec<RecordRow>> },
    Reset,
}

type Observer = Arc<dyn Fn(&ViewChange) + Send + Sync>;

struct ViewState {
    items: Vec<RecordRow>,
    predicate: FilterPredicate,
}

/// An observable projection over an unfiltered record stream (§4.K).
pub struct FilteredView {
    state: Mutex<ViewState>,
    observers: Mutex<Vec<Observer>>,
    /// When true, a prune notification emits placeholder rows (id only)
    /// instead of fetching the full payload of records about to be
    /// discarded.
    placeholder_on_prune: bool,
    /// Batch every observation into a single change, vs. one change per
    /// item.
    batch_notifications: bool,
}

impl FilteredView {
    pub fn new(predicate: FilterPredicate, placeholder_on_prune: bool, batch_notifications: bool) -> Self {
        FilteredView {
            state: Mutex::new(ViewState {
                items: Vec::new(),
                predicate,
            }),
            observers: Mutex::new(Vec::new()),
            placeholder_on_prune,
            batch_notifications,
        }
    }

    pub fn subscribe(&self, observer: Observer) {
        self.observers.lock().push(observer);
    }

    fn emit(&self, change: ViewChange) {
        for observer in self.observers.lock().iter() {
            observer(&change);
        }
    }

    /// Feeds newly-appended rows (in ascending id order) through the
    /// predicate, updating overview use-counts and materialized items for
    /// whichever pass, then notifying observers.
    pub fn on_appended(&self, rows: &[RecordRow]) {
        if rows.is_empty() {
            return;
        }
        let mut accepted = Vec::new();
        {
            let mut state = self.state.lock();
            for row in rows {
                state.predicate.record_use(row);
                if state.predicate.matches(row) {
                    state.items.push(row.clone());
                    accepted.push(row.clone());
                }
            }
        }
        if accepted.is_empty() {
            return;
        }
        if self.batch_notifications {
            self.emit(ViewChange::Added(accepted));
        } else {
            for row in accepted {
                self.emit(ViewChange::Added(vec![row]));
            }
        }
    }

    /// Reacts to a store prune: drops materialized items at or below
    /// `cut_id`, releases their overview use-counts, and emits a single
    /// composite `Removed` change (real rows or placeholders, per
    /// configuration).
    pub fn on_pruned(&self, cut_id: RecordId) {
        if cut_id.is_none() {
            return;
        }
        let removed;
        {
            let mut state = self.state.lock();
            let split = state.items.partition_point(|r| r.id.0 <= cut_id.0);
            removed = state.items.drain(0..split).collect::<Vec<_>>();
            for row in &removed {
                state.predicate.release_use(row);
            }
        }
        if removed.is_empty() {
            return;
        }
        let rows = if self.placeholder_on_prune {
            None
        } else {
            Some(removed)
        };
        self.emit(ViewChange::Removed { up_to: cut_id, rows });
    }

    /// Resets the predicate to its post-reset defaults and re-evaluates
    /// every materialized item against it, since the reset may both widen
    /// and narrow the match set.
    pub fn reset_predicate(&self) {
        {
            let mut state = self.state.lock();
            state.predicate.reset();
            let all: Vec<RecordRow> = std::mem::take(&mut state.items);
            let predicate = &state.predicate;
            state.items = all.into_iter().filter(|r| predicate.matches(r)).collect();
        }
        self.emit(ViewChange::Reset);
    }

    pub fn with_predicate<R>(&self, f: impl FnOnce(&mut FilterPredicate) -> R) -> R {
        let mut state = self.state.lock();
        f(&mut state.predicate)
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn snapshot(&self) -> Vec<RecordRow> {
        self.state.lock().items.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use logflow_domain::value_objects::tag::TagSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn row(id: i64, writer: &str, level: &str, text: &str) -> RecordRow {
        let offset = FixedOffset::east_opt(0).unwrap();
        RecordRow {
            id: RecordId(id),
            timestamp: offset.timestamp_opt(1_700_000_000 + id, 0).unwrap(),
            monotonic_ns: id as u64,
            writer_name: writer.into(),
            level_name: level.into(),
            tags: TagSet::empty(),
            app_name: "app".into(),
            process_name: "proc".into(),
            process_id: 1,
            text: text.into(),
            lost_message_count: None,
        }
    }

    #[test]
    fn unfiltered_view_accepts_everything() {
        let predicate = FilterPredicate::new(false, true, false);
        let view = FilteredView::new(predicate, false, true);
        view.on_appended(&[row(0, "console", "Info", "hello")]);
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn enabled_field_filter_excludes_unselected_values() {
        let mut predicate = FilterPredicate::new(false, true, false);
        predicate.levels.set_enabled(true);
        let view = FilteredView::new(predicate, false, true);

        view.on_appended(&[row(0, "console", "Error", "boom")]);
        assert_eq!(view.len(), 1, "first use of a value defaults to selected");

        view.with_predicate(|p| p.levels.set_selected("Error", false));
        view.on_appended(&[row(1, "console", "Error", "boom again")]);
        assert_eq!(view.len(), 1, "deselected value should not be (re)matched going forward");
    }

    #[test]
    fn substring_filter_matches_text() {
        let mut predicate = FilterPredicate::new(false, true, false);
        predicate.text_substring = Some("needle".into());
        let view = FilteredView::new(predicate, false, true);
        view.on_appended(&[row(0, "console", "Info", "haystack needle haystack")]);
        view.on_appended(&[row(1, "console", "Info", "no match here")]);
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn prune_removes_items_up_to_cut_id_and_notifies_once() {
        let predicate = FilterPredicate::new(false, true, false);
        let view = FilteredView::new(predicate, false, true);
        view.on_appended(&[row(0, "c", "Info", "a"), row(1, "c", "Info", "b"), row(2, "c", "Info", "c")]);

        let notifications = Arc::new(AtomicUsize::new(0));
        let n2 = notifications.clone();
        view.subscribe(Arc::new(move |_change| {
            n2.fetch_add(1, Ordering::SeqCst);
        }));

        view.on_pruned(RecordId(1));
        assert_eq!(view.len(), 1);
        assert_eq!(notifications.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn accumulate_items_keeps_overview_entry_after_last_use_released() {
        let predicate = FilterPredicate::new(true, true, false);
        let view = FilteredView::new(predicate, false, true);
        view.on_appended(&[row(0, "console", "Info", "x")]);
        view.on_pruned(RecordId(0));

        let items = view.with_predicate(|p| p.writers.items());
        let console = items.iter().find(|i| i.value == "console").expect("accumulated item should remain");
        assert!(!console.value_used);
    }

    #[test]
    fn without_accumulate_items_overview_entry_is_dropped() {
        let predicate = FilterPredicate::new(false, true, false);
        let view = FilteredView::new(predicate, false, true);
        view.on_appended(&[row(0, "console", "Info", "x")]);
        view.on_pruned(RecordId(0));

        let items = view.with_predicate(|p| p.writers.items());
        assert!(items.iter().all(|i| i.value != "console"));
    }

    #[test]
    fn placeholder_on_prune_omits_row_payloads() {
        let predicate = FilterPredicate::new(false, true, false);
        let view = FilteredView::new(predicate, true, true);
        view.on_appended(&[row(0, "c", "Info", "a")]);

        let captured: Arc<Mutex<Option<ViewChange>>> = Arc::new(Mutex::new(None));
        let captured2 = captured.clone();
        view.subscribe(Arc::new(move |change| {
            *captured2.lock() = Some(change.clone());
        }));
        view.on_pruned(RecordId(0));

        match captured.lock().take().unwrap() {
            ViewChange::Removed { rows, .. } => assert!(rows.is_none()),
            other => panic!("expected Removed, got {other:?}"),
        }
    }

    #[test]
    fn reset_clears_selections_when_unselect_items_on_reset() {
        let predicate = FilterPredicate::new(false, true, true);
        let view = FilteredView::new(predicate, false, true);
        view.on_appended(&[row(0, "console", "Info", "x")]);
        view.reset_predicate();

        let items = view.with_predicate(|p| p.writers.items());
        assert!(items.iter().all(|i| !i.selected));
    }
}
