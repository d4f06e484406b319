// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The registry backing one configuration generation: a map from
//! `(stage-name, setting-name)` to its typed string-form value.

use crate::error::PipelineError;
use crate::settings::proxy::Dispatcher;
use crate::value_objects::setting_value::{SettingType, SettingValue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Key = (String, String);

struct Entry {
    type_tag: SettingType,
    value: SettingValue,
    default: SettingValue,
}

struct Subscriber {
    id: u64,
    dispatcher: Arc<dyn Dispatcher>,
    handler: Arc<dyn Fn(&str, &str, &SettingValue) + Send + Sync>,
}

/// The backing store for one configuration generation. Created fresh on
/// every configuration swap; proxies retarget to the new instance without
/// the owning stage knowing it happened.
pub struct SettingsStore {
    entries: Mutex<HashMap<Key, Entry>>,
    subscribers: Mutex<HashMap<Key, Vec<Subscriber>>>,
    next_subscription_id: AtomicU64,
}

impl SettingsStore {
    pub fn new() -> Self {
        SettingsStore {
            entries: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            next_subscription_id: AtomicU64::new(1),
        }
    }

    /// If absent, inserts `default` and returns it. If present — even with
    /// a different default — the existing value is preserved and returned
    /// unchanged; this is the two-call split that replaced the historical
    /// ambiguous "get-with-default" (§4.D rationale).
    pub fn register(
        &self,
        stage: &str,
        name: &str,
        default: SettingValue,
    ) -> SettingValue {
        let key = (stage.to_string(), name.to_string());
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key).or_insert_with(|| Entry {
            type_tag: default.type_tag(),
            value: default.clone(),
            default: default.clone(),
        });
        entry.value.clone()
    }

    /// Returns the current value, or `None` if nothing was ever registered
    /// or set for this key. Never mutates.
    pub fn get(&self, stage: &str, name: &str) -> Option<SettingValue> {
        let key = (stage.to_string(), name.to_string());
        self.entries.lock().unwrap().get(&key).map(|e| e.value.clone())
    }

    /// Upserts a value without touching any registered default. Fires
    /// `changed` to every subscriber of this key, each re-entered through
    /// its own dispatcher (so a UI subscriber runs on the UI thread it
    /// subscribed from).
    pub fn set(&self, stage: &str, name: &str, value: SettingValue) -> Result<(), PipelineError> {
        let key = (stage.to_string(), name.to_string());
        {
            let mut entries = self.entries.lock().unwrap();
            match entries.get(&key) {
                Some(existing) if existing.type_tag != value.type_tag() => {
                    return Err(PipelineError::config(
                        name,
                        format!("type mismatch: expected {:?}, got {:?}", existing.type_tag, value.type_tag()),
                    ));
                }
                Some(existing) => {
                    entries.insert(
                        key.clone(),
                        Entry { type_tag: existing.type_tag, value: value.clone(), default: existing.default.clone() },
                    );
                }
                None => {
                    entries.insert(
                        key.clone(),
                        Entry { type_tag: value.type_tag(), value: value.clone(), default: value.clone() },
                    );
                }
            }
        }
        self.notify(&key, &value);
        Ok(())
    }

    fn notify(&self, key: &Key, value: &SettingValue) {
        let subs = self.subscribers.lock().unwrap();
        if let Some(list) = subs.get(key) {
            for sub in list {
                let handler = sub.handler.clone();
                let (stage, name) = key.clone();
                let value = value.clone();
                sub.dispatcher.dispatch(Box::new(move || handler(&stage, &name, &value)));
            }
        }
    }

    /// Subscribes to `changed` for one key, re-entering `handler` through
    /// `dispatcher`. Returns a subscription id usable with `unsubscribe`.
    pub fn subscribe(
        &self,
        stage: &str,
        name: &str,
        dispatcher: Arc<dyn Dispatcher>,
        handler: Arc<dyn Fn(&str, &str, &SettingValue) + Send + Sync>,
    ) -> u64 {
        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        let key = (stage.to_string(), name.to_string());
        self.subscribers
            .lock()
            .unwrap()
            .entry(key)
            .or_default()
            .push(Subscriber { id, dispatcher, handler });
        id
    }

    pub fn unsubscribe(&self, stage: &str, name: &str, id: u64) {
        let key = (stage.to_string(), name.to_string());
        if let Some(list) = self.subscribers.lock().unwrap().get_mut(&key) {
            list.retain(|s| s.id != id);
        }
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::proxy::InlineDispatcher;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn register_preserves_existing_value_on_differing_default() {
        let store = SettingsStore::new();
        store.register("console", "color", SettingValue::Bool(true));
        store.set("console", "color", SettingValue::Bool(false)).unwrap();
        let v = store.register("console", "color", SettingValue::Bool(true));
        assert_eq!(v, SettingValue::Bool(false));
    }

    #[test]
    fn get_never_mutates_absent_key() {
        let store = SettingsStore::new();
        assert_eq!(store.get("x", "y"), None);
        assert_eq!(store.get("x", "y"), None);
    }

    #[test]
    fn set_fires_subscribers() {
        let store = SettingsStore::new();
        store.register("file", "path", SettingValue::String("a.log".into()));
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        store.subscribe(
            "file",
            "path",
            Arc::new(InlineDispatcher),
            Arc::new(move |_s, _n, _v| fired2.store(true, Ordering::SeqCst)),
        );
        store.set("file", "path", SettingValue::String("b.log".into())).unwrap();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn set_rejects_type_mismatch() {
        let store = SettingsStore::new();
        store.register("s", "n", SettingValue::I64(1));
        assert!(store.set("s", "n", SettingValue::String("x".into())).is_err());
    }
}
