// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Setting Proxy
//!
//! What a [`crate::entities::stage::Stage`] actually holds. A proxy never
//! caches a concrete settings backing (§4.D: "a stage must never cache a
//! concrete setting backing; it only holds its proxy") — it holds an atomic
//! pointer to the current [`SettingsStore`] plus a generation counter, so
//! that [`SettingsProxy::rebind`] can atomically retarget every proxy in a
//! pipeline to a freshly swapped-in configuration without the owning stage
//! noticing.
//!
//! Subscriber dispatch is re-entrant: a [`Dispatcher`] re-enters the
//! subscriber's handler on whatever thread-affinity context it was
//! registered from, so a UI subscriber is always called back on the UI
//! thread even though the setting changed from a worker.

use crate::settings::registry::SettingsStore;
use crate::value_objects::setting_value::SettingValue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Re-enters a subscriber's handler on whatever execution context it was
/// registered from. `InlineDispatcher` runs handlers synchronously on the
/// thread that fired `changed`; a UI toolkit integration supplies its own
/// implementation that posts to the UI thread's message loop.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, work: Box<dyn FnOnce() + Send>);
}

/// Dispatches inline, on the calling thread. Used by non-UI subscribers
/// (stages, tests) that have no thread-affinity requirement.
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, work: Box<dyn FnOnce() + Send>) {
        work();
    }
}

pub struct SubscriptionHandle {
    stage: String,
    name: String,
    id: u64,
}

/// A stage's handle on its settings. Retargets atomically when the owning
/// pipeline's configuration is replaced (a hot reload), carrying every
/// subscription across to the new backing store.
pub struct SettingsProxy {
    stage_name: Mutex<Option<String>>,
    backing: Mutex<Arc<SettingsStore>>,
    generation: AtomicU64,
    subscriptions: Mutex<Vec<(SubscriptionHandle, Arc<dyn Dispatcher>, Arc<dyn Fn(&str, &str, &SettingValue) + Send + Sync>)>>,
}

impl SettingsProxy {
    pub fn new(backing: Arc<SettingsStore>) -> Self {
        SettingsProxy {
            stage_name: Mutex::new(None),
            backing: Mutex::new(backing),
            generation: AtomicU64::new(0),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Scopes this proxy to one stage's settings namespace. Called once by
    /// the pipeline builder before the stage is attached.
    pub fn scoped_to(self, stage_name: impl Into<String>) -> Self {
        *self.stage_name.lock().unwrap() = Some(stage_name.into());
        self
    }

    fn stage(&self) -> String {
        self.stage_name
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| "<unscoped>".to_string())
    }

    pub fn register(&self, name: &str, default: SettingValue) -> SettingValue {
        self.backing.lock().unwrap().register(&self.stage(), name, default)
    }

    pub fn get(&self, name: &str) -> Option<SettingValue> {
        self.backing.lock().unwrap().get(&self.stage(), name)
    }

    pub fn set(&self, name: &str, value: SettingValue) -> Result<(), crate::error::PipelineError> {
        self.backing.lock().unwrap().set(&self.stage(), name, value)
    }

    pub fn subscribe(
        &self,
        name: &str,
        dispatcher: Arc<dyn Dispatcher>,
        handler: Arc<dyn Fn(&str, &str, &SettingValue) + Send + Sync>,
    ) {
        let stage = self.stage();
        let id = self
            .backing
            .lock()
            .unwrap()
            .subscribe(&stage, name, dispatcher.clone(), handler.clone());
        self.subscriptions.lock().unwrap().push((
            SubscriptionHandle { stage, name: name.to_string(), id },
            dispatcher,
            handler,
        ));
    }

    /// The generation counter, bumped on every `rebind`. Tests and
    /// diagnostics can observe that a rebind actually happened.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Atomically retargets this proxy to `new_backing`, re-subscribing
    /// every live subscription against the new store before publishing the
    /// swap, so no `changed` notification is lost in the handoff.
    pub fn rebind(&self, new_backing: Arc<SettingsStore>) {
        let subs = self.subscriptions.lock().unwrap();
        for (handle, dispatcher, handler) in subs.iter() {
            new_backing.subscribe(&handle.stage, &handle.name, dispatcher.clone(), handler.clone());
        }
        drop(subs);
        *self.backing.lock().unwrap() = new_backing;
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn rebind_preserves_subscribers_and_bumps_generation() {
        let store_a = Arc::new(SettingsStore::new());
        let proxy = SettingsProxy::new(store_a.clone()).scoped_to("console");
        proxy.register("color", SettingValue::Bool(true));

        let seen = Arc::new(AtomicU32::new(0));
        let seen2 = seen.clone();
        proxy.subscribe(
            "color",
            Arc::new(InlineDispatcher),
            Arc::new(move |_s, _n, _v| {
                seen2.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let store_b = Arc::new(SettingsStore::new());
        store_b.register("console", "color", SettingValue::Bool(true));
        assert_eq!(proxy.generation(), 0);
        proxy.rebind(store_b.clone());
        assert_eq!(proxy.generation(), 1);

        store_b.set("console", "color", SettingValue::Bool(false)).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        // the old store firing no longer reaches the proxy's subscriber
        store_a.set("console", "color", SettingValue::Bool(false)).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn get_and_set_scope_to_the_stage_name() {
        let store = Arc::new(SettingsStore::new());
        let proxy = SettingsProxy::new(store.clone()).scoped_to("file");
        proxy.register("path", SettingValue::String("a.log".into()));
        proxy.set("path", SettingValue::String("b.log".into())).unwrap();
        assert_eq!(proxy.get("path"), Some(SettingValue::String("b.log".into())));
        assert_eq!(store.get("file", "path"), Some(SettingValue::String("b.log".into())));
    }
}
