// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # String Intern Table
//!
//! Process-wide deduplication of the short, highly repeated strings a
//! record carries: writer name, level name, application name, process
//! name. A handful of distinct values recur on millions of records; interning
//! turns the per-record cost from an allocation into an `Arc` clone and lets
//! equal strings compare by pointer before falling back to content.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A process-wide table of interned strings, keyed by content.
///
/// Reads (the common case — the same handful of writer/level/app names
/// recur) take a shared lock; only a first-seen string takes the write
/// lock, matching the read-heavy/write-rare access pattern of a logging
/// hot path.
pub struct InternTable {
    entries: RwLock<HashMap<Box<str>, Arc<str>>>,
}

impl InternTable {
    pub fn new() -> Self {
        InternTable {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the interned `Arc<str>` for `value`, inserting it if this is
    /// the first time this table has seen it.
    pub fn intern(&self, value: &str) -> Arc<str> {
        if let Some(existing) = self.entries.read().unwrap().get(value) {
            return existing.clone();
        }
        let mut entries = self.entries.write().unwrap();
        // Another writer may have inserted it while we waited for the lock.
        if let Some(existing) = entries.get(value) {
            return existing.clone();
        }
        let arc: Arc<str> = Arc::from(value);
        entries.insert(Box::from(value), arc.clone());
        arc
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InternTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    #[test]
    fn repeated_values_share_the_same_allocation() {
        let table = InternTable::new();
        let a = table.intern("Warning");
        let b = table.intern("Warning");
        assert!(StdArc::ptr_eq(&a, &b));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn distinct_values_get_distinct_entries() {
        let table = InternTable::new();
        table.intern("Info");
        table.intern("Warning");
        assert_eq!(table.len(), 2);
    }
}
