// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Record & Pool
//!
//! [`Record`] is the structured log entry. It is mutable only from the
//! moment it is checked out of its [`RecordPool`] until it is published to
//! the pipeline; after that, any attempt to mutate it is a usage error. A
//! [`PooledRecord`] is the handle producers and stages actually hold: it
//! carries the logical reference count and returns the record to its pool
//! when that count reaches zero.

use crate::error::PipelineError;
use crate::value_objects::tag::TagSet;
use chrono::{DateTime, FixedOffset};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// The immutable-after-publish fields of a log record.
#[derive(Debug, Clone)]
pub struct RecordFields {
    pub timestamp: DateTime<FixedOffset>,
    /// Monotonic high-precision timestamp, nanoseconds, for intra-process
    /// ordering when wall-clock resolution is too coarse.
    pub monotonic_ns: u64,
    pub writer_name: Arc<str>,
    pub level_name: Arc<str>,
    pub tags: TagSet,
    pub app_name: Arc<str>,
    pub process_name: Arc<str>,
    pub process_id: u32,
    pub text: String,
    pub lost_message_count: Option<u64>,
}

/// A record owned by a [`RecordPool`]. Holds its fields plus the lifecycle
/// state (publish flag, logical reference count, owning pool identity).
#[derive(Debug)]
pub struct Record {
    pool_id: u64,
    fields: Mutex<RecordFields>,
    published: AtomicBool,
    refcount: AtomicUsize,
}

impl Record {
    fn fresh(pool_id: u64, fields: RecordFields) -> Self {
        Record {
            pool_id,
            fields: Mutex::new(fields),
            published: AtomicBool::new(false),
            refcount: AtomicUsize::new(1),
        }
    }

    pub fn is_published(&self) -> bool {
        self.published.load(Ordering::Acquire)
    }

    /// Marks the record read-only. Called by the pipeline entry point the
    /// moment a record is handed off to stage E.
    pub fn publish(&self) {
        self.published.store(true, Ordering::Release);
    }

    pub fn text(&self) -> String {
        self.fields.lock().unwrap().text.clone()
    }

    pub fn writer_name(&self) -> Arc<str> {
        self.fields.lock().unwrap().writer_name.clone()
    }

    pub fn level_name(&self) -> Arc<str> {
        self.fields.lock().unwrap().level_name.clone()
    }

    pub fn tags(&self) -> TagSet {
        self.fields.lock().unwrap().tags.clone()
    }

    pub fn app_name(&self) -> Arc<str> {
        self.fields.lock().unwrap().app_name.clone()
    }

    pub fn process_name(&self) -> Arc<str> {
        self.fields.lock().unwrap().process_name.clone()
    }

    pub fn process_id(&self) -> u32 {
        self.fields.lock().unwrap().process_id
    }

    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.fields.lock().unwrap().timestamp
    }

    pub fn monotonic_ns(&self) -> u64 {
        self.fields.lock().unwrap().monotonic_ns
    }

    pub fn lost_message_count(&self) -> Option<u64> {
        self.fields.lock().unwrap().lost_message_count
    }

    /// Sets the lost-message count attached to this record (§4.G: a dropped
    /// record's loss is attached to the *next* enqueued record). Fails with
    /// `UsageError` once the record is published.
    pub fn set_lost_message_count(&self, count: u64) -> Result<(), PipelineError> {
        if self.is_published() {
            return Err(PipelineError::UsageError(
                "cannot mutate a record after it has been published".into(),
            ));
        }
        self.fields.lock().unwrap().lost_message_count = Some(count);
        Ok(())
    }

    fn clear_for_reuse(&self) {
        self.published.store(false, Ordering::Release);
        let mut f = self.fields.lock().unwrap();
        f.text.clear();
        f.lost_message_count = None;
        f.tags = TagSet::empty();
    }
}

/// A handle on a checked-out [`Record`], carrying the logical reference
/// count discipline described in §4.A: starts at 1 on checkout, `retain`
/// increments, `release` decrements, and the transition to zero returns the
/// record to its pool.
pub struct PooledRecord {
    pool: Arc<PoolInner>,
    record: Arc<Record>,
}

impl PooledRecord {
    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Increments the logical reference count. Must be paired with a
    /// matching `release`.
    pub fn retain(&self) -> PooledRecord {
        self.record.refcount.fetch_add(1, Ordering::AcqRel);
        PooledRecord {
            pool: self.pool.clone(),
            record: self.record.clone(),
        }
    }

    /// Decrements the logical reference count. At zero, the record is
    /// cleared and returned to its originating pool.
    ///
    /// Returns `UsageError` if the count was already zero (double-release)
    /// or if this handle's pool does not match the record's origin pool —
    /// "a record obtained from one pool must not be returned to another".
    pub fn release(self) -> Result<(), PipelineError> {
        if self.record.pool_id != self.pool.id {
            return Err(PipelineError::UsageError(format!(
                "record belongs to pool {} but was released to pool {}",
                self.record.pool_id, self.pool.id
            )));
        }
        loop {
            let current = self.record.refcount.load(Ordering::Acquire);
            if current == 0 {
                return Err(PipelineError::UsageError(
                    "double-release: record reference count is already zero".into(),
                ));
            }
            let next = current - 1;
            if self
                .record
                .refcount
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                if next == 0 {
                    self.record.clear_for_reuse();
                    self.pool.recycle(self.record.clone());
                }
                return Ok(());
            }
        }
    }
}

struct PoolInner {
    id: u64,
    free: Mutex<Vec<Arc<Record>>>,
}

impl PoolInner {
    fn recycle(&self, record: Arc<Record>) {
        self.free.lock().unwrap().push(record);
    }
}

/// A thread-safe pool of reusable [`Record`] allocations. Checkout hands out
/// a record with fields populated and a logical reference count of 1.
pub struct RecordPool {
    inner: Arc<PoolInner>,
    next_id: AtomicU64,
    next_monotonic: AtomicI64,
}

impl RecordPool {
    pub fn new() -> Self {
        static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);
        RecordPool {
            inner: Arc::new(PoolInner {
                id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
                free: Mutex::new(Vec::new()),
            }),
            next_id: AtomicU64::new(0),
            next_monotonic: AtomicI64::new(0),
        }
    }

    /// A monotonically increasing nanosecond counter local to this pool,
    /// usable as `RecordFields::monotonic_ns` when the caller has no finer
    /// clock source available.
    pub fn next_monotonic_ns(&self) -> u64 {
        self.next_monotonic.fetch_add(1, Ordering::Relaxed) as u64
    }

    pub fn checkout(&self, fields: RecordFields) -> PooledRecord {
        let mut free = self.inner.free.lock().unwrap();
        if let Some(record) = free.pop() {
            drop(free);
            *record.fields.lock().unwrap() = fields;
            record.refcount.store(1, Ordering::Release);
            record.published.store(false, Ordering::Release);
            return PooledRecord {
                pool: self.inner.clone(),
                record,
            };
        }
        drop(free);
        self.next_id.fetch_add(1, Ordering::Relaxed);
        PooledRecord {
            pool: self.inner.clone(),
            record: Arc::new(Record::fresh(self.inner.id, fields)),
        }
    }

    pub fn pooled_len(&self) -> usize {
        self.inner.free.lock().unwrap().len()
    }
}

impl Default for RecordPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fields() -> RecordFields {
        RecordFields {
            timestamp: DateTime::parse_from_rfc3339("2000-01-01T00:00:00Z").unwrap(),
            monotonic_ns: 0,
            writer_name: Arc::from("W"),
            level_name: Arc::from("Warning"),
            tags: TagSet::empty(),
            app_name: Arc::from("A"),
            process_name: Arc::from("P"),
            process_id: 42,
            text: "hello".into(),
            lost_message_count: None,
        }
    }

    #[test]
    fn checkout_starts_at_refcount_one_and_release_recycles() {
        let pool = RecordPool::new();
        let rec = pool.checkout(sample_fields());
        assert_eq!(pool.pooled_len(), 0);
        rec.release().unwrap();
        assert_eq!(pool.pooled_len(), 1);
    }

    #[test]
    fn retain_requires_matching_release_count() {
        let pool = RecordPool::new();
        let rec = pool.checkout(sample_fields());
        let retained = rec.retain();
        rec.release().unwrap();
        assert_eq!(pool.pooled_len(), 0, "still one outstanding handle");
        retained.release().unwrap();
        assert_eq!(pool.pooled_len(), 1);
    }

    #[test]
    fn double_release_is_fatal_usage_error() {
        let pool = RecordPool::new();
        let rec = pool.checkout(sample_fields());
        let dup = PooledRecord {
            pool: rec.pool.clone(),
            record: rec.record.clone(),
        };
        rec.release().unwrap();
        assert!(dup.release().is_err());
    }

    #[test]
    fn mutation_after_publish_is_rejected() {
        let pool = RecordPool::new();
        let rec = pool.checkout(sample_fields());
        rec.record().publish();
        assert!(rec.record().set_lost_message_count(3).is_err());
    }

    #[test]
    fn record_from_one_pool_cannot_release_to_another() {
        let pool_a = RecordPool::new();
        let pool_b = RecordPool::new();
        let rec = pool_a.checkout(sample_fields());
        let wrong_pool_handle = PooledRecord {
            pool: pool_b.inner.clone(),
            record: rec.record.clone(),
        };
        assert!(wrong_pool_handle.release().is_err());
    }
}
