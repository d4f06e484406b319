// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Record Store Port
//!
//! The contract component I (the store access engine) fulfills, independent
//! of the concrete on-disk schema or durability mode. `logflow`'s SQLite
//! engine implements this trait; the paged cache (component J) and the
//! filtered view (component K) are written only against this port, the way
//! the donor's cache/view layers depend on `PipelineRepository` rather than
//! a concrete SQL type.

use crate::error::PipelineError;
use crate::value_objects::ids::RecordId;
use crate::value_objects::tag::TagSet;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use std::time::Duration;

/// A fully materialized row as read back from the store: record fields
/// joined with their text row and (in the Analysis schema) their
/// dictionary rows.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordRow {
    pub id: RecordId,
    pub timestamp: DateTime<FixedOffset>,
    pub monotonic_ns: u64,
    pub writer_name: String,
    pub level_name: String,
    pub tags: TagSet,
    pub app_name: String,
    pub process_name: String,
    pub process_id: u32,
    pub text: String,
    pub lost_message_count: Option<u64>,
}

/// Summary statistics kept consistent by every mutating operation (§8.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub oldest_id: RecordId,
    pub newest_id: RecordId,
    pub count: u64,
}

impl StoreStats {
    pub fn empty() -> Self {
        StoreStats {
            oldest_id: RecordId::NONE,
            newest_id: RecordId::NONE,
            count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.oldest_id.is_none() && self.newest_id.is_none() && self.count == 0
    }
}

/// What a `prune` call actually did, so the paged cache (§4.J) and a
/// filtered view (§4.K) can react precisely instead of re-scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruneOutcome {
    /// Inclusive upper bound of ids removed, or `RecordId::NONE` if nothing
    /// was removed.
    pub cut_id: RecordId,
    pub removed_count: u64,
}

/// The store access engine's port (§4.I). Implementations must uphold the
/// invariants in §8.3/§8.4: ids dense and strictly increasing, every
/// `records` row has a matching `texts` row, dictionary references resolve.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Appends one record within a transaction: intern each identifier in
    /// its dictionary (insert-if-missing), insert into `records`, insert
    /// into `texts`. Rolls back and returns `WriteFailed` on any failure.
    async fn append(&self, row: NewRecord) -> Result<RecordId, PipelineError>;

    /// Appends a batch atomically: either every record lands, or none do and
    /// every id that would have been assigned is rolled back.
    async fn append_batch(&self, rows: Vec<NewRecord>) -> Result<Vec<RecordId>, PipelineError>;

    /// Returns up to `count` contiguous records starting at `from_id` in
    /// ascending id order. A `from_id` below the oldest id starts at
    /// oldest instead (§4.I).
    async fn read_range(&self, from_id: RecordId, count: usize) -> Result<Vec<RecordRow>, PipelineError>;

    /// Removes the oldest records until `count <= max_count` **and** every
    /// remaining record's timestamp is within `max_age` of now. A single
    /// cut id is computed by taking the max of the two candidate cut ids;
    /// `max_count < 0` disables the count bound, `max_age == Duration::ZERO`
    /// disables the age bound.
    async fn prune(&self, max_count: i64, max_age: Duration) -> Result<PruneOutcome, PipelineError>;

    /// `messages_only = true` drops `records`/`texts` but preserves
    /// dictionaries; `false` drops everything, including resetting the id
    /// sequence back to zero (recovered from `original_source/`, see
    /// SPEC_FULL.md).
    async fn clear(&self, messages_only: bool) -> Result<(), PipelineError>;

    async fn stats(&self) -> Result<StoreStats, PipelineError>;
}

/// The fields needed to append one record — a store-layer view of
/// [`crate::entities::record::RecordFields`] that does not require a live
/// pooled record (the caller may have already released it by the time the
/// async stage's batch reaches the store).
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub timestamp: DateTime<FixedOffset>,
    pub monotonic_ns: u64,
    pub writer_name: String,
    pub level_name: String,
    pub tags: TagSet,
    pub app_name: String,
    pub process_name: String,
    pub process_id: u32,
    pub text: String,
    pub lost_message_count: Option<u64>,
}
