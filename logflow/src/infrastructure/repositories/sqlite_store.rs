// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Store Access Engine (§4.I)
//!
//! [`SqliteRecordStore`] implements [`RecordStore`] against the schema
//! created by [`super::schema`]. Appends intern each identifier string
//! in-transaction (insert-if-missing for the Analysis schema's dictionary
//! tables), assign dense strictly-increasing ids, and roll back on any
//! failure; `prune` computes a single cut id from the count and age bounds
//! and deletes `records`/`texts` up to it in one transaction.
//!
//! Dictionary lookups in the Analysis schema are fronted by an in-process
//! [`DashMap`] so a hot repeated writer/level/app/process name does not cost
//! a round trip per record (recovered from `original_source/`, see
//! SPEC_FULL.md) — invalidated whenever a store is freshly opened since the
//! cache is keyed to one `SqliteRecordStore` instance.

use crate::infrastructure::metrics::SharedMetrics;
use crate::infrastructure::repositories::schema::{self, DurabilityMode, StorePurpose, MAX_ADDRESSABLE_RECORDS};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use dashmap::DashMap;
use logflow_domain::error::PipelineError;
use logflow_domain::repositories::record_store::{NewRecord, PruneOutcome, RecordRow, RecordStore, StoreStats};
use logflow_domain::value_objects::ids::RecordId;
use logflow_domain::value_objects::tag::TagSet;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::time::Duration;

/// The store access engine for one open file (§4.I). Owns its connection
/// pool and, for the Analysis schema, the dictionary lookup cache.
pub struct SqliteRecordStore {
    pool: SqlitePool,
    purpose: StorePurpose,
    /// `(table name, value)` -> row id. Only populated for the Analysis
    /// schema; the Recording schema has no dictionaries.
    dict_cache: DashMap<(&'static str, String), i64>,
    metrics: SharedMetrics,
}

impl SqliteRecordStore {
    pub async fn open(
        path: &str,
        purpose: StorePurpose,
        durability: DurabilityMode,
        metrics: SharedMetrics,
    ) -> Result<Self, PipelineError> {
        let pool = schema::open_store(path, purpose, durability).await?;
        Ok(SqliteRecordStore {
            pool,
            purpose,
            dict_cache: DashMap::new(),
            metrics,
        })
    }

    pub fn purpose(&self) -> StorePurpose {
        self.purpose
    }

    fn label(&self) -> String {
        format!("{:?}", self.purpose)
    }

    pub async fn clear(&self, messages_only: bool) -> Result<(), PipelineError> {
        schema::clear_tables(&self.pool, self.purpose, messages_only).await?;
        if !messages_only {
            self.dict_cache.clear();
        }
        Ok(())
    }

    /// Looks up or inserts `value` in dictionary `table`, preferring the
    /// in-process cache before a round trip.
    async fn intern_dict(&self, tx: &mut Transaction<'_, Sqlite>, table: &'static str, value: &str) -> Result<i64, PipelineError> {
        if let Some(id) = self.dict_cache.get(&(table, value.to_string())) {
            return Ok(*id);
        }
        sqlx::query(&format!("INSERT OR IGNORE INTO {table} (name) VALUES (?)"))
            .bind(value)
            .execute(&mut **tx)
            .await
            .map_err(|e| PipelineError::write_failed(e.to_string()))?;
        let id: i64 = sqlx::query_scalar(&format!("SELECT id FROM {table} WHERE name = ?"))
            .bind(value)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| PipelineError::write_failed(e.to_string()))?;
        self.dict_cache.insert((table, value.to_string()), id);
        Ok(id)
    }

    async fn next_id(&self, tx: &mut Transaction<'_, Sqlite>) -> Result<RecordId, PipelineError> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM records")
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| PipelineError::write_failed(e.to_string()))?;
        let next = max.map(|m| m + 1).unwrap_or(0);
        if next as u64 >= MAX_ADDRESSABLE_RECORDS {
            return Err(PipelineError::FileTooLarge {
                record_count: next as u64,
                max: MAX_ADDRESSABLE_RECORDS,
            });
        }
        Ok(RecordId(next))
    }

    async fn insert_one(&self, tx: &mut Transaction<'_, Sqlite>, id: RecordId, row: &NewRecord) -> Result<(), PipelineError> {
        let tags_json = serde_json::to_string(&row.tags.iter().collect::<Vec<_>>())
            .map_err(|e| PipelineError::SerializationError(e.to_string()))?;
        let ts_ticks = row.timestamp.timestamp_nanos_opt().unwrap_or(0);
        let offset_ticks = row.timestamp.offset().local_minus_utc() as i64;

        match self.purpose {
            StorePurpose::Recording => {
                sqlx::query(
                    "INSERT INTO records (id, timestamp_utc_ticks, timezone_offset_ticks, high_precision_ts,
                        lost_message_count, process_id, process_name, application_name, writer_name, level_name, tags)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(id.0)
                .bind(ts_ticks)
                .bind(offset_ticks)
                .bind(row.monotonic_ns as i64)
                .bind(row.lost_message_count.map(|c| c as i64))
                .bind(row.process_id as i64)
                .bind(&row.process_name)
                .bind(&row.app_name)
                .bind(&row.writer_name)
                .bind(&row.level_name)
                .bind(&tags_json)
                .execute(&mut **tx)
                .await
                .map_err(|e| PipelineError::write_failed(e.to_string()))?;
            }
            StorePurpose::Analysis => {
                let process_ref = self.intern_dict(tx, "processes", &row.process_name).await?;
                let application_ref = self.intern_dict(tx, "applications", &row.app_name).await?;
                let writer_ref = self.intern_dict(tx, "writers", &row.writer_name).await?;
                let level_ref = self.intern_dict(tx, "levels", &row.level_name).await?;
                sqlx::query(
                    "INSERT INTO records (id, timestamp_utc_ticks, timezone_offset_ticks, high_precision_ts,
                        lost_message_count, process_id, process_ref, application_ref, writer_ref, level_ref, tags)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(id.0)
                .bind(ts_ticks)
                .bind(offset_ticks)
                .bind(row.monotonic_ns as i64)
                .bind(row.lost_message_count.map(|c| c as i64))
                .bind(row.process_id as i64)
                .bind(process_ref)
                .bind(application_ref)
                .bind(writer_ref)
                .bind(level_ref)
                .bind(&tags_json)
                .execute(&mut **tx)
                .await
                .map_err(|e| PipelineError::write_failed(e.to_string()))?;
            }
        }
        sqlx::query("INSERT INTO texts (id, text) VALUES (?, ?)")
            .bind(id.0)
            .bind(&row.text)
            .execute(&mut **tx)
            .await
            .map_err(|e| PipelineError::write_failed(e.to_string()))?;
        Ok(())
    }

    fn row_query(&self) -> &'static str {
        match self.purpose {
            StorePurpose::Recording => {
                "SELECT r.id, r.timestamp_utc_ticks, r.timezone_offset_ticks, r.high_precision_ts,
                        r.lost_message_count, r.process_id, r.process_name, r.application_name,
                        r.writer_name, r.level_name, r.tags, t.text
                 FROM records r JOIN texts t ON t.id = r.id
                 WHERE r.id >= ? ORDER BY r.id ASC LIMIT ?"
            }
            StorePurpose::Analysis => {
                "SELECT r.id, r.timestamp_utc_ticks, r.timezone_offset_ticks, r.high_precision_ts,
                        r.lost_message_count, r.process_id, p.name AS process_name, a.name AS application_name,
                        w.name AS writer_name, l.name AS level_name, r.tags, t.text
                 FROM records r
                 JOIN texts t ON t.id = r.id
                 JOIN processes p ON p.id = r.process_ref
                 JOIN applications a ON a.id = r.application_ref
                 JOIN writers w ON w.id = r.writer_ref
                 JOIN levels l ON l.id = r.level_ref
                 WHERE r.id >= ? ORDER BY r.id ASC LIMIT ?"
            }
        }
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<RecordRow, PipelineError> {
        let id: i64 = row.get("id");
        let ts_ticks: i64 = row.get("timestamp_utc_ticks");
        let offset_ticks: i64 = row.get("timezone_offset_ticks");
        let offset = FixedOffset::east_opt(offset_ticks as i32).unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
        let utc = Utc.timestamp_nanos(ts_ticks);
        let timestamp: DateTime<FixedOffset> = utc.with_timezone(&offset);
        let lost_message_count: Option<i64> = row.get("lost_message_count");
        let tags_json: String = row.get("tags");
        let tag_strings: Vec<String> = serde_json::from_str(&tags_json).map_err(|e| PipelineError::read_failed(e.to_string()))?;
        let tags = TagSet::new(tag_strings).map_err(|e| PipelineError::read_failed(e.to_string()))?;
        Ok(RecordRow {
            id: RecordId(id),
            timestamp,
            monotonic_ns: row.get::<i64, _>("high_precision_ts") as u64,
            writer_name: row.get("writer_name"),
            level_name: row.get("level_name"),
            tags,
            app_name: row.get("application_name"),
            process_name: row.get("process_name"),
            process_id: row.get::<i64, _>("process_id") as u32,
            text: row.get("text"),
            lost_message_count: lost_message_count.map(|c| c as u64),
        })
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn append(&self, row: NewRecord) -> Result<RecordId, PipelineError> {
        let result = async {
            let mut tx = self.pool.begin().await.map_err(|e| PipelineError::write_failed(e.to_string()))?;
            let id = self.next_id(&mut tx).await?;
            self.insert_one(&mut tx, id, &row).await?;
            tx.commit().await.map_err(|e| PipelineError::write_failed(e.to_string()))?;
            Ok(id)
        }
        .await;
        match &result {
            Ok(_) => self.metrics.record_store_appended(&self.label(), 1),
            Err(_) => self.metrics.record_store_append_failed(&self.label()),
        }
        result
    }

    async fn append_batch(&self, rows: Vec<NewRecord>) -> Result<Vec<RecordId>, PipelineError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let count = rows.len() as u64;
        let result = async {
            let mut tx = self.pool.begin().await.map_err(|e| PipelineError::write_failed(e.to_string()))?;
            let mut ids = Vec::with_capacity(rows.len());
            let mut next = self.next_id(&mut tx).await?;
            for row in &rows {
                self.insert_one(&mut tx, next, row).await?;
                ids.push(next);
                next = next.next();
            }
            tx.commit().await.map_err(|e| PipelineError::write_failed(e.to_string()))?;
            Ok(ids)
        }
        .await;
        match &result {
            Ok(_) => self.metrics.record_store_appended(&self.label(), count),
            Err(_) => self.metrics.record_store_append_failed(&self.label()),
        }
        result
    }

    async fn read_range(&self, from_id: RecordId, count: usize) -> Result<Vec<RecordRow>, PipelineError> {
        let start = if from_id.is_none() { 0 } else { from_id.0 };
        let rows = sqlx::query(self.row_query())
            .bind(start)
            .bind(count as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PipelineError::read_failed(e.to_string()))?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn prune(&self, max_count: i64, max_age: Duration) -> Result<PruneOutcome, PipelineError> {
        let stats = self.stats().await?;
        if stats.is_empty() {
            return Ok(PruneOutcome { cut_id: RecordId::NONE, removed_count: 0 });
        }

        let candidate_count_id = if max_count >= 0 && stats.count > max_count as u64 {
            RecordId(stats.oldest_id.0 + (stats.count - max_count as u64) as i64 - 1)
        } else {
            RecordId::NONE
        };

        let candidate_age_id = if max_age > Duration::ZERO {
            let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::zero());
            let cutoff_ticks = cutoff.timestamp_nanos_opt().unwrap_or(0);
            let max_id: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM records WHERE timestamp_utc_ticks < ?")
                .bind(cutoff_ticks)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| PipelineError::read_failed(e.to_string()))?;
            max_id.map(RecordId).unwrap_or(RecordId::NONE)
        } else {
            RecordId::NONE
        };

        let cut_id = candidate_count_id.max(candidate_age_id);
        if cut_id.is_none() {
            return Ok(PruneOutcome { cut_id: RecordId::NONE, removed_count: 0 });
        }

        let mut tx = self.pool.begin().await.map_err(|e| PipelineError::write_failed(e.to_string()))?;
        sqlx::query("DELETE FROM records WHERE id <= ?")
            .bind(cut_id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| PipelineError::write_failed(e.to_string()))?;
        sqlx::query("DELETE FROM texts WHERE id <= ?")
            .bind(cut_id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| PipelineError::write_failed(e.to_string()))?;
        tx.commit().await.map_err(|e| PipelineError::write_failed(e.to_string()))?;

        let removed_count = (cut_id.0 - stats.oldest_id.0 + 1) as u64;
        self.metrics.record_store_pruned(&self.label(), removed_count);
        Ok(PruneOutcome { cut_id, removed_count })
    }

    async fn clear(&self, messages_only: bool) -> Result<(), PipelineError> {
        SqliteRecordStore::clear(self, messages_only).await
    }

    async fn stats(&self) -> Result<StoreStats, PipelineError> {
        let row = sqlx::query("SELECT MIN(id) AS oldest, MAX(id) AS newest, COUNT(*) AS cnt FROM records")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PipelineError::read_failed(e.to_string()))?;
        let oldest: Option<i64> = row.get("oldest");
        let newest: Option<i64> = row.get("newest");
        let count: i64 = row.get("cnt");
        Ok(StoreStats {
            oldest_id: oldest.map(RecordId).unwrap_or(RecordId::NONE),
            newest_id: newest.map(RecordId).unwrap_or(RecordId::NONE),
            count: count as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::metrics::Metrics;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn sample(text: &str) -> NewRecord {
        NewRecord {
            timestamp: DateTime::parse_from_rfc3339("2000-01-01T00:00:00Z").unwrap(),
            monotonic_ns: 0,
            writer_name: "W".into(),
            level_name: "Warning".into(),
            tags: TagSet::empty(),
            app_name: "A".into(),
            process_name: "P".into(),
            process_id: 42,
            text: text.into(),
            lost_message_count: None,
        }
    }

    async fn open_temp(purpose: StorePurpose) -> SqliteRecordStore {
        let f = NamedTempFile::new().unwrap();
        let path = f.path().to_str().unwrap().to_string();
        drop(f);
        SqliteRecordStore::open(&path, purpose, DurabilityMode::Fast, Arc::new(Metrics::new().unwrap()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn empty_store_has_none_ids_and_zero_count() {
        let store = open_temp(StorePurpose::Recording).await;
        let stats = store.stats().await.unwrap();
        assert!(stats.is_empty());
    }

    #[tokio::test]
    async fn append_one_assigns_id_zero_and_reads_back() {
        let store = open_temp(StorePurpose::Recording).await;
        let id = store.append(sample("hello")).await.unwrap();
        assert_eq!(id, RecordId(0));
        let rows = store.read_range(RecordId(0), 1).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text, "hello");
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.count, 1);
    }

    #[tokio::test]
    async fn analysis_schema_round_trips_through_dictionaries() {
        let store = open_temp(StorePurpose::Analysis).await;
        store.append(sample("x")).await.unwrap();
        let rows = store.read_range(RecordId(0), 1).await.unwrap();
        assert_eq!(rows[0].writer_name, "W");
        assert_eq!(rows[0].process_name, "P");
    }

    #[tokio::test]
    async fn prune_by_count_keeps_newest() {
        let store = open_temp(StorePurpose::Recording).await;
        for i in 0..10 {
            store.append(sample(&format!("msg{i}"))).await.unwrap();
        }
        let outcome = store.prune(5, Duration::ZERO).await.unwrap();
        assert_eq!(outcome.removed_count, 5);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.oldest_id, RecordId(5));
        assert_eq!(stats.newest_id, RecordId(9));
        assert_eq!(stats.count, 5);
    }

    #[tokio::test]
    async fn prune_twice_is_idempotent() {
        let store = open_temp(StorePurpose::Recording).await;
        for i in 0..10 {
            store.append(sample(&format!("msg{i}"))).await.unwrap();
        }
        store.prune(5, Duration::ZERO).await.unwrap();
        let second = store.prune(5, Duration::ZERO).await.unwrap();
        assert_eq!(second.removed_count, 0);
    }

    #[tokio::test]
    async fn append_batch_is_atomic() {
        let store = open_temp(StorePurpose::Recording).await;
        let batch = vec![sample("a"), sample("b"), sample("c")];
        let ids = store.append_batch(batch).await.unwrap();
        assert_eq!(ids, vec![RecordId(0), RecordId(1), RecordId(2)]);
    }

    #[tokio::test]
    async fn clear_messages_only_preserves_dictionary_cache_hit() {
        let store = open_temp(StorePurpose::Analysis).await;
        store.append(sample("a")).await.unwrap();
        store.clear(true).await.unwrap();
        let stats = store.stats().await.unwrap();
        assert!(stats.is_empty());
        // re-append reuses the cached dictionary id rather than erroring
        store.append(sample("b")).await.unwrap();
    }
}
