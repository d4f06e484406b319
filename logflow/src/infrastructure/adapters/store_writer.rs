// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Store Writer (§4.G + §4.I)
//!
//! The async terminal stage that persists records through a
//! [`RecordStore`] — the integration point between the pipeline runtime
//! (components E/F/G) and the store access engine (components H/I). A
//! whole batch is appended atomically via
//! [`RecordStore::append_batch`]: either every record in the batch lands
//! or none do, which is a stronger guarantee than per-record appends would
//! give a bursty writer under the batching §4.G performs.

use async_trait::async_trait;
use logflow_bootstrap::shutdown::CancellationToken;
use logflow_domain::entities::record::PooledRecord;
use logflow_domain::error::PipelineError;
use logflow_domain::repositories::record_store::{NewRecord, RecordStore};
use std::sync::Arc;

use crate::infrastructure::runtime::async_stage::AsyncStageProcessor;

fn to_new_record(record: &PooledRecord) -> NewRecord {
    let r = record.record();
    NewRecord {
        timestamp: r.timestamp(),
        monotonic_ns: r.monotonic_ns(),
        writer_name: r.writer_name().to_string(),
        level_name: r.level_name().to_string(),
        tags: r.tags(),
        app_name: r.app_name().to_string(),
        process_name: r.process_name().to_string(),
        process_id: r.process_id(),
        text: r.text(),
        lost_message_count: r.lost_message_count(),
    }
}

/// Wraps a [`RecordStore`] as a pipeline stage. The store is opened by the
/// caller and handed in already-owned, matching §3's "a store file is
/// owned by the component that opened it" — the stage does not open or
/// close the file itself.
pub struct StoreWriter<S: RecordStore> {
    store: Arc<S>,
}

impl<S: RecordStore> StoreWriter<S> {
    pub fn new(store: Arc<S>) -> Self {
        StoreWriter { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

#[async_trait]
impl<S: RecordStore> AsyncStageProcessor for StoreWriter<S> {
    async fn process_async(&self, batch: &[PooledRecord], _shutdown: &CancellationToken) -> Result<(), PipelineError> {
        if batch.is_empty() {
            return Ok(());
        }
        let rows: Vec<NewRecord> = batch.iter().map(to_new_record).collect();
        self.store.append_batch(rows).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logflow_domain::entities::record::{RecordFields, RecordPool};
    use logflow_domain::repositories::record_store::{PruneOutcome, RecordRow, StoreStats};
    use logflow_domain::value_objects::ids::RecordId;
    use logflow_domain::value_objects::tag::TagSet;
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;

    struct MemStore {
        rows: AsyncMutex<Vec<NewRecord>>,
    }

    #[async_trait]
    impl RecordStore for MemStore {
        async fn append(&self, row: NewRecord) -> Result<RecordId, PipelineError> {
            let mut rows = self.rows.lock().await;
            let id = RecordId(rows.len() as i64);
            rows.push(row);
            Ok(id)
        }
        async fn append_batch(&self, rows: Vec<NewRecord>) -> Result<Vec<RecordId>, PipelineError> {
            let mut store = self.rows.lock().await;
            let mut ids = Vec::with_capacity(rows.len());
            for row in rows {
                ids.push(RecordId(store.len() as i64));
                store.push(row);
            }
            Ok(ids)
        }
        async fn read_range(&self, _from_id: RecordId, _count: usize) -> Result<Vec<RecordRow>, PipelineError> {
            unimplemented!()
        }
        async fn prune(&self, _max_count: i64, _max_age: Duration) -> Result<PruneOutcome, PipelineError> {
            unimplemented!()
        }
        async fn clear(&self, _messages_only: bool) -> Result<(), PipelineError> {
            unimplemented!()
        }
        async fn stats(&self) -> Result<StoreStats, PipelineError> {
            unimplemented!()
        }
    }

    fn fields(text: &str) -> RecordFields {
        RecordFields {
            timestamp: chrono::DateTime::parse_from_rfc3339("2000-01-01T00:00:00Z").unwrap(),
            monotonic_ns: 0,
            writer_name: std::sync::Arc::from("w"),
            level_name: std::sync::Arc::from("Info"),
            tags: TagSet::empty(),
            app_name: std::sync::Arc::from("a"),
            process_name: std::sync::Arc::from("p"),
            process_id: 1,
            text: text.into(),
            lost_message_count: None,
        }
    }

    #[tokio::test]
    async fn batch_is_appended_atomically() {
        let store = Arc::new(MemStore { rows: AsyncMutex::new(Vec::new()) });
        let writer = StoreWriter::new(store.clone());
        let pool = RecordPool::new();
        let token = logflow_bootstrap::shutdown::ShutdownCoordinator::default().token();

        let batch = vec![pool.checkout(fields("a")), pool.checkout(fields("b"))];
        writer.process_async(&batch, &token).await.unwrap();
        for r in batch {
            r.release().unwrap();
        }

        assert_eq!(store.rows.lock().await.len(), 2);
    }
}
