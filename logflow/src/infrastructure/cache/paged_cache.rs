// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Paged Cache (§4.J)
//!
//! A bounded window of fixed-size pages in front of a [`RecordStore`],
//! sized so a viewer can scroll through a large store without re-reading
//! the whole thing from disk on every frame. Pages are read-through: a miss
//! pulls `page_size` contiguous rows from the store and installs a new
//! page; eviction is least-recently-used once the page budget is spent.
//!
//! The cache is addressed by zero-based index relative to the store's
//! oldest live id, not by [`RecordId`] directly, matching how a viewer's
//! scrollbar maps position to row.

use crate::infrastructure::metrics::SharedMetrics;
use logflow_domain::error::PipelineError;
use logflow_domain::repositories::record_store::{RecordRow, RecordStore};
use logflow_domain::value_objects::ids::RecordId;
use parking_lot::Mutex;
use std::sync::Arc;

/// A single contiguous window of rows, anchored at `first_id`.
struct Page {
    first_id: RecordId,
    rows: Vec<RecordRow>,
    last_used: u64,
}

impl Page {
    fn covers(&self, id: RecordId) -> bool {
        let last = self.first_id.0 + self.rows.len() as i64 - 1;
        id.0 >= self.first_id.0 && id.0 <= last
    }

    fn row(&self, id: RecordId) -> Option<&RecordRow> {
        if !self.covers(id) {
            return None;
        }
        self.rows.get((id.0 - self.first_id.0) as usize)
    }
}

struct CacheState {
    pages: Vec<Page>,
    clock: u64,
}

/// Bounded, read-through cache of [`RecordRow`] pages fronting a
/// [`RecordStore`] for viewer scroll ranges.
pub struct PagedCache<S: RecordStore> {
    name: String,
    store: Arc<S>,
    page_size: usize,
    max_pages: usize,
    state: Mutex<CacheState>,
    metrics: SharedMetrics,
}

impl<S: RecordStore> PagedCache<S> {
    /// `page_size` is the number of contiguous records loaded per miss;
    /// `max_pages` bounds how many pages are held before LRU eviction.
    /// `name` labels this cache's metrics when more than one viewer is
    /// active at once.
    pub fn new(name: impl Into<String>, store: Arc<S>, page_size: usize, max_pages: usize, metrics: SharedMetrics) -> Self {
        assert!(page_size > 0, "page_size must be positive");
        assert!(max_pages > 0, "max_pages must be positive");
        Self {
            name: name.into(),
            store,
            page_size,
            max_pages,
            state: Mutex::new(CacheState {
                pages: Vec::new(),
                clock: 0,
            }),
            metrics,
        }
    }

    /// Resolves a scroll-relative `index` (0 = the store's oldest live
    /// record) to a row, loading a page on a cache miss. Returns `Ok(None)`
    /// when `index` is past the newest record or the store is empty.
    pub async fn get(&self, index: u64) -> Result<Option<RecordRow>, PipelineError> {
        let stats = self.store.stats().await?;
        if stats.is_empty() {
            return Ok(None);
        }
        let id = RecordId(stats.oldest_id.0 + index as i64);
        if id.0 > stats.newest_id.0 {
            return Ok(None);
        }

        if let Some(row) = self.lookup(id) {
            self.metrics.record_cache_hit(&self.name);
            return Ok(Some(row));
        }
        self.metrics.record_cache_miss(&self.name);

        let rows = self.store.read_range(id, self.page_size).await?;
        if rows.is_empty() {
            return Ok(None);
        }
        let row = rows[0].clone();
        self.install(Page {
            first_id: id,
            rows,
            last_used: 0,
        });
        Ok(Some(row))
    }

    /// Number of pages currently resident, for metrics/introspection.
    pub fn resident_pages(&self) -> usize {
        self.state.lock().pages.len()
    }

    /// Drops every resident page. Called after a write the cache has no
    /// cheaper way to reconcile against (e.g. `WriteFailed` recovery).
    pub fn invalidate_all(&self) {
        let mut state = self.state.lock();
        state.pages.clear();
    }

    /// Discards pages made stale by a prune: any page whose range starts
    /// at or before `cut_id` no longer reflects live store contents, since
    /// ids below `cut_id` have been removed and the cache's index-to-id
    /// mapping would shift under it.
    pub fn notify_pruned(&self, cut_id: RecordId) {
        if cut_id.is_none() {
            return;
        }
        let mut state = self.state.lock();
        state.pages.retain(|p| p.first_id.0 > cut_id.0);
    }

    /// Drops the single page covering the tail of the store (the page
    /// containing `last_known_newest`, if resident) so the next read picks
    /// up newly appended rows instead of serving a short, stale page.
    pub fn notify_appended(&self, last_known_newest: RecordId) {
        let mut state = self.state.lock();
        state.pages.retain(|p| !p.covers(last_known_newest));
    }

    fn lookup(&self, id: RecordId) -> Option<RecordRow> {
        let mut state = self.state.lock();
        let clock = state.clock;
        state.clock += 1;
        for page in state.pages.iter_mut() {
            if let Some(row) = page.row(id) {
                page.last_used = clock;
                return Some(row.clone());
            }
        }
        None
    }

    fn install(&self, page: Page) {
        let mut state = self.state.lock();
        let clock = state.clock;
        state.clock += 1;
        let mut page = page;
        page.last_used = clock;

        state.pages.retain(|p| p.first_id != page.first_id);
        state.pages.push(page);

        while state.pages.len() > self.max_pages {
            let evict = state
                .pages
                .iter()
                .enumerate()
                .min_by_key(|(_, p)| p.last_used)
                .map(|(i, _)| i);
            if let Some(i) = evict {
                state.pages.remove(i);
                self.metrics.record_cache_eviction(&self.name);
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::metrics::Metrics;
    use async_trait::async_trait;
    use chrono::{FixedOffset, TimeZone};
    use logflow_domain::repositories::record_store::{NewRecord, PruneOutcome, StoreStats};
    use logflow_domain::value_objects::tag::TagSet;
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;

    fn test_metrics() -> SharedMetrics {
        Arc::new(Metrics::new().unwrap())
    }

    /// A trivial in-memory store standing in for `SqliteRecordStore`,
    /// since the cache is written only against the `RecordStore` port.
    struct MemStore {
        rows: AsyncMutex<Vec<RecordRow>>,
    }

    impl MemStore {
        fn with_rows(n: i64) -> Self {
            let offset = FixedOffset::east_opt(0).unwrap();
            let rows = (0..n)
                .map(|i| RecordRow {
                    id: RecordId(i),
                    timestamp: offset.timestamp_opt(1_700_000_000 + i, 0).unwrap(),
                    monotonic_ns: i as u64,
                    writer_name: "w".into(),
                    level_name: "INFO".into(),
                    tags: TagSet::empty(),
                    app_name: "app".into(),
                    process_name: "proc".into(),
                    process_id: 1,
                    text: format!("line {i}"),
                    lost_message_count: None,
                })
                .collect();
            Self {
                rows: AsyncMutex::new(rows),
            }
        }
    }

    #[async_trait]
    impl RecordStore for MemStore {
        async fn append(&self, _row: NewRecord) -> Result<RecordId, PipelineError> {
            unimplemented!()
        }
        async fn append_batch(&self, _rows: Vec<NewRecord>) -> Result<Vec<RecordId>, PipelineError> {
            unimplemented!()
        }
        async fn read_range(&self, from_id: RecordId, count: usize) -> Result<Vec<RecordRow>, PipelineError> {
            let rows = self.rows.lock().await;
            Ok(rows
                .iter()
                .filter(|r| r.id.0 >= from_id.0)
                .take(count)
                .cloned()
                .collect())
        }
        async fn prune(&self, _max_count: i64, _max_age: Duration) -> Result<PruneOutcome, PipelineError> {
            unimplemented!()
        }
        async fn clear(&self, _messages_only: bool) -> Result<(), PipelineError> {
            unimplemented!()
        }
        async fn stats(&self) -> Result<StoreStats, PipelineError> {
            let rows = self.rows.lock().await;
            if rows.is_empty() {
                return Ok(StoreStats::empty());
            }
            Ok(StoreStats {
                oldest_id: rows.first().unwrap().id,
                newest_id: rows.last().unwrap().id,
                count: rows.len() as u64,
            })
        }
    }

    #[tokio::test]
    async fn get_loads_a_page_on_miss_and_serves_from_it_on_hit() {
        let store = Arc::new(MemStore::with_rows(100));
        let cache = PagedCache::new("test", store, 10, 4, test_metrics());

        let row = cache.get(5).await.unwrap().unwrap();
        assert_eq!(row.id, RecordId(5));
        assert_eq!(cache.resident_pages(), 1);

        // Same page, should not allocate a second page.
        let row2 = cache.get(7).await.unwrap().unwrap();
        assert_eq!(row2.id, RecordId(7));
        assert_eq!(cache.resident_pages(), 1);
    }

    #[tokio::test]
    async fn get_past_newest_returns_none() {
        let store = Arc::new(MemStore::with_rows(3));
        let cache = PagedCache::new("test", store, 10, 4, test_metrics());
        assert!(cache.get(10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_store_returns_none() {
        let store = Arc::new(MemStore::with_rows(0));
        let cache = PagedCache::new("test", store, 10, 4, test_metrics());
        assert!(cache.get(0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eviction_drops_the_least_recently_used_page() {
        let store = Arc::new(MemStore::with_rows(100));
        let cache = PagedCache::new("test", store, 10, 2, test_metrics());

        cache.get(0).await.unwrap(); // page A: [0,10)
        cache.get(20).await.unwrap(); // page B: [20,30)
        cache.get(0).await.unwrap(); // touch page A again
        cache.get(40).await.unwrap(); // page C: should evict B, the LRU one

        assert_eq!(cache.resident_pages(), 2);
        // Page A (touched most recently among the first two) must survive.
        assert!(cache.get(5).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn notify_pruned_drops_pages_below_the_cut_id() {
        let store = Arc::new(MemStore::with_rows(100));
        let cache = PagedCache::new("test", store, 10, 4, test_metrics());

        cache.get(0).await.unwrap();
        cache.get(50).await.unwrap();
        assert_eq!(cache.resident_pages(), 2);

        cache.notify_pruned(RecordId(10));
        assert_eq!(cache.resident_pages(), 1);
    }

    #[tokio::test]
    async fn invalidate_all_clears_every_page() {
        let store = Arc::new(MemStore::with_rows(100));
        let cache = PagedCache::new("test", store, 10, 4, test_metrics());
        cache.get(0).await.unwrap();
        cache.get(50).await.unwrap();
        cache.invalidate_all();
        assert_eq!(cache.resident_pages(), 0);
    }
}
