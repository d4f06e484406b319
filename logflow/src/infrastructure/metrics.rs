// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics
//!
//! Prometheus-based observability for the pipeline runtime and the store
//! engine, following the donor's `MetricsService` pattern: one `Registry`,
//! one struct of typed collectors built and registered in `new`, plain
//! methods that record a measurement. Every counter/gauge here is ambient
//! observability, not a pipeline feature, so it is carried regardless of
//! spec.md's stated Non-goals (SPEC_FULL.md "ambient stack").
//!
//! Metrics tracked:
//! - queue depth and enqueue/drop counters per async stage (§4.G)
//! - stage processing latency (sync and async)
//! - store append/prune counters and current record count (§4.I)
//! - paged cache hit/miss counters (§4.J)

use logflow_domain::error::PipelineError;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry};
use std::sync::Arc;
use std::time::Duration;

/// The process-wide metrics surface. Cheap to clone (everything inside is
/// already `Arc`-backed by `prometheus`'s own collector handles), so it is
/// typically held as `Arc<Metrics>` and passed to every stage and store at
/// construction time.
pub struct Metrics {
    registry: Registry,

    stage_queue_depth: IntGaugeVec,
    stage_enqueued_total: IntCounterVec,
    stage_dropped_total: IntCounterVec,
    stage_process_duration: HistogramVec,

    store_appended_total: IntCounterVec,
    store_append_failed_total: IntCounterVec,
    store_pruned_total: IntCounterVec,
    store_record_count: IntGaugeVec,

    cache_hits_total: IntCounterVec,
    cache_misses_total: IntCounterVec,
    cache_evictions_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, PipelineError> {
        let registry = Registry::new();
        let ns = "logflow";

        let stage_queue_depth = IntGaugeVec::new(
            Opts::new("stage_queue_depth", "Current number of records queued for an async stage").namespace(ns),
            &["stage"],
        )
        .map_err(metrics_err("stage_queue_depth"))?;

        let stage_enqueued_total = IntCounterVec::new(
            Opts::new("stage_enqueued_total", "Records successfully enqueued to a stage").namespace(ns),
            &["stage"],
        )
        .map_err(metrics_err("stage_enqueued_total"))?;

        let stage_dropped_total = IntCounterVec::new(
            Opts::new("stage_dropped_total", "Records dropped by a stage's overflow policy").namespace(ns),
            &["stage"],
        )
        .map_err(metrics_err("stage_dropped_total"))?;

        let stage_process_duration = HistogramVec::new(
            HistogramOpts::new("stage_process_duration_seconds", "Time spent in a stage's processing call")
                .namespace(ns)
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["stage"],
        )
        .map_err(metrics_err("stage_process_duration_seconds"))?;

        let store_appended_total = IntCounterVec::new(
            Opts::new("store_appended_total", "Records successfully appended to a record store").namespace(ns),
            &["store"],
        )
        .map_err(metrics_err("store_appended_total"))?;

        let store_append_failed_total = IntCounterVec::new(
            Opts::new("store_append_failed_total", "Append transactions rolled back").namespace(ns),
            &["store"],
        )
        .map_err(metrics_err("store_append_failed_total"))?;

        let store_pruned_total = IntCounterVec::new(
            Opts::new("store_pruned_total", "Records removed by prune() calls").namespace(ns),
            &["store"],
        )
        .map_err(metrics_err("store_pruned_total"))?;

        let store_record_count = IntGaugeVec::new(
            Opts::new("store_record_count", "Current record count in a store").namespace(ns),
            &["store"],
        )
        .map_err(metrics_err("store_record_count"))?;

        let cache_hits_total = IntCounterVec::new(
            Opts::new("cache_hits_total", "Paged cache reads served from a resident page").namespace(ns),
            &["cache"],
        )
        .map_err(metrics_err("cache_hits_total"))?;

        let cache_misses_total = IntCounterVec::new(
            Opts::new("cache_misses_total", "Paged cache reads that went to the store").namespace(ns),
            &["cache"],
        )
        .map_err(metrics_err("cache_misses_total"))?;

        let cache_evictions_total = IntCounterVec::new(
            Opts::new("cache_evictions_total", "Pages evicted from a paged cache").namespace(ns),
            &["cache"],
        )
        .map_err(metrics_err("cache_evictions_total"))?;

        let metrics = Metrics {
            registry,
            stage_queue_depth,
            stage_enqueued_total,
            stage_dropped_total,
            stage_process_duration,
            store_appended_total,
            store_append_failed_total,
            store_pruned_total,
            store_record_count,
            cache_hits_total,
            cache_misses_total,
            cache_evictions_total,
        };
        metrics.register_all()?;
        Ok(metrics)
    }

    fn register_all(&self) -> Result<(), PipelineError> {
        macro_rules! register {
            ($($collector:expr),+ $(,)?) => {
                $(
                    self.registry
                        .register(Box::new($collector.clone()))
                        .map_err(|e| PipelineError::internal(format!("failed to register metric: {e}")))?;
                )+
            };
        }
        register!(
            self.stage_queue_depth,
            self.stage_enqueued_total,
            self.stage_dropped_total,
            self.stage_process_duration,
            self.store_appended_total,
            self.store_append_failed_total,
            self.store_pruned_total,
            self.store_record_count,
            self.cache_hits_total,
            self.cache_misses_total,
            self.cache_evictions_total,
        );
        Ok(())
    }

    pub fn set_queue_depth(&self, stage: &str, depth: i64) {
        self.stage_queue_depth.with_label_values(&[stage]).set(depth);
    }

    pub fn record_enqueued(&self, stage: &str) {
        self.stage_enqueued_total.with_label_values(&[stage]).inc();
    }

    pub fn record_dropped(&self, stage: &str, count: u64) {
        self.stage_dropped_total.with_label_values(&[stage]).inc_by(count);
    }

    pub fn observe_process_duration(&self, stage: &str, elapsed: Duration) {
        self.stage_process_duration
            .with_label_values(&[stage])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_store_appended(&self, store: &str, count: u64) {
        self.store_appended_total.with_label_values(&[store]).inc_by(count);
    }

    pub fn record_store_append_failed(&self, store: &str) {
        self.store_append_failed_total.with_label_values(&[store]).inc();
    }

    pub fn record_store_pruned(&self, store: &str, count: u64) {
        self.store_pruned_total.with_label_values(&[store]).inc_by(count);
    }

    pub fn set_store_record_count(&self, store: &str, count: i64) {
        self.store_record_count.with_label_values(&[store]).set(count);
    }

    pub fn record_cache_hit(&self, cache: &str) {
        self.cache_hits_total.with_label_values(&[cache]).inc();
    }

    pub fn record_cache_miss(&self, cache: &str) {
        self.cache_misses_total.with_label_values(&[cache]).inc();
    }

    pub fn record_cache_eviction(&self, cache: &str) {
        self.cache_evictions_total.with_label_values(&[cache]).inc();
    }

    /// Renders the current state of every collector in the Prometheus text
    /// exposition format, for a `/metrics` endpoint.
    pub fn encode(&self) -> Result<String, PipelineError> {
        let encoder = prometheus::TextEncoder::new();
        let families = self.registry.gather();
        encoder
            .encode_to_string(&families)
            .map_err(|e| PipelineError::internal(format!("failed to encode metrics: {e}")))
    }
}

fn metrics_err(name: &'static str) -> impl FnOnce(prometheus::Error) -> PipelineError {
    move |e| PipelineError::internal(format!("failed to create metric '{name}': {e}"))
}

/// A stopwatch measuring one stage's processing call, recording into
/// [`Metrics::observe_process_duration`] when dropped. Covers both the
/// sync fast path (§4.F) and an async stage's batch dispatch (§4.G).
pub struct StageTimer<'a> {
    metrics: &'a Metrics,
    stage: &'a str,
    start: std::time::Instant,
}

impl<'a> StageTimer<'a> {
    pub fn start(metrics: &'a Metrics, stage: &'a str) -> Self {
        StageTimer {
            metrics,
            stage,
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for StageTimer<'_> {
    fn drop(&mut self) {
        self.metrics.observe_process_duration(self.stage, self.start.elapsed());
    }
}

/// A handle shared across the runtime and store engine. `Arc`-wrapped so
/// every stage and store can hold one without the ownership complexity of
/// passing `&Metrics` through the object-safe `AsyncStageProcessor`/
/// `SyncStageProcessor` trait boundaries.
pub type SharedMetrics = Arc<Metrics>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_registers_without_error() {
        Metrics::new().unwrap();
    }

    #[test]
    fn encode_reflects_recorded_values() {
        let metrics = Metrics::new().unwrap();
        metrics.record_enqueued("console");
        metrics.record_dropped("console", 3);
        metrics.set_queue_depth("console", 7);

        let text = metrics.encode().unwrap();
        assert!(text.contains("logflow_stage_enqueued_total"));
        assert!(text.contains("logflow_stage_dropped_total"));
        assert!(text.contains("logflow_stage_queue_depth"));
    }

    #[test]
    fn stage_timer_records_a_duration_on_drop() {
        let metrics = Metrics::new().unwrap();
        {
            let _timer = StageTimer::start(&metrics, "file");
            std::thread::sleep(Duration::from_millis(1));
        }
        let text = metrics.encode().unwrap();
        assert!(text.contains("logflow_stage_process_duration_seconds_count{stage=\"file\"} 1"));
    }

    #[test]
    fn store_and_cache_counters_accumulate() {
        let metrics = Metrics::new().unwrap();
        metrics.record_store_appended("primary", 5);
        metrics.record_store_pruned("primary", 2);
        metrics.set_store_record_count("primary", 3);
        metrics.record_cache_hit("viewer");
        metrics.record_cache_miss("viewer");
        metrics.record_cache_eviction("viewer");

        let text = metrics.encode().unwrap();
        assert!(text.contains("logflow_store_appended_total{store=\"primary\"} 5"));
        assert!(text.contains("logflow_store_record_count{store=\"primary\"} 3"));
        assert!(text.contains("logflow_cache_hits_total{cache=\"viewer\"} 1"));
    }
}
