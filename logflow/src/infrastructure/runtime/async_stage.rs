// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Async Stage Runtime (§4.G — "hardest part of the pipeline")
//!
//! Each [`AsyncStage`] owns a dedicated OS thread running its own
//! single-threaded (`current_thread`) Tokio runtime, not a task scheduled
//! on a shared pool: a shared pool's continuation hand-offs were observed
//! (per the donor's design notes, carried into SPEC_FULL.md) to cost a CPU
//! core going cold between hops, which matters for a stage doing
//! back-to-back network or disk I/O. Everything the worker awaits —
//! reconnect sleeps, the bounded queue, the shutdown token — resumes on
//! that same worker.
//!
//! Enqueue happens on the producer thread; the worker pops up to
//! `batch_max` items per wake and hands them to
//! [`AsyncStageProcessor::process_async`] as one batch, then releases each
//! record's reference. A `processAsync` failure is isolated at the stage
//! boundary: it is reported to the [`SystemLogger`] and never rethrown, so
//! one bad batch cannot kill the worker.

use crate::infrastructure::metrics::{SharedMetrics, StageTimer};
use async_trait::async_trait;
use logflow_bootstrap::shutdown::{CancellationToken, ShutdownCoordinator};
use logflow_bootstrap::system_logger::SystemLogger;
use logflow_domain::entities::record::PooledRecord;
use logflow_domain::entities::stage::OverflowPolicy;
use logflow_domain::error::PipelineError;
use logflow_domain::settings::proxy::SettingsProxy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Default bound on the per-stage queue (§4.G.1).
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;
/// Default batch size handed to `process_async` per worker wake.
pub const DEFAULT_BATCH_MAX: usize = 64;
/// Default grace period for queue drain on shutdown (§4.G.4).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// The contract an async-stage adapter implements (file writer, store
/// writer, the two forwarders). Runs exclusively on the stage's dedicated
/// worker thread.
#[async_trait]
pub trait AsyncStageProcessor: Send + Sync {
    async fn on_initialize(&self, _settings: &SettingsProxy) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Processes one batch, in enqueue order. Any `Err` is caught by the
    /// worker, reported to the system logger, and the batch is dropped —
    /// implementations must not rely on being retried.
    async fn process_async(&self, batch: &[PooledRecord], shutdown: &CancellationToken) -> Result<(), PipelineError>;

    async fn on_shutdown(&self) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Configuration read out of the stage's settings at attach time.
#[derive(Debug, Clone, Copy)]
pub struct AsyncStageConfig {
    pub queue_capacity: usize,
    pub batch_max: usize,
    pub overflow_policy: OverflowPolicy,
    pub shutdown_timeout: Duration,
}

impl Default for AsyncStageConfig {
    fn default() -> Self {
        AsyncStageConfig {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_max: DEFAULT_BATCH_MAX,
            overflow_policy: OverflowPolicy::Drop,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// A running async stage: the producer-facing handle on the bounded queue
/// and the dedicated worker thread behind it.
pub struct AsyncStage {
    name: String,
    sender: mpsc::Sender<PooledRecord>,
    policy: OverflowPolicy,
    lost_count: Arc<AtomicU64>,
    shutdown: ShutdownCoordinator,
    shutdown_timeout: Duration,
    worker: Option<std::thread::JoinHandle<()>>,
    metrics: SharedMetrics,
}

impl AsyncStage {
    /// Spawns the dedicated worker thread and returns the producer-facing
    /// handle. `on_initialize` has already been awaited by the caller
    /// before this is constructed (it needs the settings proxy, which the
    /// worker thread does not otherwise see).
    pub fn spawn(
        name: impl Into<String>,
        processor: Arc<dyn AsyncStageProcessor>,
        config: AsyncStageConfig,
        system_logger: Arc<dyn SystemLogger>,
        metrics: SharedMetrics,
    ) -> Self {
        let name = name.into();
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let shutdown = ShutdownCoordinator::new(config.shutdown_timeout);
        let lost_count = Arc::new(AtomicU64::new(0));

        let worker_name = name.clone();
        let worker_shutdown = shutdown.token();
        let worker_metrics = metrics.clone();
        let worker = std::thread::Builder::new()
            .name(format!("logflow-async-stage-{worker_name}"))
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build the dedicated async-stage runtime");
                rt.block_on(worker_loop(
                    worker_name,
                    processor,
                    receiver,
                    config.batch_max,
                    config.shutdown_timeout,
                    worker_shutdown,
                    system_logger,
                    worker_metrics,
                ));
            })
            .expect("failed to spawn dedicated async-stage worker thread");

        AsyncStage {
            name,
            sender,
            policy: config.overflow_policy,
            lost_count,
            shutdown,
            shutdown_timeout: config.shutdown_timeout,
            worker: Some(worker),
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueues one record from a producer thread (§4.G.1). Under `Block`,
    /// blocks the caller until space is available or the worker is gone.
    /// Under `Drop`, a full queue increments the stage's lost counter
    /// instead of blocking; the count is attached to the next record that
    /// actually makes it onto the queue.
    pub fn enqueue(&self, record: PooledRecord) -> Result<(), PipelineError> {
        let pending_loss = self.lost_count.swap(0, Ordering::AcqRel);
        if pending_loss > 0 {
            record.record().set_lost_message_count(pending_loss)?;
        }

        let result = match self.policy {
            OverflowPolicy::Block => self.sender.blocking_send(record).map_err(|_| {
                PipelineError::Cancelled(format!("stage '{}' worker is no longer running", self.name))
            }),
            OverflowPolicy::Drop => match self.sender.try_send(record) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(rec)) => {
                    // This enqueue attempt itself is the drop: restore the
                    // loss we tentatively attached to it, plus one.
                    self.lost_count.fetch_add(pending_loss + 1, Ordering::AcqRel);
                    self.metrics.record_dropped(&self.name, 1);
                    rec.release()
                }
                Err(mpsc::error::TrySendError::Closed(rec)) => {
                    let _ = rec.release();
                    Err(PipelineError::Cancelled(format!(
                        "stage '{}' worker is no longer running",
                        self.name
                    )))
                }
            },
        };
        if result.is_ok() {
            self.metrics.record_enqueued(&self.name);
            let depth = self.sender.max_capacity() - self.sender.capacity();
            self.metrics.set_queue_depth(&self.name, depth as i64);
        }
        result
    }

    /// Current lost-message count awaiting attachment to the next enqueue,
    /// for metrics/introspection.
    pub fn pending_lost_count(&self) -> u64 {
        self.lost_count.load(Ordering::Acquire)
    }

    /// Signals the shutdown token and joins the worker thread, which drains
    /// the queue for up to `shutdown_timeout` before exiting (§4.G.4).
    pub fn shutdown(&mut self) {
        self.shutdown.initiate_shutdown();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        self.shutdown.complete_shutdown();
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }
}

impl Drop for AsyncStage {
    fn drop(&mut self) {
        self.shutdown.initiate_shutdown();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        self.shutdown.complete_shutdown();
    }
}

async fn worker_loop(
    stage_name: String,
    processor: Arc<dyn AsyncStageProcessor>,
    mut receiver: mpsc::Receiver<PooledRecord>,
    batch_max: usize,
    shutdown_timeout: Duration,
    shutdown: CancellationToken,
    system_logger: Arc<dyn SystemLogger>,
    metrics: SharedMetrics,
) {
    let batch_max = batch_max.max(1);
    loop {
        let first = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            item = receiver.recv() => item,
        };
        let Some(first) = first else { break };

        let mut batch = Vec::with_capacity(batch_max);
        batch.push(first);
        while batch.len() < batch_max {
            match receiver.try_recv() {
                Ok(item) => batch.push(item),
                Err(_) => break,
            }
        }

        dispatch_batch(&stage_name, &*processor, batch, &shutdown, &*system_logger, &metrics).await;
    }

    drain_on_shutdown(
        &stage_name,
        &*processor,
        &mut receiver,
        shutdown_timeout,
        &shutdown,
        &*system_logger,
        &metrics,
    )
    .await;
    if let Err(e) = processor.on_shutdown().await {
        system_logger.error(&stage_name, &format!("on_shutdown failed: {e}"));
    }
}

async fn dispatch_batch(
    stage_name: &str,
    processor: &dyn AsyncStageProcessor,
    batch: Vec<PooledRecord>,
    shutdown: &CancellationToken,
    system_logger: &dyn SystemLogger,
    metrics: &SharedMetrics,
) {
    {
        let _timer = StageTimer::start(metrics, stage_name);
        if let Err(e) = processor.process_async(&batch, shutdown).await {
            system_logger.error(stage_name, &format!("process_async failed, batch dropped: {e}"));
        }
    }
    for record in batch {
        if let Err(e) = record.release() {
            system_logger.error(stage_name, &format!("releasing processed record failed: {e}"));
        }
    }
}

/// After the shutdown token fires, keeps draining whatever is still on the
/// queue for up to `shutdown_timeout` rather than discarding it outright —
/// records that do not make it in time are reported, not silently lost.
async fn drain_on_shutdown(
    stage_name: &str,
    processor: &dyn AsyncStageProcessor,
    receiver: &mut mpsc::Receiver<PooledRecord>,
    shutdown_timeout: Duration,
    shutdown: &CancellationToken,
    system_logger: &dyn SystemLogger,
    metrics: &SharedMetrics,
) {
    let deadline = tokio::time::Instant::now() + shutdown_timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, receiver.recv()).await {
            Ok(Some(record)) => {
                dispatch_batch(stage_name, processor, vec![record], shutdown, system_logger, metrics).await;
            }
            Ok(None) => break,
            Err(_) => break,
        }
    }

    // Anything left past the deadline is reported and released, never
    // silently dropped (§4.G.4, §8 scenario 8).
    let mut leftover = 0u64;
    while let Ok(record) = receiver.try_recv() {
        leftover += 1;
        let _ = record.release();
    }
    if leftover > 0 {
        system_logger.warn(
            stage_name,
            &format!("{leftover} record(s) discarded at shutdown after the drain deadline"),
        );
    }
}
