// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Running Pipeline (§4.E)
//!
//! Binds a [`Pipeline`] graph to the concrete adapter behind each of its
//! stages and drives the lifecycle: `initialize` walks the graph
//! reverse-topologically (leaves first) so a stage's `on_initialize` never
//! runs before everything downstream of it is already `Attached`; on
//! failure, every stage already initialized is torn down in reverse order.
//! `shutdown` walks the graph topologically (roots first).
//!
//! Dispatch (`write`) implements the splitter semantics generically: any
//! stage whose sync processor returns [`SyncOutcome::Forward`] has the
//! record delivered to every one of its downstream links, retaining one
//! extra reference per extra downstream target. An async stage is always a
//! dispatch terminus from the runtime's point of view — whatever further
//! fan-out it performs happens inside its own `process_async`.

use super::async_stage::{AsyncStage, AsyncStageConfig, AsyncStageProcessor};
use super::sync_stage::{SyncOutcome, SyncStageProcessor};
use crate::infrastructure::metrics::SharedMetrics;
use logflow_bootstrap::system_logger::SystemLogger;
use logflow_domain::aggregates::pipeline::Pipeline;
use logflow_domain::entities::record::{PooledRecord, RecordFields, RecordPool};
use logflow_domain::entities::stage::{Stage, StageState};
use logflow_domain::error::PipelineError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A registered async stage's processor, its attach-time configuration, and
/// the live worker handle once `initialize` has spawned it.
pub struct AsyncStageSlot {
    processor: Arc<dyn AsyncStageProcessor>,
    config: AsyncStageConfig,
    handle: Mutex<Option<AsyncStage>>,
}

impl AsyncStageSlot {
    pub fn new(processor: Arc<dyn AsyncStageProcessor>, config: AsyncStageConfig) -> Self {
        AsyncStageSlot {
            processor,
            config,
            handle: Mutex::new(None),
        }
    }
}

/// One stage's runtime behavior, keyed by stage name in
/// [`RunningPipeline`]. A stage is sync or async per §4.E/§4.F/§4.G —
/// never both.
pub enum StageRuntime {
    Sync(Box<dyn SyncStageProcessor>),
    Async(AsyncStageSlot),
}

/// A [`Pipeline`] graph bound to live adapters, ready to accept records and
/// to be taken through its attach/shutdown lifecycle.
pub struct RunningPipeline {
    pipeline: Arc<Pipeline>,
    processors: HashMap<String, StageRuntime>,
    pool: Arc<RecordPool>,
    system_logger: Arc<dyn SystemLogger>,
    metrics: SharedMetrics,
}

impl RunningPipeline {
    pub fn new(
        pipeline: Arc<Pipeline>,
        processors: HashMap<String, StageRuntime>,
        pool: Arc<RecordPool>,
        system_logger: Arc<dyn SystemLogger>,
        metrics: SharedMetrics,
    ) -> Self {
        RunningPipeline {
            pipeline,
            processors,
            pool,
            system_logger,
            metrics,
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn pool(&self) -> &Arc<RecordPool> {
        &self.pool
    }

    /// Checks out a record from the pool, publishes it, and hands it to
    /// `entry_stage` (§4.E/§4.F data flow: producer → pool → entry stage →
    /// stage chain).
    pub fn write(&self, entry_stage: &str, fields: RecordFields) -> Result<(), PipelineError> {
        let pooled = self.pool.checkout(fields);
        pooled.record().publish();
        self.dispatch(entry_stage, pooled)
    }

    fn dispatch(&self, stage_name: &str, record: PooledRecord) -> Result<(), PipelineError> {
        let stage = self
            .pipeline
            .stage(stage_name)
            .ok_or_else(|| PipelineError::NotFound(stage_name.to_string()))?;
        match self.processors.get(stage_name) {
            Some(StageRuntime::Sync(processor)) => match processor.process_sync(&record)? {
                SyncOutcome::Forward => self.fan_out(stage, record),
                SyncOutcome::Stop => record.release(),
            },
            Some(StageRuntime::Async(slot)) => {
                let handle = slot.handle.lock().unwrap();
                match handle.as_ref() {
                    Some(h) => h.enqueue(record),
                    None => Err(PipelineError::InvalidConfiguration(format!(
                        "stage '{stage_name}' is not attached"
                    ))),
                }
            }
            None => Err(PipelineError::NotFound(stage_name.to_string())),
        }
    }

    fn fan_out(&self, stage: &Stage, record: PooledRecord) -> Result<(), PipelineError> {
        let downstream = stage.downstream();
        if downstream.is_empty() {
            return record.release();
        }
        let last = downstream.len() - 1;
        let mut record = Some(record);
        for (i, name) in downstream.iter().enumerate() {
            let to_send = if i == last {
                record.take().expect("record available for the final downstream link")
            } else {
                record.as_ref().expect("record available while fanning out").retain()
            };
            self.dispatch(name, to_send)?;
        }
        Ok(())
    }

    /// Attaches every stage, leaves first (§4.E). On any stage's
    /// `on_initialize` failing, already-attached stages are shut down in
    /// reverse order and the error is returned.
    pub async fn initialize(&self) -> Result<(), PipelineError> {
        let order = self.pipeline.reverse_topological_order();
        let mut initialized: Vec<&Stage> = Vec::new();
        for stage in order {
            stage.transition(StageState::Initializing)?;
            match self.initialize_one(stage).await {
                Ok(()) => {
                    stage.transition(StageState::Attached)?;
                    initialized.push(stage);
                }
                Err(e) => {
                    for done in initialized.into_iter().rev() {
                        self.shutdown_one(done).await;
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn initialize_one(&self, stage: &Stage) -> Result<(), PipelineError> {
        match self.processors.get(stage.name()) {
            Some(StageRuntime::Sync(processor)) => processor.on_initialize(stage.settings()),
            Some(StageRuntime::Async(slot)) => {
                slot.processor.on_initialize(stage.settings()).await?;
                let handle = AsyncStage::spawn(
                    stage.name(),
                    slot.processor.clone(),
                    slot.config,
                    self.system_logger.clone(),
                    self.metrics.clone(),
                );
                *slot.handle.lock().unwrap() = Some(handle);
                Ok(())
            }
            None => Err(PipelineError::NotFound(stage.name().to_string())),
        }
    }

    /// Tears the pipeline down, roots first (§4.E): drains and shuts down
    /// every async worker, calls `on_shutdown` on every sync stage.
    /// Individual stage failures are reported to the system logger rather
    /// than aborting the walk — `on_shutdown` must not throw.
    pub async fn shutdown(&self) {
        for stage in self.pipeline.topological_order() {
            self.shutdown_one(stage).await;
        }
    }

    async fn shutdown_one(&self, stage: &Stage) {
        if stage.transition(StageState::ShuttingDown).is_err() {
            return;
        }
        match self.processors.get(stage.name()) {
            Some(StageRuntime::Sync(processor)) => {
                if let Err(e) = processor.on_shutdown() {
                    self.system_logger.error(stage.name(), &format!("on_shutdown failed: {e}"));
                }
            }
            Some(StageRuntime::Async(slot)) => {
                let handle = slot.handle.lock().unwrap().take();
                if let Some(mut h) = handle {
                    h.shutdown();
                }
            }
            None => {}
        }
        let _ = stage.transition(StageState::Detached);
    }
}
