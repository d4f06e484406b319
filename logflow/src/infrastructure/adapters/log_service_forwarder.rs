// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Log-Service Forwarder (§6, boundary only)
//!
//! Frames records for an out-of-scope wire protocol and hands them to a
//! [`LogServiceTransport`] — the on-wire format itself is an external
//! collaborator; this stage owns only the framing contract described in
//! §6: a frame may carry a string identifier or a small integer id
//! registered against it by one of the three registration commands
//! (writer/level/tag), so a hot-repeated name costs one registration frame
//! instead of a string on every record.
//!
//! Reconnect follows the pattern recovered from the corpus's own
//! `exponential_backoff::Backoff`-driven retry loop: back off between
//! attempts, bounded by `autoReconnectRetryInterval`, and make the sleep
//! itself cancellable by the shutdown token rather than a plain
//! `tokio::time::sleep` a shutdown could not interrupt (§4.G.5).

use async_trait::async_trait;
use dashmap::DashMap;
use exponential_backoff::Backoff;
use logflow_bootstrap::shutdown::CancellationToken;
use logflow_domain::entities::record::PooledRecord;
use logflow_domain::error::PipelineError;
use logflow_domain::settings::proxy::SettingsProxy;
use logflow_domain::value_objects::setting_value::SettingValue;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::infrastructure::runtime::async_stage::AsyncStageProcessor;

/// One frame handed to the transport. The wire encoding is the
/// transport's concern; this is the boundary shape §6 describes.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    RegisterWriter { id: u32, name: String },
    RegisterLevel { id: u32, name: String },
    RegisterTag { id: u32, name: String },
    Record {
        writer_id: u32,
        level_id: u32,
        tag_ids: Vec<u32>,
        app_name: String,
        process_name: String,
        process_id: u32,
        timestamp_utc_ticks: i64,
        text: String,
        lost_message_count: Option<u64>,
    },
}

/// The transport the forwarder sends framed batches over. The concrete
/// wire protocol is out of scope (§1); production code supplies a real
/// socket-backed implementation, tests supply an in-memory double.
#[async_trait]
pub trait LogServiceTransport: Send + Sync {
    async fn connect(&self, endpoint: &str, timeout: Duration) -> Result<(), PipelineError>;
    async fn send(&self, frames: &[Frame]) -> Result<(), PipelineError>;
    async fn disconnect(&self);
}

/// Interns names to small integer ids, emitting one registration frame the
/// first time a name is seen.
#[derive(Default)]
struct IdRegistry {
    ids: DashMap<String, u32>,
    next: AtomicU32,
}

impl IdRegistry {
    /// Resolves `name` to its id, registering a fresh one if this is the
    /// first time it's seen. Only ever called from the stage's own worker
    /// thread, so the get-then-insert has no concurrent writer to race.
    fn resolve(&self, name: &str) -> (u32, bool) {
        if let Some(id) = self.ids.get(name) {
            return (*id, false);
        }
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.ids.insert(name.to_string(), id);
        (id, true)
    }
}

pub struct LogServiceForwarder {
    transport: Arc<dyn LogServiceTransport>,
    default_endpoint: String,
    connect_timeout: Duration,
    reconnect_interval: Duration,
    endpoint: Mutex<String>,
    connected: AtomicBool,
    writers: IdRegistry,
    levels: IdRegistry,
    tags: IdRegistry,
}

impl LogServiceForwarder {
    pub fn new(transport: Arc<dyn LogServiceTransport>) -> Self {
        LogServiceForwarder {
            transport,
            default_endpoint: "127.0.0.1:9999".to_string(),
            connect_timeout: Duration::from_secs(5),
            reconnect_interval: Duration::from_secs(5),
            endpoint: Mutex::new(String::new()),
            connected: AtomicBool::new(false),
            writers: IdRegistry::default(),
            levels: IdRegistry::default(),
            tags: IdRegistry::default(),
        }
    }

    /// Connects, retrying with exponential backoff bounded by
    /// `autoReconnectRetryInterval`, until it succeeds or the shutdown
    /// token fires. The retry sleep races the token so a shutdown during a
    /// long backoff is still prompt (§4.G.5).
    async fn ensure_connected(&self, shutdown: &CancellationToken) -> Result<(), PipelineError> {
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        let endpoint = self.endpoint.lock().await.clone();
        let backoff = Backoff::new(u32::MAX, Duration::from_millis(100), self.reconnect_interval);
        let mut delays = (&backoff).into_iter();
        loop {
            if shutdown.is_cancelled() {
                return Err(PipelineError::Cancelled("forwarder reconnect aborted by shutdown".into()));
            }
            match self.transport.connect(&endpoint, self.connect_timeout).await {
                Ok(()) => {
                    self.connected.store(true, Ordering::Release);
                    return Ok(());
                }
                Err(e) => {
                    let wait = delays.next().unwrap_or(self.reconnect_interval);
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            return Err(PipelineError::Cancelled(format!(
                                "forwarder reconnect aborted by shutdown after: {e}"
                            )));
                        }
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }
    }

    fn frame_for(&self, record: &PooledRecord, registration: &mut Vec<Frame>) -> Frame {
        let r = record.record();
        let (writer_id, new_writer) = self.writers.resolve(&r.writer_name());
        if new_writer {
            registration.push(Frame::RegisterWriter { id: writer_id, name: r.writer_name().to_string() });
        }
        let (level_id, new_level) = self.levels.resolve(&r.level_name());
        if new_level {
            registration.push(Frame::RegisterLevel { id: level_id, name: r.level_name().to_string() });
        }
        let tag_set = r.tags();
        let mut tag_ids = Vec::with_capacity(tag_set.len());
        for tag in tag_set.iter() {
            let (id, new_tag) = self.tags.resolve(tag);
            if new_tag {
                registration.push(Frame::RegisterTag { id, name: tag.to_string() });
            }
            tag_ids.push(id);
        }
        Frame::Record {
            writer_id,
            level_id,
            tag_ids,
            app_name: r.app_name().to_string(),
            process_name: r.process_name().to_string(),
            process_id: r.process_id(),
            timestamp_utc_ticks: r.timestamp().timestamp_nanos_opt().unwrap_or(0),
            text: r.text(),
            lost_message_count: r.lost_message_count(),
        }
    }
}

#[async_trait]
impl AsyncStageProcessor for LogServiceForwarder {
    async fn on_initialize(&self, settings: &SettingsProxy) -> Result<(), PipelineError> {
        let endpoint = settings.register("endpoint", SettingValue::String(self.default_endpoint.clone()));
        if let SettingValue::String(e) = endpoint {
            *self.endpoint.lock().await = e;
        }
        Ok(())
    }

    async fn process_async(&self, batch: &[PooledRecord], shutdown: &CancellationToken) -> Result<(), PipelineError> {
        self.ensure_connected(shutdown).await?;

        let mut frames = Vec::new();
        let mut records = Vec::with_capacity(batch.len());
        for record in batch {
            records.push(self.frame_for(record, &mut frames));
        }
        frames.extend(records);

        match self.transport.send(&frames).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.connected.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    async fn on_shutdown(&self) -> Result<(), PipelineError> {
        self.transport.disconnect().await;
        self.connected.store(false, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logflow_domain::entities::record::{RecordFields, RecordPool};
    use logflow_domain::settings::registry::SettingsStore;
    use logflow_domain::value_objects::tag::TagSet;
    use std::sync::Mutex as StdMutex;
    use std::time::Instant;

    struct FlakyTransport {
        fail_connects: AtomicU32,
        sent: StdMutex<Vec<Frame>>,
    }

    #[async_trait]
    impl LogServiceTransport for FlakyTransport {
        async fn connect(&self, _endpoint: &str, _timeout: Duration) -> Result<(), PipelineError> {
            if self.fail_connects.load(Ordering::SeqCst) > 0 {
                self.fail_connects.fetch_sub(1, Ordering::SeqCst);
                return Err(PipelineError::TransportError("connection refused".into()));
            }
            Ok(())
        }
        async fn send(&self, frames: &[Frame]) -> Result<(), PipelineError> {
            self.sent.lock().unwrap().extend_from_slice(frames);
            Ok(())
        }
        async fn disconnect(&self) {}
    }

    struct AlwaysFailTransport;

    #[async_trait]
    impl LogServiceTransport for AlwaysFailTransport {
        async fn connect(&self, _endpoint: &str, _timeout: Duration) -> Result<(), PipelineError> {
            Err(PipelineError::TransportError("unreachable".into()))
        }
        async fn send(&self, _frames: &[Frame]) -> Result<(), PipelineError> {
            unreachable!("never connects")
        }
        async fn disconnect(&self) {}
    }

    fn fields() -> RecordFields {
        RecordFields {
            timestamp: chrono::DateTime::parse_from_rfc3339("2000-01-01T00:00:00Z").unwrap(),
            monotonic_ns: 0,
            writer_name: Arc::from("w"),
            level_name: Arc::from("Info"),
            tags: TagSet::new(["x"]).unwrap(),
            app_name: Arc::from("a"),
            process_name: Arc::from("p"),
            process_id: 1,
            text: "hi".into(),
            lost_message_count: None,
        }
    }

    #[tokio::test]
    async fn registers_names_once_and_reuses_ids_on_repeat() {
        let transport = Arc::new(FlakyTransport { fail_connects: AtomicU32::new(0), sent: StdMutex::new(Vec::new()) });
        let forwarder = LogServiceForwarder::new(transport.clone());
        let store = Arc::new(SettingsStore::new());
        let proxy = SettingsProxy::new(store).scoped_to("log-service");
        forwarder.on_initialize(&proxy).await.unwrap();

        let pool = RecordPool::new();
        let token = logflow_bootstrap::shutdown::ShutdownCoordinator::default().token();
        let rec1 = pool.checkout(fields());
        let rec2 = pool.checkout(fields());
        forwarder.process_async(&[rec1], &token).await.unwrap();
        forwarder.process_async(&[rec2], &token).await.unwrap();

        let sent = transport.sent.lock().unwrap();
        let registrations = sent.iter().filter(|f| matches!(f, Frame::RegisterWriter { .. })).count();
        assert_eq!(registrations, 1, "writer name should be registered only once");
    }

    #[tokio::test]
    async fn reconnects_after_a_transient_failure() {
        let transport = Arc::new(FlakyTransport { fail_connects: AtomicU32::new(2), sent: StdMutex::new(Vec::new()) });
        let forwarder = LogServiceForwarder::new(transport.clone());
        let pool = RecordPool::new();
        let token = logflow_bootstrap::shutdown::ShutdownCoordinator::default().token();
        let rec = pool.checkout(fields());
        forwarder.process_async(&[rec], &token).await.unwrap();
        assert!(!transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_stuck_reconnect_promptly() {
        let transport = Arc::new(AlwaysFailTransport);
        let forwarder = LogServiceForwarder::new(transport);
        let pool = RecordPool::new();
        let coordinator = logflow_bootstrap::shutdown::ShutdownCoordinator::new(Duration::from_secs(30));
        let token = coordinator.token();

        let token_for_cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            token_for_cancel.cancel();
        });

        let rec = pool.checkout(fields());
        let start = Instant::now();
        let result = forwarder.process_async(&[rec], &token).await;
        assert!(result.is_err());
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
