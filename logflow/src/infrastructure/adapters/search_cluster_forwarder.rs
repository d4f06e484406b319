// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Search Cluster Forwarder (§6, boundary only)
//!
//! Bulk-inserts a batch as one HTTP request against a search cluster's bulk
//! endpoint. Two target shapes are supported: a stream-style endpoint,
//! which wants a `create` action per document, and a plain index, which
//! wants `index` (an upsert by id). Each document body carries a schema
//! version field so a cluster holding documents from more than one build of
//! this forwarder can tell them apart.
//!
//! Reconnection shares the same backoff-with-cancellable-sleep shape as
//! [`super::log_service_forwarder::LogServiceForwarder`] (§4.G.5): a health
//! probe stands in for "connect", since HTTP has no persistent connection
//! to lose, but a cluster that is down still needs the same
//! retry-bounded-by-`autoReconnectRetryInterval` treatment before the
//! stage gives up on a batch.

use async_trait::async_trait;
use logflow_bootstrap::shutdown::CancellationToken;
use logflow_domain::entities::record::PooledRecord;
use logflow_domain::error::PipelineError;
use logflow_domain::settings::proxy::SettingsProxy;
use logflow_domain::value_objects::setting_value::SettingValue;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::infrastructure::runtime::async_stage::AsyncStageProcessor;

/// Schema version stamped onto every document this build produces.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    /// Append-only stream: every record is a new document (`create`).
    Stream,
    /// Plain index: documents may be upserted by id (`index`).
    Index,
}

impl TargetType {
    fn bulk_action(&self) -> &'static str {
        match self {
            TargetType::Stream => "create",
            TargetType::Index => "index",
        }
    }

    fn from_setting(s: &str) -> TargetType {
        if s.eq_ignore_ascii_case("index") {
            TargetType::Index
        } else {
            TargetType::Stream
        }
    }
}

#[derive(Debug, Serialize)]
struct Document {
    schema_version: u32,
    timestamp: String,
    writer: String,
    level: String,
    tags: Vec<String>,
    app_name: String,
    process_name: String,
    process_id: u32,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    lost_message_count: Option<u64>,
}

fn document_for(record: &PooledRecord) -> Document {
    let r = record.record();
    let tag_set = r.tags();
    Document {
        schema_version: SCHEMA_VERSION,
        timestamp: r.timestamp().to_rfc3339(),
        writer: r.writer_name().to_string(),
        level: r.level_name().to_string(),
        tags: tag_set.iter().map(String::from).collect(),
        app_name: r.app_name().to_string(),
        process_name: r.process_name().to_string(),
        process_id: r.process_id(),
        text: r.text(),
        lost_message_count: r.lost_message_count(),
    }
}

/// The HTTP boundary the forwarder drives. Production code wraps
/// `reqwest::Client`; tests supply an in-memory double.
#[async_trait]
pub trait SearchClusterClient: Send + Sync {
    async fn health_check(&self, endpoint: &str, timeout: Duration) -> Result<(), PipelineError>;
    async fn bulk_insert(&self, endpoint: &str, action: &str, documents: &[Document]) -> Result<(), PipelineError>;
}

/// A `reqwest`-backed [`SearchClusterClient`] against a bulk-insert
/// endpoint of the form `POST {endpoint}/_bulk`.
pub struct ReqwestSearchClusterClient {
    client: reqwest::Client,
}

impl ReqwestSearchClusterClient {
    pub fn new() -> Self {
        ReqwestSearchClusterClient { client: reqwest::Client::new() }
    }
}

impl Default for ReqwestSearchClusterClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchClusterClient for ReqwestSearchClusterClient {
    async fn health_check(&self, endpoint: &str, timeout: Duration) -> Result<(), PipelineError> {
        let url = format!("{endpoint}/_health");
        let resp = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| PipelineError::TransportError(format!("health check against '{url}': {e}")))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(PipelineError::TransportError(format!("health check against '{url}' returned {}", resp.status())))
        }
    }

    async fn bulk_insert(&self, endpoint: &str, action: &str, documents: &[Document]) -> Result<(), PipelineError> {
        let url = format!("{endpoint}/_bulk");
        let mut body = String::new();
        for doc in documents {
            body.push_str(&format!("{{\"{action}\":{{}}}}\n"));
            body.push_str(&serde_json::to_string(doc).map_err(PipelineError::from)?);
            body.push('\n');
        }
        let resp = self
            .client
            .post(&url)
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| PipelineError::TransportError(format!("bulk insert against '{url}': {e}")))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(PipelineError::TransportError(format!("bulk insert against '{url}' returned {}", resp.status())))
        }
    }
}

pub struct SearchClusterForwarder {
    client: std::sync::Arc<dyn SearchClusterClient>,
    default_endpoint: String,
    endpoint: Mutex<String>,
    connect_timeout: Duration,
    reconnect_interval: Duration,
    target_type: Mutex<TargetType>,
    healthy: AtomicBool,
}

impl SearchClusterForwarder {
    pub fn new(client: std::sync::Arc<dyn SearchClusterClient>) -> Self {
        SearchClusterForwarder {
            client,
            default_endpoint: "http://127.0.0.1:9200".to_string(),
            endpoint: Mutex::new(String::new()),
            connect_timeout: Duration::from_secs(5),
            reconnect_interval: Duration::from_secs(5),
            target_type: Mutex::new(TargetType::Stream),
            healthy: AtomicBool::new(false),
        }
    }

    /// Health-checks the cluster, retrying with exponential backoff bounded
    /// by `autoReconnectRetryInterval` until it succeeds or the shutdown
    /// token fires (§4.G.5: the retry sleep must itself be cancellable).
    async fn ensure_healthy(&self, shutdown: &CancellationToken) -> Result<(), PipelineError> {
        if self.healthy.load(Ordering::Acquire) {
            return Ok(());
        }
        let endpoint = self.endpoint.lock().await.clone();
        let backoff = exponential_backoff::Backoff::new(u32::MAX, Duration::from_millis(100), self.reconnect_interval);
        let mut delays = (&backoff).into_iter();
        loop {
            if shutdown.is_cancelled() {
                return Err(PipelineError::Cancelled("forwarder health check aborted by shutdown".into()));
            }
            match self.client.health_check(&endpoint, self.connect_timeout).await {
                Ok(()) => {
                    self.healthy.store(true, Ordering::Release);
                    return Ok(());
                }
                Err(e) => {
                    let wait = delays.next().unwrap_or(self.reconnect_interval);
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            return Err(PipelineError::Cancelled(format!(
                                "forwarder health check aborted by shutdown after: {e}"
                            )));
                        }
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }
    }
}

#[async_trait]
impl AsyncStageProcessor for SearchClusterForwarder {
    async fn on_initialize(&self, settings: &SettingsProxy) -> Result<(), PipelineError> {
        let endpoint = settings.register("endpoint", SettingValue::String(self.default_endpoint.clone()));
        if let SettingValue::String(e) = endpoint {
            *self.endpoint.lock().await = e;
        }
        let target = settings.register("targetType", SettingValue::String("stream".to_string()));
        if let SettingValue::String(t) = target {
            *self.target_type.lock().await = TargetType::from_setting(&t);
        }
        Ok(())
    }

    async fn process_async(&self, batch: &[PooledRecord], shutdown: &CancellationToken) -> Result<(), PipelineError> {
        self.ensure_healthy(shutdown).await?;

        let endpoint = self.endpoint.lock().await.clone();
        let action = self.target_type.lock().await.bulk_action();
        let documents: Vec<Document> = batch.iter().map(document_for).collect();

        match self.client.bulk_insert(&endpoint, action, &documents).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.healthy.store(false, Ordering::Release);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logflow_domain::entities::record::{RecordFields, RecordPool};
    use logflow_domain::settings::registry::SettingsStore;
    use logflow_domain::value_objects::tag::TagSet;
    use std::sync::atomic::AtomicU32;
    use std::sync::{Arc, Mutex as StdMutex};

    struct RecordingClient {
        fail_health_checks: AtomicU32,
        inserts: StdMutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl SearchClusterClient for RecordingClient {
        async fn health_check(&self, _endpoint: &str, _timeout: Duration) -> Result<(), PipelineError> {
            if self.fail_health_checks.load(Ordering::SeqCst) > 0 {
                self.fail_health_checks.fetch_sub(1, Ordering::SeqCst);
                return Err(PipelineError::TransportError("cluster unreachable".into()));
            }
            Ok(())
        }
        async fn bulk_insert(&self, _endpoint: &str, action: &str, documents: &[Document]) -> Result<(), PipelineError> {
            self.inserts.lock().unwrap().push((action.to_string(), documents.len()));
            Ok(())
        }
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
    async fn stream_target_uses_create_action() {
        let client = Arc::new(RecordingClient { fail_health_checks: AtomicU32::new(0), inserts: StdMutex::new(Vec::new()) });
        let forwarder = SearchClusterForwarder::new(client.clone());
        let store = Arc::new(SettingsStore::new());
        let proxy = SettingsProxy::new(store).scoped_to("search-cluster");
        forwarder.on_initialize(&proxy).await.unwrap();

        let pool = RecordPool::new();
        let token = logflow_bootstrap::shutdown::ShutdownCoordinator::default().token();
        let batch = vec![pool.checkout(fields()), pool.checkout(fields())];
        forwarder.process_async(&batch, &token).await.unwrap();

        let inserts = client.inserts.lock().unwrap();
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0], ("create".to_string(), 2));
    }

    #[tokio::test]
    async fn index_target_uses_index_action() {
        let client = Arc::new(RecordingClient { fail_health_checks: AtomicU32::new(0), inserts: StdMutex::new(Vec::new()) });
        let forwarder = SearchClusterForwarder::new(client.clone());
        let store = Arc::new(SettingsStore::new());
        let proxy = SettingsProxy::new(store).scoped_to("search-cluster");
        proxy.set("targetType", SettingValue::String("index".into())).unwrap();
        proxy.register("targetType", SettingValue::String("stream".into()));
        forwarder.on_initialize(&proxy).await.unwrap();

        let pool = RecordPool::new();
        let token = logflow_bootstrap::shutdown::ShutdownCoordinator::default().token();
        let batch = vec![pool.checkout(fields())];
        forwarder.process_async(&batch, &token).await.unwrap();

        assert_eq!(client.inserts.lock().unwrap()[0].0, "index");
    }

    #[tokio::test]
    async fn recovers_after_a_transient_health_check_failure() {
        let client = Arc::new(RecordingClient { fail_health_checks: AtomicU32::new(2), inserts: StdMutex::new(Vec::new()) });
        let forwarder = SearchClusterForwarder::new(client.clone());
        let pool = RecordPool::new();
        let token = logflow_bootstrap::shutdown::ShutdownCoordinator::default().token();
        let batch = vec![pool.checkout(fields())];
        forwarder.process_async(&batch, &token).await.unwrap();
        assert_eq!(client.inserts.lock().unwrap().len(), 1);
    }
}
