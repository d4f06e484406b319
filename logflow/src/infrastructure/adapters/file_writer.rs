// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Text File Writer (§4.G)
//!
//! An async stage: appending to a file is the textbook "durable writers
//! must be async" case from §4.F — a slow disk must never stall a
//! producer thread. The file handle is opened once, in `on_initialize`,
//! and appended to for the stage's whole attached lifetime; each batch is
//! written as one set of line writes followed by a single flush, trading a
//! little latency for fewer syscalls under load.

use async_trait::async_trait;
use logflow_bootstrap::shutdown::CancellationToken;
use logflow_domain::entities::record::PooledRecord;
use logflow_domain::error::PipelineError;
use logflow_domain::settings::proxy::SettingsProxy;
use logflow_domain::value_objects::setting_value::SettingValue;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::infrastructure::runtime::async_stage::AsyncStageProcessor;

fn format_line(record: &PooledRecord) -> String {
    let r = record.record();
    format!(
        "{} [{}] {}: {}\n",
        r.timestamp().to_rfc3339(),
        r.level_name(),
        r.writer_name(),
        r.text()
    )
}

pub struct FileWriter {
    default_path: String,
    file: Mutex<Option<File>>,
}

impl FileWriter {
    pub fn new(default_path: impl Into<String>) -> Self {
        FileWriter {
            default_path: default_path.into(),
            file: Mutex::new(None),
        }
    }
}

#[async_trait]
impl AsyncStageProcessor for FileWriter {
    async fn on_initialize(&self, settings: &SettingsProxy) -> Result<(), PipelineError> {
        let path_setting = settings.register("path", SettingValue::String(self.default_path.clone()));
        let path = match path_setting {
            SettingValue::String(p) => p,
            other => return Err(PipelineError::config("path", other.to_string_form())),
        };
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| PipelineError::IoError(format!("opening '{path}': {e}")))?;
        *self.file.lock().await = Some(file);
        Ok(())
    }

    async fn process_async(&self, batch: &[PooledRecord], _shutdown: &CancellationToken) -> Result<(), PipelineError> {
        let mut guard = self.file.lock().await;
        let file = guard
            .as_mut()
            .ok_or_else(|| PipelineError::InvalidConfiguration("file writer used before on_initialize".into()))?;
        for record in batch {
            let line = format_line(record);
            file.write_all(line.as_bytes())
                .await
                .map_err(|e| PipelineError::write_failed(e.to_string()))?;
        }
        file.flush().await.map_err(|e| PipelineError::write_failed(e.to_string()))?;
        Ok(())
    }

    async fn on_shutdown(&self) -> Result<(), PipelineError> {
        let mut guard = self.file.lock().await;
        if let Some(file) = guard.as_mut() {
            let _ = file.flush().await;
        }
        *guard = None;
        Ok(())
    }
}
