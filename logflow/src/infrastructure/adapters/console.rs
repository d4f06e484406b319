// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Console Writer (§4.F)
//!
//! A sync stage that writes one formatted line per record to stdout or
//! stderr. Runs on the producer thread, so it must stay on the fast path:
//! no locking beyond the standard library's own stdout/stderr line lock,
//! no I/O that could block arbitrarily (a terminal, unlike a file or a
//! socket, essentially never does).

use logflow_domain::entities::record::PooledRecord;
use logflow_domain::error::PipelineError;
use logflow_domain::settings::proxy::SettingsProxy;
use logflow_domain::value_objects::setting_value::SettingValue;
use std::io::Write;
use std::sync::Mutex;

use crate::infrastructure::runtime::sync_stage::{SyncOutcome, SyncStageProcessor};

/// Formats one line for a record: `TIMESTAMP [LEVEL] writer: text #tag1 #tag2`.
fn format_line(record: &PooledRecord) -> String {
    let r = record.record();
    let tag_set = r.tags();
    let tags: Vec<&str> = tag_set.iter().collect();
    let mut line = format!(
        "{} [{}] {}: {}",
        r.timestamp().to_rfc3339(),
        r.level_name(),
        r.writer_name(),
        r.text()
    );
    if !tags.is_empty() {
        line.push_str(" #");
        line.push_str(&tags.join(" #"));
    }
    line
}

/// Writes to stderr instead of stdout when `use_stderr = true` is set at
/// registration; a pipeline built against a TTY usually wants stdout, one
/// feeding a process supervisor usually wants stderr.
pub struct ConsoleWriter {
    use_stderr: Mutex<bool>,
}

impl ConsoleWriter {
    pub fn new(use_stderr: bool) -> Self {
        ConsoleWriter {
            use_stderr: Mutex::new(use_stderr),
        }
    }
}

impl Default for ConsoleWriter {
    fn default() -> Self {
        ConsoleWriter::new(false)
    }
}

impl SyncStageProcessor for ConsoleWriter {
    fn on_initialize(&self, settings: &SettingsProxy) -> Result<(), PipelineError> {
        let default = *self.use_stderr.lock().unwrap();
        let value = settings.register("useStderr", SettingValue::Bool(default));
        if let SettingValue::Bool(b) = value {
            *self.use_stderr.lock().unwrap() = b;
        }
        Ok(())
    }

    fn process_sync(&self, record: &PooledRecord) -> Result<SyncOutcome, PipelineError> {
        let line = format_line(record);
        if *self.use_stderr.lock().unwrap() {
            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "{line}");
        } else {
            let mut stdout = std::io::stdout();
            let _ = writeln!(stdout, "{line}");
        }
        Ok(SyncOutcome::Forward)
    }
}
