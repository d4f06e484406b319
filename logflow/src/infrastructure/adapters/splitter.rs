// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Splitter (§4.E)
//!
//! The default fan-out stage: always returns [`SyncOutcome::Forward`], so
//! [`crate::infrastructure::runtime::pipeline_runtime::RunningPipeline`]'s
//! generic fan-out delivers the record to every one of the splitter's
//! downstream links, unmodified and in no particular order relative to
//! each other. A pipeline that wants an explicit "branch here" node in its
//! graph (rather than relying on a stage's own processing to forward)
//! attaches a `Splitter`.

use logflow_domain::entities::record::PooledRecord;
use logflow_domain::error::PipelineError;

use crate::infrastructure::runtime::sync_stage::{SyncOutcome, SyncStageProcessor};

/// Stateless fan-out node. One instance may be shared across pipelines
/// since it holds nothing record- or stage-specific.
pub struct Splitter;

impl SyncStageProcessor for Splitter {
    fn process_sync(&self, _record: &PooledRecord) -> Result<SyncOutcome, PipelineError> {
        Ok(SyncOutcome::Forward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logflow_domain::entities::record::{RecordFields, RecordPool};
    use logflow_domain::value_objects::tag::TagSet;
    use std::sync::Arc;

    #[test]
    fn always_forwards() {
        let pool = RecordPool::new();
        let rec = pool.checkout(RecordFields {
            timestamp: chrono::DateTime::parse_from_rfc3339("2000-01-01T00:00:00Z").unwrap(),
            monotonic_ns: 0,
            writer_name: Arc::from("w"),
            level_name: Arc::from("Info"),
            tags: TagSet::empty(),
            app_name: Arc::from("a"),
            process_name: Arc::from("p"),
            process_id: 1,
            text: "hi".into(),
            lost_message_count: None,
        });
        assert_eq!(Splitter.process_sync(&rec).unwrap(), SyncOutcome::Forward);
        rec.release().unwrap();
    }
}
