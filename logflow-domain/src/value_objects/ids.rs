// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Strongly-typed identifiers, preventing accidental mixing of a record id
//! with a stage name hash or a pipeline id.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A record's position in its store file. Dense and strictly increasing
/// within a file; `-1` represents "no records" (see
/// [`crate::repositories::record_store::RecordStore`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub i64);

impl RecordId {
    pub const NONE: RecordId = RecordId(-1);

    pub fn is_none(&self) -> bool {
        self.0 < 0
    }

    pub fn next(&self) -> RecordId {
        RecordId(self.0 + 1)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RecordId {
    fn from(v: i64) -> Self {
        RecordId(v)
    }
}

/// Unique identifier for a pipeline instance, assigned at build time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineId(pub ulid::Ulid);

impl PipelineId {
    pub fn new() -> Self {
        PipelineId(ulid::Ulid::new())
    }
}

impl Default for PipelineId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_none_is_negative() {
        assert!(RecordId::NONE.is_none());
        assert!(!RecordId(0).is_none());
    }

    #[test]
    fn record_id_ordering_matches_numeric_order() {
        assert!(RecordId(0) < RecordId(1));
        assert_eq!(RecordId(4).next(), RecordId(5));
    }
}
