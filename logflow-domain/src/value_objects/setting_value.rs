// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Setting Value
//!
//! A setting's concrete type is one of a handful of primitives, a short
//! string, or a user type with a round-trip string converter. The registry
//! (`settings::registry`) stores values in their string form plus a
//! type-tag; `SettingValue` is the typed view a caller gets back from
//! `get`/`register`.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The type tag recorded alongside a setting's string form, so that a
/// reader can validate a round trip without knowing the caller's type ahead
/// of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingType {
    Bool,
    I64,
    U64,
    F64,
    String,
    /// A user type whose converter is supplied at `register` time; only the
    /// string form is stored, so the tag alone cannot validate it.
    Custom,
}

/// A setting's value in its typed form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SettingValue {
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    String(String),
}

impl SettingValue {
    pub fn type_tag(&self) -> SettingType {
        match self {
            SettingValue::Bool(_) => SettingType::Bool,
            SettingValue::I64(_) => SettingType::I64,
            SettingValue::U64(_) => SettingType::U64,
            SettingValue::F64(_) => SettingType::F64,
            SettingValue::String(_) => SettingType::String,
        }
    }

    /// The string form persisted by the registry and by the plain-text
    /// configuration file.
    pub fn to_string_form(&self) -> String {
        match self {
            SettingValue::Bool(b) => b.to_string(),
            SettingValue::I64(i) => i.to_string(),
            SettingValue::U64(u) => u.to_string(),
            SettingValue::F64(f) => f.to_string(),
            SettingValue::String(s) => s.clone(),
        }
    }

    /// Parses a string form against an expected type tag. A converter
    /// rejection surfaces as `ConfigError` carrying the offending name and
    /// raw string, per the spec's failure contract for §4.D.
    pub fn parse(name: &str, raw: &str, expected: SettingType) -> Result<Self, PipelineError> {
        let bad = || PipelineError::config(name, raw.to_string());
        match expected {
            SettingType::Bool => raw.parse::<bool>().map(SettingValue::Bool).map_err(|_| bad()),
            SettingType::I64 => raw.parse::<i64>().map(SettingValue::I64).map_err(|_| bad()),
            SettingType::U64 => raw.parse::<u64>().map(SettingValue::U64).map_err(|_| bad()),
            SettingType::F64 => raw.parse::<f64>().map(SettingValue::F64).map_err(|_| bad()),
            SettingType::String | SettingType::Custom => Ok(SettingValue::String(raw.to_string())),
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_form())
    }
}

/// A user type with a round-trip string converter, registered alongside a
/// setting whose type tag is [`SettingType::Custom`].
pub trait SettingConverter: Send + Sync {
    fn parse(&self, raw: &str) -> Result<SettingValue, PipelineError>;
    fn format(&self, value: &SettingValue) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn round_trips_primitives() {
        let v = SettingValue::I64(-42);
        let s = v.to_string_form();
        let parsed = SettingValue::parse("x", &s, SettingType::I64).unwrap();
        assert_eq!(v, parsed);
    }

    #[test]
    fn converter_rejection_surfaces_config_error() {
        let err = SettingValue::parse("batchMax", "not-a-number", SettingType::U64).unwrap_err();
        match err {
            PipelineError::ConfigError { name, message } => {
                assert_eq!(name, "batchMax");
                assert_eq!(message, "not-a-number");
            }
            _ => panic!("expected ConfigError"),
        }
    }

    proptest! {
        #[test]
        fn i64_round_trips_through_string_form(n: i64) {
            let v = SettingValue::I64(n);
            let parsed = SettingValue::parse("n", &v.to_string_form(), SettingType::I64).unwrap();
            prop_assert_eq!(v, parsed);
        }

        #[test]
        fn string_round_trips_through_string_form(s in "\\PC*") {
            let v = SettingValue::String(s);
            let parsed = SettingValue::parse("s", &v.to_string_form(), SettingType::String).unwrap();
            prop_assert_eq!(v, parsed);
        }
    }
}
