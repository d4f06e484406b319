// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite-backed implementation of the [`logflow_domain::RecordStore`] port
//! (§4.H store file format, §4.I store access engine).

pub mod schema;
pub mod sqlite_store;

pub use schema::{DurabilityMode, StoreHeader, StorePurpose};
pub use sqlite_store::SqliteRecordStore;
