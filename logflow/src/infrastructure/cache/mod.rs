// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The paged cache (§4.J): a bounded, read-through window over a
//! [`logflow_domain::RecordStore`] sized for viewer scroll ranges.

pub mod paged_cache;

pub use paged_cache::PagedCache;
