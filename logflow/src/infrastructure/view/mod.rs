// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The filtered view (§4.K): an observable projection over the unfiltered
//! record set, with per-field overview facets for building a viewer's
//! filter UI.

pub mod filtered_view;

pub use filtered_view::{FieldFilter, FilterPredicate, FilteredView, OverviewItem, ViewChange};
