// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Runtime (§4.E, §4.F, §4.G)
//!
//! The part of the domain's [`logflow_domain::Pipeline`] shape that only
//! makes sense with live I/O behind it: the sync/async stage contracts a
//! concrete adapter implements, and [`pipeline_runtime::RunningPipeline`],
//! which drives `Stage::transition` through the lifecycle in the order the
//! graph demands.

pub mod async_stage;
pub mod pipeline_runtime;
pub mod sync_stage;
