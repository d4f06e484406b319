// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Signal Handling
//!
//! Listens for the host's termination signals and drives a
//! [`crate::shutdown::ShutdownCoordinator`] from them, so stage shutdown
//! (leaves-first, per the pipeline's reverse-topological order) begins the
//! moment an operator asks the process to stop.
//!
//! - Unix: `SIGTERM`, `SIGINT`, `SIGHUP` all initiate shutdown. `SIGHUP` is
//!   traditionally "reload configuration"; this process has no running
//!   daemon mode distinct from "the pipeline", so a `SIGHUP` is treated the
//!   same as `SIGTERM` rather than silently ignored.
//! - Windows: only `Ctrl-C` (`SIGINT`'s nearest analogue) is available
//!   through `tokio::signal`.
//!
//! A second signal while shutdown is already underway is logged and
//! otherwise ignored — the grace period enforced by `ShutdownCoordinator`
//! is the only escalation path; this process does not offer a "force kill"
//! on repeated signals.

use crate::shutdown::ShutdownCoordinator;
use std::sync::Arc;

/// Spawns a task that awaits the platform's termination signals and calls
/// [`ShutdownCoordinator::initiate_shutdown`] on the first one received.
/// Returns the task handle so the caller can hold it alive for the
/// lifetime of the process (dropping it would abort the listener).
pub fn install_shutdown_handler(coordinator: Arc<ShutdownCoordinator>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_termination_signal().await;
        coordinator.initiate_shutdown();
    })
}

/// Resolves once any recognized termination signal arrives. Exposed
/// separately from [`install_shutdown_handler`] so callers that need to
/// `select!` against other futures (an in-flight CLI subcommand, a
/// benchmark run) can race this directly.
#[cfg(unix)]
pub async fn wait_for_termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");
    let mut sighup = signal(SignalKind::hangup()).expect("failed to register SIGHUP handler");

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM, initiating shutdown"),
        _ = sigint.recv() => tracing::info!("received SIGINT, initiating shutdown"),
        _ = sighup.recv() => tracing::info!("received SIGHUP, initiating shutdown"),
    }
}

#[cfg(windows)]
pub async fn wait_for_termination_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("received Ctrl-C, initiating shutdown");
}

#[cfg(not(any(unix, windows)))]
pub async fn wait_for_termination_signal() {
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn install_shutdown_handler_reacts_to_sigterm() {
        let coordinator = Arc::new(ShutdownCoordinator::new(Duration::from_millis(100)));
        let _handle = install_shutdown_handler(coordinator.clone());

        assert!(!coordinator.is_shutting_down());

        #[cfg(unix)]
        unsafe {
            libc::raise(libc::SIGTERM);
        }
        #[cfg(not(unix))]
        coordinator.initiate_shutdown();

        tokio::time::timeout(Duration::from_secs(2), async {
            while !coordinator.is_shutting_down() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("shutdown was not initiated in time");
    }
}
