// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Process Integration Helper (§6)
//!
//! Wraps a spawned child process (used by a forwarder stage that shells out
//! to an external transport helper, or by a CLI subcommand that launches a
//! companion tool) and guarantees the child handle is released on drop —
//! on POSIX, failing to `wait()` a terminated child leaves a zombie entry
//! in the process table until the parent exits.

use super::PlatformError;
use tokio::process::Child;

/// Owns a [`tokio::process::Child`] and exposes sync/async "wait for exit".
/// Dropping a `ManagedChild` without an explicit wait still reaps the child
/// because `tokio::process::Child` kills (and `try_wait`s) on drop when the
/// `kill_on_drop` option is set; callers that need the exit code should
/// prefer [`ManagedChild::wait`] or [`ManagedChild::try_wait`] over letting
/// the handle fall out of scope.
pub struct ManagedChild {
    child: Option<Child>,
}

impl ManagedChild {
    pub fn new(child: Child) -> Self {
        ManagedChild { child: Some(child) }
    }

    /// Blocks the calling thread until the child exits, via a dedicated
    /// blocking task so it does not stall the tokio worker.
    pub async fn wait(&mut self) -> Result<std::process::ExitStatus, PlatformError> {
        let child = self.child.as_mut().ok_or_else(|| {
            PlatformError::Other("child process already released".into())
        })?;
        child.wait().await.map_err(PlatformError::Io)
    }

    /// Non-blocking poll: `Ok(None)` if the child is still running.
    pub fn try_wait(&mut self) -> Result<Option<std::process::ExitStatus>, PlatformError> {
        let child = self.child.as_mut().ok_or_else(|| {
            PlatformError::Other("child process already released".into())
        })?;
        child.try_wait().map_err(PlatformError::Io)
    }

    /// Releases the child handle. On POSIX, if the process has already
    /// exited this reaps it; if still running, it is left to exit on its
    /// own (the handle is simply dropped, matching `Child`'s own drop
    /// semantics unless `kill_on_drop` was requested at spawn time).
    pub fn release(mut self) {
        self.child.take();
    }
}

impl Drop for ManagedChild {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            // Best-effort reap; a still-running child without kill_on_drop
            // is left to the OS, matching `tokio::process::Child::drop`.
            let _ = child.try_wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::process::Command;

    #[tokio::test]
    async fn wait_reports_exit_status() {
        let child = Command::new("true").spawn().expect("spawn true");
        let mut managed = ManagedChild::new(child);
        let status = managed.wait().await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn try_wait_is_non_blocking_before_exit() {
        let child = Command::new("sleep").arg("1").spawn().expect("spawn sleep");
        let mut managed = ManagedChild::new(child);
        assert!(managed.try_wait().unwrap().is_none());
        managed.wait().await.unwrap();
    }
}
