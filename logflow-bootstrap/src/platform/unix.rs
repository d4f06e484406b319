// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Unix Platform Implementation
//!
//! POSIX implementation backing [`super::Platform`] on Linux and macOS, via
//! `libc` syscalls (`sysconf`, `getuid`) rather than shelling out to `nproc`
//! or parsing `/proc`.

use super::{Platform, PlatformError};
use async_trait::async_trait;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

pub struct UnixPlatform;

impl UnixPlatform {
    pub fn new() -> Self {
        Self
    }

    fn sysconf(name: libc::c_int) -> Result<i64, PlatformError> {
        let value = unsafe { libc::sysconf(name) };
        if value < 0 {
            Err(PlatformError::Other(format!("sysconf({name}) failed")))
        } else {
            Ok(value)
        }
    }
}

impl Default for UnixPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for UnixPlatform {
    fn page_size(&self) -> usize {
        Self::sysconf(libc::_SC_PAGESIZE).unwrap_or(4096) as usize
    }

    fn cpu_count(&self) -> usize {
        Self::sysconf(libc::_SC_NPROCESSORS_ONLN).unwrap_or(1).max(1) as usize
    }

    fn total_memory(&self) -> Result<u64, PlatformError> {
        let pages = Self::sysconf(libc::_SC_PHYS_PAGES)?;
        Ok(pages as u64 * self.page_size() as u64)
    }

    fn available_memory(&self) -> Result<u64, PlatformError> {
        let pages = Self::sysconf(libc::_SC_AVPHYS_PAGES)?;
        Ok(pages as u64 * self.page_size() as u64)
    }

    fn line_separator(&self) -> &'static str {
        "\n"
    }

    fn path_separator(&self) -> char {
        ':'
    }

    fn platform_name(&self) -> &'static str {
        if cfg!(target_os = "macos") {
            "macos"
        } else {
            "linux"
        }
    }

    fn temp_dir(&self) -> PathBuf {
        std::env::temp_dir()
    }

    fn is_elevated(&self) -> bool {
        unsafe { libc::geteuid() == 0 }
    }

    fn set_permissions(&self, path: &Path, mode: u32) -> Result<(), PlatformError> {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .map_err(PlatformError::Io)
    }

    fn is_executable(&self, path: &Path) -> bool {
        std::fs::metadata(path)
            .map(|meta| meta.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    async fn sync_file(&self, file: &tokio::fs::File) -> Result<(), PlatformError> {
        file.sync_all().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basics_are_sane() {
        let platform = UnixPlatform::new();
        assert!(platform.cpu_count() >= 1);
        assert!(platform.page_size() >= 512);
        assert_eq!(platform.line_separator(), "\n");
        assert_eq!(platform.path_separator(), ':');
    }

    #[test]
    fn root_is_never_the_test_runner() {
        // CI runs as a non-root user; this also exercises the geteuid path.
        let platform = UnixPlatform::new();
        let _ = platform.is_elevated();
    }
}
