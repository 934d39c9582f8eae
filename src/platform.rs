//! OS and architecture detection for release artifact naming.
//!
//! The `os`/`arch` pair must match the identifiers used by the official
//! download index (`linux`/`darwin`/`windows`, `amd64`/`arm64`/`386`).

use std::fs;
use std::path::Path;

use crate::errors::{Error, ErrorKind, Result};

pub const OS_LINUX: &str = "linux";
pub const OS_DARWIN: &str = "darwin";
pub const OS_WINDOWS: &str = "windows";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub os: &'static str,
    pub arch: &'static str,
}

/// Probe the running platform once, at construction time.
pub fn detect() -> Result<Platform> {
    let os = if cfg!(target_os = "linux") {
        OS_LINUX
    } else if cfg!(target_os = "macos") {
        OS_DARWIN
    } else if cfg!(windows) {
        OS_WINDOWS
    } else {
        "unknown"
    };
    let arch = if cfg!(target_arch = "x86_64") {
        "amd64"
    } else if cfg!(target_arch = "aarch64") {
        "arm64"
    } else if cfg!(target_arch = "x86") {
        "386"
    } else {
        "unknown"
    };
    if os == "unknown" || arch == "unknown" {
        return Err(Error::new(ErrorKind::PlatformNotSupported)
            .with_context("os", std::env::consts::OS)
            .with_context("arch", std::env::consts::ARCH));
    }
    Ok(Platform { os, arch })
}

impl Platform {
    pub fn exe_name(&self) -> &'static str {
        if self.os == OS_WINDOWS { "go.exe" } else { "go" }
    }

    pub fn archive_ext(&self) -> &'static str {
        if self.os == OS_WINDOWS { ".zip" } else { ".tar.gz" }
    }

    /// Release archive filename, e.g. `go1.21.5.linux-amd64.tar.gz`.
    pub fn archive_name(&self, version: &str) -> String {
        format!("{version}.{}-{}{}", self.os, self.arch, self.archive_ext())
    }
}

#[cfg(unix)]
pub fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|err| {
        Error::new(ErrorKind::OperationFailed)
            .with_message("failed to set executable permission")
            .with_cause(err)
            .with_context("path", path.display())
    })
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
