//! Archive extraction and installation verification.
//!
//! Both archive formats wrap the toolchain in a single `go/` directory; every
//! entry has that leading component stripped before it is joined onto the
//! destination, so `go/bin/go` lands at `<dest>/bin/go`.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use flate2::read::GzDecoder;
use log::warn;
use regex_lite::Regex;

use crate::errors::{Error, ErrorKind, Result};
use crate::platform::{self, Platform};
use crate::recovery::{RecoveryAction, RecoveryManager};
use crate::version;

/// Top-level directory every official release archive wraps its tree in.
const ARCHIVE_ROOT: &str = "go";

pub trait Installer {
    /// Extract `archive_path` into `dest_path` and verify the result is a
    /// runnable toolchain reporting `version`. Failure leaves no directory.
    fn install(&self, archive_path: &Path, version: &str, dest_path: &Path) -> Result<()>;
    fn verify(&self, dest_path: &Path, version: &str) -> Result<()>;
    fn uninstall(&self, version: &str, dest_path: &Path) -> Result<()>;
}

pub struct ArchiveInstaller {
    platform: Platform,
}

impl ArchiveInstaller {
    pub fn new(platform: Platform) -> Self {
        ArchiveInstaller { platform }
    }

    fn extract(&self, archive_path: &Path, dest_path: &Path) -> Result<()> {
        let name = archive_path.to_string_lossy();
        let result = if name.ends_with(".zip") {
            self.extract_zip(archive_path, dest_path)
        } else if name.ends_with(".tar.gz") {
            self.extract_tar_gz(archive_path, dest_path)
        } else {
            Err(Error::new(ErrorKind::InstallFailed).with_message("unsupported archive format"))
        };
        result.map_err(|err| {
            err.with_context("archive_path", archive_path.display())
                .with_context("dest_path", dest_path.display())
        })
    }

    fn extract_zip(&self, archive_path: &Path, dest_path: &Path) -> Result<()> {
        let file = File::open(archive_path)
            .map_err(|err| extract_err("failed to open zip archive", err))?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|err| extract_err("failed to read zip archive", err))?;
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|err| extract_err("failed to read zip entry", err))?;
            let Some(rel) = strip_archive_root(Path::new(entry.name())) else {
                continue;
            };
            let target = dest_path.join(rel);
            if entry.is_dir() {
                fs::create_dir_all(&target)
                    .map_err(|err| extract_err("failed to create directory", err))?;
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .map_err(|err| extract_err("failed to create directory", err))?;
            }
            let mut out = File::create(&target)
                .map_err(|err| extract_err("failed to create file", err))?;
            io::copy(&mut entry, &mut out)
                .map_err(|err| extract_err("failed to write file", err))?;
            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&target, fs::Permissions::from_mode(mode))
                    .map_err(|err| extract_err("failed to set file mode", err))?;
            }
        }
        Ok(())
    }

    fn extract_tar_gz(&self, archive_path: &Path, dest_path: &Path) -> Result<()> {
        let file = File::open(archive_path)
            .map_err(|err| extract_err("failed to open tar.gz archive", err))?;
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        let entries = archive
            .entries()
            .map_err(|err| extract_err("failed to read archive entries", err))?;
        for entry in entries {
            let mut entry = entry.map_err(|err| extract_err("failed to read archive entry", err))?;
            let path = entry
                .path()
                .map_err(|err| extract_err("failed to read entry path", err))?
                .into_owned();
            let Some(rel) = strip_archive_root(&path) else {
                continue;
            };
            let target = dest_path.join(rel);
            let entry_type = entry.header().entry_type();
            let mode = entry.header().mode().unwrap_or(0o755);
            match entry_type {
                tar::EntryType::Directory => {
                    fs::create_dir_all(&target)
                        .map_err(|err| extract_err("failed to create directory", err))?;
                    set_mode(&target, mode)?;
                }
                tar::EntryType::Regular => {
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent)
                            .map_err(|err| extract_err("failed to create directory", err))?;
                    }
                    let mut out = File::create(&target)
                        .map_err(|err| extract_err("failed to create file", err))?;
                    io::copy(&mut entry, &mut out)
                        .map_err(|err| extract_err("failed to write file", err))?;
                    set_mode(&target, mode)?;
                }
                tar::EntryType::Symlink => {
                    #[cfg(unix)]
                    {
                        let link = entry
                            .link_name()
                            .map_err(|err| extract_err("failed to read symlink target", err))?
                            .ok_or_else(|| {
                                Error::new(ErrorKind::InstallFailed)
                                    .with_message("symlink entry has no target")
                            })?;
                        std::os::unix::fs::symlink(&link, &target)
                            .map_err(|err| extract_err("failed to create symlink", err))?;
                    }
                }
                // Other entry types are skipped.
                _ => {}
            }
        }
        Ok(())
    }
}

impl Installer for ArchiveInstaller {
    fn install(&self, archive_path: &Path, version: &str, dest_path: &Path) -> Result<()> {
        fs::create_dir_all(dest_path).map_err(|err| {
            Error::new(ErrorKind::InstallFailed)
                .with_message("failed to create destination directory")
                .with_cause(err)
                .with_context("dest_path", dest_path.display())
        })?;

        // From here on, any failure must leave no orphan directory behind.
        let mut recovery = RecoveryManager::new();
        recovery.add_cleanup(RecoveryAction::RemoveDirectory { path: dest_path.to_path_buf() });

        let result = self
            .extract(archive_path, dest_path)
            .and_then(|()| self.verify(dest_path, version));
        if let Err(err) = result {
            if let Err(cleanup_err) = recovery.cleanup() {
                warn!("failed to clean up after aborted install: {cleanup_err}");
            }
            return Err(err);
        }
        recovery.clear();
        Ok(())
    }

    fn verify(&self, dest_path: &Path, version: &str) -> Result<()> {
        let bin_dir = dest_path.join("bin");
        if !bin_dir.is_dir() {
            return Err(Error::new(ErrorKind::InstallFailed)
                .with_message("bin directory not found")
                .with_context("dest_path", dest_path.display()));
        }
        let go_path = bin_dir.join(self.platform.exe_name());
        if !go_path.is_file() {
            return Err(Error::new(ErrorKind::InstallFailed)
                .with_message("go executable not found")
                .with_context("dest_path", dest_path.display()));
        }
        platform::make_executable(&go_path)?;

        let output = Command::new(&go_path).arg("version").output().map_err(|err| {
            Error::new(ErrorKind::InstallFailed)
                .with_message("failed to execute go version")
                .with_cause(err)
                .with_context("go_path", go_path.display())
        })?;
        if !output.status.success() {
            return Err(Error::new(ErrorKind::InstallFailed)
                .with_message(format!("go version exited with {}", output.status))
                .with_context("stderr", String::from_utf8_lossy(&output.stderr).trim()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let Some(reported) = parse_go_version(&stdout) else {
            return Err(Error::new(ErrorKind::InstallFailed)
                .with_message("failed to parse go version output")
                .with_context("output", stdout.trim()));
        };
        let expected = version::bare(version);
        // A mismatch means a corrupted archive, a wrong download, or a naming
        // defect; never accept it.
        if reported != expected {
            return Err(Error::new(ErrorKind::InstallFailed)
                .with_message(format!("version mismatch: expected {expected}, got {reported}"))
                .with_context("expected_version", expected)
                .with_context("reported_version", reported));
        }
        Ok(())
    }

    fn uninstall(&self, version: &str, dest_path: &Path) -> Result<()> {
        if !dest_path.exists() {
            return Err(Error::new(ErrorKind::VersionNotInstalled)
                .with_message("installation path does not exist")
                .with_context("version", version)
                .with_context("dest_path", dest_path.display()));
        }
        fs::remove_dir_all(dest_path).map_err(|err| {
            Error::new(ErrorKind::UninstallFailed)
                .with_message("failed to remove installation directory")
                .with_cause(err)
                .with_context("dest_path", dest_path.display())
        })
    }
}

/// Structural check: does `path` hold a toolchain binary where we expect one?
pub fn is_valid_installation(path: &Path, platform: Platform) -> bool {
    path.join("bin").join(platform.exe_name()).is_file()
}

/// Extract the semantic version from `go version` output, e.g.
/// `go version go1.21.5 linux/amd64` -> `1.21.5`.
pub fn parse_go_version(output: &str) -> Option<&str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"go version go(\d+\.\d+(?:\.\d+)?)").unwrap());
    re.captures(output).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Drop the conventional `go/` wrapper from an archive entry path. Returns
/// `None` for the wrapper directory itself.
fn strip_archive_root(path: &Path) -> Option<PathBuf> {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == ARCHIVE_ROOT => {
            let rest: PathBuf = components.collect();
            if rest.as_os_str().is_empty() { None } else { Some(rest) }
        }
        _ => Some(path.to_path_buf()),
    }
}

fn extract_err(message: &str, cause: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::new(ErrorKind::InstallFailed).with_message(message).with_cause(cause)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|err| extract_err("failed to set file mode", err))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
