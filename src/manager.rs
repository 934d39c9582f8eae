//! The orchestrator: install, switch, and uninstall as explicit multi-step
//! transactions over the config store, downloader, installer, and environment
//! writer.
//!
//! Every side effect registers its compensating action with a
//! [`RecoveryManager`] immediately after it happens; the stack is replayed on
//! abort and cleared exactly once on commit, so the on-disk directory and the
//! config entry always appear or disappear together.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use regex_lite::Regex;

use crate::config::ConfigStore;
use crate::downloader::{Downloader, ProgressFn};
use crate::environment::EnvWriter;
use crate::errors::{Error, ErrorKind, Result};
use crate::installer::{self, Installer};
use crate::platform::Platform;
use crate::recovery::{self, RecoveryAction, RecoveryManager};
use crate::version;

/// An installation known to the manager, reconstructed from disk and config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledVersion {
    pub version: String,
    pub path: PathBuf,
    pub is_active: bool,
    pub install_date: Option<DateTime<Utc>>,
}

pub struct VersionManager {
    store: Box<dyn ConfigStore>,
    downloader: Box<dyn Downloader>,
    installer: Box<dyn Installer>,
    env: Box<dyn EnvWriter>,
    platform: Platform,
}

impl VersionManager {
    pub fn new(
        store: Box<dyn ConfigStore>,
        downloader: Box<dyn Downloader>,
        installer: Box<dyn Installer>,
        env: Box<dyn EnvWriter>,
        platform: Platform,
    ) -> Self {
        VersionManager { store, downloader, installer, env, platform }
    }

    /// Install `version`: download, verify, extract, verify again, commit.
    ///
    /// The transaction aborts cleanly at every step; a config entry exists
    /// afterwards if and only if the installation directory does.
    pub fn install(&self, version: &str, progress: Option<ProgressFn>) -> Result<()> {
        version::validate(version)?;
        let version = version::canonicalize(version);
        info!("starting installation of {version}");

        let mut recovery = RecoveryManager::new();
        let result = self.install_with_recovery(&version, progress, &mut recovery);
        // Cleanups run on every exit; a committed install has cleared them.
        if let Err(err) = recovery.cleanup() {
            warn!("install cleanup failed: {err}");
        }
        result
    }

    fn install_with_recovery(
        &self,
        version: &str,
        progress: Option<ProgressFn>,
        recovery: &mut RecoveryManager,
    ) -> Result<()> {
        let mut cfg = self.store.load()?;

        // Fail fast before any side effect.
        if cfg.versions.contains_key(version) {
            return Err(Error::new(ErrorKind::VersionAlreadyInstalled)
                .with_message(format!("version {version} is already installed"))
                .with_context("requested_version", version));
        }

        // Snapshot the config so every later mutation can be undone.
        match recovery::backup_file(self.store.path()) {
            Ok(backup) => {
                debug!("config backed up to {}", backup.display());
                recovery.add_rollback(RecoveryAction::RestoreFile {
                    from: backup.clone(),
                    to: self.store.path().to_path_buf(),
                });
                recovery.add_cleanup(RecoveryAction::RemoveFile { path: backup });
            }
            Err(err) => debug!("config backup skipped: {err}"),
        }

        fs::create_dir_all(&cfg.install_path).map_err(|err| {
            Error::new(ErrorKind::InstallFailed)
                .with_message("failed to create install root")
                .with_cause(err)
                .with_context("install_path", cfg.install_path.display())
        })?;

        let archive_path = cfg.install_path.join(self.platform.archive_name(version));
        recovery.add_cleanup(RecoveryAction::RemoveFile { path: archive_path.clone() });

        info!("downloading {version} to {}", archive_path.display());
        if let Err(err) = self.downloader.download(version, &archive_path, progress) {
            error!("download failed: {err}");
            if let Err(rollback_err) = recovery.rollback() {
                error!("rollback failed: {rollback_err}");
            }
            return Err(err);
        }

        let version_path = cfg.install_path.join(version);
        recovery.add_cleanup(RecoveryAction::RemoveDirectory { path: version_path.clone() });

        info!("installing {version} to {}", version_path.display());
        if let Err(err) = self.installer.install(&archive_path, version, &version_path) {
            error!("installation failed: {err}");
            if let Err(recovery_err) = recovery.cleanup_and_rollback() {
                error!("recovery failed: {recovery_err}");
            }
            return Err(err);
        }

        cfg.versions.insert(version.to_string(), version_path);
        if let Err(err) = self.store.save(&cfg) {
            // The toolchain is on disk but unrecorded; removing it keeps
            // config and disk in agreement.
            error!("failed to save config after installation: {err}");
            if let Err(recovery_err) = recovery.cleanup_and_rollback() {
                error!("recovery after config save failure failed: {recovery_err}");
            }
            return Err(Error::new(ErrorKind::StorageFailed)
                .with_message("installation succeeded but the config could not be saved")
                .with_cause(err));
        }

        // Committed; the downloaded archive is no longer needed.
        recovery.clear();
        if let Err(err) = fs::remove_file(&archive_path) {
            warn!("failed to remove downloaded archive {}: {err}", archive_path.display());
        }
        info!("{version} installed successfully");
        Ok(())
    }

    /// Make `version` the active toolchain: environment first, then config,
    /// then an end-to-end re-read to confirm the switch took effect.
    ///
    /// There is no compensation between the environment mutation and the
    /// config commit; a failure in that window reports which step failed.
    pub fn switch_to(&self, version: &str) -> Result<()> {
        version::validate(version)?;
        let version = version::canonicalize(version);
        info!("switching to {version}");

        let mut cfg = self.store.load()?;
        let Some(version_path) = cfg.versions.get(&version).cloned() else {
            let bare = version::bare(&version).to_string();
            return Err(Error::new(ErrorKind::VersionNotInstalled)
                .with_message(format!(
                    "Go {bare} is not installed. Install it first with: gover install {bare}"
                ))
                .with_context("requested_version", version));
        };

        if !installer::is_valid_installation(&version_path, self.platform) {
            let bare = version::bare(&version).to_string();
            return Err(Error::new(ErrorKind::VersionNotFound)
                .with_message(format!(
                    "Go {bare} installation is invalid or corrupted. Try reinstalling: \
                     gover uninstall {bare} && gover install {bare}"
                ))
                .with_context("version_path", version_path.display()));
        }

        self.env.set_go_root(&version_path).map_err(|err| {
            Error::new(ErrorKind::EnvironmentSetupFailed)
                .with_message("failed to set GOROOT")
                .with_cause(err)
        })?;
        self.env.update_path(&version_path).map_err(|err| {
            Error::new(ErrorKind::EnvironmentSetupFailed)
                .with_message("failed to update PATH")
                .with_cause(err)
        })?;

        cfg.active_version = version.clone();
        self.store.save(&cfg)?;

        // Re-read end to end so a half-applied switch cannot report success.
        let active = self.active_version().map_err(|err| {
            Error::new(ErrorKind::EnvironmentSetupFailed)
                .with_message("failed to verify version switch")
                .with_cause(err)
        })?;
        if active.version != version {
            return Err(Error::new(ErrorKind::EnvironmentSetupFailed)
                .with_message("version switch verification failed")
                .with_context("expected", &version)
                .with_context("actual", active.version));
        }
        info!("switched to {version}");
        Ok(())
    }

    /// Remove an installed version. The active version is refused.
    pub fn uninstall(&self, version: &str) -> Result<()> {
        version::validate(version)?;
        let version = version::canonicalize(version);
        info!("uninstalling {version}");

        let mut cfg = self.store.load()?;
        let Some(version_path) = cfg.versions.get(&version).cloned() else {
            return Err(Error::new(ErrorKind::VersionNotInstalled)
                .with_message(format!("version {version} is not installed"))
                .with_context("requested_version", version));
        };
        if cfg.active_version == version {
            return Err(Error::new(ErrorKind::UninstallFailed)
                .with_message("cannot uninstall the currently active version")
                .with_context("active_version", &version));
        }

        self.installer.uninstall(&version, &version_path)?;

        cfg.versions.remove(&version);
        // Known gap: if this save fails the directory is already gone and the
        // config keeps an entry pointing at a deleted path.
        if let Err(err) = self.store.save(&cfg) {
            error!(
                "uninstall removed {} but failed to record it: {err}",
                version_path.display()
            );
            return Err(err);
        }
        info!("uninstalled {version}");
        Ok(())
    }

    /// Version ids of every release in the remote index, freshest first.
    pub fn list_available(&self) -> Result<Vec<String>> {
        info!("fetching available versions");
        let versions = self.downloader.available_versions()?;
        Ok(versions.into_iter().map(|v| v.version).collect())
    }

    /// The newest stable release, falling back to the newest release overall
    /// when none is marked stable.
    pub fn latest(&self) -> Result<String> {
        let versions = self.downloader.available_versions()?;
        let latest = match versions.iter().find(|v| v.stable) {
            Some(v) => v.version.clone(),
            None => {
                let Some(first) = versions.first() else {
                    return Err(Error::new(ErrorKind::VersionNotFound)
                        .with_message("no versions available"));
                };
                warn!("no stable version found, falling back to {}", first.version);
                first.version.clone()
            }
        };
        self.touch_update_check();
        Ok(latest)
    }

    /// Scan the install root for managed versions and cross-check the config;
    /// a system toolchain found on PATH is reported too if it is not ours.
    pub fn installed_versions(&self) -> Result<Vec<InstalledVersion>> {
        let cfg = self.store.load()?;
        let mut versions = Vec::new();
        if let Ok(entries) = fs::read_dir(&cfg.install_path) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !version_dir_re().is_match(&name) {
                    continue;
                }
                let path = entry.path();
                if !installer::is_valid_installation(&path, self.platform) {
                    continue;
                }
                let install_date = entry
                    .metadata()
                    .ok()
                    .and_then(|meta| meta.modified().ok())
                    .map(DateTime::<Utc>::from);
                versions.push(InstalledVersion {
                    is_active: name == cfg.active_version,
                    version: name,
                    path,
                    install_date,
                });
            }
        }
        if let Some(mut system) = self.system_version()
            && !versions.iter().any(|v| v.path == system.path)
        {
            system.is_active = cfg.active_version.is_empty();
            versions.push(system);
        }
        Ok(versions)
    }

    /// The currently selected version: the config's active entry, or a system
    /// toolchain found on PATH when none is recorded.
    pub fn active_version(&self) -> Result<InstalledVersion> {
        let cfg = self.store.load()?;
        if !cfg.active_version.is_empty() {
            let Some(path) = cfg.versions.get(&cfg.active_version) else {
                return Err(Error::new(ErrorKind::VersionNotFound)
                    .with_message("active version not found in config")
                    .with_context("active_version", &cfg.active_version));
            };
            return Ok(InstalledVersion {
                version: cfg.active_version.clone(),
                path: path.clone(),
                is_active: true,
                install_date: None,
            });
        }
        self.system_version().ok_or_else(|| {
            Error::new(ErrorKind::VersionNotFound).with_message("no active version found")
        })
    }

    /// Rewrite legacy un-prefixed version keys to the canonical form.
    /// Returns whether the config needed rewriting.
    pub fn migrate_config(&self) -> Result<bool> {
        let mut cfg = self.store.load()?;
        if !cfg.migrate() {
            return Ok(false);
        }
        self.store.save(&cfg)?;
        info!("config migrated to canonical version ids");
        Ok(true)
    }

    fn system_version(&self) -> Option<InstalledVersion> {
        let output = Command::new("go").arg("version").output().ok()?;
        if !output.status.success() {
            return None;
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let reported = installer::parse_go_version(&stdout)?;
        let version = format!("go{reported}");
        let goroot = self.env.go_root().ok().or_else(|| {
            let out = Command::new("go").args(["env", "GOROOT"]).output().ok()?;
            out.status.success().then(|| {
                PathBuf::from(String::from_utf8_lossy(&out.stdout).trim().to_string())
            })
        })?;
        Some(InstalledVersion { version, path: goroot, is_active: true, install_date: None })
    }

    fn touch_update_check(&self) {
        // Best effort: a failed timestamp write must not fail the query.
        match self.store.load() {
            Ok(mut cfg) => {
                cfg.last_update_check = Some(Utc::now());
                if let Err(err) = self.store.save(&cfg) {
                    warn!("could not record update check: {err}");
                }
            }
            Err(err) => warn!("could not record update check: {err}"),
        }
    }
}

fn version_dir_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^go\d+\.\d+(\.\d+)?$").unwrap())
}
