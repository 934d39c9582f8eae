//! Persisted configuration: the authoritative version -> path mapping.
//!
//! A single JSON document per user. Writes go through a temp file and an
//! atomic rename so a concurrent reader never observes a half-written file;
//! a `.backup` sibling taken before each overwrite doubles as the corruption
//! recovery source on load.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, ErrorKind, Result};
use crate::recovery;

pub const APP_DIR: &str = ".gover";
pub const CONFIG_FILE: &str = "config.json";
pub const VERSIONS_DIR: &str = "versions";

/// The persisted document. `versions` is a `BTreeMap` so serialization is
/// deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub active_version: String,
    pub install_path: PathBuf,
    #[serde(default)]
    pub versions: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub last_update_check: Option<DateTime<Utc>>,
}

impl Config {
    /// Rewrite legacy un-prefixed version keys (`1.21.5`) to the canonical
    /// `go`-prefixed form. Returns whether anything changed.
    pub fn migrate(&mut self) -> bool {
        let mut changed = false;
        let versions = std::mem::take(&mut self.versions);
        for (version, path) in versions {
            let canonical = crate::version::canonicalize(&version);
            if canonical != version {
                changed = true;
            }
            self.versions.insert(canonical, path);
        }
        if !self.active_version.is_empty() && !self.active_version.starts_with("go") {
            self.active_version = crate::version::canonicalize(&self.active_version);
            changed = true;
        }
        changed
    }
}

pub trait ConfigStore {
    fn load(&self) -> Result<Config>;
    fn save(&self, config: &Config) -> Result<()>;
    fn ensure_dir(&self) -> Result<()>;
    /// Location of the persisted document, for callers that snapshot it.
    fn path(&self) -> &Path;
}

/// File-backed [`ConfigStore`] rooted at `~/.gover/config.json`.
pub struct FileStore {
    config_path: PathBuf,
}

impl FileStore {
    pub fn new() -> Result<Self> {
        let home = home_dir()?;
        Ok(FileStore { config_path: home.join(APP_DIR).join(CONFIG_FILE) })
    }

    /// Store backed by an explicit path, used by tests and custom roots.
    pub fn at(config_path: impl Into<PathBuf>) -> Self {
        FileStore { config_path: config_path.into() }
    }

    fn backup_path(&self) -> PathBuf {
        recovery::sibling_with_suffix(&self.config_path, ".backup")
    }
}

impl ConfigStore for FileStore {
    fn load(&self) -> Result<Config> {
        let data = match fs::read(&self.config_path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return default_config(),
            Err(err) => {
                return Err(Error::new(ErrorKind::StorageFailed)
                    .with_message("failed to read config file")
                    .with_cause(err)
                    .with_context("config_path", self.config_path.display()));
            }
        };

        match serde_json::from_slice::<Config>(&data) {
            Ok(config) => Ok(config),
            Err(parse_err) => {
                // The live file is corrupted; adopt the backup if it parses.
                let backup_path = self.backup_path();
                if let Ok(backup_data) = fs::read(&backup_path)
                    && let Ok(config) = serde_json::from_slice::<Config>(&backup_data)
                {
                    warn!(
                        "config file {} is corrupted, recovered from {}",
                        self.config_path.display(),
                        backup_path.display()
                    );
                    if let Err(err) = fs::write(&self.config_path, &backup_data) {
                        warn!("failed to rewrite recovered config: {err}");
                    }
                    return Ok(config);
                }
                Err(Error::new(ErrorKind::ConfigCorrupted)
                    .with_message("failed to parse config file and no valid backup found")
                    .with_cause(parse_err)
                    .with_context("config_path", self.config_path.display())
                    .recoverable())
            }
        }
    }

    fn save(&self, config: &Config) -> Result<()> {
        self.ensure_dir()?;

        let data = serde_json::to_vec_pretty(config).map_err(|err| {
            Error::new(ErrorKind::StorageFailed)
                .with_message("failed to serialize config")
                .with_cause(err)
                .with_context("config_path", self.config_path.display())
        })?;

        // Best effort: a failed backup must not block the save itself.
        let mut backup = None;
        if self.config_path.exists() {
            match recovery::backup_file(&self.config_path) {
                Ok(path) => backup = Some(path),
                Err(err) => warn!("config backup failed, continuing without one: {err}"),
            }
        }

        let tmp_path = recovery::sibling_with_suffix(&self.config_path, ".tmp");
        fs::write(&tmp_path, &data).map_err(|err| {
            Error::new(ErrorKind::StorageFailed)
                .with_message("failed to write config file")
                .with_cause(err)
                .with_context("config_path", self.config_path.display())
                .with_context("temp_path", tmp_path.display())
        })?;

        if let Err(err) = fs::rename(&tmp_path, &self.config_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(Error::new(ErrorKind::StorageFailed)
                .with_message("failed to replace config file")
                .with_cause(err)
                .with_context("config_path", self.config_path.display()));
        }

        if let Some(backup) = backup {
            let _ = fs::remove_file(backup);
        }
        Ok(())
    }

    fn ensure_dir(&self) -> Result<()> {
        let Some(dir) = self.config_path.parent() else {
            return Ok(());
        };
        fs::create_dir_all(dir).map_err(|err| {
            Error::new(ErrorKind::StorageFailed)
                .with_message("failed to create config directory")
                .with_cause(err)
                .with_context("config_dir", dir.display())
        })
    }

    fn path(&self) -> &Path {
        &self.config_path
    }
}

/// Fresh config for a user with no persisted state: empty version map, no
/// active version, install root under the home directory.
fn default_config() -> Result<Config> {
    let home = home_dir()?;
    Ok(Config {
        active_version: String::new(),
        install_path: home.join(APP_DIR).join(VERSIONS_DIR),
        versions: BTreeMap::new(),
        last_update_check: None,
    })
}

fn home_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| {
            Error::new(ErrorKind::StorageFailed).with_message("failed to locate home directory")
        })
}
