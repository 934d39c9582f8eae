//! Compensating actions for multi-step transactions.
//!
//! Side-effecting steps register their undo here immediately after the effect
//! happens, never in advance. On abort the stack replays most-recent-first; on
//! commit it is cleared exactly once.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use crate::errors::{Error, ErrorKind, Result};

/// A single compensating step, described as data so it can be logged and
/// inspected rather than hidden inside a closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    RemoveFile { path: PathBuf },
    RemoveDirectory { path: PathBuf },
    RestoreFile { from: PathBuf, to: PathBuf },
}

impl RecoveryAction {
    pub fn run(&self) -> Result<()> {
        match self {
            RecoveryAction::RemoveFile { path } => remove_file_if_exists(path),
            RecoveryAction::RemoveDirectory { path } => remove_dir_if_exists(path),
            RecoveryAction::RestoreFile { from, to } => restore_file(from, to),
        }
    }
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryAction::RemoveFile { path } => write!(f, "remove file {}", path.display()),
            RecoveryAction::RemoveDirectory { path } => {
                write!(f, "remove directory {}", path.display())
            }
            RecoveryAction::RestoreFile { from, to } => {
                write!(f, "restore {} from {}", to.display(), from.display())
            }
        }
    }
}

/// LIFO stacks of cleanup and rollback actions for one transaction.
#[derive(Debug, Default)]
pub struct RecoveryManager {
    cleanups: Vec<RecoveryAction>,
    rollbacks: Vec<RecoveryAction>,
}

impl RecoveryManager {
    pub fn new() -> Self {
        RecoveryManager::default()
    }

    pub fn add_cleanup(&mut self, action: RecoveryAction) {
        self.cleanups.push(action);
    }

    pub fn add_rollback(&mut self, action: RecoveryAction) {
        self.rollbacks.push(action);
    }

    /// Run every cleanup action in reverse registration order, collecting
    /// failures instead of stopping at the first one.
    pub fn cleanup(&self) -> Result<()> {
        run_reverse(&self.cleanups, ErrorKind::CleanupFailed)
    }

    /// Run every rollback action in reverse registration order.
    pub fn rollback(&self) -> Result<()> {
        run_reverse(&self.rollbacks, ErrorKind::RecoveryFailed)
    }

    /// Run both stacks; a double failure is reported as a partial failure
    /// carrying both causes.
    pub fn cleanup_and_rollback(&self) -> Result<()> {
        let cleanup = self.cleanup();
        let rollback = self.rollback();
        match (cleanup, rollback) {
            (Err(cleanup_err), Err(rollback_err)) => Err(Error::new(ErrorKind::PartialFailure)
                .with_message("both cleanup and rollback failed")
                .with_context("cleanup_error", cleanup_err)
                .with_context("rollback_error", rollback_err)),
            (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err),
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    /// Discard all registered actions. Called exactly once, at the point the
    /// transaction is irrevocably committed.
    pub fn clear(&mut self) {
        self.cleanups.clear();
        self.rollbacks.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.cleanups.is_empty() && self.rollbacks.is_empty()
    }
}

fn run_reverse(actions: &[RecoveryAction], kind: ErrorKind) -> Result<()> {
    let mut failures = Vec::new();
    for action in actions.iter().rev() {
        debug!("running compensating action: {action}");
        if let Err(err) = action.run() {
            failures.push(format!("{action}: {err}"));
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::new(kind)
            .with_message(format!("{} compensating actions failed", failures.len()))
            .with_context("failures", failures.join("; ")))
    }
}

/// Remove a file, treating a missing path as already cleaned.
pub fn remove_file_if_exists(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::new(ErrorKind::InvalidInput).with_message("path cannot be empty"));
    }
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::new(ErrorKind::CleanupFailed)
            .with_message("failed to remove file")
            .with_cause(err)
            .with_context("path", path.display())),
    }
}

/// Remove a directory tree, treating a missing path as already cleaned.
pub fn remove_dir_if_exists(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::new(ErrorKind::InvalidInput).with_message("path cannot be empty"));
    }
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::new(ErrorKind::CleanupFailed)
            .with_message("failed to remove directory")
            .with_cause(err)
            .with_context("path", path.display())),
    }
}

/// Copy `path` to a `.backup` sibling and return the backup path.
pub fn backup_file(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(Error::new(ErrorKind::NotFound)
            .with_message("source file not found")
            .with_context("path", path.display()));
    }
    let backup = sibling_with_suffix(path, ".backup");
    fs::copy(path, &backup).map_err(|err| {
        Error::new(ErrorKind::OperationFailed)
            .with_message("failed to write backup file")
            .with_cause(err)
            .with_context("path", path.display())
    })?;
    Ok(backup)
}

/// Overwrite `to` with the contents of the backup at `from`.
pub fn restore_file(from: &Path, to: &Path) -> Result<()> {
    if !from.exists() {
        return Err(Error::new(ErrorKind::NotFound)
            .with_message("backup file not found")
            .with_context("path", from.display()));
    }
    fs::copy(from, to).map_err(|err| {
        Error::new(ErrorKind::RecoveryFailed)
            .with_message("failed to restore file")
            .with_cause(err)
            .with_context("from", from.display())
            .with_context("to", to.display())
    })?;
    Ok(())
}

pub(crate) fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}
