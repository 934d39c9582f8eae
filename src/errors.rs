//! Typed errors for the version lifecycle pipeline.
//!
//! Every failure carries a stable [`ErrorKind`], a human message, an optional
//! wrapped cause, a key/value context map, and a `recoverable` flag. Callers
//! branch on [`Error::kind`], never on message text.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Closed set of failure kinds, compared by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    VersionNotFound,
    VersionAlreadyInstalled,
    VersionNotInstalled,
    InvalidVersion,
    InvalidInput,
    DownloadFailed,
    ChecksumMismatch,
    InstallFailed,
    UninstallFailed,
    EnvironmentSetupFailed,
    StorageFailed,
    ConfigCorrupted,
    NetworkError,
    PlatformNotSupported,
    NotFound,
    OperationFailed,
    CleanupFailed,
    RecoveryFailed,
    PartialFailure,
}

impl ErrorKind {
    /// Stable machine-readable code, part of the CLI's output contract.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::VersionNotFound => "VERSION_NOT_FOUND",
            ErrorKind::VersionAlreadyInstalled => "VERSION_ALREADY_INSTALLED",
            ErrorKind::VersionNotInstalled => "VERSION_NOT_INSTALLED",
            ErrorKind::InvalidVersion => "INVALID_VERSION",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::DownloadFailed => "DOWNLOAD_FAILED",
            ErrorKind::ChecksumMismatch => "CHECKSUM_MISMATCH",
            ErrorKind::InstallFailed => "INSTALL_FAILED",
            ErrorKind::UninstallFailed => "UNINSTALL_FAILED",
            ErrorKind::EnvironmentSetupFailed => "ENVIRONMENT_SETUP_FAILED",
            ErrorKind::StorageFailed => "STORAGE_FAILED",
            ErrorKind::ConfigCorrupted => "CONFIG_CORRUPTED",
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::PlatformNotSupported => "PLATFORM_NOT_SUPPORTED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::OperationFailed => "OPERATION_FAILED",
            ErrorKind::CleanupFailed => "CLEANUP_FAILED",
            ErrorKind::RecoveryFailed => "RECOVERY_FAILED",
            ErrorKind::PartialFailure => "PARTIAL_FAILURE",
        }
    }

    fn base_message(self) -> &'static str {
        match self {
            ErrorKind::VersionNotFound => "version not found",
            ErrorKind::VersionAlreadyInstalled => "version already installed",
            ErrorKind::VersionNotInstalled => "version not installed",
            ErrorKind::InvalidVersion => "invalid version format",
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::DownloadFailed => "download failed",
            ErrorKind::ChecksumMismatch => "checksum verification failed",
            ErrorKind::InstallFailed => "installation failed",
            ErrorKind::UninstallFailed => "uninstall failed",
            ErrorKind::EnvironmentSetupFailed => "environment setup failed",
            ErrorKind::StorageFailed => "storage operation failed",
            ErrorKind::ConfigCorrupted => "configuration file is corrupted",
            ErrorKind::NetworkError => "network error",
            ErrorKind::PlatformNotSupported => "platform not supported",
            ErrorKind::NotFound => "resource not found",
            ErrorKind::OperationFailed => "operation failed",
            ErrorKind::CleanupFailed => "cleanup operation failed",
            ErrorKind::RecoveryFailed => "recovery operation failed",
            ErrorKind::PartialFailure => "operation partially failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The single error type of the crate.
///
/// The wrapped cause is exposed through `std::error::Error::source`, so the
/// top-level renderer can walk the full chain.
#[derive(Debug, Error)]
#[error("[{}] {}", .kind.code(), .message)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    context: BTreeMap<&'static str, String>,
    recoverable: bool,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Error {
            kind,
            message: kind.base_message().to_string(),
            cause: None,
            context: BTreeMap::new(),
            recoverable: false,
        }
    }

    /// Append a detail to the message, keeping the kind's base message as prefix.
    pub fn with_message(mut self, detail: impl fmt::Display) -> Self {
        self.message = format!("{}: {detail}", self.message);
        self
    }

    pub fn with_cause(mut self, cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_context(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        self.context.insert(key, value.to_string());
        self
    }

    /// Mark the error as recoverable: the caller may retry or repair and go on.
    pub fn recoverable(mut self) -> Self {
        self.recoverable = true;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }

    pub fn context_entries(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.context.iter().map(|(k, v)| (*k, v.as_str()))
    }
}
