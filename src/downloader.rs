//! Resolve and fetch Go release archives from the official download index.
//!
//! Every byte read from the network is hashed incrementally while the
//! progress callback is driven on the same read path, so the callback must
//! stay cheap. The archive lands at its destination only after the digest
//! matches the published checksum.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use log::{info, warn};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::errors::{Error, ErrorKind, Result};
use crate::platform::Platform;
use crate::recovery::{RecoveryAction, RecoveryManager};
use crate::version;

pub const VERSION_INDEX_URL: &str = "https://go.dev/dl/?mode=json";
pub const DOWNLOAD_BASE_URL: &str = "https://go.dev/dl/";

const INDEX_TIMEOUT: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const COPY_BUF_SIZE: usize = 64 * 1024;

/// One release entry of the remote version index.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteVersion {
    pub version: String,
    #[serde(default)]
    pub stable: bool,
    #[serde(default)]
    pub files: Vec<RemoteFile>,
}

/// One downloadable artifact of a release.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFile {
    pub filename: String,
    pub os: String,
    pub arch: String,
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub size: u64,
}

/// Byte-level progress callback: `(bytes_so_far, total_bytes)`.
pub type ProgressFn<'a> = &'a mut dyn FnMut(u64, u64);

pub trait Downloader {
    /// Fetch the remote index, freshest first. Never cached.
    fn available_versions(&self) -> Result<Vec<RemoteVersion>>;
    fn download_url(&self, version: &str, os: &str, arch: &str) -> Result<String>;
    /// Stream the archive for `version` to `dest`, verifying its checksum.
    fn download(&self, version: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<()>;
}

pub struct HttpDownloader {
    client: reqwest::blocking::Client,
    base_url: String,
    api_url: String,
    platform: Platform,
}

impl HttpDownloader {
    pub fn new(platform: Platform) -> Result<Self> {
        Self::with_urls(platform, DOWNLOAD_BASE_URL, VERSION_INDEX_URL)
    }

    pub fn with_urls(platform: Platform, base_url: &str, api_url: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("gover/", env!("CARGO_PKG_VERSION")))
            .timeout(CLIENT_TIMEOUT)
            .build()
            .map_err(|err| {
                Error::new(ErrorKind::NetworkError)
                    .with_message("failed to create HTTP client")
                    .with_cause(err)
            })?;
        Ok(HttpDownloader {
            client,
            base_url: base_url.to_string(),
            api_url: api_url.to_string(),
            platform,
        })
    }

    fn fetch_index(&self) -> Result<Vec<RemoteVersion>> {
        let resp = self
            .client
            .get(&self.api_url)
            .timeout(INDEX_TIMEOUT)
            .send()
            .map_err(|err| {
                Error::new(ErrorKind::NetworkError)
                    .with_message("failed to fetch version index")
                    .with_cause(err)
            })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::new(ErrorKind::NetworkError)
                .with_message(format!("version index returned status {status}")));
        }
        resp.json().map_err(|err| {
            Error::new(ErrorKind::NetworkError)
                .with_message("failed to parse version index")
                .with_cause(err)
        })
    }

    fn file_info(&self, version: &str, os: &str, arch: &str) -> Result<RemoteFile> {
        let index = self.fetch_index()?;
        select_file(&index, version, os, arch)
            .cloned()
            .ok_or_else(|| {
                Error::new(ErrorKind::VersionNotFound)
                    .with_message(format!("file metadata not found for {version} on {os}/{arch}"))
                    .with_context("requested_version", version)
            })
    }

    fn download_with_recovery(
        &self,
        version: &str,
        dest: &Path,
        progress: Option<ProgressFn>,
        recovery: &mut RecoveryManager,
    ) -> Result<()> {
        let (os, arch) = (self.platform.os, self.platform.arch);
        let url = self.download_url(version, os, arch)?;
        info!("download url: {url}");

        // Missing metadata degrades to an unverified download rather than
        // failing the whole install.
        let expected = match self.file_info(version, os, arch) {
            Ok(file) => Some(file),
            Err(err) => {
                warn!("file metadata unavailable, skipping checksum verification: {err}");
                None
            }
        };

        let staging = tempfile::Builder::new()
            .prefix(".gover-download-")
            .tempfile()
            .map_err(|err| {
                Error::new(ErrorKind::DownloadFailed)
                    .with_message("failed to create staging file")
                    .with_cause(err)
            })?;
        let staging_path = staging.into_temp_path().keep().map_err(|err| {
            Error::new(ErrorKind::DownloadFailed)
                .with_message("failed to persist staging file")
                .with_cause(err)
        })?;
        recovery.add_cleanup(RecoveryAction::RemoveFile { path: staging_path.clone() });

        let expected_size = expected.as_ref().map(|f| f.size).unwrap_or(0);
        info!("downloading to staging file {}", staging_path.display());
        let digest = self.fetch_to_file(&url, &staging_path, expected_size, progress)?;

        match &expected {
            Some(file) if !file.sha256.is_empty() => {
                if digest != file.sha256 {
                    return Err(Error::new(ErrorKind::ChecksumMismatch)
                        .with_message("downloaded archive does not match the published checksum")
                        .with_context("expected_sha256", &file.sha256)
                        .with_context("actual_sha256", &digest));
                }
                info!("checksum verified");
            }
            _ => warn!("no checksum available for {version}, integrity not verified"),
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                Error::new(ErrorKind::DownloadFailed)
                    .with_message("failed to create destination directory")
                    .with_cause(err)
                    .with_context("dest_path", dest.display())
            })?;
        }
        move_file(&staging_path, dest)?;
        info!("download complete: {}", dest.display());
        Ok(())
    }

    fn fetch_to_file(
        &self,
        url: &str,
        dest: &Path,
        expected_size: u64,
        mut progress: Option<ProgressFn>,
    ) -> Result<String> {
        let mut resp = self.client.get(url).send().map_err(|err| {
            Error::new(ErrorKind::DownloadFailed)
                .with_message("failed to start download")
                .with_cause(err)
        })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::new(ErrorKind::DownloadFailed)
                .with_message(format!("download returned status {status}")));
        }

        let total = resp.content_length().unwrap_or(expected_size);
        let mut out = File::create(dest).map_err(|err| {
            Error::new(ErrorKind::DownloadFailed)
                .with_message("failed to open staging file")
                .with_cause(err)
        })?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        let mut copied = 0u64;
        loop {
            let n = resp.read(&mut buf).map_err(|err| {
                Error::new(ErrorKind::DownloadFailed)
                    .with_message("failed while reading download stream")
                    .with_cause(err)
            })?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            out.write_all(&buf[..n]).map_err(|err| {
                Error::new(ErrorKind::DownloadFailed)
                    .with_message("failed to write staging file")
                    .with_cause(err)
            })?;
            copied += n as u64;
            if let Some(cb) = progress.as_mut() {
                cb(copied, total);
            }
        }
        out.sync_all().map_err(|err| {
            Error::new(ErrorKind::DownloadFailed)
                .with_message("failed to flush staging file")
                .with_cause(err)
        })?;
        Ok(format!("{:x}", hasher.finalize()))
    }
}

impl Downloader for HttpDownloader {
    fn available_versions(&self) -> Result<Vec<RemoteVersion>> {
        self.fetch_index()
    }

    fn download_url(&self, version: &str, os: &str, arch: &str) -> Result<String> {
        let version = version::canonicalize(version);
        let index = self.fetch_index()?;
        if let Some(file) = select_file(&index, &version, os, arch) {
            return Ok(format!("{}{}", self.base_url, file.filename));
        }
        let available: Vec<&str> =
            index.iter().filter(|v| v.stable).take(8).map(|v| v.version.as_str()).collect();
        Err(Error::new(ErrorKind::VersionNotFound)
            .with_message(format!("version {version} not found for {os}/{arch}"))
            .with_context("requested_version", version)
            .with_context("available_versions", available.join(", ")))
    }

    fn download(&self, version: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<()> {
        info!("starting download of {version}");
        let mut recovery = RecoveryManager::new();
        let result = self.download_with_recovery(version, dest, progress, &mut recovery);
        // The staging file is removed on every path; after a successful move
        // this is a no-op.
        if let Err(err) = recovery.cleanup() {
            warn!("download cleanup failed: {err}");
        }
        result
    }
}

/// Linear scan of the index for a version and a platform-matching file.
pub(crate) fn select_file<'a>(
    index: &'a [RemoteVersion],
    version: &str,
    os: &str,
    arch: &str,
) -> Option<&'a RemoteFile> {
    index
        .iter()
        .find(|v| v.version == version)?
        .files
        .iter()
        .find(|f| f.os == os && f.arch == arch)
}

fn move_file(src: &Path, dest: &Path) -> Result<()> {
    if let Err(err) = fs::rename(src, dest) {
        // Rename cannot cross filesystem boundaries; fall back to copy + delete.
        warn!("rename to {} failed ({err}), copying instead", dest.display());
        fs::copy(src, dest).map_err(|err| {
            Error::new(ErrorKind::DownloadFailed)
                .with_message("failed to move archive to destination")
                .with_cause(err)
                .with_context("dest_path", dest.display())
        })?;
        let _ = fs::remove_file(src);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX_JSON: &str = r#"[
        {
            "version": "go1.22.0",
            "stable": true,
            "files": [
                {"filename": "go1.22.0.linux-amd64.tar.gz", "os": "linux", "arch": "amd64", "sha256": "aaa", "size": 10},
                {"filename": "go1.22.0.windows-amd64.zip", "os": "windows", "arch": "amd64", "sha256": "bbb", "size": 11}
            ]
        },
        {
            "version": "go1.21.5",
            "stable": false,
            "files": [
                {"filename": "go1.21.5.darwin-arm64.tar.gz", "os": "darwin", "arch": "arm64", "sha256": "ccc", "size": 12}
            ]
        }
    ]"#;

    fn index() -> Vec<RemoteVersion> {
        serde_json::from_str(INDEX_JSON).expect("index parses")
    }

    #[test]
    fn index_deserializes_with_defaults() {
        let index = index();
        assert_eq!(index.len(), 2);
        assert!(index[0].stable);
        assert_eq!(index[0].files[0].sha256, "aaa");
        // Missing optional fields fall back to defaults.
        let sparse: Vec<RemoteVersion> =
            serde_json::from_str(r#"[{"version": "go1.9"}]"#).unwrap();
        assert!(!sparse[0].stable);
        assert!(sparse[0].files.is_empty());
    }

    #[test]
    fn select_file_matches_version_and_platform() {
        let index = index();
        let file = select_file(&index, "go1.22.0", "windows", "amd64").expect("found");
        assert_eq!(file.filename, "go1.22.0.windows-amd64.zip");
        assert!(select_file(&index, "go1.22.0", "linux", "arm64").is_none());
        assert!(select_file(&index, "go9.9.9", "linux", "amd64").is_none());
    }
}
