//! Shared fixtures for the integration tests: archive builders and fake
//! component implementations.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use flate2::Compression;
use flate2::write::GzEncoder;
use gover::config::{Config, FileStore};
use gover::downloader::{Downloader, ProgressFn, RemoteVersion};
use gover::environment::EnvWriter;
use gover::errors::{Error, ErrorKind, Result};
use gover::installer::ArchiveInstaller;
use gover::manager::VersionManager;
use gover::platform::Platform;

pub fn test_platform() -> Platform {
    Platform { os: "linux", arch: "amd64" }
}

pub fn base_config(root: &Path) -> Config {
    Config {
        active_version: String::new(),
        install_path: root.join("versions"),
        versions: BTreeMap::new(),
        last_update_check: None,
    }
}

pub fn manager_at(
    config_path: &Path,
    downloader: Box<dyn Downloader>,
    env: FakeEnvWriter,
) -> VersionManager {
    let platform = test_platform();
    VersionManager::new(
        Box::new(FileStore::at(config_path)),
        downloader,
        Box::new(ArchiveInstaller::new(platform)),
        Box::new(env),
        platform,
    )
}

/// Write a tar.gz archive of `(name, contents, mode)` entries.
pub fn write_tar_gz(dest: &Path, entries: &[(&str, &[u8], u32)]) {
    let file = File::create(dest).expect("create archive");
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, data, mode) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(*mode);
        builder.append_data(&mut header, name, *data).expect("append entry");
    }
    builder.into_inner().expect("finish tar").finish().expect("finish gzip");
}

/// Write a zip archive of `(name, contents)` entries.
pub fn write_zip(dest: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(dest).expect("create archive");
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, data) in entries {
        writer.start_file(*name, options).expect("start entry");
        writer.write_all(data).expect("write entry");
    }
    writer.finish().expect("finish zip");
}

/// A stand-in `go` binary: a shell script whose `version` output mimics the
/// real toolchain.
pub fn fake_go_script(version: &str) -> Vec<u8> {
    format!("#!/bin/sh\necho \"go version go{version} linux/amd64\"\n").into_bytes()
}

/// Environment writer that records its calls instead of touching the system.
#[derive(Clone, Default)]
pub struct FakeEnvWriter {
    pub calls: Rc<RefCell<Vec<String>>>,
    root: Rc<RefCell<Option<PathBuf>>>,
}

impl FakeEnvWriter {
    pub fn new() -> Self {
        FakeEnvWriter::default()
    }
}

impl EnvWriter for FakeEnvWriter {
    fn set_go_root(&self, path: &Path) -> Result<()> {
        self.calls.borrow_mut().push(format!("set_go_root {}", path.display()));
        *self.root.borrow_mut() = Some(path.to_path_buf());
        Ok(())
    }

    fn update_path(&self, go_root: &Path) -> Result<()> {
        self.calls.borrow_mut().push(format!("update_path {}", go_root.display()));
        Ok(())
    }

    fn go_root(&self) -> Result<PathBuf> {
        self.root
            .borrow()
            .clone()
            .ok_or_else(|| Error::new(ErrorKind::NotFound).with_message("GOROOT not set"))
    }
}

/// Downloader that materializes a tar.gz archive locally instead of going to
/// the network.
pub struct FakeDownloader {
    entries: Vec<(String, Vec<u8>, u32)>,
}

impl FakeDownloader {
    /// Archive holding a runnable fake toolchain reporting `version`.
    pub fn with_toolchain(version: &str) -> Self {
        FakeDownloader {
            entries: vec![
                ("go/bin/go".to_string(), fake_go_script(version), 0o755),
                ("go/VERSION".to_string(), format!("go{version}").into_bytes(), 0o644),
            ],
        }
    }
}

impl Downloader for FakeDownloader {
    fn available_versions(&self) -> Result<Vec<RemoteVersion>> {
        Ok(Vec::new())
    }

    fn download_url(&self, version: &str, os: &str, arch: &str) -> Result<String> {
        Ok(format!("fake://{version}.{os}-{arch}"))
    }

    fn download(&self, _version: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<()> {
        let entries: Vec<(&str, &[u8], u32)> =
            self.entries.iter().map(|(n, d, m)| (n.as_str(), d.as_slice(), *m)).collect();
        write_tar_gz(dest, &entries);
        if let Some(cb) = progress {
            cb(1, 1);
        }
        Ok(())
    }
}

/// Downloader whose every operation fails, for abort-path tests.
pub struct FailingDownloader;

impl Downloader for FailingDownloader {
    fn available_versions(&self) -> Result<Vec<RemoteVersion>> {
        Err(Error::new(ErrorKind::NetworkError).with_message("simulated network failure"))
    }

    fn download_url(&self, _version: &str, _os: &str, _arch: &str) -> Result<String> {
        Err(Error::new(ErrorKind::NetworkError).with_message("simulated network failure"))
    }

    fn download(&self, _version: &str, _dest: &Path, _progress: Option<ProgressFn>) -> Result<()> {
        Err(Error::new(ErrorKind::DownloadFailed).with_message("simulated download failure"))
    }
}
