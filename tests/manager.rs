mod common;

use std::fs;

use common::{FailingDownloader, FakeDownloader, FakeEnvWriter, base_config, manager_at};
use gover::config::{ConfigStore, FileStore};
use gover::errors::ErrorKind;

#[cfg(unix)]
#[test]
fn install_records_the_version_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    FileStore::at(&config_path).save(&base_config(dir.path())).unwrap();

    let manager = manager_at(
        &config_path,
        Box::new(FakeDownloader::with_toolchain("1.22.0")),
        FakeEnvWriter::new(),
    );
    manager.install("go1.22.0", None).unwrap();

    let config = FileStore::at(&config_path).load().unwrap();
    assert_eq!(config.versions["go1.22.0"], dir.path().join("versions/go1.22.0"));
    assert!(config.active_version.is_empty(), "install must not change the active version");
    assert!(dir.path().join("versions/go1.22.0/bin/go").is_file());
    // Neither the archive nor the config backup survives a committed install.
    assert!(!dir.path().join("versions/go1.22.0.linux-amd64.tar.gz").exists());
    assert!(!dir.path().join("config.json.backup").exists());
}

#[cfg(unix)]
#[test]
fn install_reports_progress() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    FileStore::at(&config_path).save(&base_config(dir.path())).unwrap();

    let manager = manager_at(
        &config_path,
        Box::new(FakeDownloader::with_toolchain("1.22.0")),
        FakeEnvWriter::new(),
    );
    let mut ticks = 0u32;
    let mut progress = |_current: u64, _total: u64| ticks += 1;
    manager.install("1.22.0", Some(&mut progress)).unwrap();
    assert!(ticks > 0, "the progress callback must be driven on the read path");
}

#[test]
fn install_of_known_version_fails_without_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    let mut config = base_config(dir.path());
    config
        .versions
        .insert("go1.21.5".to_string(), dir.path().join("versions/go1.21.5"));
    FileStore::at(&config_path).save(&config).unwrap();
    let before = fs::read(&config_path).unwrap();

    let manager = manager_at(&config_path, Box::new(FailingDownloader), FakeEnvWriter::new());
    let err = manager.install("1.21.5", None).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::VersionAlreadyInstalled);
    assert_eq!(fs::read(&config_path).unwrap(), before, "config must be untouched");
    assert!(!dir.path().join("config.json.backup").exists(), "no side effect may precede the check");
}

#[test]
fn download_failure_rolls_back_and_surfaces_the_error() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    let config = base_config(dir.path());
    FileStore::at(&config_path).save(&config).unwrap();

    let manager = manager_at(&config_path, Box::new(FailingDownloader), FakeEnvWriter::new());
    let err = manager.install("1.22.0", None).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DownloadFailed);
    assert_eq!(FileStore::at(&config_path).load().unwrap(), config);
    assert!(!dir.path().join("versions/go1.22.0").exists());
    assert!(!dir.path().join("config.json.backup").exists(), "cleanup must remove the backup");
}

#[test]
fn invalid_version_input_is_rejected_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    let manager = manager_at(&config_path, Box::new(FailingDownloader), FakeEnvWriter::new());
    let err = manager.install("not-a-version", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidVersion);
}

#[test]
fn uninstall_of_the_active_version_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    let version_dir = dir.path().join("versions/go1.21.5");
    fs::create_dir_all(version_dir.join("bin")).unwrap();
    fs::write(version_dir.join("bin/go"), b"binary").unwrap();

    let mut config = base_config(dir.path());
    config.versions.insert("go1.21.5".to_string(), version_dir.clone());
    config.active_version = "go1.21.5".to_string();
    FileStore::at(&config_path).save(&config).unwrap();

    let manager = manager_at(&config_path, Box::new(FailingDownloader), FakeEnvWriter::new());
    let err = manager.uninstall("go1.21.5").unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UninstallFailed);
    assert!(version_dir.exists(), "the active installation must be untouched");
    assert_eq!(FileStore::at(&config_path).load().unwrap(), config);
}

#[test]
fn uninstall_of_unknown_version_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    FileStore::at(&config_path).save(&base_config(dir.path())).unwrap();

    let manager = manager_at(&config_path, Box::new(FailingDownloader), FakeEnvWriter::new());
    let err = manager.uninstall("go1.9.9").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VersionNotInstalled);
}

#[test]
fn uninstall_removes_directory_and_config_entry_together() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    let old = dir.path().join("versions/go1.21.5");
    let active = dir.path().join("versions/go1.22.0");
    for path in [&old, &active] {
        fs::create_dir_all(path.join("bin")).unwrap();
        fs::write(path.join("bin/go"), b"binary").unwrap();
    }

    let mut config = base_config(dir.path());
    config.versions.insert("go1.21.5".to_string(), old.clone());
    config.versions.insert("go1.22.0".to_string(), active.clone());
    config.active_version = "go1.22.0".to_string();
    FileStore::at(&config_path).save(&config).unwrap();

    let manager = manager_at(&config_path, Box::new(FailingDownloader), FakeEnvWriter::new());
    manager.uninstall("1.21.5").unwrap();

    assert!(!old.exists());
    assert!(active.exists());
    let config = FileStore::at(&config_path).load().unwrap();
    assert!(!config.versions.contains_key("go1.21.5"));
    assert_eq!(config.active_version, "go1.22.0");
}

#[test]
fn switch_to_uninstalled_version_never_touches_the_environment() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    FileStore::at(&config_path).save(&base_config(dir.path())).unwrap();

    let env = FakeEnvWriter::new();
    let manager = manager_at(&config_path, Box::new(FailingDownloader), env.clone());
    let err = manager.switch_to("go9.9.9").unwrap_err();

    assert_eq!(err.kind(), ErrorKind::VersionNotInstalled);
    assert!(env.calls.borrow().is_empty(), "environment must not be mutated");
}

#[test]
fn switch_to_corrupted_installation_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    let version_dir = dir.path().join("versions/go1.22.0");
    // Present in config but the toolchain binary is missing on disk.
    fs::create_dir_all(&version_dir).unwrap();

    let mut config = base_config(dir.path());
    config.versions.insert("go1.22.0".to_string(), version_dir);
    FileStore::at(&config_path).save(&config).unwrap();

    let env = FakeEnvWriter::new();
    let manager = manager_at(&config_path, Box::new(FailingDownloader), env.clone());
    let err = manager.switch_to("go1.22.0").unwrap_err();

    assert_eq!(err.kind(), ErrorKind::VersionNotFound);
    assert!(env.calls.borrow().is_empty());
}

#[test]
fn switch_to_sets_environment_then_commits_the_config() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    let version_dir = dir.path().join("versions/go1.22.0");
    fs::create_dir_all(version_dir.join("bin")).unwrap();
    fs::write(version_dir.join("bin/go"), b"binary").unwrap();

    let mut config = base_config(dir.path());
    config.versions.insert("go1.22.0".to_string(), version_dir.clone());
    FileStore::at(&config_path).save(&config).unwrap();

    let env = FakeEnvWriter::new();
    let manager = manager_at(&config_path, Box::new(FailingDownloader), env.clone());
    manager.switch_to("1.22.0").unwrap();

    assert_eq!(
        *env.calls.borrow(),
        vec![
            format!("set_go_root {}", version_dir.display()),
            format!("update_path {}", version_dir.display()),
        ]
    );
    let config = FileStore::at(&config_path).load().unwrap();
    assert_eq!(config.active_version, "go1.22.0");

    let active = manager.active_version().unwrap();
    assert_eq!(active.version, "go1.22.0");
    assert!(active.is_active);
}

#[test]
fn migrate_config_rewrites_legacy_keys_once() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    let mut config = base_config(dir.path());
    config.versions.insert("1.21.5".to_string(), dir.path().join("versions/1.21.5"));
    config.active_version = "1.21.5".to_string();
    FileStore::at(&config_path).save(&config).unwrap();

    let manager = manager_at(&config_path, Box::new(FailingDownloader), FakeEnvWriter::new());
    assert!(manager.migrate_config().unwrap());

    let migrated = FileStore::at(&config_path).load().unwrap();
    assert_eq!(migrated.active_version, "go1.21.5");
    assert!(migrated.versions.contains_key("go1.21.5"));
    assert!(!migrated.versions.contains_key("1.21.5"));

    assert!(!manager.migrate_config().unwrap(), "second pass must be a no-op");
}

#[cfg(unix)]
#[test]
fn installed_versions_cross_checks_config_and_disk() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    let valid = dir.path().join("versions/go1.22.0");
    fs::create_dir_all(valid.join("bin")).unwrap();
    fs::write(valid.join("bin/go"), b"binary").unwrap();
    // A directory without a toolchain binary must not be reported.
    fs::create_dir_all(dir.path().join("versions/go1.9.9")).unwrap();
    // Nor one whose name is not a version id.
    fs::create_dir_all(dir.path().join("versions/scratch/bin")).unwrap();

    let mut config = base_config(dir.path());
    config.versions.insert("go1.22.0".to_string(), valid.clone());
    config.active_version = "go1.22.0".to_string();
    FileStore::at(&config_path).save(&config).unwrap();

    let manager = manager_at(&config_path, Box::new(FailingDownloader), FakeEnvWriter::new());
    let versions = manager.installed_versions().unwrap();

    let ours: Vec<_> = versions.iter().filter(|v| v.path.starts_with(dir.path())).collect();
    assert_eq!(ours.len(), 1);
    assert_eq!(ours[0].version, "go1.22.0");
    assert!(ours[0].is_active);
    assert!(ours[0].install_date.is_some());
}
