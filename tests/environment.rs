#![cfg(unix)]

use std::fs;

use gover::environment::EnvWriter;
use gover::environment::unix::ShellProfileWriter;
use gover::errors::ErrorKind;

#[test]
fn set_go_root_writes_a_managed_block() {
    let home = tempfile::tempdir().unwrap();
    let go_root = home.path().join("versions/go1.22.0");
    fs::create_dir_all(&go_root).unwrap();

    let writer = ShellProfileWriter::with_home(home.path());
    writer.set_go_root(&go_root).unwrap();

    let profile = fs::read_to_string(home.path().join(".profile")).unwrap();
    assert!(profile.contains("# gover managed GOROOT"));
    assert!(profile.contains(&format!(r#"export GOROOT="{}""#, go_root.display())));
}

#[test]
fn rewriting_replaces_the_previous_block() {
    let home = tempfile::tempdir().unwrap();
    let old_root = home.path().join("versions/go1.21.5");
    let new_root = home.path().join("versions/go1.22.0");
    fs::create_dir_all(&old_root).unwrap();
    fs::create_dir_all(&new_root).unwrap();

    let writer = ShellProfileWriter::with_home(home.path());
    writer.set_go_root(&old_root).unwrap();
    writer.set_go_root(&new_root).unwrap();

    let profile = fs::read_to_string(home.path().join(".profile")).unwrap();
    assert_eq!(profile.matches("# gover managed GOROOT").count(), 1, "must stay idempotent");
    assert!(profile.contains(&format!(r#"export GOROOT="{}""#, new_root.display())));
    assert!(!profile.contains(&old_root.display().to_string()));
}

#[test]
fn unrelated_profile_content_is_preserved() {
    let home = tempfile::tempdir().unwrap();
    let go_root = home.path().join("versions/go1.22.0");
    fs::create_dir_all(&go_root).unwrap();
    fs::write(home.path().join(".profile"), "alias ll='ls -l'\n").unwrap();

    let writer = ShellProfileWriter::with_home(home.path());
    writer.set_go_root(&go_root).unwrap();

    let profile = fs::read_to_string(home.path().join(".profile")).unwrap();
    assert!(profile.contains("alias ll='ls -l'"));
    assert!(profile.contains("# gover managed GOROOT"));
}

#[test]
fn update_path_prepends_the_bin_directory() {
    let home = tempfile::tempdir().unwrap();
    let go_root = home.path().join("versions/go1.22.0");
    fs::create_dir_all(go_root.join("bin")).unwrap();

    let writer = ShellProfileWriter::with_home(home.path());
    writer.update_path(&go_root).unwrap();

    let profile = fs::read_to_string(home.path().join(".profile")).unwrap();
    assert!(profile.contains("# gover managed PATH"));
    assert!(
        profile.contains(&format!(r#"export PATH="{}:$PATH""#, go_root.join("bin").display()))
    );
}

#[test]
fn missing_go_root_is_invalid_input() {
    let home = tempfile::tempdir().unwrap();
    let writer = ShellProfileWriter::with_home(home.path());
    let err = writer.set_go_root(&home.path().join("does-not-exist")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn update_path_requires_the_bin_directory() {
    let home = tempfile::tempdir().unwrap();
    let go_root = home.path().join("versions/go1.22.0");
    fs::create_dir_all(&go_root).unwrap();

    let writer = ShellProfileWriter::with_home(home.path());
    let err = writer.update_path(&go_root).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(err.context("bin_path").is_some());
}
