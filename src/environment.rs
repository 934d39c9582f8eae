//! Persistent environment mutation: GOROOT and the search path must survive
//! the process that set them.
//!
//! The capability is a trait so the orchestrator stays platform-agnostic and
//! tests can substitute a fake; the real implementation is chosen once, at
//! construction time.

use std::path::{Path, PathBuf};

use crate::errors::{Error, ErrorKind, Result};

pub trait EnvWriter {
    /// Point GOROOT at the given installation. Idempotent; fails loudly if
    /// the path is missing.
    fn set_go_root(&self, path: &Path) -> Result<()>;
    /// Put `<go_root>/bin` on the persistent search path. Idempotent.
    fn update_path(&self, go_root: &Path) -> Result<()>;
    /// Read back the persisted GOROOT, if any.
    fn go_root(&self) -> Result<PathBuf>;
}

/// Select the writer implementation for the current platform.
pub fn platform_writer() -> Result<Box<dyn EnvWriter>> {
    #[cfg(unix)]
    {
        Ok(Box::new(unix::ShellProfileWriter::new()?))
    }
    #[cfg(windows)]
    {
        Ok(Box::new(windows::RegistryWriter))
    }
    #[cfg(not(any(unix, windows)))]
    {
        Err(Error::new(ErrorKind::PlatformNotSupported)
            .with_message("no persistent environment writer for this platform"))
    }
}

fn validate_install_dir(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::new(ErrorKind::InvalidInput).with_message("GOROOT path cannot be empty"));
    }
    if !path.is_dir() {
        return Err(Error::new(ErrorKind::InvalidInput)
            .with_message("GOROOT path does not exist")
            .with_context("path", path.display()));
    }
    Ok(())
}

fn validate_bin_dir(go_root: &Path) -> Result<PathBuf> {
    let bin = go_root.join("bin");
    if !bin.is_dir() {
        return Err(Error::new(ErrorKind::InvalidInput)
            .with_message("Go bin directory does not exist")
            .with_context("go_root", go_root.display())
            .with_context("bin_path", bin.display()));
    }
    Ok(bin)
}

#[cfg(unix)]
pub mod unix {
    //! Shell-profile based persistence for Linux and macOS.
    //!
    //! Each managed variable occupies a marker-delimited pair of lines in the
    //! user's rc files; rewriting replaces the previous pair, which is what
    //! makes the writer idempotent.

    use std::env;
    use std::fs;
    use std::io;

    use log::warn;

    use super::*;

    pub struct ShellProfileWriter {
        home: PathBuf,
    }

    impl ShellProfileWriter {
        pub fn new() -> Result<Self> {
            let home = dirs::home_dir().filter(|p| !p.as_os_str().is_empty()).ok_or_else(|| {
                Error::new(ErrorKind::OperationFailed)
                    .with_message("failed to locate home directory")
            })?;
            Ok(ShellProfileWriter { home })
        }

        /// Writer rooted at an explicit home directory, used by tests.
        pub fn with_home(home: impl Into<PathBuf>) -> Self {
            ShellProfileWriter { home: home.into() }
        }

        fn rc_files(&self) -> Vec<PathBuf> {
            let shell = env::var("SHELL").unwrap_or_default();
            let names: &[&str] = if shell.contains("zsh") {
                &[".zshrc", ".zprofile"]
            } else if shell.contains("bash") {
                &[".bashrc", ".bash_profile", ".profile"]
            } else {
                &[".profile", ".bashrc"]
            };
            names.iter().map(|name| self.home.join(name)).collect()
        }

        fn write_managed(&self, key: &str, export_line: &str) -> Result<()> {
            let mut updated = false;
            for rc in self.rc_files() {
                if !rc.exists() {
                    continue;
                }
                match update_rc(&rc, key, export_line) {
                    Ok(()) => updated = true,
                    Err(err) => warn!("failed to update {}: {err}", rc.display()),
                }
            }
            // No profile existed at all; create one.
            if !updated {
                update_rc(&self.home.join(".profile"), key, export_line)?;
            }
            Ok(())
        }
    }

    impl EnvWriter for ShellProfileWriter {
        fn set_go_root(&self, path: &Path) -> Result<()> {
            validate_install_dir(path)?;
            let line = format!(r#"export GOROOT="{}""#, path.display());
            self.write_managed("GOROOT", &line)
        }

        fn update_path(&self, go_root: &Path) -> Result<()> {
            let bin = validate_bin_dir(go_root)?;
            let line = format!(r#"export PATH="{}:$PATH""#, bin.display());
            self.write_managed("PATH", &line)
        }

        fn go_root(&self) -> Result<PathBuf> {
            match env::var_os("GOROOT") {
                Some(value) if !value.is_empty() => Ok(PathBuf::from(value)),
                _ => Err(Error::new(ErrorKind::NotFound).with_message("GOROOT not set")),
            }
        }
    }

    fn marker(key: &str) -> String {
        format!("# gover managed {key}")
    }

    fn update_rc(rc: &Path, key: &str, export_line: &str) -> Result<()> {
        let existing = match fs::read_to_string(rc) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(rc_err("failed to read shell profile", err, rc)),
        };

        let marker = marker(key);
        let export_prefix = format!("export {key}=");
        let mut lines: Vec<&str> = Vec::new();
        let mut skip_export = false;
        for line in existing.lines() {
            if line.contains(&marker) {
                skip_export = true;
                continue;
            }
            if skip_export {
                skip_export = false;
                if line.trim_start().starts_with(&export_prefix) {
                    continue;
                }
            }
            lines.push(line);
        }

        let mut content = String::new();
        if !lines.is_empty() {
            content.push_str(&lines.join("\n"));
            content.push_str("\n\n");
        }
        content.push_str(&marker);
        content.push('\n');
        content.push_str(export_line);
        content.push('\n');

        fs::write(rc, content).map_err(|err| rc_err("failed to write shell profile", err, rc))
    }

    fn rc_err(message: &str, cause: io::Error, rc: &Path) -> Error {
        Error::new(ErrorKind::EnvironmentSetupFailed)
            .with_message(message)
            .with_cause(cause)
            .with_context("profile", rc.display())
    }
}

#[cfg(windows)]
pub mod windows {
    //! Registry based persistence: GOROOT and Path under HKCU `Environment`.
    //! Changes take effect in shells started after the write.

    use winreg::RegKey;
    use winreg::enums::{HKEY_CURRENT_USER, KEY_READ, KEY_WRITE};

    use super::*;

    /// Fragment identifying search-path entries that we own.
    const INSTALL_MARKER: &str = ".gover\\versions";

    pub struct RegistryWriter;

    impl EnvWriter for RegistryWriter {
        fn set_go_root(&self, path: &Path) -> Result<()> {
            validate_install_dir(path)?;
            environment_key()?
                .set_value("GOROOT", &path.display().to_string())
                .map_err(|err| registry_err("failed to set GOROOT", err))
        }

        fn update_path(&self, go_root: &Path) -> Result<()> {
            let bin = validate_bin_dir(go_root)?;
            let key = environment_key()?;
            let current: String = key.get_value("Path").unwrap_or_default();
            let bin_entry = bin.display().to_string();
            // Drop stale entries from previous switches before prepending the
            // new one.
            let mut parts: Vec<&str> = current
                .split(';')
                .filter(|part| !part.is_empty() && !part.contains(INSTALL_MARKER))
                .collect();
            parts.insert(0, &bin_entry);
            key.set_value("Path", &parts.join(";"))
                .map_err(|err| registry_err("failed to update Path", err))
        }

        fn go_root(&self) -> Result<PathBuf> {
            let key = RegKey::predef(HKEY_CURRENT_USER)
                .open_subkey("Environment")
                .map_err(|err| registry_err("failed to open user environment key", err))?;
            let value: String = key.get_value("GOROOT").map_err(|_| {
                Error::new(ErrorKind::NotFound).with_message("GOROOT not set")
            })?;
            Ok(PathBuf::from(value))
        }
    }

    fn environment_key() -> Result<RegKey> {
        RegKey::predef(HKEY_CURRENT_USER)
            .open_subkey_with_flags("Environment", KEY_READ | KEY_WRITE)
            .map_err(|err| registry_err("failed to open user environment key", err))
    }

    fn registry_err(message: &str, cause: std::io::Error) -> Error {
        Error::new(ErrorKind::EnvironmentSetupFailed).with_message(message).with_cause(cause)
    }
}
