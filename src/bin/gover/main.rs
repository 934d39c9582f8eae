//! The gover CLI: a thin shell over the library's version manager.

mod cmd;

use std::io::{self, Write};

use clap::Parser;
use gover::config::FileStore;
use gover::downloader::HttpDownloader;
use gover::environment;
use gover::errors::{Error, ErrorKind};
use gover::installer::ArchiveInstaller;
use gover::manager::VersionManager;
use gover::platform;
use gover::version;

macro_rules! print_info {
    ($($arg:tt)*) => {
        println!("\x1b[1;34minfo:\x1b[0m {}", format!($($arg)*))
    }
}

macro_rules! print_warn {
    ($($arg:tt)*) => {
        println!("\x1b[1;33mwarn:\x1b[0m {}", format!($($arg)*))
    }
}

macro_rules! print_success {
    ($($arg:tt)*) => {
        println!("\x1b[1;32mok:\x1b[0m {}", format!($($arg)*))
    }
}

macro_rules! print_error {
    ($($arg:tt)*) => {
        eprintln!("\x1b[1;31merror:\x1b[0m {}", format!($($arg)*))
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    // A panic from anywhere below must not escape as a crash; it surfaces as
    // a generic operation failure instead.
    match std::panic::catch_unwind(run) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            report(&err);
            std::process::exit(1);
        }
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            report(
                &Error::new(ErrorKind::OperationFailed)
                    .with_message("unexpected internal failure")
                    .with_context("panic", detail),
            );
            std::process::exit(1);
        }
    }
}

fn run() -> Result<(), Error> {
    let cli = cmd::Cli::parse();
    let platform = platform::detect()?;
    let manager = VersionManager::new(
        Box::new(FileStore::new()?),
        Box::new(HttpDownloader::new(platform)?),
        Box::new(ArchiveInstaller::new(platform)),
        environment::platform_writer()?,
        platform,
    );

    match cli.command {
        cmd::Commands::Install { version } => {
            let version = resolve_version(&manager, &version)?;
            print_info!("Installing Go {}...", version::bare(&version));
            let mut progress = progress_printer();
            let result = manager.install(&version, Some(&mut progress));
            println!();
            result?;
            print_success!("Installed Go {}", version::bare(&version));
            print_info!("Run 'gover use {}' to make it the active version.", version::bare(&version));
        }
        cmd::Commands::Uninstall { version } => {
            manager.uninstall(&version)?;
            print_success!("Uninstalled Go {}", version::bare(&version));
        }
        cmd::Commands::Use { version } => {
            manager.switch_to(&version)?;
            print_success!("Now using Go {}", version::bare(&version));
            print_info!("Open a new shell to pick up the updated environment.");
        }
        cmd::Commands::List { remote } => {
            if remote {
                let versions = manager.list_available()?;
                if versions.is_empty() {
                    print_info!("No versions available");
                } else {
                    print_info!("Available versions:\n");
                    for version in versions {
                        println!("- {version}");
                    }
                }
            } else {
                let versions = manager.installed_versions()?;
                if versions.is_empty() {
                    print_info!("No versions installed");
                } else {
                    print_info!("Installed versions:\n");
                    for v in versions {
                        let marker = if v.is_active { "*" } else { " " };
                        match v.install_date {
                            Some(date) => println!(
                                "{marker} {} ({}, installed {})",
                                v.version,
                                v.path.display(),
                                date.format("%Y-%m-%d")
                            ),
                            None => println!("{marker} {} ({})", v.version, v.path.display()),
                        }
                    }
                }
            }
        }
        cmd::Commands::Current => {
            let active = manager.active_version()?;
            println!("{} ({})", active.version, active.path.display());
        }
        cmd::Commands::Latest => {
            println!("{}", manager.latest()?);
        }
        cmd::Commands::MigrateConfig => {
            if manager.migrate_config()? {
                print_success!("Configuration migrated to the canonical version-id format");
            } else {
                print_info!("Configuration is already in the correct format");
            }
        }
    }
    Ok(())
}

fn resolve_version(manager: &VersionManager, version: &str) -> Result<String, Error> {
    if version.eq_ignore_ascii_case("latest") {
        let resolved = manager.latest()?;
        print_info!("Resolved 'latest' to {resolved}");
        Ok(resolved)
    } else {
        Ok(version.to_string())
    }
}

/// Progress callback for downloads. Runs on the byte-copy path, so it only
/// touches stdout when the displayed percentage actually changes.
fn progress_printer() -> impl FnMut(u64, u64) {
    let mut last = u64::MAX;
    move |current, total| {
        if total == 0 {
            return;
        }
        let percent = (current * 100 / total).min(100);
        if percent != last {
            last = percent;
            print!("\r\x1b[1;34minfo:\x1b[0m downloading... {percent}%");
            let _ = io::stdout().flush();
        }
    }
}

fn report(err: &Error) {
    print_error!("{err}");
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        print_error!("  caused by: {cause}");
        source = cause.source();
    }
    if err.is_recoverable() {
        print_warn!("This error is recoverable; state was restored where possible.");
    }
    if let Some(hint) = remediation(err.kind()) {
        print_info!("{hint}");
    }
}

fn remediation(kind: ErrorKind) -> Option<&'static str> {
    match kind {
        ErrorKind::VersionNotFound => {
            Some("Run 'gover list --remote' to see the versions available for download.")
        }
        ErrorKind::VersionAlreadyInstalled => Some("Run 'gover use <version>' to switch to it."),
        ErrorKind::VersionNotInstalled => Some("Run 'gover install <version>' first."),
        ErrorKind::InvalidVersion => {
            Some("Versions look like 1.22.0 or go1.22.0; 'latest' also works for install.")
        }
        ErrorKind::ChecksumMismatch => {
            Some("The download was corrupted in transit; running the install again usually fixes it.")
        }
        ErrorKind::NetworkError => Some("Check your network connection and try again."),
        ErrorKind::ConfigCorrupted => {
            Some("The config file could not be parsed; repair or delete it and retry.")
        }
        ErrorKind::UninstallFailed => {
            Some("Switch to a different version first if you are removing the active one.")
        }
        _ => None,
    }
}
