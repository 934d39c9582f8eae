//! Command line arguments for gover.

use clap::{Parser, Subcommand};
use clap_cargo::style::CLAP_STYLING;

#[derive(Debug, Parser)]
#[command(
    about = "Install, switch between, and remove Go toolchain versions",
    version,
    display_name = "gover",
    styles = CLAP_STYLING,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Download and install a Go version (e.g. 1.22.0, or "latest")
    Install { version: String },
    /// Remove an installed Go version
    Uninstall { version: String },
    /// Switch the active Go version
    Use { version: String },
    /// Show installed versions, or the remote index with --remote
    List {
        /// List versions available for download instead of installed ones
        #[arg(long)]
        remote: bool,
    },
    /// Show the currently active version
    Current,
    /// Show the latest stable version available for download
    Latest,
    /// Rewrite the config file to the canonical version-id format
    MigrateConfig,
}

#[test]
fn verify_cli() {
    use clap::CommandFactory;
    Cli::command().debug_assert();
}
