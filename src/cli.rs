//! Binary entry point arguments (spec §10.4 ambient CLI tooling).
//!
//! Grounded on the teacher's `cli.rs` (`clap` derive, a top-level `dry_run`
//! flag threaded through the whole run). The teacher's TUI-tool menagerie
//! (`Tools { Disk, System, User, Network }`) has no counterpart here: the
//! core is a headless pipeline, not an interactive toolbox.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Headless installer core for a rolling-release Arch-family distribution.
#[derive(Parser)]
#[command(name = "rollforge")]
#[command(about = "Installation pipeline core: partitioning, storage layering, system configuration, bootloader generation")]
#[command(version)]
pub struct Cli {
    /// Dry-run mode: log every subprocess argv without executing it.
    ///
    /// Equivalent to setting `DIRTY_CMD_RUN=1`; destructive operations
    /// (wipe, format, mount, install) are skipped and logged.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full installation pipeline from a declarative config file
    Install {
        /// Path to settings.json (default: ./settings.json)
        #[arg(short, long, default_value = "settings.json")]
        config: PathBuf,
    },
    /// Load and validate a configuration file without installing anything
    Validate {
        /// Path to settings.json to validate
        config: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
