//! Command-line interface definitions for QuickPurge.
//!
//! This module defines all CLI arguments, subcommands, and options using the clap derive API.
//!
//! # Example
//!
//! ```bash
//! # Scan two directories
//! quickpurge scan ~/Downloads ~/Pictures
//!
//! # Archive a duplicate found by the latest scan
//! quickpurge archive ~/Downloads/copy.jpg
//!
//! # Put it back
//! quickpurge restore ~/.local/share/quickpurge/archive/20240131-142501-337_copy.jpg
//!
//! # Verbose mode for debugging
//! quickpurge -v scan-system
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Duplicate file finder with a recoverable archive.
///
/// QuickPurge finds duplicate files by size and BLAKE3 content hash, and moves
/// the copies you choose into a holding directory from which they can be
/// restored or permanently deleted.
#[derive(Debug, Parser)]
#[command(name = "quickpurge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to a TOML configuration file
    ///
    /// Defaults to the platform config directory (e.g. ~/.config/quickpurge/config.toml).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Print errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan one or more directories for duplicate files
    Scan(ScanArgs),
    /// Scan every mounted volume, one session per volume
    ScanSystem,
    /// List duplicate groups of a scan session
    Groups(SessionArgs),
    /// Show scan history, newest first
    History(HistoryArgs),
    /// Forget a duplicate group without touching its files
    Dismiss(DismissArgs),
    /// Move duplicates into the holding directory
    Archive(ArchiveArgs),
    /// Move archived files back to where they came from
    Restore(ArchivedPaths),
    /// Permanently delete archived files
    Purge(PurgeArgs),
    /// List the holding directory
    Archived(ArchivedArgs),
    /// Manage exclusion rules
    #[command(subcommand)]
    Exclude(ExcludeCommand),
    /// Check the result database for corruption
    CheckDb(CheckDbArgs),
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Directories to scan
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Args)]
pub struct SessionArgs {
    /// Session id (defaults to the most recent scan)
    #[arg(long, value_name = "ID")]
    pub session: Option<i64>,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Maximum number of sessions to show
    #[arg(long, value_name = "N", default_value = "20")]
    pub limit: usize,

    /// Wipe every session and duplicate record (exclusion rules are kept)
    #[arg(long)]
    pub clear: bool,
}

#[derive(Debug, Args)]
pub struct DismissArgs {
    /// Digest of the group, as printed by `groups` (a unique prefix is enough)
    #[arg(value_name = "DIGEST")]
    pub digest: String,

    /// Session the group belongs to (defaults to the most recent scan)
    #[arg(long, value_name = "ID")]
    pub session: Option<i64>,
}

#[derive(Debug, Args)]
pub struct ArchiveArgs {
    /// Files to archive
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Session whose duplicate records are updated (defaults to the most recent scan)
    #[arg(long, value_name = "ID")]
    pub session: Option<i64>,
}

#[derive(Debug, Args)]
pub struct ArchivedPaths {
    /// Archived payload paths inside the holding directory
    #[arg(value_name = "ARCHIVED", required = true)]
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ArchivedArgs {
    /// Delete metadata files whose payload is no longer in the holding directory
    #[arg(long)]
    pub prune: bool,
}

#[derive(Debug, Args)]
pub struct PurgeArgs {
    /// Archived payload paths inside the holding directory
    #[arg(value_name = "ARCHIVED", required = true)]
    pub paths: Vec<PathBuf>,

    /// Confirm permanent deletion
    ///
    /// Files cannot be recovered afterwards.
    #[arg(short = 'y', long)]
    pub yes: bool,
}

#[derive(Debug, Subcommand)]
pub enum ExcludeCommand {
    /// Add a rule (a folder by default, a name suffix with --suffix)
    Add {
        #[arg(value_name = "PATTERN")]
        pattern: String,
        /// Treat the pattern as a suffix such as `.iso` or `Thumbs.db`
        #[arg(long)]
        suffix: bool,
    },
    /// Remove every rule with this pattern
    Remove {
        #[arg(value_name = "PATTERN")]
        pattern: String,
    },
    /// List user rules
    List,
}

#[derive(Debug, Args)]
pub struct CheckDbArgs {
    /// Rename a corrupt database aside and create a fresh one
    #[arg(long)]
    pub repair: bool,
}
