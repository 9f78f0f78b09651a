//! Records exchanged with the result store.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Separator used when a group's paths are joined into one string.
///
/// The ASCII unit separator cannot appear in a path on any supported platform.
pub const GROUP_DELIMITER: char = '\u{1f}';

/// Opaque scan session identifier assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub i64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Totals written once when a scan completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTotals {
    /// Files bucketed during grouping.
    pub files: u64,
    /// Extra copies found (one per repeated digest).
    pub duplicates: u64,
    /// Bytes reclaimable by removing every extra copy.
    pub bytes_saved: u64,
}

/// One row of scan history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub started_at: DateTime<Utc>,
    /// `None` until the session finishes; stays `None` for cancelled scans.
    pub totals: Option<ScanTotals>,
}

impl SessionSummary {
    /// Whether the session was finalized.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.totals.is_some()
    }
}

/// One duplicate group as returned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroupRow {
    /// Hex content digest shared by every member.
    pub digest: String,
    /// Member paths joined with [`GROUP_DELIMITER`].
    pub joined_paths: String,
    /// Size shared by every member.
    pub size: u64,
}

impl DuplicateGroupRow {
    /// Split the joined paths back into individual paths.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.joined_paths
            .split(GROUP_DELIMITER)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .collect()
    }

    /// Bytes freed by keeping one member and removing the rest.
    #[must_use]
    pub fn reclaimable(&self) -> u64 {
        let extra = self.paths().len().saturating_sub(1) as u64;
        extra * self.size
    }
}

/// A user exclusion rule.
///
/// Folder rules exclude everything under `pattern`; suffix rules exclude any
/// path ending in `pattern` (compared case-insensitively).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExclusionRule {
    pub pattern: String,
    pub is_folder: bool,
}

impl ExclusionRule {
    /// Ancestor rule for a directory.
    pub fn folder(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            is_folder: true,
        }
    }

    /// Suffix rule, e.g. `.iso` or `Thumbs.db`.
    pub fn suffix(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            is_folder: false,
        }
    }
}
