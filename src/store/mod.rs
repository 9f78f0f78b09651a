//! Result store for scan sessions, duplicate records and exclusion rules.
//!
//! The scan engine and the archiver only see the [`ResultSink`] trait; the
//! SQLite implementation lives in [`database`].

pub mod database;
pub mod models;

use std::path::Path;

pub use database::{IntegrityStatus, SqliteStore, StoreError};
pub use models::{
    DuplicateGroupRow, ExclusionRule, ScanTotals, SessionId, SessionSummary, GROUP_DELIMITER,
};

/// Narrow record/query interface consumed by the scan engine and the archiver.
///
/// Implementations must be usable from the scan worker thread while the
/// interface thread queries them.
pub trait ResultSink: Send + Sync {
    /// Create a session with a start timestamp and unset totals.
    fn begin_session(&self) -> Result<SessionId, StoreError>;

    /// Write the session totals. Called once, on normal completion only.
    fn finish_session(&self, id: SessionId, totals: ScanTotals) -> Result<(), StoreError>;

    /// Record one duplicate member.
    fn insert_duplicate(
        &self,
        session: SessionId,
        path: &Path,
        digest: &str,
        size: u64,
    ) -> Result<(), StoreError>;

    /// Drop every duplicate record; session history is kept.
    fn clear_transient_duplicates(&self) -> Result<(), StoreError>;

    /// Drop the records of `session` whose path equals `path`.
    /// Returns the number of rows removed.
    fn remove_duplicate_by_path(&self, session: SessionId, path: &Path)
        -> Result<usize, StoreError>;

    /// Drop every record of one group.
    fn remove_duplicate_group(&self, session: SessionId, digest: &str)
        -> Result<usize, StoreError>;

    /// Groups of two or more records sharing (digest, size) in `session`.
    fn list_duplicate_groups(&self, session: SessionId)
        -> Result<Vec<DuplicateGroupRow>, StoreError>;

    /// Most recent sessions first.
    fn list_sessions(&self, limit: Option<usize>) -> Result<Vec<SessionSummary>, StoreError>;

    /// Look up one session.
    fn session(&self, id: SessionId) -> Result<Option<SessionSummary>, StoreError>;

    /// Wipe sessions and duplicate records. Exclusion rules survive.
    fn clear_all(&self) -> Result<(), StoreError>;

    fn add_rule(&self, rule: &ExclusionRule) -> Result<(), StoreError>;

    /// Remove every rule with this pattern. Returns the number removed.
    fn remove_rule(&self, pattern: &str) -> Result<usize, StoreError>;

    fn list_rules(&self) -> Result<Vec<ExclusionRule>, StoreError>;
}
