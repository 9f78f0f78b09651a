//! SQLite-backed [`ResultSink`].
//!
//! One connection guarded by a mutex; the scan worker writes while the
//! interface thread reads. Schema changes are tracked with `PRAGMA user_version`.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension};

use super::models::{
    DuplicateGroupRow, ExclusionRule, ScanTotals, SessionId, SessionSummary,
};
use super::ResultSink;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS scans (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        started_at INTEGER NOT NULL,
        total_files INTEGER,
        total_duplicates INTEGER,
        total_size_saved INTEGER
    );
    CREATE TABLE IF NOT EXISTS duplicates (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scan_id INTEGER NOT NULL,
        file_path TEXT NOT NULL,
        file_hash TEXT NOT NULL,
        file_size INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_duplicates_scan ON duplicates(scan_id);
    CREATE INDEX IF NOT EXISTS idx_duplicates_hash ON duplicates(file_hash);
    CREATE TABLE IF NOT EXISTS exclusions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        pattern TEXT NOT NULL,
        is_folder INTEGER NOT NULL CHECK(is_folder IN (0, 1)),
        UNIQUE(pattern, is_folder)
    );
";

/// Errors raised by the result store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The file exists but is not a usable database.
    #[error("database is corrupt: {0}")]
    Corrupt(String),

    /// Paths are stored as text, so names that are not valid UTF-8 cannot
    /// be recorded without corrupting them.
    #[error("path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),

    /// A previous holder of the connection panicked.
    #[error("database connection lock poisoned")]
    Poisoned,

    /// Filesystem error around the database file.
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of [`SqliteStore::check_integrity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityStatus {
    /// The database passed `PRAGMA quick_check`.
    Ok,
    /// No file exists yet; opening will create it.
    Missing,
    /// The file is unreadable as a database or failed the check.
    Corrupt(String),
}

/// Result store persisted in a single SQLite file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create the store at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// [`StoreError::Corrupt`] when the file is not a database, otherwise
    /// [`StoreError::Sqlite`] or [`StoreError::Io`].
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn).map_err(classify)
    }

    /// Open a private in-memory store (tests, dry runs).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version > SCHEMA_VERSION {
            log::warn!(
                "Database schema version {} is newer than supported version {}",
                version,
                SCHEMA_VERSION
            );
        }
        conn.execute_batch(SCHEMA)?;
        if version < SCHEMA_VERSION {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            log::debug!("Result store schema initialized (version {})", SCHEMA_VERSION);
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Probe a database file before use without modifying it.
    ///
    /// # Errors
    ///
    /// Only for failures unrelated to corruption (e.g. the file cannot be
    /// opened at all because of permissions).
    pub fn check_integrity(path: &Path) -> Result<IntegrityStatus, StoreError> {
        if !path.exists() {
            return Ok(IntegrityStatus::Missing);
        }

        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let rows: Result<Vec<String>, rusqlite::Error> = conn
            .prepare("PRAGMA quick_check")
            .and_then(|mut stmt| {
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>();
                rows
            });

        match rows {
            Ok(rows) if rows.len() == 1 && rows[0] == "ok" => Ok(IntegrityStatus::Ok),
            Ok(rows) => Ok(IntegrityStatus::Corrupt(rows.join("; "))),
            Err(e) if is_corruption(&e) => Ok(IntegrityStatus::Corrupt(e.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn is_corruption(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt)
    )
}

fn classify(err: StoreError) -> StoreError {
    match err {
        StoreError::Sqlite(e) if is_corruption(&e) => StoreError::Corrupt(e.to_string()),
        other => other,
    }
}

fn to_db_size(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_db_size(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn path_text(path: &Path) -> Result<&str, StoreError> {
    path.to_str()
        .ok_or_else(|| StoreError::NonUtf8Path(path.to_path_buf()))
}

fn summary_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionSummary> {
    let id: i64 = row.get(0)?;
    let started: i64 = row.get(1)?;
    let files: Option<i64> = row.get(2)?;
    let duplicates: Option<i64> = row.get(3)?;
    let bytes: Option<i64> = row.get(4)?;

    let totals = match (files, duplicates, bytes) {
        (Some(files), Some(duplicates), Some(bytes)) => Some(ScanTotals {
            files: from_db_size(files),
            duplicates: from_db_size(duplicates),
            bytes_saved: from_db_size(bytes),
        }),
        _ => None,
    };

    Ok(SessionSummary {
        id: SessionId(id),
        started_at: DateTime::<Utc>::from_timestamp(started, 0).unwrap_or_default(),
        totals,
    })
}

impl ResultSink for SqliteStore {
    fn begin_session(&self) -> Result<SessionId, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO scans (started_at) VALUES (?1)",
            params![Utc::now().timestamp()],
        )?;
        let id = SessionId(conn.last_insert_rowid());
        log::debug!("Began scan session {}", id);
        Ok(id)
    }

    fn finish_session(&self, id: SessionId, totals: ScanTotals) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE scans
             SET total_files = ?1, total_duplicates = ?2, total_size_saved = ?3
             WHERE id = ?4 AND total_files IS NULL",
            params![
                to_db_size(totals.files),
                to_db_size(totals.duplicates),
                to_db_size(totals.bytes_saved),
                id.0
            ],
        )?;
        Ok(())
    }

    fn insert_duplicate(
        &self,
        session: SessionId,
        path: &Path,
        digest: &str,
        size: u64,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO duplicates (scan_id, file_path, file_hash, file_size)
             VALUES (?1, ?2, ?3, ?4)",
            params![session.0, path_text(path)?, digest, to_db_size(size)],
        )?;
        Ok(())
    }

    fn clear_transient_duplicates(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM duplicates", [])?;
        log::debug!("Cleared {} transient duplicate record(s)", removed);
        Ok(())
    }

    fn remove_duplicate_by_path(
        &self,
        session: SessionId,
        path: &Path,
    ) -> Result<usize, StoreError> {
        // Such a path can never have been recorded.
        let Ok(text) = path_text(path) else {
            return Ok(0);
        };
        let conn = self.conn()?;
        Ok(conn.execute(
            "DELETE FROM duplicates WHERE scan_id = ?1 AND file_path = ?2",
            params![session.0, text],
        )?)
    }

    fn remove_duplicate_group(
        &self,
        session: SessionId,
        digest: &str,
    ) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        Ok(conn.execute(
            "DELETE FROM duplicates WHERE scan_id = ?1 AND file_hash = ?2",
            params![session.0, digest],
        )?)
    }

    fn list_duplicate_groups(
        &self,
        session: SessionId,
    ) -> Result<Vec<DuplicateGroupRow>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT file_hash, GROUP_CONCAT(file_path, CHAR(31)), file_size
             FROM (SELECT * FROM duplicates WHERE scan_id = ?1 ORDER BY id)
             GROUP BY file_hash, file_size
             HAVING COUNT(*) > 1
             ORDER BY file_size DESC, MIN(id)",
        )?;
        let rows = stmt
            .query_map(params![session.0], |row| {
                Ok(DuplicateGroupRow {
                    digest: row.get(0)?,
                    joined_paths: row.get(1)?,
                    size: from_db_size(row.get(2)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn list_sessions(&self, limit: Option<usize>) -> Result<Vec<SessionSummary>, StoreError> {
        let conn = self.conn()?;
        let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        let mut stmt = conn.prepare(
            "SELECT id, started_at, total_files, total_duplicates, total_size_saved
             FROM scans ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], summary_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn session(&self, id: SessionId) -> Result<Option<SessionSummary>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id, started_at, total_files, total_duplicates, total_size_saved
                 FROM scans WHERE id = ?1",
                params![id.0],
                summary_from_row,
            )
            .optional()?)
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute_batch("DELETE FROM duplicates; DELETE FROM scans;")?;
        log::info!("Cleared scan history and duplicate records");
        Ok(())
    }

    fn add_rule(&self, rule: &ExclusionRule) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO exclusions (pattern, is_folder) VALUES (?1, ?2)",
            params![rule.pattern, rule.is_folder],
        )?;
        Ok(())
    }

    fn remove_rule(&self, pattern: &str) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM exclusions WHERE pattern = ?1", params![pattern])?)
    }

    fn list_rules(&self) -> Result<Vec<ExclusionRule>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT pattern, is_folder FROM exclusions ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ExclusionRule {
                    pattern: row.get(0)?,
                    is_folder: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
