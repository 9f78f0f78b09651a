//! Recoverable archiving of duplicate files.
//!
//! # Overview
//!
//! Instead of deleting a duplicate, the archiver moves it into a holding
//! directory and writes a JSON sidecar next to it recording where it came
//! from:
//!
//! ```text
//! <holding_dir>/20240131-142501-337_report.pdf
//! <holding_dir>/20240131-142501-337_report.pdf.meta.json
//! ```
//!
//! An archived payload can later be restored to its original location or
//! permanently deleted. A payload whose sidecar is gone can only be deleted.
//!
//! # Safety
//!
//! Every archive request is re-checked against the [`ExclusionPolicy`] even if
//! the path came from a scan. Restore and permanent delete only accept
//! payloads sitting directly in the holding directory, and restores never
//! overwrite an existing file.
//!
//! # Example
//!
//! ```no_run
//! use quickpurge::actions::Archiver;
//! use quickpurge::exclusion::ExclusionPolicy;
//! use std::path::{Path, PathBuf};
//! use std::sync::Arc;
//!
//! let archiver = Archiver::new(
//!     PathBuf::from("/home/me/QuickPurge_Archive"),
//!     Arc::new(ExclusionPolicy::builtin_only()),
//! );
//! match archiver.archive(Path::new("/home/me/Downloads/copy.pdf")) {
//!     Ok(archived) => println!("Archived to {}", archived.display()),
//!     Err(e) => eprintln!("Failed: {}", e),
//! }
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytesize::ByteSize;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::exclusion::paths::absolute_lexical;
use crate::exclusion::ExclusionPolicy;
use crate::store::{ResultSink, SessionId, StoreError};

/// Suffix appended to a payload's file name to form its sidecar name.
pub const SIDECAR_SUFFIX: &str = ".meta.json";

/// Error type for archive operations.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The path is protected by the exclusion policy.
    #[error("refusing to touch excluded path: {0}")]
    Excluded(PathBuf),

    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// Directories and special files are never archived.
    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),

    /// Restore and delete only operate on payloads in the holding directory.
    #[error("not an archived payload in the holding directory: {0}")]
    NotArchived(PathBuf),

    /// The payload has no sidecar and cannot be restored.
    #[error("no archive metadata for {0} - it can only be permanently deleted")]
    MissingMetadata(PathBuf),

    #[error("unreadable archive metadata for {path}: {message}")]
    InvalidMetadata { path: PathBuf, message: String },

    /// Restoring would overwrite an existing file.
    #[error("destination already exists: {0}")]
    DestinationExists(PathBuf),

    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file was moved but its scan record could not be dropped.
    #[error("result store error: {0}")]
    Store(#[from] StoreError),
}

impl ArchiveError {
    /// Get the path associated with this error (if any).
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Excluded(p)
            | Self::NotFound(p)
            | Self::NotAFile(p)
            | Self::NotArchived(p)
            | Self::MissingMetadata(p)
            | Self::InvalidMetadata { path: p, .. }
            | Self::DestinationExists(p)
            | Self::Io { path: p, .. } => Some(p),
            Self::Store(_) => None,
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

/// Contents of a sidecar file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    pub original_path: PathBuf,
    pub archived_at: DateTime<Utc>,
    pub size: u64,
}

/// One payload in the holding directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub payload: PathBuf,
    /// `None` when the sidecar is missing or unreadable.
    pub original_path: Option<PathBuf>,
    pub archived_at: Option<DateTime<Utc>>,
    pub size: u64,
}

impl ArchiveEntry {
    /// Whether [`Archiver::restore`] can bring this payload back.
    #[must_use]
    pub fn is_restorable(&self) -> bool {
        self.original_path.is_some()
    }
}

/// A successful archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedFile {
    pub original: PathBuf,
    pub archived: PathBuf,
    pub size: u64,
}

/// Results of a batch archive.
#[derive(Debug, Clone, Default)]
pub struct BatchArchiveResult {
    pub successes: Vec<ArchivedFile>,
    /// Failed paths with their error messages.
    pub failures: Vec<(PathBuf, String)>,
    pub bytes_archived: u64,
}

impl BatchArchiveResult {
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.successes.len()
    }

    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// Human-readable summary of the operation.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.all_succeeded() {
            format!(
                "Archived {} file(s), {}",
                self.success_count(),
                ByteSize(self.bytes_archived)
            )
        } else {
            format!(
                "Archived {} file(s), {} failed, {}",
                self.success_count(),
                self.failure_count(),
                ByteSize(self.bytes_archived)
            )
        }
    }
}

/// Callback trait for batch archive progress.
pub trait ArchiveProgressCallback: Send + Sync {
    /// Called before each file.
    fn on_before_archive(&self, path: &Path, index: usize, total: usize);

    fn on_archive_success(&self, archived: &ArchivedFile);

    fn on_archive_failure(&self, path: &Path, error: &str);

    /// Called once when the batch completes.
    fn on_complete(&self, result: &BatchArchiveResult);
}

/// Moves files into a holding directory and back.
///
/// A single archiver is assumed per holding directory.
#[derive(Debug, Clone)]
pub struct Archiver {
    holding_dir: PathBuf,
    policy: Arc<ExclusionPolicy>,
}

impl Archiver {
    #[must_use]
    pub fn new(holding_dir: PathBuf, policy: Arc<ExclusionPolicy>) -> Self {
        Self {
            holding_dir,
            policy,
        }
    }

    #[must_use]
    pub fn holding_dir(&self) -> &Path {
        &self.holding_dir
    }

    /// Move `path` into the holding directory and write its sidecar.
    ///
    /// Returns the archived payload path.
    ///
    /// # Errors
    ///
    /// - `Excluded` if the exclusion policy protects the path
    /// - `NotFound` if the path does not exist
    /// - `NotAFile` for directories and special files
    /// - `Io` if the holding directory, the move or the sidecar write fails
    pub fn archive(&self, path: &Path) -> Result<PathBuf, ArchiveError> {
        self.archive_file(path).map(|a| a.archived)
    }

    fn archive_file(&self, path: &Path) -> Result<ArchivedFile, ArchiveError> {
        if self.policy.is_excluded(path) {
            log::warn!("Refusing to archive excluded path: {}", path.display());
            return Err(ArchiveError::Excluded(path.to_path_buf()));
        }

        let metadata = fs::symlink_metadata(path).map_err(|e| ArchiveError::io(path, e))?;
        if !metadata.is_file() {
            return Err(ArchiveError::NotAFile(path.to_path_buf()));
        }
        let original = absolute_lexical(path);
        let basename = original
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ArchiveError::NotAFile(path.to_path_buf()))?;

        fs::create_dir_all(&self.holding_dir)
            .map_err(|e| ArchiveError::io(&self.holding_dir, e))?;

        let now = Local::now();
        let stamp = now.format("%Y%m%d-%H%M%S-%3f").to_string();
        let payload = unique_payload_path(&self.holding_dir, &stamp, &basename);

        move_file(&original, &payload)?;

        let record = ArchiveMetadata {
            original_path: original.clone(),
            archived_at: now.with_timezone(&Utc),
            size: metadata.len(),
        };
        if let Err(e) = write_sidecar(&payload, &record) {
            // Without a sidecar the payload could never be restored.
            log::error!(
                "Sidecar write failed for {}, moving it back: {}",
                payload.display(),
                e
            );
            if let Err(undo) = move_file(&payload, &original) {
                log::error!(
                    "Could not move {} back to {}: {}",
                    payload.display(),
                    original.display(),
                    undo
                );
            }
            return Err(e);
        }

        log::info!(
            "Archived: {} -> {} ({})",
            original.display(),
            payload.display(),
            ByteSize(record.size)
        );
        Ok(ArchivedFile {
            original,
            archived: payload,
            size: record.size,
        })
    }

    /// Archive `path` and drop its duplicate record from `session`.
    ///
    /// # Errors
    ///
    /// Any [`Archiver::archive`] error, or `Store` if the file was moved but
    /// the record could not be removed.
    pub fn archive_duplicate(
        &self,
        sink: &dyn ResultSink,
        session: SessionId,
        path: &Path,
    ) -> Result<PathBuf, ArchiveError> {
        self.archive_recorded(sink, session, path).map(|a| a.archived)
    }

    fn archive_recorded(
        &self,
        sink: &dyn ResultSink,
        session: SessionId,
        path: &Path,
    ) -> Result<ArchivedFile, ArchiveError> {
        let archived = self.archive_file(path)?;
        let removed = sink.remove_duplicate_by_path(session, &archived.original)?;
        log::debug!(
            "Dropped {} record(s) for {} from session {}",
            removed,
            archived.original.display(),
            session
        );
        Ok(archived)
    }

    /// Move an archived payload back to its original location.
    ///
    /// Returns the restored path.
    ///
    /// # Errors
    ///
    /// - `NotArchived` if the path is not a payload in the holding directory
    /// - `NotFound` if the payload does not exist
    /// - `MissingMetadata` / `InvalidMetadata` if the sidecar is absent or unreadable
    /// - `DestinationExists` if something already occupies the original path
    /// - `Io` if the move fails
    pub fn restore(&self, archived: &Path) -> Result<PathBuf, ArchiveError> {
        let archived = &self.payload_in_holding(archived)?;
        if fs::symlink_metadata(archived).is_err() {
            return Err(ArchiveError::NotFound(archived.to_path_buf()));
        }

        let sidecar = sidecar_path(archived);
        let record = read_sidecar(&sidecar).map_err(|e| match e {
            ArchiveError::NotFound(_) => ArchiveError::MissingMetadata(archived.to_path_buf()),
            other => other,
        })?;
        let original = record.original_path;

        if fs::symlink_metadata(&original).is_ok() {
            log::warn!(
                "Not restoring {}: {} already exists",
                archived.display(),
                original.display()
            );
            return Err(ArchiveError::DestinationExists(original));
        }

        if let Some(parent) = original.parent() {
            fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
        }
        move_file(archived, &original)?;

        if let Err(e) = fs::remove_file(&sidecar) {
            log::warn!(
                "Could not remove sidecar {}, it will be listed as stale: {}",
                sidecar.display(),
                e
            );
        }

        log::info!("Restored: {} -> {}", archived.display(), original.display());
        Ok(original)
    }

    /// Remove an archived payload and its sidecar, if any.
    ///
    /// # Errors
    ///
    /// `NotArchived` if the path is not a payload in the holding directory,
    /// `NotFound` if the payload does not exist, `Io` if removal fails.
    pub fn permanent_delete(&self, archived: &Path) -> Result<(), ArchiveError> {
        let archived = &self.payload_in_holding(archived)?;
        let metadata =
            fs::symlink_metadata(archived).map_err(|e| ArchiveError::io(archived, e))?;
        if metadata.is_dir() {
            return Err(ArchiveError::NotAFile(archived.to_path_buf()));
        }

        fs::remove_file(archived).map_err(|e| ArchiveError::io(archived, e))?;

        let sidecar = sidecar_path(archived);
        match fs::remove_file(&sidecar) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("No sidecar for {}", archived.display());
            }
            Err(e) => return Err(ArchiveError::io(&sidecar, e)),
        }

        log::info!(
            "Permanently deleted: {} ({})",
            archived.display(),
            ByteSize(metadata.len())
        );
        Ok(())
    }

    /// Every payload in the holding directory, sorted by name.
    ///
    /// A missing holding directory is an empty archive.
    ///
    /// # Errors
    ///
    /// `Io` if the holding directory cannot be read.
    pub fn list_archived(&self) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        let read_dir = match fs::read_dir(&self.holding_dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ArchiveError::io(&self.holding_dir, e)),
        };

        let mut entries = Vec::new();
        for dirent in read_dir {
            let dirent = dirent.map_err(|e| ArchiveError::io(&self.holding_dir, e))?;
            let payload = dirent.path();
            if is_sidecar(&payload) {
                continue;
            }
            let Ok(metadata) = dirent.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }

            let record = match read_sidecar(&sidecar_path(&payload)) {
                Ok(record) => Some(record),
                Err(ArchiveError::NotFound(_)) => None,
                Err(e) => {
                    log::warn!("{}", e);
                    None
                }
            };
            entries.push(ArchiveEntry {
                payload,
                original_path: record.as_ref().map(|r| r.original_path.clone()),
                archived_at: record.as_ref().map(|r| r.archived_at),
                size: metadata.len(),
            });
        }

        entries.sort_by(|a, b| a.payload.cmp(&b.payload));
        Ok(entries)
    }

    /// Sidecars in the holding directory whose payload is gone.
    ///
    /// These are left behind when a restore moved the payload out but could
    /// not remove the metadata. They are safe to delete with
    /// [`Archiver::remove_stale_sidecars`].
    ///
    /// # Errors
    ///
    /// `Io` if the holding directory cannot be read.
    pub fn stale_sidecars(&self) -> Result<Vec<PathBuf>, ArchiveError> {
        let read_dir = match fs::read_dir(&self.holding_dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ArchiveError::io(&self.holding_dir, e)),
        };

        let mut stale = Vec::new();
        for dirent in read_dir {
            let path = dirent
                .map_err(|e| ArchiveError::io(&self.holding_dir, e))?
                .path();
            if let Some(payload) = payload_for_sidecar(&path) {
                if fs::symlink_metadata(&payload).is_err() {
                    stale.push(path);
                }
            }
        }
        stale.sort();
        Ok(stale)
    }

    /// Delete every stale sidecar. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// `Io` if the holding directory cannot be read or a sidecar cannot be
    /// removed.
    pub fn remove_stale_sidecars(&self) -> Result<usize, ArchiveError> {
        let stale = self.stale_sidecars()?;
        for sidecar in &stale {
            fs::remove_file(sidecar).map_err(|e| ArchiveError::io(sidecar, e))?;
            log::debug!("Removed stale sidecar {}", sidecar.display());
        }
        Ok(stale.len())
    }

    /// `archived` made absolute, if it names a payload directly inside the
    /// holding directory.
    fn payload_in_holding(&self, archived: &Path) -> Result<PathBuf, ArchiveError> {
        let payload = absolute_lexical(archived);
        let holding = absolute_lexical(&self.holding_dir);
        if payload.parent() != Some(holding.as_path()) || is_sidecar(&payload) {
            log::warn!(
                "Refusing {}: not a payload in {}",
                archived.display(),
                holding.display()
            );
            return Err(ArchiveError::NotArchived(archived.to_path_buf()));
        }
        Ok(payload)
    }

    /// Archive many files, continuing past failures.
    pub fn archive_batch(
        &self,
        paths: &[PathBuf],
        callback: Option<&dyn ArchiveProgressCallback>,
    ) -> BatchArchiveResult {
        run_batch(paths, callback, |path| self.archive_file(path))
    }

    /// Like [`Archiver::archive_batch`], dropping each archived file's
    /// record from `session`.
    pub fn archive_duplicates(
        &self,
        sink: &dyn ResultSink,
        session: SessionId,
        paths: &[PathBuf],
        callback: Option<&dyn ArchiveProgressCallback>,
    ) -> BatchArchiveResult {
        run_batch(paths, callback, |path| {
            self.archive_recorded(sink, session, path)
        })
    }
}

fn run_batch<F>(
    paths: &[PathBuf],
    callback: Option<&dyn ArchiveProgressCallback>,
    mut archive: F,
) -> BatchArchiveResult
where
    F: FnMut(&Path) -> Result<ArchivedFile, ArchiveError>,
{
    let mut result = BatchArchiveResult::default();
    let total = paths.len();

    for (index, path) in paths.iter().enumerate() {
        if let Some(cb) = callback {
            cb.on_before_archive(path, index, total);
        }

        match archive(path) {
            Ok(archived) => {
                result.bytes_archived += archived.size;
                if let Some(cb) = callback {
                    cb.on_archive_success(&archived);
                }
                result.successes.push(archived);
            }
            Err(e) => {
                let message = e.to_string();
                log::warn!("Failed to archive {}: {}", path.display(), message);
                if let Some(cb) = callback {
                    cb.on_archive_failure(path, &message);
                }
                result.failures.push((path.clone(), message));
            }
        }
    }

    if let Some(cb) = callback {
        cb.on_complete(&result);
    }
    log::info!("{}", result.summary());
    result
}

/// Sidecar path for a payload.
#[must_use]
pub fn sidecar_path(payload: &Path) -> PathBuf {
    let mut name = payload.as_os_str().to_os_string();
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

fn is_sidecar(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().ends_with(SIDECAR_SUFFIX))
}

/// The payload a sidecar belongs to, or `None` for non-sidecar paths.
fn payload_for_sidecar(sidecar: &Path) -> Option<PathBuf> {
    let name = sidecar.file_name()?.to_str()?;
    let payload = name.strip_suffix(SIDECAR_SUFFIX)?;
    (!payload.is_empty()).then(|| sidecar.with_file_name(payload))
}

/// `<stamp>_<basename>`, or `<stamp>-<n>_<basename>` if that is taken.
fn unique_payload_path(dir: &Path, stamp: &str, basename: &str) -> PathBuf {
    let taken = |p: &Path| fs::symlink_metadata(p).is_ok() || fs::symlink_metadata(sidecar_path(p)).is_ok();

    let candidate = dir.join(format!("{}_{}", stamp, basename));
    if !taken(&candidate) {
        return candidate;
    }
    let mut n: u32 = 1;
    loop {
        let candidate = dir.join(format!("{}-{}_{}", stamp, n, basename));
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Rename, falling back to copy and remove across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<(), ArchiveError> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            log::debug!(
                "Cross-device move, copying {} to {}",
                from.display(),
                to.display()
            );
            if let Err(e) = fs::copy(from, to) {
                discard_partial_copy(to);
                return Err(ArchiveError::io(from, e));
            }
            if let Err(e) = fs::remove_file(from) {
                discard_partial_copy(to);
                return Err(ArchiveError::io(from, e));
            }
            Ok(())
        }
        Err(e) => Err(ArchiveError::io(from, e)),
    }
}

fn discard_partial_copy(to: &Path) {
    match fs::remove_file(to) {
        Ok(()) => log::debug!("Removed partial copy {}", to.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::error!("Could not remove partial copy {}: {}", to.display(), e),
    }
}

fn write_sidecar(payload: &Path, record: &ArchiveMetadata) -> Result<(), ArchiveError> {
    let sidecar = sidecar_path(payload);
    let json = serde_json::to_vec_pretty(record).map_err(|e| ArchiveError::InvalidMetadata {
        path: sidecar.clone(),
        message: e.to_string(),
    })?;
    fs::write(&sidecar, json).map_err(|e| ArchiveError::Io {
        path: sidecar,
        source: e,
    })
}

fn read_sidecar(sidecar: &Path) -> Result<ArchiveMetadata, ArchiveError> {
    let bytes = fs::read(sidecar).map_err(|e| ArchiveError::io(sidecar, e))?;
    serde_json::from_slice(&bytes).map_err(|e| ArchiveError::InvalidMetadata {
        path: sidecar.to_path_buf(),
        message: e.to_string(),
    })
}
