//! Scanner module for directory traversal and file hashing.
//!
//! - [`walker`]: sequential directory traversal with protected-directory pruning
//! - [`hasher`]: streaming BLAKE3 content digests
//! - [`volumes`]: mounted volume enumeration for whole-system scans

pub mod hasher;
pub mod volumes;
pub mod walker;

use std::path::PathBuf;
use std::time::SystemTime;

pub use hasher::ContentHasher;
pub use volumes::mounted_volumes;
pub use walker::Walker;

use crate::store::StoreError;

/// A regular file discovered during traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time, when the platform reports one
    pub modified: Option<SystemTime>,
}

impl FileEntry {
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: Option<SystemTime>) -> Self {
        Self {
            path,
            size,
            modified,
        }
    }
}

/// Errors that can occur during scanning.
///
/// Per-file variants are produced by the walker and skipped by the engine;
/// only [`ScanError::Store`] aborts a scan.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The path vanished between listing and inspection.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// Any other I/O error.
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The result store failed; the scan cannot record its results.
    #[error("result store failure: {0}")]
    Store(#[from] StoreError),
}

impl ScanError {
    /// Classify an I/O error on `path` the way the walker and hasher report them.
    pub(crate) fn from_io(path: PathBuf, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            std::io::ErrorKind::NotFound => Self::NotFound(path),
            _ => Self::Io {
                path,
                source: error,
            },
        }
    }
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file (including locked files).
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
