//! Streaming content digests.
//!
//! Files are read in fixed-size chunks into a BLAKE3 hasher, so memory use is
//! one chunk buffer regardless of file size. Digests are 64 lowercase hex
//! characters (256 bits).

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use super::HashError;
use crate::config::DEFAULT_CHUNK_SIZE;

/// Computes content digests used as duplicate-detection keys.
#[derive(Debug, Clone)]
pub struct ContentHasher {
    chunk_size: usize,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl ContentHasher {
    /// Hasher reading `chunk_size` bytes per step (a zero size is clamped to 1).
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Digest of the file at `path`, or `None` if it cannot be read.
    ///
    /// Failures are logged and mean "skip this file"; they never abort a scan.
    #[must_use]
    pub fn hash(&self, path: &Path) -> Option<String> {
        match self.try_hash(path) {
            Ok(digest) => Some(digest),
            Err(HashError::NotFound(p)) => {
                log::debug!("Skipping (not found): {}", p.display());
                None
            }
            Err(HashError::PermissionDenied(p)) => {
                log::warn!("Skipping (permission denied): {}", p.display());
                None
            }
            Err(HashError::Io { path, source }) => {
                log::warn!("Skipping (unreadable or locked): {}: {}", path.display(), source);
                None
            }
        }
    }

    /// Digest of the file at `path`.
    ///
    /// # Errors
    ///
    /// [`HashError`] classified by the underlying I/O error kind.
    pub fn try_hash(&self, path: &Path) -> Result<String, HashError> {
        let mut file = File::open(path).map_err(|e| classify(path, e))?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; self.chunk_size];

        loop {
            match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    hasher.update(&buffer[..n]);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(classify(path, e)),
            }
        }

        Ok(hasher.finalize().to_hex().to_string())
    }
}

fn classify(path: &Path, error: std::io::Error) -> HashError {
    match error.kind() {
        ErrorKind::NotFound => HashError::NotFound(path.to_path_buf()),
        ErrorKind::PermissionDenied => HashError::PermissionDenied(path.to_path_buf()),
        _ => HashError::Io {
            path: path.to_path_buf(),
            source: error,
        },
    }
}
