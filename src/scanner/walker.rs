//! Directory walker built on walkdir.
//!
//! Yields every regular file under a root in file-name order. Symlinks are
//! not followed and symlinked files are not yielded. Directories covered by a
//! folder exclusion rule are pruned so the walk never descends into them.
//! Per-entry errors are yielded as [`ScanError`] values rather than stopping
//! iteration.
//!
//! # Example
//!
//! ```no_run
//! use quickpurge::exclusion::ExclusionPolicy;
//! use quickpurge::scanner::Walker;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let walker = Walker::new(Path::new("."), Arc::new(ExclusionPolicy::builtin_only()));
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(file) => println!("{}: {} bytes", file.path.display(), file.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use super::{FileEntry, ScanError};
use crate::exclusion::ExclusionPolicy;

/// Sequential directory walker.
#[derive(Debug)]
pub struct Walker {
    root: PathBuf,
    policy: Arc<ExclusionPolicy>,
    same_file_system: bool,
}

impl Walker {
    #[must_use]
    pub fn new(root: &Path, policy: Arc<ExclusionPolicy>) -> Self {
        Self {
            root: root.to_path_buf(),
            policy,
            same_file_system: false,
        }
    }

    /// Stay on the root's filesystem (used when scanning whole volumes so
    /// nested mounts are scanned as their own volume).
    #[must_use]
    pub fn with_same_file_system(mut self, same: bool) -> Self {
        self.same_file_system = same;
        self
    }

    /// Walk the tree, yielding regular files.
    pub fn walk(&self) -> impl Iterator<Item = Result<FileEntry, ScanError>> + '_ {
        let policy = Arc::clone(&self.policy);
        let root = self.root.clone();

        WalkDir::new(&self.root)
            .follow_links(false)
            .same_file_system(self.same_file_system)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| {
                // Never prune the root itself; the caller already chose it.
                if entry.depth() == 0 || !entry.file_type().is_dir() {
                    return true;
                }
                let pruned = policy.is_protected_dir(entry.path());
                if pruned {
                    log::debug!("Pruning protected directory: {}", entry.path().display());
                }
                !pruned
            })
            .filter_map(move |result| match result {
                Ok(entry) => {
                    if !entry.file_type().is_file() {
                        return None;
                    }
                    match entry.metadata() {
                        Ok(metadata) => Some(Ok(FileEntry::new(
                            entry.into_path(),
                            metadata.len(),
                            metadata.modified().ok(),
                        ))),
                        Err(e) => Some(Err(walk_error(entry.path(), e))),
                    }
                }
                Err(e) => {
                    let path = e.path().map_or_else(|| root.clone(), Path::to_path_buf);
                    Some(Err(walk_error(&path, e)))
                }
            })
    }
}

fn walk_error(path: &Path, error: walkdir::Error) -> ScanError {
    match error.into_io_error() {
        Some(io) => ScanError::from_io(path.to_path_buf(), io),
        None => ScanError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::other("filesystem loop detected"),
        },
    }
}
