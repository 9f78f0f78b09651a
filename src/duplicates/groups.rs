//! Size bucketing (phase 1 of duplicate detection).
//!
//! Files of different sizes cannot be identical, so only buckets holding two
//! or more files go on to hashing.
//!
//! # Example
//!
//! ```
//! use quickpurge::duplicates::SizeBuckets;
//! use quickpurge::scanner::FileEntry;
//! use std::path::PathBuf;
//!
//! let mut buckets = SizeBuckets::new();
//! buckets.insert(FileEntry::new(PathBuf::from("/a.txt"), 3, None));
//! buckets.insert(FileEntry::new(PathBuf::from("/b.txt"), 3, None));
//! buckets.insert(FileEntry::new(PathBuf::from("/c.txt"), 6, None));
//!
//! assert_eq!(buckets.file_count(), 3);
//! assert_eq!(buckets.candidate_count(), 2);
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::exclusion::paths::absolute_lexical;
use crate::scanner::FileEntry;

/// Files grouped by exact byte size, in ascending size order.
#[derive(Debug, Default)]
pub struct SizeBuckets {
    buckets: BTreeMap<u64, Vec<FileEntry>>,
    files: u64,
}

impl SizeBuckets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file: FileEntry) {
        self.buckets.entry(file.size).or_default().push(file);
        self.files += 1;
    }

    /// Every file inserted, candidates or not.
    #[must_use]
    pub fn file_count(&self) -> u64 {
        self.files
    }

    /// Buckets that could contain duplicates (two or more members).
    pub fn candidate_buckets(&self) -> impl Iterator<Item = (u64, &[FileEntry])> {
        self.buckets
            .iter()
            .filter(|(_, files)| files.len() > 1)
            .map(|(size, files)| (*size, files.as_slice()))
    }

    /// Files that will be hashed.
    #[must_use]
    pub fn candidate_count(&self) -> u64 {
        self.candidate_buckets()
            .map(|(_, files)| files.len() as u64)
            .sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files == 0
    }
}

/// Drop roots nested inside (or equal to) another root so no file is
/// visited twice. Caller order is preserved; roots are made absolute.
#[must_use]
pub fn non_overlapping_roots(roots: &[PathBuf]) -> Vec<PathBuf> {
    let absolute: Vec<PathBuf> = roots.iter().map(|r| absolute_lexical(r)).collect();
    let mut result: Vec<PathBuf> = Vec::new();

    for (i, root) in absolute.iter().enumerate() {
        let covered = absolute.iter().enumerate().any(|(j, other)| {
            i != j && covers(other, root) && (other != root || j < i)
        });
        if covered {
            log::debug!("Skipping overlapping root: {}", root.display());
        } else {
            result.push(root.clone());
        }
    }
    result
}

fn covers(ancestor: &Path, path: &Path) -> bool {
    path.starts_with(ancestor)
}
