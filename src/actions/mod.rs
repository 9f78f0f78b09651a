//! File actions.
//!
//! Duplicates are never deleted outright. They are moved into a holding
//! directory with a sidecar recording their original location, from where
//! they can be restored or permanently deleted.
//!
//! ```no_run
//! use quickpurge::actions::Archiver;
//! use quickpurge::exclusion::ExclusionPolicy;
//! use std::path::{Path, PathBuf};
//! use std::sync::Arc;
//!
//! let archiver = Archiver::new(
//!     PathBuf::from("/tmp/holding"),
//!     Arc::new(ExclusionPolicy::builtin_only()),
//! );
//! let archived = archiver.archive(Path::new("/tmp/copy.txt")).unwrap();
//! archiver.restore(&archived).unwrap();
//! ```

pub mod archive;

pub use archive::{
    sidecar_path, ArchiveEntry, ArchiveError, ArchiveMetadata, ArchiveProgressCallback,
    ArchivedFile, Archiver, BatchArchiveResult, SIDECAR_SUFFIX,
};
