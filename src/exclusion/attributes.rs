//! Filesystem attribute probes used by the exclusion policy.
//!
//! Both probes answer `false` when the metadata cannot be read; a failed
//! probe never excludes a path on its own.

use std::path::Path;

#[cfg(windows)]
const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
#[cfg(windows)]
const FILE_ATTRIBUTE_SYSTEM: u32 = 0x4;

/// Whether the OS marks the path hidden or system.
///
/// Only Windows has such attributes; elsewhere this is always `false`.
/// Volume roots are never reported: Windows flags `C:\` itself as
/// hidden+system.
#[must_use]
pub fn is_hidden_or_system(path: &Path) -> bool {
    if path.parent().is_none() {
        return false;
    }
    platform_hidden_or_system(path)
}

#[cfg(windows)]
fn platform_hidden_or_system(path: &Path) -> bool {
    use std::os::windows::fs::MetadataExt;

    match std::fs::symlink_metadata(path) {
        Ok(metadata) => {
            metadata.file_attributes() & (FILE_ATTRIBUTE_HIDDEN | FILE_ATTRIBUTE_SYSTEM) != 0
        }
        Err(e) => {
            log::debug!("Attribute probe failed for {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(not(windows))]
fn platform_hidden_or_system(_path: &Path) -> bool {
    false
}

/// Whether a non-directory path has more than one hard link.
///
/// Directories are skipped because POSIX directories always carry at least
/// two links (`.` and the parent entry).
#[must_use]
pub fn has_multiple_links(path: &Path) -> bool {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) => !metadata.is_dir() && link_count(&metadata) > 1,
        Err(e) => {
            log::trace!("Link probe failed for {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(unix)]
fn link_count(metadata: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.nlink()
}

// The stable std API exposes no link count on other platforms.
#[cfg(not(unix))]
fn link_count(_metadata: &std::fs::Metadata) -> u64 {
    1
}
