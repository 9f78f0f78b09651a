//! Mounted volume enumeration for whole-system scans.

use std::path::PathBuf;

use sysinfo::Disks;

/// Mount points of every disk the OS reports, sorted and deduplicated.
///
/// Falls back to the filesystem root(s) when enumeration finds nothing
/// (containers and some sandboxes report no disks).
#[must_use]
pub fn mounted_volumes() -> Vec<PathBuf> {
    let disks = Disks::new_with_refreshed_list();
    let mounts = disks
        .list()
        .iter()
        .map(|disk| disk.mount_point().to_path_buf())
        .collect();

    let volumes = dedupe_mounts(mounts);
    if volumes.is_empty() {
        log::debug!("No disks reported, falling back to filesystem root");
        return fallback_roots();
    }
    log::debug!("Found {} mounted volume(s)", volumes.len());
    volumes
}

fn dedupe_mounts(mut mounts: Vec<PathBuf>) -> Vec<PathBuf> {
    mounts.retain(|m| !m.as_os_str().is_empty());
    mounts.sort();
    mounts.dedup();
    mounts
}

#[cfg(windows)]
fn fallback_roots() -> Vec<PathBuf> {
    std::env::var_os("SystemDrive")
        .map(|drive| {
            let mut root = PathBuf::from(drive);
            root.push("\\");
            vec![root]
        })
        .unwrap_or_else(|| vec![PathBuf::from("C:\\")])
}

#[cfg(not(windows))]
fn fallback_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("/")]
}
