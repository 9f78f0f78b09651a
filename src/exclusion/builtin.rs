//! Built-in protected locations and file types.
//!
//! These are always active in addition to user rules and cannot be edited
//! at runtime.

use std::path::PathBuf;

use directories::BaseDirs;

/// Executable, script and installer extensions (lowercase, no dot).
pub const PROTECTED_EXTENSIONS: &[&str] = &[
    "exe", "dll", "sys", "drv", "lnk", "com", "msi", "bat", "cmd", "ps1",
];

/// Whether `extension` (any case, without the dot) is protected.
#[must_use]
pub fn is_protected_extension(extension: &str) -> bool {
    let lower = extension.to_lowercase();
    PROTECTED_EXTENSIONS.contains(&lower.as_str())
}

/// Protected directories for the running OS.
///
/// Entries whose location cannot be determined (unset environment variable,
/// unknown home directory) are left out.
#[must_use]
pub fn protected_dirs() -> Vec<PathBuf> {
    let home = BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
    platform_dirs(home)
}

#[cfg(windows)]
fn platform_dirs(home: Option<PathBuf>) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = ["SystemRoot", "ProgramFiles", "ProgramFiles(x86)"]
        .iter()
        .filter_map(|var| std::env::var_os(var))
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .collect();
    if let Some(home) = home {
        dirs.push(home.join("AppData"));
        dirs.push(home.join("NTUSER.DAT"));
    }
    dirs
}

#[cfg(target_os = "macos")]
fn platform_dirs(home: Option<PathBuf>) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = [
        "/System",
        "/Library",
        "/Applications",
        "/usr",
        "/bin",
        "/sbin",
        "/private/etc",
        "/private/var/db",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();
    if let Some(home) = home {
        dirs.push(home.join("Library"));
    }
    dirs
}

#[cfg(not(any(windows, target_os = "macos")))]
fn platform_dirs(home: Option<PathBuf>) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = [
        "/usr", "/var", "/etc", "/bin", "/sbin", "/lib", "/lib32", "/lib64", "/boot", "/proc",
        "/sys", "/dev", "/run", "/snap",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();
    if let Some(home) = home {
        dirs.push(home.join(".cache"));
        dirs.push(home.join(".config"));
        dirs.push(home.join(".local"));
    }
    dirs
}
