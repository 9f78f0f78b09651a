//! Path normalization for exclusion comparisons.
//!
//! Two forms are produced for every candidate:
//!
//! - the *absolute* form, made absolute against the current directory with
//!   `.` and `..` resolved lexically (no filesystem access, symlinks are not
//!   followed). This form is used for filesystem probes.
//! - the *comparison key*, which is the absolute form in Unicode NFC and
//!   lowercased. macOS hands out NFD names while users type NFC, and the
//!   rule matching is case-insensitive on every platform.

use std::path::{Component, Path, PathBuf};

use unicode_normalization::UnicodeNormalization;

/// Make `path` absolute and resolve `.`/`..` without touching the filesystem.
///
/// A `..` at the root stays at the root.
#[must_use]
pub fn absolute_lexical(path: &Path) -> PathBuf {
    let joined;
    let path = if path.is_absolute() {
        path
    } else {
        match std::env::current_dir() {
            Ok(cwd) => {
                joined = cwd.join(path);
                joined.as_path()
            }
            Err(e) => {
                log::debug!("Cannot resolve current directory ({}), keeping relative path", e);
                path
            }
        }
    };

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if out.parent().is_some() {
                    out.pop();
                }
            }
            Component::Normal(name) => out.push(name),
        }
    }
    out
}

/// NFC-normalize and lowercase a string.
#[must_use]
pub fn fold_str(s: &str) -> String {
    s.nfc().collect::<String>().to_lowercase()
}

/// Comparison key for an already absolute path.
///
/// Paths that are not valid UTF-8 are folded lossily; they can still match
/// rules through their valid prefix components.
#[must_use]
pub fn comparison_key(absolute: &Path) -> PathBuf {
    PathBuf::from(fold_str(&absolute.to_string_lossy()))
}

/// `absolute_lexical` followed by `comparison_key`.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    comparison_key(&absolute_lexical(path))
}
