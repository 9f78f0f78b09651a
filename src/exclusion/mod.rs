//! Exclusion policy: which paths must never be scanned or archived.
//!
//! # Evaluation order
//!
//! [`ExclusionPolicy::is_excluded`] short-circuits on the first match:
//!
//! 1. empty path (always excluded)
//! 2. user folder rules (ancestor match) and user suffix rules
//! 3. built-in protected directories (see [`builtin`])
//! 4. built-in protected extensions
//! 5. OS hidden/system attribute (Windows only)
//! 6. more than one hard link
//!
//! Comparisons use the normalized form from [`paths`]: absolute, lexically
//! cleaned, NFC and lowercased. Probe failures count as "no match" for that
//! step and evaluation continues.
//!
//! # Example
//!
//! ```no_run
//! use quickpurge::exclusion::ExclusionPolicy;
//! use quickpurge::store::ExclusionRule;
//! use std::path::Path;
//!
//! let policy = ExclusionPolicy::new(vec![ExclusionRule::suffix(".iso")]);
//! assert!(policy.is_excluded(Path::new("/home/me/disk.ISO")));
//! ```

pub mod attributes;
pub mod builtin;
pub mod paths;

use std::path::{Path, PathBuf};

use crate::store::{ExclusionRule, ResultSink, StoreError};

/// Compiled set of user and built-in exclusion rules.
#[derive(Debug, Clone)]
pub struct ExclusionPolicy {
    user_folders: Vec<PathBuf>,
    user_suffixes: Vec<String>,
    protected_dirs: Vec<PathBuf>,
}

impl ExclusionPolicy {
    /// Policy with the given user rules plus the built-in set for this OS.
    #[must_use]
    pub fn new(user_rules: Vec<ExclusionRule>) -> Self {
        Self::with_protected_dirs(user_rules, builtin::protected_dirs())
    }

    /// Policy with only the built-in rules.
    #[must_use]
    pub fn builtin_only() -> Self {
        Self::new(Vec::new())
    }

    /// Policy with an explicit list of protected directories instead of the
    /// platform defaults. Extension and attribute checks still apply.
    #[must_use]
    pub fn with_protected_dirs(user_rules: Vec<ExclusionRule>, protected: Vec<PathBuf>) -> Self {
        let mut user_folders = Vec::new();
        let mut user_suffixes = Vec::new();

        for rule in user_rules {
            let pattern = rule.pattern.trim();
            if pattern.is_empty() {
                log::debug!("Ignoring empty exclusion pattern");
                continue;
            }
            if rule.is_folder {
                user_folders.push(paths::normalize(Path::new(pattern)));
            } else {
                user_suffixes.push(paths::fold_str(pattern));
            }
        }

        let protected_dirs = protected
            .iter()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| paths::normalize(p))
            .collect();

        Self {
            user_folders,
            user_suffixes,
            protected_dirs,
        }
    }

    /// Load user rules from the store and add the built-in set.
    ///
    /// # Errors
    ///
    /// Propagates the store failure; callers decide whether to fall back to
    /// [`ExclusionPolicy::builtin_only`].
    pub fn from_sink(sink: &dyn ResultSink) -> Result<Self, StoreError> {
        Ok(Self::new(sink.list_rules()?))
    }

    /// Whether `path` must never be touched by scan or archive operations.
    #[must_use]
    pub fn is_excluded(&self, path: &Path) -> bool {
        if path.as_os_str().is_empty() {
            return true;
        }

        let absolute = paths::absolute_lexical(path);
        let key = paths::comparison_key(&absolute);

        if let Some(reason) = self.rule_match(&key) {
            log::trace!("Excluded ({}): {}", reason, path.display());
            return true;
        }

        if attributes::is_hidden_or_system(&absolute) {
            log::trace!("Excluded (hidden/system): {}", path.display());
            return true;
        }

        if attributes::has_multiple_links(&absolute) {
            log::trace!("Excluded (hard link): {}", path.display());
            return true;
        }

        false
    }

    /// Whether a directory is covered by a folder rule, so nothing beneath
    /// it can ever be scanned. Used to prune the walk.
    #[must_use]
    pub fn is_protected_dir(&self, dir: &Path) -> bool {
        if dir.as_os_str().is_empty() {
            return false;
        }
        let key = paths::normalize(dir);
        self.user_folders
            .iter()
            .chain(&self.protected_dirs)
            .any(|folder| key.starts_with(folder))
    }

    /// Number of active user rules.
    #[must_use]
    pub fn user_rule_count(&self) -> usize {
        self.user_folders.len() + self.user_suffixes.len()
    }

    /// Checks 2 to 4, on the comparison key.
    fn rule_match(&self, key: &Path) -> Option<&'static str> {
        if self.user_folders.iter().any(|folder| key.starts_with(folder)) {
            return Some("user folder rule");
        }

        let text = key.to_string_lossy();
        if self.user_suffixes.iter().any(|suffix| text.ends_with(suffix.as_str())) {
            return Some("user suffix rule");
        }

        if self.protected_dirs.iter().any(|dir| key.starts_with(dir)) {
            return Some("protected directory");
        }

        let protected_ext = key
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(builtin::is_protected_extension);
        if protected_ext {
            return Some("protected extension");
        }

        None
    }
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        Self::builtin_only()
    }
}
