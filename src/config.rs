//! Layered application configuration.
//!
//! Settings are merged with figment, later layers overriding earlier ones:
//!
//! 1. Built-in defaults ([`Settings::default`])
//! 2. TOML file (`--config` or the platform config directory)
//! 3. `QUICKPURGE_*` environment variables (e.g. `QUICKPURGE_HASH_CHUNK_SIZE`)

use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Default hashing chunk size (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Default number of files between grouping progress events.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 200;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "QUICKPURGE_";

/// Errors raised while loading or validating settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A layer could not be parsed or extracted.
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Settings could not be rendered as TOML.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Runtime settings consumed by the scan engine, archiver and host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Bytes read per hashing step.
    pub hash_chunk_size: usize,
    /// Files between `Grouping` progress events.
    pub progress_interval: u64,
    /// Holding directory for archived duplicates.
    pub archive_dir: PathBuf,
    /// SQLite result store location.
    pub database_path: PathBuf,
    /// Capacity of the progress event queue.
    pub event_queue_capacity: usize,
    /// Entries kept by the in-memory digest cache.
    pub digest_cache_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            hash_chunk_size: DEFAULT_CHUNK_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            archive_dir: default_archive_dir(),
            database_path: data_dir.join("quickpurge.db"),
            event_queue_capacity: 1024,
            digest_cache_capacity: 4096,
        }
    }
}

impl Settings {
    /// Load settings from defaults, the config file and the environment.
    ///
    /// A missing config file is not an error; the layer is simply skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a layer fails to parse or a value is invalid.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));

        let file = config_file.map(Path::to_path_buf).or_else(default_config_path);
        if let Some(file) = file {
            if file.exists() {
                log::debug!("Loading configuration from {}", file.display());
                figment = figment.merge(Toml::file(file));
            }
        }

        let settings: Settings = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(Box::new)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the engine cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hash_chunk_size == 0 {
            return Err(ConfigError::Invalid("hash_chunk_size must be > 0".into()));
        }
        if self.progress_interval == 0 {
            return Err(ConfigError::Invalid("progress_interval must be > 0".into()));
        }
        if self.event_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_queue_capacity must be > 0".into(),
            ));
        }
        if self.digest_cache_capacity == 0 {
            return Err(ConfigError::Invalid(
                "digest_cache_capacity must be > 0".into(),
            ));
        }
        if self.archive_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("archive_dir must not be empty".into()));
        }
        Ok(())
    }

    /// Render the settings as a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if a path is not valid UTF-8.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "quickpurge", "quickpurge")
}

/// Platform config file location (`.../quickpurge/config.toml`).
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

fn default_data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| home_dir().join(".quickpurge"))
}

fn default_archive_dir() -> PathBuf {
    match project_dirs() {
        Some(dirs) => dirs.data_dir().join("archive"),
        None => home_dir().join("QuickPurge_Archive"),
    }
}

fn home_dir() -> PathBuf {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}
