//! Scan engine: two-phase duplicate detection.
//!
//! # Overview
//!
//! 1. **Phase 1 - Grouping**: walk every root, drop excluded files and
//!    bucket the rest by byte size.
//! 2. **Phase 2 - Hash & detect**: hash every member of each bucket with two
//!    or more files. Within a bucket the first path seen for a digest is
//!    remembered; every later path with that digest is a duplicate. The
//!    first-seen path is recorded once, when its first match appears.
//!
//! Cancellation is polled before every file in both phases and before every
//! volume. Each invocation emits exactly one [`ScanEvent::Done`].
//!
//! # Example
//!
//! ```no_run
//! use quickpurge::duplicates::{ScanConfig, ScanEngine};
//! use quickpurge::exclusion::ExclusionPolicy;
//! use quickpurge::progress;
//! use quickpurge::signal::CancelFlag;
//! use quickpurge::store::SqliteStore;
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! let store = Arc::new(SqliteStore::open_in_memory().unwrap());
//! let engine = ScanEngine::new(
//!     store,
//!     Arc::new(ExclusionPolicy::builtin_only()),
//!     ScanConfig::default(),
//! );
//! let (tx, _rx) = progress::channel(1024);
//! let session = engine
//!     .scan(&[PathBuf::from("/home/me/Downloads")], &tx, &CancelFlag::new())
//!     .unwrap();
//! ```

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytesize::ByteSize;

use super::groups::{non_overlapping_roots, SizeBuckets};
use crate::cache::{DigestCache, DigestKey};
use crate::config::{Settings, DEFAULT_CHUNK_SIZE, DEFAULT_PROGRESS_INTERVAL};
use crate::exclusion::ExclusionPolicy;
use crate::progress::{ProgressSender, ScanEvent, ScanReport};
use crate::scanner::{mounted_volumes, ContentHasher, FileEntry, ScanError, Walker};
use crate::signal::CancelFlag;
use crate::store::{ResultSink, ScanTotals, SessionId};

/// Tunables for the scan engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    /// Bytes read per hashing step.
    pub chunk_size: usize,
    /// Files between `Grouping` events.
    pub progress_interval: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl ScanConfig {
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    #[must_use]
    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval.max(1);
        self
    }
}

impl From<&Settings> for ScanConfig {
    fn from(settings: &Settings) -> Self {
        Self::default()
            .with_chunk_size(settings.hash_chunk_size)
            .with_progress_interval(settings.progress_interval)
    }
}

/// How one session run ended, before the terminal event is emitted.
enum Outcome {
    Completed { session: SessionId, totals: ScanTotals },
    Cancelled { totals: ScanTotals },
}

/// First path seen for a digest within one size bucket.
struct FirstSeen<'a> {
    path: &'a Path,
    recorded: bool,
}

/// Orchestrates traversal, grouping, hashing and recording.
pub struct ScanEngine {
    sink: Arc<dyn ResultSink>,
    policy: Arc<ExclusionPolicy>,
    hasher: ContentHasher,
    config: ScanConfig,
    digest_cache: Option<Arc<DigestCache>>,
}

impl std::fmt::Debug for ScanEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanEngine")
            .field("config", &self.config)
            .field("digest_cache", &self.digest_cache.as_ref().map(|_| "<cache>"))
            .finish_non_exhaustive()
    }
}

impl ScanEngine {
    #[must_use]
    pub fn new(
        sink: Arc<dyn ResultSink>,
        policy: Arc<ExclusionPolicy>,
        config: ScanConfig,
    ) -> Self {
        Self {
            sink,
            policy,
            hasher: ContentHasher::new(config.chunk_size),
            config,
            digest_cache: None,
        }
    }

    /// Reuse digests across scans for files whose path, size and mtime are
    /// unchanged.
    #[must_use]
    pub fn with_digest_cache(mut self, cache: Arc<DigestCache>) -> Self {
        self.digest_cache = Some(cache);
        self
    }

    #[must_use]
    pub fn policy(&self) -> &Arc<ExclusionPolicy> {
        &self.policy
    }

    /// Scan one or more directory roots as a single session.
    ///
    /// Returns the session id on completion and `None` on cancellation.
    ///
    /// # Errors
    ///
    /// [`ScanError::Store`] when the result store fails. An `Error` event and
    /// a terminal `Done` without a session id are emitted first.
    pub fn scan(
        &self,
        roots: &[PathBuf],
        progress: &ProgressSender,
        cancel: &CancelFlag,
    ) -> Result<Option<SessionId>, ScanError> {
        let outcome = self.run_session(roots, false, progress, cancel);
        match outcome {
            Ok(Outcome::Completed { session, totals }) => {
                progress.send(ScanEvent::Done {
                    session_id: Some(session),
                    report: ScanReport {
                        totals,
                        cancelled: false,
                    },
                });
                Ok(Some(session))
            }
            Ok(Outcome::Cancelled { totals }) => {
                progress.send(ScanEvent::Done {
                    session_id: None,
                    report: ScanReport {
                        totals,
                        cancelled: true,
                    },
                });
                Ok(None)
            }
            Err(e) => Err(fail(progress, e)),
        }
    }

    /// Scan every mounted volume, one session per volume.
    ///
    /// # Errors
    ///
    /// See [`ScanEngine::scan_volumes`].
    pub fn scan_entire_system(
        &self,
        progress: &ProgressSender,
        cancel: &CancelFlag,
    ) -> Result<Option<SessionId>, ScanError> {
        self.scan_volumes(&mounted_volumes(), progress, cancel)
    }

    /// Scan the given volumes sequentially, one session each.
    ///
    /// Excluded volumes are skipped. Returns the last completed session id,
    /// or `None` if no volume completed. A single `Done` event closes the run
    /// with totals summed over the completed volumes.
    ///
    /// # Errors
    ///
    /// [`ScanError::Store`] when the result store fails on any volume.
    pub fn scan_volumes(
        &self,
        volumes: &[PathBuf],
        progress: &ProgressSender,
        cancel: &CancelFlag,
    ) -> Result<Option<SessionId>, ScanError> {
        let mut last_completed = None;
        let mut aggregate = ScanTotals::default();
        let mut cancelled = false;

        for mount in volumes {
            if cancel.is_cancelled() {
                log::info!("Scan cancelled before volume {}", mount.display());
                cancelled = true;
                break;
            }
            if self.policy.is_excluded(mount) {
                log::debug!("Skipping excluded volume: {}", mount.display());
                continue;
            }

            log::info!("Scanning volume: {}", mount.display());
            progress.send(ScanEvent::Volume {
                mount: mount.clone(),
            });

            match self.run_session(std::slice::from_ref(mount), true, progress, cancel) {
                Ok(Outcome::Completed { session, totals }) => {
                    last_completed = Some(session);
                    aggregate.files += totals.files;
                    aggregate.duplicates += totals.duplicates;
                    aggregate.bytes_saved += totals.bytes_saved;
                    progress.send(ScanEvent::VolumeFinished {
                        mount: mount.clone(),
                        session_id: Some(session),
                    });
                }
                Ok(Outcome::Cancelled { totals }) => {
                    aggregate.files += totals.files;
                    cancelled = true;
                    break;
                }
                Err(e) => return Err(fail(progress, e)),
            }
        }

        progress.send(ScanEvent::Done {
            session_id: last_completed,
            report: ScanReport {
                totals: aggregate,
                cancelled,
            },
        });
        Ok(last_completed)
    }

    /// One session over `roots`. Emits no terminal event.
    fn run_session(
        &self,
        roots: &[PathBuf],
        same_file_system: bool,
        progress: &ProgressSender,
        cancel: &CancelFlag,
    ) -> Result<Outcome, ScanError> {
        let roots = non_overlapping_roots(roots);

        self.sink.clear_transient_duplicates()?;
        let session = self.sink.begin_session()?;
        log::info!("Scan session {} started over {} root(s)", session, roots.len());

        let Some(buckets) = self.group_by_size(&roots, same_file_system, progress, cancel) else {
            log::info!("Scan session {} cancelled during grouping", session);
            return Ok(Outcome::Cancelled {
                totals: ScanTotals::default(),
            });
        };

        let mut totals = ScanTotals {
            files: buckets.file_count(),
            ..ScanTotals::default()
        };

        if !self.hash_and_record(session, &buckets, &mut totals, progress, cancel)? {
            log::info!("Scan session {} cancelled during hashing", session);
            return Ok(Outcome::Cancelled { totals });
        }

        self.sink.finish_session(session, totals)?;
        log::info!(
            "Scan complete: {} files, {} duplicates, {} reclaimable",
            totals.files,
            totals.duplicates,
            ByteSize(totals.bytes_saved)
        );
        Ok(Outcome::Completed { session, totals })
    }

    /// Phase 1. Returns `None` when cancelled.
    fn group_by_size(
        &self,
        roots: &[PathBuf],
        same_file_system: bool,
        progress: &ProgressSender,
        cancel: &CancelFlag,
    ) -> Option<SizeBuckets> {
        let mut buckets = SizeBuckets::new();
        let interval = self.config.progress_interval.max(1);

        for root in roots {
            if cancel.is_cancelled() {
                return None;
            }
            progress.send(ScanEvent::Start { root: root.clone() });

            if !root.is_dir() {
                log::warn!("Skipping root that is not a directory: {}", root.display());
                progress.send(ScanEvent::Error {
                    message: format!("not a directory: {}", root.display()),
                });
                continue;
            }

            let walker = Walker::new(root, Arc::clone(&self.policy))
                .with_same_file_system(same_file_system);
            for entry in walker.walk() {
                if cancel.is_cancelled() {
                    return None;
                }

                let file = match entry {
                    Ok(file) => file,
                    Err(e) => {
                        log::debug!("Skipping during grouping: {}", e);
                        continue;
                    }
                };
                if self.policy.is_excluded(&file.path) {
                    continue;
                }
                if file.path.to_str().is_none() {
                    log::warn!(
                        "Skipping file with a non UTF-8 name: {}",
                        file.path.display()
                    );
                    continue;
                }

                buckets.insert(file);
                if buckets.file_count() % interval == 0 {
                    progress.send(ScanEvent::Grouping {
                        files_scanned: buckets.file_count(),
                    });
                }
            }
        }

        log::debug!(
            "Grouping finished: {} files, {} hash candidates",
            buckets.file_count(),
            buckets.candidate_count()
        );
        Some(buckets)
    }

    /// Phase 2. Returns `Ok(false)` when cancelled.
    fn hash_and_record(
        &self,
        session: SessionId,
        buckets: &SizeBuckets,
        totals: &mut ScanTotals,
        progress: &ProgressSender,
        cancel: &CancelFlag,
    ) -> Result<bool, ScanError> {
        let total_files = buckets.file_count();
        let mut processed: u64 = 0;

        for (size, files) in buckets.candidate_buckets() {
            let mut first_seen: HashMap<String, FirstSeen<'_>> = HashMap::new();

            for file in files {
                if cancel.is_cancelled() {
                    return Ok(false);
                }

                processed += 1;
                progress.send(ScanEvent::Hashing {
                    path: file.path.clone(),
                    files_scanned: processed,
                    total_files,
                    percent: percent(processed, total_files),
                });

                let Some(digest) = self.digest(file) else {
                    continue;
                };

                match first_seen.entry(digest) {
                    Entry::Vacant(slot) => {
                        slot.insert(FirstSeen {
                            path: &file.path,
                            recorded: false,
                        });
                    }
                    Entry::Occupied(mut slot) => {
                        let digest = slot.key().clone();
                        let first = slot.get_mut();
                        if !first.recorded {
                            self.sink
                                .insert_duplicate(session, first.path, &digest, size)?;
                            first.recorded = true;
                        }
                        self.sink
                            .insert_duplicate(session, &file.path, &digest, size)?;
                        log::trace!(
                            "Duplicate: {} == {}",
                            file.path.display(),
                            first.path.display()
                        );

                        totals.duplicates += 1;
                        totals.bytes_saved += size;
                    }
                }
            }
        }
        Ok(true)
    }

    fn digest(&self, file: &FileEntry) -> Option<String> {
        match &self.digest_cache {
            Some(cache) => {
                let key = DigestKey {
                    path: file.path.clone(),
                    size: file.size,
                    modified: file.modified,
                };
                cache.get_or_compute(key, || self.hasher.hash(&file.path))
            }
            None => self.hasher.hash(&file.path),
        }
    }
}

/// Report a store failure and close the invocation.
fn fail(progress: &ProgressSender, error: ScanError) -> ScanError {
    log::error!("Scan aborted: {}", error);
    progress.send(ScanEvent::Error {
        message: error.to_string(),
    });
    progress.send(ScanEvent::Done {
        session_id: None,
        report: ScanReport::default(),
    });
    error
}

fn percent(processed: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = processed.saturating_mul(100) / total;
    u8::try_from(pct.min(100)).unwrap_or(100)
}
