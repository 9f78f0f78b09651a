use quickpurge::duplicates::{ScanConfig, ScanEngine};
use quickpurge::scanner::ScanError;
use quickpurge::exclusion::ExclusionPolicy;
use quickpurge::progress::{self, ScanEvent};
use quickpurge::signal::CancelFlag;
use quickpurge::store::{
    DuplicateGroupRow, ExclusionRule, ResultSink, ScanTotals, SessionId, SessionSummary,
    SqliteStore, StoreError,
};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

/// Store wrapper that can raise the cancel flag once the first duplicate
/// lands, or fail `finish_session` from its n-th call (1-based) onwards.
struct ScriptedSink {
    inner: SqliteStore,
    cancel_on_insert: Option<CancelFlag>,
    fail_finish_from: Option<usize>,
    finishes: AtomicUsize,
}

impl ScriptedSink {
    fn cancelling(cancel: CancelFlag) -> Self {
        Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            cancel_on_insert: Some(cancel),
            fail_finish_from: None,
            finishes: AtomicUsize::new(0),
        }
    }

    fn failing_finish_from(n: usize) -> Self {
        Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            cancel_on_insert: None,
            fail_finish_from: Some(n),
            finishes: AtomicUsize::new(0),
        }
    }
}

impl ResultSink for ScriptedSink {
    fn begin_session(&self) -> Result<SessionId, StoreError> {
        self.inner.begin_session()
    }
    fn finish_session(&self, id: SessionId, totals: ScanTotals) -> Result<(), StoreError> {
        let call = self.finishes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_finish_from.is_some_and(|n| call >= n) {
            return Err(StoreError::Poisoned);
        }
        self.inner.finish_session(id, totals)
    }
    fn insert_duplicate(
        &self,
        session: SessionId,
        path: &Path,
        digest: &str,
        size: u64,
    ) -> Result<(), StoreError> {
        if let Some(cancel) = &self.cancel_on_insert {
            cancel.cancel();
        }
        self.inner.insert_duplicate(session, path, digest, size)
    }
    fn clear_transient_duplicates(&self) -> Result<(), StoreError> {
        self.inner.clear_transient_duplicates()
    }
    fn remove_duplicate_by_path(
        &self,
        session: SessionId,
        path: &Path,
    ) -> Result<usize, StoreError> {
        self.inner.remove_duplicate_by_path(session, path)
    }
    fn remove_duplicate_group(
        &self,
        session: SessionId,
        digest: &str,
    ) -> Result<usize, StoreError> {
        self.inner.remove_duplicate_group(session, digest)
    }
    fn list_duplicate_groups(
        &self,
        session: SessionId,
    ) -> Result<Vec<DuplicateGroupRow>, StoreError> {
        self.inner.list_duplicate_groups(session)
    }
    fn list_sessions(&self, limit: Option<usize>) -> Result<Vec<SessionSummary>, StoreError> {
        self.inner.list_sessions(limit)
    }
    fn session(&self, id: SessionId) -> Result<Option<SessionSummary>, StoreError> {
        self.inner.session(id)
    }
    fn clear_all(&self) -> Result<(), StoreError> {
        self.inner.clear_all()
    }
    fn add_rule(&self, rule: &ExclusionRule) -> Result<(), StoreError> {
        self.inner.add_rule(rule)
    }
    fn remove_rule(&self, pattern: &str) -> Result<usize, StoreError> {
        self.inner.remove_rule(pattern)
    }
    fn list_rules(&self) -> Result<Vec<ExclusionRule>, StoreError> {
        self.inner.list_rules()
    }
}

fn open_policy() -> Arc<ExclusionPolicy> {
    Arc::new(ExclusionPolicy::with_protected_dirs(Vec::new(), Vec::new()))
}

#[test]
fn test_cancel_before_start_records_nothing() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a"), "dup").unwrap();
    fs::write(dir.path().join("b"), "dup").unwrap();

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let engine = ScanEngine::new(store.clone(), open_policy(), ScanConfig::default());
    let cancel = CancelFlag::new();
    cancel.cancel();

    let (tx, rx) = progress::channel(64);
    let session = engine
        .scan(&[dir.path().to_path_buf()], &tx, &cancel)
        .unwrap();
    assert!(session.is_none());

    let events = rx.collect_until_done(Duration::from_millis(500));
    assert_eq!(events.len(), 1);
    match &events[0] {
        ScanEvent::Done { session_id, report } => {
            assert!(session_id.is_none());
            assert!(report.cancelled);
        }
        other => panic!("expected Done, got {:?}", other),
    }

    // The dangling session has no totals and no records.
    let sessions = store.list_sessions(None).unwrap();
    assert_eq!(sessions.len(), 1);
    assert!(sessions[0].totals.is_none());
    assert!(store
        .list_duplicate_groups(sessions[0].id)
        .unwrap()
        .is_empty());
}

#[test]
fn test_cancel_mid_hash_emits_done_without_session() {
    let dir = tempdir().unwrap();
    // Two separate groups so hashing continues after the first insert.
    fs::write(dir.path().join("a1"), "aa").unwrap();
    fs::write(dir.path().join("a2"), "aa").unwrap();
    fs::write(dir.path().join("b1"), "bbbb").unwrap();
    fs::write(dir.path().join("b2"), "bbbb").unwrap();

    let cancel = CancelFlag::new();
    let sink = Arc::new(ScriptedSink::cancelling(cancel.clone()));
    let engine = ScanEngine::new(sink.clone(), open_policy(), ScanConfig::default());

    let (tx, rx) = progress::channel(64);
    let session = engine
        .scan(&[dir.path().to_path_buf()], &tx, &cancel)
        .unwrap();
    assert!(session.is_none());

    let events = rx.collect_until_done(Duration::from_millis(500));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert!(matches!(
        events.last(),
        Some(ScanEvent::Done {
            session_id: None,
            ..
        })
    ));

    // The b-group was never hashed.
    let hashed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ScanEvent::Hashing { path, .. } => Some(path.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(hashed, vec![dir.path().join("a1"), dir.path().join("a2")]);

    let sessions = sink.list_sessions(None).unwrap();
    assert!(sessions[0].totals.is_none());
}

#[test]
fn test_flag_reset_allows_next_scan() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a"), "dup").unwrap();
    fs::write(dir.path().join("b"), "dup").unwrap();

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let engine = ScanEngine::new(store.clone(), open_policy(), ScanConfig::default());
    let cancel = CancelFlag::new();
    cancel.cancel();
    let tx = progress::ProgressSender::disconnected();
    assert!(engine
        .scan(&[dir.path().to_path_buf()], &tx, &cancel)
        .unwrap()
        .is_none());

    cancel.reset();
    let session = engine
        .scan(&[dir.path().to_path_buf()], &tx, &cancel)
        .unwrap()
        .unwrap();
    assert_eq!(store.list_duplicate_groups(session).unwrap().len(), 1);
}

/// One `Error`, then exactly one `Done` without a session, then nothing.
fn assert_store_fault_events(rx: &progress::ProgressReceiver) -> Vec<ScanEvent> {
    let events = rx.collect_until_done(Duration::from_millis(500));
    assert!(rx.drain().is_empty());
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    match events.last() {
        Some(ScanEvent::Done { session_id, report }) => {
            assert!(session_id.is_none());
            assert!(!report.cancelled);
        }
        other => panic!("expected Done, got {:?}", other),
    }
    assert!(matches!(
        events.get(events.len().wrapping_sub(2)),
        Some(ScanEvent::Error { .. })
    ));
    events
}

#[test]
fn test_store_fault_fails_scan_with_single_done() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a"), "dup").unwrap();
    fs::write(dir.path().join("b"), "dup").unwrap();

    let sink = Arc::new(ScriptedSink::failing_finish_from(1));
    let engine = ScanEngine::new(sink.clone(), open_policy(), ScanConfig::default());

    let (tx, rx) = progress::channel(256);
    let result = engine.scan(&[dir.path().to_path_buf()], &tx, &CancelFlag::new());
    assert!(matches!(result, Err(ScanError::Store(StoreError::Poisoned))));

    assert_store_fault_events(&rx);

    // The session was never finalized.
    let sessions = sink.list_sessions(None).unwrap();
    assert_eq!(sessions.len(), 1);
    assert!(!sessions[0].is_complete());
}

#[test]
fn test_store_fault_on_second_volume_fails_system_scan() {
    let vol_a = tempdir().unwrap();
    let vol_b = tempdir().unwrap();
    for vol in [&vol_a, &vol_b] {
        fs::write(vol.path().join("one"), "dup").unwrap();
        fs::write(vol.path().join("two"), "dup").unwrap();
    }
    let volumes = vec![vol_a.path().to_path_buf(), vol_b.path().to_path_buf()];

    let sink = Arc::new(ScriptedSink::failing_finish_from(2));
    let engine = ScanEngine::new(sink.clone(), open_policy(), ScanConfig::default());

    let (tx, rx) = progress::channel(1024);
    let result = engine.scan_volumes(&volumes, &tx, &CancelFlag::new());
    assert!(matches!(result, Err(ScanError::Store(_))));

    let events = assert_store_fault_events(&rx);
    let finished = events
        .iter()
        .filter(|e| matches!(e, ScanEvent::VolumeFinished { .. }))
        .count();
    assert_eq!(finished, 1);

    let sessions = sink.list_sessions(None).unwrap();
    assert_eq!(sessions.len(), 2);
    assert!(!sessions[0].is_complete());
    assert!(sessions[1].is_complete());
}
