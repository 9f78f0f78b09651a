use quickpurge::duplicates::{ScanConfig, ScanEngine};
use quickpurge::exclusion::ExclusionPolicy;
use quickpurge::progress::{self, ScanEvent};
use quickpurge::signal::CancelFlag;
use quickpurge::store::{ResultSink, ScanTotals, SessionId, SqliteStore};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn engine(store: &Arc<SqliteStore>) -> ScanEngine {
    ScanEngine::new(
        store.clone(),
        Arc::new(ExclusionPolicy::with_protected_dirs(Vec::new(), Vec::new())),
        ScanConfig::default(),
    )
}

fn scan(store: &Arc<SqliteStore>, roots: &[PathBuf]) -> (Option<SessionId>, Vec<ScanEvent>) {
    let (tx, rx) = progress::channel(4096);
    let session = engine(store).scan(roots, &tx, &CancelFlag::new()).unwrap();
    let events = rx.collect_until_done(Duration::from_millis(500));
    (session, events)
}

#[test]
fn test_scan_reports_one_group_for_two_copies() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "dup").unwrap();
    fs::write(dir.path().join("b.txt"), "dup").unwrap();
    fs::write(dir.path().join("c.txt"), "unique").unwrap();

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let (session, events) = scan(&store, &[dir.path().to_path_buf()]);
    let session = session.unwrap();

    let groups = store.list_duplicate_groups(session).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].size, 3);
    assert_eq!(
        groups[0].paths(),
        vec![dir.path().join("a.txt"), dir.path().join("b.txt")]
    );

    let totals = store.session(session).unwrap().unwrap().totals.unwrap();
    assert_eq!(
        totals,
        ScanTotals {
            files: 3,
            duplicates: 1,
            bytes_saved: 3,
        }
    );

    match events.last() {
        Some(ScanEvent::Done { session_id, report }) => {
            assert_eq!(*session_id, Some(session));
            assert_eq!(report.totals, totals);
            assert!(!report.cancelled);
        }
        other => panic!("expected Done, got {:?}", other),
    }
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert!(matches!(events.first(), Some(ScanEvent::Start { .. })));
}

#[test]
fn test_size_only_collision_yields_no_groups() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("one.txt"), "abc").unwrap();
    fs::write(dir.path().join("two.txt"), "xyz").unwrap();

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let (session, events) = scan(&store, &[dir.path().to_path_buf()]);
    let session = session.unwrap();

    assert!(store.list_duplicate_groups(session).unwrap().is_empty());
    // Both were bucketed together and hashed.
    let hashed = events
        .iter()
        .filter(|e| matches!(e, ScanEvent::Hashing { .. }))
        .count();
    assert_eq!(hashed, 2);

    let totals = store.session(session).unwrap().unwrap().totals.unwrap();
    assert_eq!(totals.files, 2);
    assert_eq!(totals.duplicates, 0);
    assert_eq!(totals.bytes_saved, 0);
}

#[test]
fn test_zero_byte_files_are_duplicates() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("empty1"), "").unwrap();
    fs::write(dir.path().join("empty2"), "").unwrap();

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let session = scan(&store, &[dir.path().to_path_buf()]).0.unwrap();

    let groups = store.list_duplicate_groups(session).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].size, 0);
    assert_eq!(groups[0].paths().len(), 2);
    let totals = store.session(session).unwrap().unwrap().totals.unwrap();
    assert_eq!(totals.duplicates, 1);
    assert_eq!(totals.bytes_saved, 0);
}

#[test]
fn test_three_copies_counted_as_extra_copies() {
    let dir = tempdir().unwrap();
    for name in ["x1", "x2", "x3"] {
        fs::write(dir.path().join(name), "same bytes").unwrap();
    }

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let session = scan(&store, &[dir.path().to_path_buf()]).0.unwrap();

    let groups = store.list_duplicate_groups(session).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].paths().len(), 3);
    assert_eq!(groups[0].reclaimable(), 20);

    let totals = store.session(session).unwrap().unwrap().totals.unwrap();
    assert_eq!(totals.duplicates, 2);
    assert_eq!(totals.bytes_saved, 20);
}

#[test]
fn test_groups_ordered_by_size_descending() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("s1"), "ab").unwrap();
    fs::write(dir.path().join("s2"), "ab").unwrap();
    fs::write(dir.path().join("l1"), "abcdef").unwrap();
    fs::write(dir.path().join("l2"), "abcdef").unwrap();

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let session = scan(&store, &[dir.path().to_path_buf()]).0.unwrap();

    let sizes: Vec<u64> = store
        .list_duplicate_groups(session)
        .unwrap()
        .iter()
        .map(|g| g.size)
        .collect();
    assert_eq!(sizes, vec![6, 2]);
}

#[test]
fn test_duplicates_across_nested_directories() {
    let dir = tempdir().unwrap();
    let deep = dir.path().join("a").join("b").join("c");
    fs::create_dir_all(&deep).unwrap();
    fs::write(dir.path().join("top.dat"), "nested content").unwrap();
    fs::write(deep.join("bottom.dat"), "nested content").unwrap();

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let session = scan(&store, &[dir.path().to_path_buf()]).0.unwrap();

    let groups = store.list_duplicate_groups(session).unwrap();
    assert_eq!(groups.len(), 1);
    let paths = groups[0].paths();
    assert!(paths.contains(&dir.path().join("top.dat")));
    assert!(paths.contains(&deep.join("bottom.dat")));
}

#[test]
fn test_multiple_roots_form_one_session() {
    let first = tempdir().unwrap();
    let second = tempdir().unwrap();
    fs::write(first.path().join("photo.jpg"), "jpegdata").unwrap();
    fs::write(second.path().join("photo-copy.jpg"), "jpegdata").unwrap();

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let (session, events) = scan(
        &store,
        &[first.path().to_path_buf(), second.path().to_path_buf()],
    );
    let session = session.unwrap();

    assert_eq!(store.list_duplicate_groups(session).unwrap().len(), 1);
    let starts = events
        .iter()
        .filter(|e| matches!(e, ScanEvent::Start { .. }))
        .count();
    assert_eq!(starts, 2);
    assert_eq!(store.list_sessions(None).unwrap().len(), 1);
}

#[test]
fn test_overlapping_roots_do_not_double_count() {
    let dir = tempdir().unwrap();
    let sub = dir.path().join("sub");
    fs::create_dir(&sub).unwrap();
    fs::write(sub.join("only.txt"), "alone").unwrap();

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let session = scan(&store, &[sub.clone(), dir.path().to_path_buf()])
        .0
        .unwrap();

    // Visiting sub/only.txt twice would make it its own duplicate.
    assert!(store.list_duplicate_groups(session).unwrap().is_empty());
    let totals = store.session(session).unwrap().unwrap().totals.unwrap();
    assert_eq!(totals.files, 1);
}

#[test]
fn test_empty_directory() {
    let dir = tempdir().unwrap();
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let session = scan(&store, &[dir.path().to_path_buf()]).0.unwrap();

    assert!(store.list_duplicate_groups(session).unwrap().is_empty());
    let totals = store.session(session).unwrap().unwrap().totals.unwrap();
    assert_eq!(totals, ScanTotals::default());
}

#[test]
fn test_new_scan_clears_previous_duplicates_but_keeps_history() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a"), "dup").unwrap();
    fs::write(dir.path().join("b"), "dup").unwrap();

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let first = scan(&store, &[dir.path().to_path_buf()]).0.unwrap();
    let second = scan(&store, &[dir.path().to_path_buf()]).0.unwrap();

    assert_ne!(first, second);
    assert!(store.list_duplicate_groups(first).unwrap().is_empty());
    assert_eq!(store.list_duplicate_groups(second).unwrap().len(), 1);
    let history = store.list_sessions(None).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, second);
}

#[cfg(unix)]
#[test]
fn test_unreadable_file_is_skipped() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a"), "dup").unwrap();
    fs::write(dir.path().join("b"), "dup").unwrap();
    let locked = dir.path().join("c");
    fs::write(&locked, "dup").unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Root ignores permission bits; nothing to test there.
    if fs::read(&locked).is_ok() {
        return;
    }

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let session = scan(&store, &[dir.path().to_path_buf()]).0.unwrap();

    let groups = store.list_duplicate_groups(session).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].paths().len(), 2);
    let totals = store.session(session).unwrap().unwrap().totals.unwrap();
    assert_eq!(totals.duplicates, 1);

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
}

#[cfg(target_os = "linux")]
#[test]
fn test_non_utf8_names_are_skipped() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = tempdir().unwrap();
    for raw in [&b"a\xff"[..], &b"a\xfe"[..]] {
        // Some filesystems refuse such names outright.
        if fs::write(dir.path().join(OsStr::from_bytes(raw)), "dup").is_err() {
            return;
        }
    }
    fs::write(dir.path().join("b"), "dup").unwrap();
    fs::write(dir.path().join("c"), "dup").unwrap();

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let session = scan(&store, &[dir.path().to_path_buf()]).0.unwrap();

    let groups = store.list_duplicate_groups(session).unwrap();
    assert_eq!(groups.len(), 1);
    let paths = groups[0].paths();
    assert_eq!(paths.len(), 2);
    assert!(paths.iter().all(|p| p.exists()));

    let totals = store.session(session).unwrap().unwrap().totals.unwrap();
    assert_eq!(totals.files, 2);
    assert_eq!(totals.duplicates, 1);
}

#[test]
fn test_hashing_progress_reaches_total() {
    let dir = tempdir().unwrap();
    for i in 0..4 {
        fs::write(dir.path().join(format!("f{}", i)), "1234").unwrap();
    }

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let (_, events) = scan(&store, &[dir.path().to_path_buf()]);

    let last_hashing = events
        .iter()
        .filter_map(|e| match e {
            ScanEvent::Hashing {
                files_scanned,
                total_files,
                percent,
                ..
            } => Some((*files_scanned, *total_files, *percent)),
            _ => None,
        })
        .last()
        .unwrap();
    assert_eq!(last_hashing, (4, 4, 100));
}
