use quickpurge::app::open_store;
use quickpurge::store::{
    ExclusionRule, IntegrityStatus, ResultSink, ScanTotals, SqliteStore, StoreError,
};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

#[test]
fn test_insert_twice_then_remove_by_path() {
    let store = SqliteStore::open_in_memory().unwrap();
    let session = store.begin_session().unwrap();
    let path = Path::new("/data/a.txt");

    store.insert_duplicate(session, path, "h1", 3).unwrap();
    store.insert_duplicate(session, path, "h1", 3).unwrap();
    store
        .insert_duplicate(session, Path::new("/data/b.txt"), "h1", 3)
        .unwrap();

    let groups = store.list_duplicate_groups(session).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].paths().len(), 3);

    let removed = store.remove_duplicate_by_path(session, path).unwrap();
    assert_eq!(removed, 2);
    // A single survivor is not a group.
    assert!(store.list_duplicate_groups(session).unwrap().is_empty());
}

#[test]
fn test_remove_by_path_leaves_other_rows() {
    let store = SqliteStore::open_in_memory().unwrap();
    let session = store.begin_session().unwrap();
    for name in ["/d/a", "/d/b", "/d/c"] {
        store
            .insert_duplicate(session, Path::new(name), "h", 1)
            .unwrap();
    }
    // Prefix-similar path must not match.
    store
        .insert_duplicate(session, Path::new("/d/a.bak"), "h", 1)
        .unwrap();

    assert_eq!(
        store
            .remove_duplicate_by_path(session, Path::new("/d/a"))
            .unwrap(),
        1
    );
    let groups = store.list_duplicate_groups(session).unwrap();
    assert_eq!(groups[0].paths().len(), 3);
}

#[test]
fn test_history_survives_reopen() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("nested").join("quickpurge.db");

    let id = {
        let store = SqliteStore::open(&db).unwrap();
        let id = store.begin_session().unwrap();
        store
            .finish_session(
                id,
                ScanTotals {
                    files: 10,
                    duplicates: 2,
                    bytes_saved: 4096,
                },
            )
            .unwrap();
        store.add_rule(&ExclusionRule::suffix(".iso")).unwrap();
        id
    };

    assert_eq!(
        SqliteStore::check_integrity(&db).unwrap(),
        IntegrityStatus::Ok
    );
    let store = SqliteStore::open(&db).unwrap();
    let summary = store.session(id).unwrap().unwrap();
    assert_eq!(summary.totals.unwrap().bytes_saved, 4096);
    assert_eq!(store.list_rules().unwrap(), vec![ExclusionRule::suffix(".iso")]);
}

#[test]
fn test_garbage_file_reports_corrupt() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("bad.db");
    fs::write(&db, vec![0xABu8; 4096]).unwrap();

    assert!(matches!(
        SqliteStore::check_integrity(&db).unwrap(),
        IntegrityStatus::Corrupt(_)
    ));
    assert!(matches!(
        SqliteStore::open(&db),
        Err(StoreError::Corrupt(_))
    ));
}

#[test]
fn test_host_recovers_corrupt_database() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("q.db");
    fs::write(&db, "not a database ".repeat(300)).unwrap();

    let store = open_store(&db).unwrap();
    let session = store.begin_session().unwrap();
    assert!(store.session(session).unwrap().is_some());

    let names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names
        .iter()
        .any(|n| n.starts_with("q.db.corrupt-") && n.ends_with(".bak")));
}

#[test]
fn test_clear_all_keeps_rules() {
    let store = SqliteStore::open_in_memory().unwrap();
    let session = store.begin_session().unwrap();
    store
        .insert_duplicate(session, Path::new("/x"), "h", 1)
        .unwrap();
    store
        .add_rule(&ExclusionRule::folder("/mnt/backup"))
        .unwrap();

    store.clear_all().unwrap();
    assert!(store.list_sessions(None).unwrap().is_empty());
    assert_eq!(store.list_rules().unwrap().len(), 1);
}
