use quickpurge::actions::{ArchiveError, Archiver};
use quickpurge::duplicates::{ScanConfig, ScanEngine};
use quickpurge::exclusion::ExclusionPolicy;
use quickpurge::progress::ProgressSender;
use quickpurge::signal::CancelFlag;
use quickpurge::store::{ExclusionRule, ResultSink, SessionId, SqliteStore};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

fn scan_with(policy: ExclusionPolicy, root: &Path) -> (Arc<SqliteStore>, SessionId) {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let engine = ScanEngine::new(store.clone(), Arc::new(policy), ScanConfig::default());
    let session = engine
        .scan(
            &[root.to_path_buf()],
            &ProgressSender::disconnected(),
            &CancelFlag::new(),
        )
        .unwrap()
        .unwrap();
    (store, session)
}

fn grouped_paths(store: &SqliteStore, session: SessionId) -> Vec<PathBuf> {
    store
        .list_duplicate_groups(session)
        .unwrap()
        .iter()
        .flat_map(|g| g.paths())
        .collect()
}

/// Two identical files in `keep/` and two in `other/`.
fn fixture() -> TempDir {
    let dir = tempdir().unwrap();
    for sub in ["keep", "other"] {
        fs::create_dir(dir.path().join(sub)).unwrap();
        fs::write(dir.path().join(sub).join("one.txt"), "same").unwrap();
        fs::write(dir.path().join(sub).join("two.txt"), "same").unwrap();
    }
    dir
}

#[test]
fn test_folder_rule_keeps_files_out_of_groups() {
    let dir = fixture();
    let keep = dir.path().join("keep");
    let policy = ExclusionPolicy::with_protected_dirs(
        vec![ExclusionRule::folder(keep.to_string_lossy())],
        Vec::new(),
    );

    let (store, session) = scan_with(policy, dir.path());
    let paths = grouped_paths(&store, session);

    assert_eq!(paths.len(), 2);
    assert!(paths.iter().all(|p| !p.starts_with(&keep)));
    let totals = store.session(session).unwrap().unwrap().totals.unwrap();
    assert_eq!(totals.files, 2);
}

#[test]
fn test_suffix_rule_keeps_files_out_of_groups() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.iso"), "image").unwrap();
    fs::write(dir.path().join("b.ISO"), "image").unwrap();
    fs::write(dir.path().join("c.txt"), "image").unwrap();

    let policy =
        ExclusionPolicy::with_protected_dirs(vec![ExclusionRule::suffix(".iso")], Vec::new());
    let (store, session) = scan_with(policy, dir.path());

    // Only c.txt is left, which has nothing to pair with.
    assert!(grouped_paths(&store, session).is_empty());
}

#[test]
fn test_protected_directory_is_pruned() {
    let dir = fixture();
    let protected = dir.path().join("other");
    let policy = ExclusionPolicy::with_protected_dirs(Vec::new(), vec![protected.clone()]);

    let (store, session) = scan_with(policy, dir.path());
    let paths = grouped_paths(&store, session);

    assert_eq!(paths.len(), 2);
    assert!(paths.iter().all(|p| !p.starts_with(&protected)));
}

#[test]
fn test_protected_extensions_never_grouped() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("setup.exe"), "MZ-binary").unwrap();
    fs::write(dir.path().join("setup-copy.EXE"), "MZ-binary").unwrap();
    fs::write(dir.path().join("run.bat"), "MZ-binary").unwrap();

    let (store, session) = scan_with(
        ExclusionPolicy::with_protected_dirs(Vec::new(), Vec::new()),
        dir.path(),
    );
    assert!(grouped_paths(&store, session).is_empty());
}

#[cfg(unix)]
#[test]
fn test_hard_linked_files_never_grouped() {
    let dir = tempdir().unwrap();
    let original = dir.path().join("original.dat");
    fs::write(&original, "linked").unwrap();
    fs::hard_link(&original, dir.path().join("link.dat")).unwrap();
    fs::write(dir.path().join("copy.dat"), "linked").unwrap();

    let (store, session) = scan_with(
        ExclusionPolicy::with_protected_dirs(Vec::new(), Vec::new()),
        dir.path(),
    );
    // Both link names are excluded; the lone copy has no partner.
    assert!(grouped_paths(&store, session).is_empty());
}

#[test]
fn test_rules_loaded_from_store_apply() {
    let dir = fixture();
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .add_rule(&ExclusionRule::folder(
            dir.path().join("KEEP").to_string_lossy(),
        ))
        .unwrap();

    let policy = ExclusionPolicy::from_sink(&store).unwrap();
    assert_eq!(policy.user_rule_count(), 1);
    assert!(policy.is_excluded(&dir.path().join("keep").join("one.txt")));
    assert!(!policy.is_excluded(&dir.path().join("other").join("one.txt")));
}

#[test]
fn test_archiver_refuses_what_scan_excludes() {
    let dir = fixture();
    let target = dir.path().join("keep").join("one.txt");
    let policy = Arc::new(ExclusionPolicy::with_protected_dirs(
        vec![ExclusionRule::folder(
            dir.path().join("keep").to_string_lossy(),
        )],
        Vec::new(),
    ));
    let archiver = Archiver::new(dir.path().join("holding"), policy);

    assert!(matches!(
        archiver.archive(&target),
        Err(ArchiveError::Excluded(_))
    ));
    assert!(target.exists());
    assert!(archiver.list_archived().unwrap().is_empty());
}
