//! Application layer behind the `quickpurge` binary.
//!
//! Owns everything the library core leaves to its host: loading settings,
//! opening (and if needed recovering) the result store, running scans on a
//! worker thread while the main thread renders progress, and printing
//! results.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use bytesize::ByteSize;
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use yansi::Paint;

use crate::actions::{ArchiveProgressCallback, ArchivedFile, Archiver, BatchArchiveResult};
use crate::cache::DigestCache;
use crate::cli::{ArchiveArgs, Cli, Commands, ExcludeCommand};
use crate::config::Settings;
use crate::duplicates::{ScanConfig, ScanEngine};
use crate::error::ExitCode;
use crate::exclusion::paths::absolute_lexical;
use crate::exclusion::ExclusionPolicy;
use crate::logging;
use crate::progress::{self, ConsoleProgress, ScanEvent, ScanReport};
use crate::signal;
use crate::store::{ExclusionRule, IntegrityStatus, ResultSink, SessionId, SqliteStore};

/// How often the main thread drains the progress queue.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What a scan run covers.
enum ScanTarget {
    Roots(Vec<PathBuf>),
    System,
}

/// Run the parsed command line and return the process exit code.
///
/// # Errors
///
/// Any failure that should abort the command; `main` prints it with its
/// `QP###` code.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    if cli.no_color {
        yansi::disable();
    }

    let settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    log::debug!("Settings: {:?}", settings);

    let open = || open_store(&settings.database_path).map(Arc::new);

    match cli.command {
        Commands::Scan(args) => run_scan(
            &open()?,
            &settings,
            ScanTarget::Roots(args.paths),
            cli.quiet,
        ),
        Commands::ScanSystem => run_scan(&open()?, &settings, ScanTarget::System, cli.quiet),
        Commands::Groups(args) => {
            let store = open()?;
            let session = resolve_session(store.as_ref(), args.session)?;
            let groups = print_groups(store.as_ref(), session)?;
            Ok(if groups == 0 {
                ExitCode::NoDuplicates
            } else {
                ExitCode::Success
            })
        }
        Commands::History(args) => {
            let store = open()?;
            if args.clear {
                store.clear_all()?;
                println!("Scan history cleared.");
            } else {
                print_history(store.as_ref(), args.limit)?;
            }
            Ok(ExitCode::Success)
        }
        Commands::Dismiss(args) => {
            let store = open()?;
            let session = resolve_session(store.as_ref(), args.session)?;
            let removed = dismiss_group(store.as_ref(), session, &args.digest)?;
            println!("Dismissed {} record(s) from session {}.", removed, session);
            Ok(ExitCode::Success)
        }
        Commands::Archive(args) => archive(&open()?, &settings, &args, cli.quiet),
        Commands::Restore(args) => restore(&open()?, &settings, &args.paths),
        Commands::Purge(args) => {
            if !args.yes {
                bail!("Refusing to permanently delete without --yes");
            }
            purge(&open()?, &settings, &args.paths)
        }
        Commands::Archived(args) => {
            let archiver = archiver(&open()?, &settings)?;
            if args.prune {
                let removed = archiver.remove_stale_sidecars()?;
                println!("Removed {} stale metadata file(s).", removed);
            }
            print_archived(&archiver)?;
            Ok(ExitCode::Success)
        }
        Commands::Exclude(cmd) => exclude(open()?.as_ref(), cmd),
        Commands::CheckDb(args) => check_db(&settings.database_path, args.repair),
    }
}

/// Open the result store, moving a corrupt database aside first.
///
/// # Errors
///
/// Fails if the database cannot be opened even after recovery.
pub fn open_store(path: &Path) -> Result<SqliteStore> {
    match SqliteStore::check_integrity(path) {
        Ok(IntegrityStatus::Ok | IntegrityStatus::Missing) => {}
        Ok(IntegrityStatus::Corrupt(reason)) => {
            log::warn!("Result database is corrupt ({}), recreating it", reason);
            let backup = quarantine_database(path)?;
            log::warn!("Corrupt database moved to {}", backup.display());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to probe {}", path.display()));
        }
    }

    SqliteStore::open(path).with_context(|| format!("Failed to open {}", path.display()))
}

/// Rename a database (and its WAL side files) to `<db>.corrupt-<timestamp>.bak`.
///
/// # Errors
///
/// Fails if the main database file cannot be renamed.
pub fn quarantine_database(path: &Path) -> Result<PathBuf> {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let mut backup = path.as_os_str().to_os_string();
    backup.push(format!(".corrupt-{}.bak", stamp));
    let backup = PathBuf::from(backup);

    fs::rename(path, &backup).with_context(|| {
        format!(
            "Failed to move {} to {}",
            path.display(),
            backup.display()
        )
    })?;

    for suffix in ["-wal", "-shm"] {
        let mut side = path.as_os_str().to_os_string();
        side.push(suffix);
        let side = PathBuf::from(side);
        if side.exists() {
            if let Err(e) = fs::remove_file(&side) {
                log::warn!("Could not remove {}: {}", side.display(), e);
            }
        }
    }
    Ok(backup)
}

fn check_db(path: &Path, repair: bool) -> Result<ExitCode> {
    let status = SqliteStore::check_integrity(path)
        .with_context(|| format!("Failed to probe {}", path.display()))?;

    match status {
        IntegrityStatus::Ok => {
            println!("{} {}", "ok".green().bold(), path.display());
            Ok(ExitCode::Success)
        }
        IntegrityStatus::Missing => {
            println!("No database at {} yet", path.display());
            Ok(ExitCode::Success)
        }
        IntegrityStatus::Corrupt(reason) if repair => {
            let backup = quarantine_database(path)?;
            SqliteStore::open(path)
                .with_context(|| format!("Failed to recreate {}", path.display()))?;
            println!(
                "{} corrupt database moved to {}, fresh database created",
                "repaired".yellow().bold(),
                backup.display()
            );
            log::debug!("Corruption detail: {}", reason);
            Ok(ExitCode::Success)
        }
        IntegrityStatus::Corrupt(reason) => Err(anyhow!(
            "Database {} is corrupt ({}); rerun with --repair",
            path.display(),
            reason
        )),
    }
}

fn run_scan(
    store: &Arc<SqliteStore>,
    settings: &Settings,
    target: ScanTarget,
    quiet: bool,
) -> Result<ExitCode> {
    let cancel = signal::install_handler()?;
    let policy = Arc::new(
        ExclusionPolicy::from_sink(store.as_ref()).context("Failed to load exclusion rules")?,
    );
    log::debug!("{} user exclusion rule(s) active", policy.user_rule_count());

    let sink: Arc<dyn ResultSink> = store.clone();
    let engine = ScanEngine::new(sink, policy, ScanConfig::from(settings))
        .with_digest_cache(Arc::new(DigestCache::new(settings.digest_cache_capacity)));

    let (tx, rx) = progress::channel(settings.event_queue_capacity);
    let worker = thread::Builder::new()
        .name("scan-worker".into())
        .spawn(move || match target {
            ScanTarget::Roots(roots) => engine.scan(&roots, &tx, &cancel),
            ScanTarget::System => engine.scan_entire_system(&tx, &cancel),
        })
        .context("Failed to start scan worker")?;

    let mut console = ConsoleProgress::new(quiet);
    let mut report: Option<ScanReport> = None;
    loop {
        // Checked before draining so a finished worker's events are all seen.
        let finished = worker.is_finished();
        for event in rx.drain() {
            console.handle(&event);
            if let ScanEvent::Done { report: r, .. } = event {
                report = Some(r);
            }
        }
        if report.is_some() || finished {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    let outcome = worker
        .join()
        .map_err(|_| anyhow!("Scan worker panicked"))?;
    let session = outcome.context("Scan failed")?;
    let report = report.unwrap_or_default();

    if report.cancelled {
        eprintln!("{}", "Scan cancelled.".yellow());
        return Ok(ExitCode::Interrupted);
    }

    let Some(session) = session else {
        println!("Nothing was scanned.");
        return Ok(ExitCode::NoDuplicates);
    };

    println!(
        "Examined {} files: {} duplicate(s), {} reclaimable",
        report.totals.files,
        report.totals.duplicates,
        ByteSize(report.totals.bytes_saved)
    );
    let groups = print_groups(store.as_ref(), session)?;
    Ok(if groups == 0 {
        ExitCode::NoDuplicates
    } else {
        ExitCode::Success
    })
}

/// The requested session, or the most recent completed one.
fn resolve_session(sink: &dyn ResultSink, requested: Option<i64>) -> Result<SessionId> {
    if let Some(id) = requested {
        let id = SessionId(id);
        return match sink.session(id)? {
            Some(_) => Ok(id),
            None => Err(anyhow!("No scan session with id {}", id)),
        };
    }
    latest_session(sink)?.ok_or_else(|| anyhow!("No completed scan yet; run `quickpurge scan` first"))
}

fn latest_session(sink: &dyn ResultSink) -> Result<Option<SessionId>> {
    Ok(sink
        .list_sessions(None)?
        .into_iter()
        .find(|s| s.is_complete())
        .map(|s| s.id))
}

fn print_groups(sink: &dyn ResultSink, session: SessionId) -> Result<usize> {
    let groups = sink.list_duplicate_groups(session)?;
    if groups.is_empty() {
        println!("No duplicates in session {}.", session);
        return Ok(0);
    }

    let mut reclaimable = 0;
    for (i, group) in groups.iter().enumerate() {
        let paths = group.paths();
        println!(
            "{} {} files of {} [{}]",
            format!("Group {}:", i + 1).bold(),
            paths.len(),
            ByteSize(group.size),
            short_digest(&group.digest).dim()
        );
        for (j, path) in paths.iter().enumerate() {
            if j == 0 {
                println!("  {}", path.display().green());
            } else {
                println!("  {}", path.display().dim());
            }
        }
        reclaimable += group.reclaimable();
    }
    println!(
        "{} group(s), {} reclaimable (session {})",
        groups.len(),
        ByteSize(reclaimable).bold(),
        session
    );
    Ok(groups.len())
}

fn short_digest(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}

/// Drop the group whose digest starts with `prefix`.
fn dismiss_group(sink: &dyn ResultSink, session: SessionId, prefix: &str) -> Result<usize> {
    let prefix = prefix.to_ascii_lowercase();
    let mut matches: Vec<String> = sink
        .list_duplicate_groups(session)?
        .into_iter()
        .map(|g| g.digest)
        .filter(|d| d.starts_with(&prefix))
        .collect();
    matches.dedup();
    match matches.as_slice() {
        [] => bail!("No group in session {} matches {}", session, prefix),
        [digest] => Ok(sink.remove_duplicate_group(session, digest)?),
        _ => bail!("Digest prefix {} is ambiguous in session {}", prefix, session),
    }
}

fn print_history(sink: &dyn ResultSink, limit: usize) -> Result<()> {
    let sessions = sink.list_sessions(Some(limit))?;
    if sessions.is_empty() {
        println!("No scans recorded.");
        return Ok(());
    }

    let header = format!(
        "{:>6}  {:<19}  {:>10}  {:>10}  {:>12}",
        "ID", "STARTED", "FILES", "DUPES", "RECLAIMABLE"
    );
    println!("{}", header.bold());
    for s in sessions {
        let started = s
            .started_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        match s.totals {
            Some(t) => println!(
                "{:>6}  {:<19}  {:>10}  {:>10}  {:>12}",
                s.id,
                started,
                t.files,
                t.duplicates,
                ByteSize(t.bytes_saved).to_string()
            ),
            None => println!(
                "{:>6}  {:<19}  {}",
                s.id,
                started,
                "incomplete".yellow()
            ),
        }
    }
    Ok(())
}

fn archiver(store: &Arc<SqliteStore>, settings: &Settings) -> Result<Archiver> {
    let policy =
        ExclusionPolicy::from_sink(store.as_ref()).context("Failed to load exclusion rules")?;
    Ok(Archiver::new(settings.archive_dir.clone(), Arc::new(policy)))
}

/// Renders batch archive progress with indicatif.
struct ConsoleArchiveProgress {
    bar: ProgressBar,
}

impl ConsoleArchiveProgress {
    fn new(total: usize, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total as u64)
        };
        bar.set_style(
            ProgressStyle::with_template("[{bar:30.green/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█>-"),
        );
        Self { bar }
    }
}

impl ArchiveProgressCallback for ConsoleArchiveProgress {
    fn on_before_archive(&self, path: &Path, _index: usize, _total: usize) {
        self.bar.set_message(
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
    }

    fn on_archive_success(&self, archived: &ArchivedFile) {
        self.bar.inc(1);
        self.bar.println(format!(
            "{} {} -> {}",
            "archived".green(),
            archived.original.display(),
            archived.archived.display()
        ));
    }

    fn on_archive_failure(&self, path: &Path, error: &str) {
        self.bar.inc(1);
        self.bar
            .println(format!("{} {}: {}", "failed".red(), path.display(), error));
    }

    fn on_complete(&self, _result: &BatchArchiveResult) {
        self.bar.finish_and_clear();
    }
}

fn archive(
    store: &Arc<SqliteStore>,
    settings: &Settings,
    args: &ArchiveArgs,
    quiet: bool,
) -> Result<ExitCode> {
    let archiver = archiver(store, settings)?;
    let session = match args.session {
        Some(id) => Some(resolve_session(store.as_ref(), Some(id))?),
        None => latest_session(store.as_ref())?,
    };

    let progress = ConsoleArchiveProgress::new(args.paths.len(), quiet);
    let result = match session {
        Some(session) => {
            archiver.archive_duplicates(store.as_ref(), session, &args.paths, Some(&progress))
        }
        None => archiver.archive_batch(&args.paths, Some(&progress)),
    };

    println!("{}", result.summary());
    batch_exit_code(result.success_count(), result.failure_count(), "archived")
}

fn restore(store: &Arc<SqliteStore>, settings: &Settings, paths: &[PathBuf]) -> Result<ExitCode> {
    let archiver = archiver(store, settings)?;
    let mut ok = 0;
    let mut failed = 0;
    for path in paths {
        match archiver.restore(path) {
            Ok(original) => {
                ok += 1;
                println!("{} {}", "restored".green(), original.display());
            }
            Err(e) => {
                failed += 1;
                eprintln!("{} {}: {}", "failed".red(), path.display(), e);
            }
        }
    }
    batch_exit_code(ok, failed, "restored")
}

fn purge(store: &Arc<SqliteStore>, settings: &Settings, paths: &[PathBuf]) -> Result<ExitCode> {
    let archiver = archiver(store, settings)?;
    let mut ok = 0;
    let mut failed = 0;
    for path in paths {
        match archiver.permanent_delete(path) {
            Ok(()) => {
                ok += 1;
                println!("{} {}", "deleted".red(), path.display());
            }
            Err(e) => {
                failed += 1;
                eprintln!("{} {}: {}", "failed".red(), path.display(), e);
            }
        }
    }
    batch_exit_code(ok, failed, "deleted")
}

/// Success, partial success, or an error when nothing worked.
fn batch_exit_code(ok: usize, failed: usize, verb: &str) -> Result<ExitCode> {
    match (ok, failed) {
        (_, 0) => Ok(ExitCode::Success),
        (0, n) => Err(anyhow!("No files {} ({} failed)", verb, n)),
        _ => Ok(ExitCode::PartialSuccess),
    }
}

fn print_archived(archiver: &Archiver) -> Result<()> {
    let entries = archiver.list_archived()?;
    if entries.is_empty() {
        println!("Holding directory {} is empty.", archiver.holding_dir().display());
        return print_stale_sidecars(archiver);
    }

    for entry in &entries {
        let name = entry
            .payload
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match &entry.original_path {
            Some(original) => println!(
                "{}  {:>10}  from {}",
                name,
                ByteSize(entry.size).to_string(),
                original.display()
            ),
            None => println!(
                "{}  {:>10}  {}",
                name,
                ByteSize(entry.size).to_string(),
                "no metadata, delete only".yellow()
            ),
        }
    }
    let total: u64 = entries.iter().map(|e| e.size).sum();
    println!("{} archived file(s), {}", entries.len(), ByteSize(total));
    print_stale_sidecars(archiver)
}

fn print_stale_sidecars(archiver: &Archiver) -> Result<()> {
    let stale = archiver.stale_sidecars()?;
    if stale.is_empty() {
        return Ok(());
    }
    for sidecar in &stale {
        println!("{}  {}", sidecar.display(), "stale metadata".yellow());
    }
    println!(
        "{} stale metadata file(s); remove them with `quickpurge archived --prune`",
        stale.len()
    );
    Ok(())
}

fn exclude(sink: &dyn ResultSink, cmd: ExcludeCommand) -> Result<ExitCode> {
    match cmd {
        ExcludeCommand::Add { pattern, suffix } => {
            let rule = if suffix {
                ExclusionRule::suffix(pattern)
            } else {
                ExclusionRule::folder(
                    absolute_lexical(Path::new(&pattern))
                        .to_string_lossy()
                        .into_owned(),
                )
            };
            sink.add_rule(&rule)?;
            println!("Added rule: {}", rule.pattern);
        }
        ExcludeCommand::Remove { pattern } => {
            let mut removed = sink.remove_rule(&pattern)?;
            if removed == 0 {
                let absolute = absolute_lexical(Path::new(&pattern));
                removed = sink.remove_rule(&absolute.to_string_lossy())?;
            }
            if removed == 0 {
                println!("No rule matches {}", pattern);
            } else {
                println!("Removed {} rule(s)", removed);
            }
        }
        ExcludeCommand::List => {
            let rules = sink.list_rules()?;
            if rules.is_empty() {
                println!("No user exclusion rules.");
            }
            for rule in rules {
                let kind = if rule.is_folder { "folder" } else { "suffix" };
                println!("{:<7} {}", kind.dim(), rule.pattern);
            }
        }
    }
    Ok(ExitCode::Success)
}
