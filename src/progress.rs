//! Progress events and their delivery to the interface thread.
//!
//! The scan worker never touches interface state. It pushes [`ScanEvent`]s
//! into a bounded queue created by [`channel`], and the owning thread drains
//! the queue on a timer and renders it (for the CLI, with [`ConsoleProgress`]).
//!
//! Non-terminal events are best effort: when the queue is full they are
//! dropped so the worker never blocks. The terminal [`ScanEvent::Done`] is
//! sent with a bounded wait so the observer always learns the scan ended.

use std::path::PathBuf;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use indicatif::{ProgressBar, ProgressStyle};

use crate::store::{ScanTotals, SessionId};

/// How long the terminal event may wait for queue space.
const TERMINAL_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Summary carried by the terminal event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub totals: ScanTotals,
    /// The scan stopped because the cancel flag was raised.
    pub cancelled: bool,
}

/// Progress events emitted by the scan engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// Traversal of a root begins.
    Start { root: PathBuf },
    /// A volume scan begins (whole-system scans only).
    Volume { mount: PathBuf },
    /// Periodic grouping progress.
    Grouping { files_scanned: u64 },
    /// A candidate file is about to be hashed.
    Hashing {
        path: PathBuf,
        files_scanned: u64,
        total_files: u64,
        percent: u8,
    },
    /// A volume finished (whole-system scans only). Not terminal.
    VolumeFinished {
        mount: PathBuf,
        session_id: Option<SessionId>,
    },
    /// Exactly one per invocation. `session_id` is `None` on cancellation or
    /// store failure.
    Done {
        session_id: Option<SessionId>,
        report: ScanReport,
    },
    /// A non-fatal problem worth showing to the operator.
    Error { message: String },
}

impl ScanEvent {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

/// Create a bounded progress queue.
#[must_use]
pub fn channel(capacity: usize) -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    (ProgressSender { tx: Some(tx) }, ProgressReceiver { rx })
}

/// Worker side of the progress queue.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: Option<Sender<ScanEvent>>,
}

impl ProgressSender {
    /// A sender that discards everything, for callers that do not observe progress.
    #[must_use]
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    /// Queue an event without blocking the worker.
    ///
    /// Non-terminal events are dropped on a full queue; the terminal event
    /// waits up to one second for space.
    pub fn send(&self, event: ScanEvent) {
        let Some(tx) = &self.tx else {
            return;
        };

        if event.is_terminal() {
            if tx.send_timeout(event, TERMINAL_SEND_TIMEOUT).is_err() {
                log::warn!("Progress observer did not accept the final event");
            }
            return;
        }

        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => log::trace!("Progress queue full, dropping event"),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Interface side of the progress queue.
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: Receiver<ScanEvent>,
}

impl ProgressReceiver {
    /// Take every event currently queued.
    pub fn drain(&self) -> Vec<ScanEvent> {
        self.rx.try_iter().collect()
    }

    /// Wait at most `timeout` for the next event.
    ///
    /// Returns `None` on timeout or once every sender is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ScanEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Collect events up to and including the terminal one.
    ///
    /// Stops early if no event arrives within `idle_timeout`.
    pub fn collect_until_done(&self, idle_timeout: Duration) -> Vec<ScanEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.recv_timeout(idle_timeout) {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }
}

/// Terminal renderer for scan events using indicatif.
///
/// A spinner counts files during grouping; a bar tracks hashing.
pub struct ConsoleProgress {
    bar: Option<ProgressBar>,
    hashing: bool,
    quiet: bool,
}

impl ConsoleProgress {
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            bar: None,
            hashing: false,
            quiet,
        }
    }

    fn grouping_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} files")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
    }

    fn hashing_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn start_spinner(&mut self, message: String) {
        self.finish_bar();
        let pb = ProgressBar::new_spinner();
        pb.set_style(Self::grouping_style());
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        self.bar = Some(pb);
        self.hashing = false;
    }

    fn finish_bar(&mut self) {
        if let Some(pb) = self.bar.take() {
            pb.finish_and_clear();
        }
    }

    /// Render one event.
    pub fn handle(&mut self, event: &ScanEvent) {
        if self.quiet {
            return;
        }

        match event {
            ScanEvent::Start { root } => {
                self.start_spinner(format!("Scanning {}", truncate_path(&root.to_string_lossy(), 40)));
            }
            ScanEvent::Volume { mount } => {
                self.start_spinner(format!("Volume {}", mount.display()));
            }
            ScanEvent::Grouping { files_scanned } => {
                if let Some(pb) = &self.bar {
                    pb.set_position(*files_scanned);
                }
            }
            ScanEvent::Hashing {
                path,
                files_scanned,
                total_files,
                ..
            } => {
                if !self.hashing {
                    self.finish_bar();
                    let pb = ProgressBar::new(*total_files);
                    pb.set_style(Self::hashing_style());
                    self.bar = Some(pb);
                    self.hashing = true;
                }
                if let Some(pb) = &self.bar {
                    pb.set_length(*total_files);
                    pb.set_position(*files_scanned);
                    pb.set_message(truncate_path(&path.to_string_lossy(), 30));
                }
            }
            ScanEvent::VolumeFinished { mount, .. } => {
                self.finish_bar();
                log::info!("Finished volume {}", mount.display());
            }
            ScanEvent::Error { message } => match &self.bar {
                Some(pb) => pb.println(format!("warning: {}", message)),
                None => log::warn!("{}", message),
            },
            ScanEvent::Done { .. } => self.finish_bar(),
        }
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let name_len = file_name.chars().count();
    if name_len + 4 > max_len {
        let tail: String = file_name
            .chars()
            .skip(name_len.saturating_sub(max_len.saturating_sub(3)))
            .collect();
        return format!("...{}", tail);
    }

    format!(".../{}", file_name)
}
