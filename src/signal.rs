//! Cooperative cancellation and Ctrl+C handling.
//!
//! Every long-running operation in QuickPurge polls a single [`CancelFlag`].
//! The flag is an `Arc<AtomicBool>` shared between the interface thread
//! (which sets it, directly or from the Ctrl+C hook) and the scan worker
//! (which checks it before each file and before each volume).
//!
//! # Usage
//!
//! ```rust,no_run
//! use quickpurge::signal::install_handler;
//!
//! let cancel = install_handler().expect("Failed to install signal handler");
//!
//! // Hand a clone to the worker thread
//! let worker_flag = cancel.clone();
//! std::thread::spawn(move || {
//!     if worker_flag.is_cancelled() {
//!         return;
//!     }
//! });
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Exit code for SIGINT (Ctrl+C) interruption.
/// This follows Unix convention: 128 + signal number (SIGINT = 2).
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Thread-safe queryable cancel signal.
///
/// Clones share the same underlying flag, so cancelling any clone is
/// observed by all of them.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
}

impl CancelFlag {
    /// Create a flag that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Clear a previous cancellation so the flag can be reused for the next run.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_FLAG: OnceLock<CancelFlag> = OnceLock::new();

/// Install a Ctrl+C handler that cancels the returned flag.
///
/// The hook can only be registered once per process. Later calls reset and
/// return the already installed flag; if some other component owns the hook,
/// an unhooked flag is returned that still works for manual cancellation.
///
/// # Errors
///
/// Currently always succeeds; the `Result` keeps the signature stable for
/// platforms where registration can fail hard.
pub fn install_handler() -> Result<CancelFlag, SignalError> {
    if let Some(flag) = GLOBAL_FLAG.get() {
        flag.reset();
        return Ok(flag.clone());
    }

    let cancel = CancelFlag::new();
    let hook = cancel.clone();

    match ctrlc::set_handler(move || {
        hook.cancel();

        let _ = writeln!(std::io::stderr(), "\nInterrupted. Finishing current file...");
        let _ = std::io::stderr().flush();

        log::info!("Cancellation signal received");
    }) {
        Ok(()) => {
            let _ = GLOBAL_FLAG.set(cancel.clone());
            Ok(cancel)
        }
        Err(e) => {
            if let Some(flag) = GLOBAL_FLAG.get() {
                flag.reset();
                Ok(flag.clone())
            } else {
                log::debug!("Ctrl+C handler unavailable ({}), using unhooked flag", e);
                let _ = GLOBAL_FLAG.set(cancel.clone());
                Ok(cancel)
            }
        }
    }
}
