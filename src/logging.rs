//! Logging setup for QuickPurge.
//!
//! QuickPurge logs through the `log` facade with `env_logger` behind it.
//! `RUST_LOG` wins when set. Otherwise `-q` keeps only errors, `-v` enables
//! debug and `-vv` trace for QuickPurge's own modules. Other crates stay at
//! `warn` unless tracing, so SQLite and walker internals do not flood scans.
//!
//! Debug builds and verbose runs print a timestamp and the log target (the
//! module path); release builds print a compact `LEVEL message` line.

use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

const CRATE_TARGET: &str = env!("CARGO_CRATE_NAME");

/// Install the global logger.
///
/// A second call is a no-op apart from a debug line, so hosts and tests may
/// call it freely.
pub fn init_logging(verbose: u8, quiet: bool) {
    let mut builder = Builder::from_env(Env::default().default_filter_or(""));
    let from_env = std::env::var_os("RUST_LOG").is_some();

    if !from_env {
        let own = determine_level(verbose, quiet);
        builder
            .filter_level(dependency_level(own))
            .filter_module(CRATE_TARGET, own);
    }

    let stamped = detailed_format(verbose);
    builder.format(move |buf, record| {
        let style = buf.default_level_style(record.level());
        if stamped {
            writeln!(
                buf,
                "{} {style}{:<5}{style:#} {}: {}",
                buf.timestamp_millis(),
                record.level(),
                record.target(),
                record.args()
            )
        } else {
            writeln!(buf, "{style}{:<5}{style:#} {}", record.level(), record.args())
        }
    });

    if builder.try_init().is_err() {
        log::debug!("Logger already installed; keeping the existing one");
        return;
    }
    log::debug!(
        "Logging ready ({})",
        if from_env { "RUST_LOG" } else { "command-line flags" }
    );
}

/// Level for QuickPurge's own modules. `quiet` wins over `verbose`.
pub fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    }
}

/// Whether lines carry a timestamp and module path.
fn detailed_format(verbose: u8) -> bool {
    cfg!(debug_assertions) || verbose > 0
}

/// Level for every other crate.
fn dependency_level(own: LevelFilter) -> LevelFilter {
    if own == LevelFilter::Trace {
        LevelFilter::Debug
    } else {
        own.min(LevelFilter::Warn)
    }
}
