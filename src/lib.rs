//! QuickPurge - duplicate file finder with a recoverable archive
//!
//! Finds duplicate files across directory trees or whole volumes by size and
//! BLAKE3 content hash, records them in a SQLite result store, and moves the
//! copies an operator selects into a holding directory from which they can be
//! restored or permanently deleted.

pub mod actions;
pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod exclusion;
pub mod logging;
pub mod progress;
pub mod scanner;
pub mod signal;
pub mod store;

pub use app::run_app;
