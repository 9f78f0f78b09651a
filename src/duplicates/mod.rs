//! Duplicate detection.
//!
//! This module provides:
//! - Size bucketing of discovered files (phase 1)
//! - Content hashing of same-size candidates and duplicate recording (phase 2)
//! - Whole-system scans, one session per mounted volume

pub mod finder;
pub mod groups;

pub use finder::{ScanConfig, ScanEngine};
pub use groups::{non_overlapping_roots, SizeBuckets};
