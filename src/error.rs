//! Exit codes and structured error reporting for the binary.

use serde::Serialize;

/// Process exit codes.
///
/// - 0: Success (completed normally, duplicates found)
/// - 1: General error (unexpected failure)
/// - 2: No duplicates found (scan completed, nothing to report)
/// - 3: Partial success (some archive/restore/purge operations failed)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Completed normally.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// Scan completed but found no duplicate groups.
    NoDuplicates = 2,
    /// Batch operation finished with at least one per-file failure.
    PartialSuccess = 3,
    /// Cancelled by the operator.
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "QP000",
            Self::GeneralError => "QP001",
            Self::NoDuplicates => "QP002",
            Self::PartialSuccess => "QP003",
            Self::Interrupted => "QP130",
        }
    }
}

/// Structured error information for JSON error output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "QP001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including the context chain
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{:#}", err),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
