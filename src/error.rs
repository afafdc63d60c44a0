//! Exit codes and structured error output.

use serde::Serialize;

use crate::actions::DisposalReport;
use crate::scanner::ScanSummary;

/// Process exit codes.
///
/// - 0: Success
/// - 1: General error (unexpected failure)
/// - 2: No duplicates found
/// - 3: Partial success (scan errors or disposal failures)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    NoDuplicates = 2,
    PartialSuccess = 3,
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
            Self::Success => "ID000",
            Self::GeneralError => "ID001",
            Self::NoDuplicates => "ID002",
            Self::PartialSuccess => "ID003",
            Self::Interrupted => "ID130",
        }
    }

    /// Outcome of a finished scan.
    #[must_use]
    pub fn for_scan(summary: &ScanSummary) -> Self {
        if summary.interrupted {
            Self::Interrupted
        } else if summary.has_errors() {
            Self::PartialSuccess
        } else if summary.duplicate_groups == 0 {
            Self::NoDuplicates
        } else {
            Self::Success
        }
    }

    /// Outcome of a disposal batch.
    #[must_use]
    pub fn for_disposal(report: &DisposalReport) -> Self {
        if report.all_succeeded() {
            Self::Success
        } else {
            Self::PartialSuccess
        }
    }
}

/// Structured error information for `--json-errors`.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "ID001")
    pub code: String,
    pub exit_code: i32,
    /// Error message including its causes
    pub message: String,
    pub interrupted: bool,
}

impl StructuredError {
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
