//! CLI error types and exit codes.

use thiserror::Error;

use campus_import::prelude::ImportError;

/// Exit codes:
/// - 0: import completed cleanly
/// - 1: import completed with tolerated per-record errors
/// - 2: import aborted or never started
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Import(#[from] ImportError),

    #[error("import completed with {0} failed record(s); see the summary artifact")]
    CompletedWithErrors(usize),

    #[error("import aborted after {0} failed record(s): error budget exceeded")]
    Aborted(usize),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::CompletedWithErrors(_) => 1,
            CliError::Import(_) | CliError::Aborted(_) => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_completed_with_errors() {
        assert_eq!(CliError::CompletedWithErrors(3).exit_code(), 1);
    }

    #[test]
    fn test_exit_code_aborted() {
        assert_eq!(CliError::Aborted(4).exit_code(), 2);
    }

    #[test]
    fn test_exit_code_fatal() {
        let err = CliError::Import(ImportError::configuration("bad config"));
        assert_eq!(err.exit_code(), 2);
    }
}
