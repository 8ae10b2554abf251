//! Exit codes for CLI operations following Unix conventions.
//!
//! # Exit Code Semantics
//!
//! - `0`: Success - operation completed, results found
//! - `1`: General error - unspecified failure (including exhausted embedder retries)
//! - `2`: Blocking error - the index and its item lookup disagree
//! - `3`: Nothing found - query returned no results
//! - `5`: I/O error - unreadable corpus, matrix or index directory
//! - `6`: Configuration error - bad parameters, `k`, dimensions or row counts
//! - `7`: Index corrupted - a saved index failed validation
//! - `126-255`: Reserved by shell

use crate::error::{BuildError, EvalError, IndexError, QueryError};
use crate::vector::VectorError;

/// Standard exit codes for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// Internal consistency failure that should halt automation (code 2)
    BlockingError = 2,

    /// Query ran but produced no results (code 3)
    NotFound = 3,

    /// File I/O error (code 5)
    IoError = 5,

    /// Configuration error (code 6)
    ConfigError = 6,

    /// Index corruption detected (code 7)
    IndexCorrupted = 7,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

impl ExitCode {
    /// `Success` for a non-empty result list, `NotFound` otherwise.
    pub fn from_results<T>(results: &[T]) -> Self {
        if results.is_empty() {
            ExitCode::NotFound
        } else {
            ExitCode::Success
        }
    }

    /// Maps vector-layer errors, mostly from reading files.
    pub fn from_vector_error(error: &VectorError) -> Self {
        match error {
            VectorError::Storage(_) | VectorError::InvalidMatrix(_) => ExitCode::IoError,
            VectorError::DimensionMismatch { .. }
            | VectorError::InvalidDimension { .. }
            | VectorError::NonFiniteComponent { .. }
            | VectorError::ComponentOutOfRange { .. } => ExitCode::ConfigError,
            VectorError::VectorNotFound(_) => ExitCode::NotFound,
            _ => ExitCode::GeneralError,
        }
    }

    /// Convert an `IndexError` to the appropriate exit code.
    pub fn from_error(error: &IndexError) -> Self {
        if error.is_config_error() {
            return ExitCode::ConfigError;
        }
        match error {
            IndexError::IndexCorrupted { .. } => ExitCode::IndexCorrupted,
            IndexError::Consistency { .. } => ExitCode::BlockingError,
            IndexError::LoadError { .. } | IndexError::PersistenceError { .. } => {
                ExitCode::IoError
            }
            IndexError::Vector(e) => Self::from_vector_error(e),
            _ => ExitCode::GeneralError,
        }
    }

    pub fn from_build_error(error: &BuildError) -> Self {
        match error {
            BuildError::Index(e) => Self::from_error(e),
            BuildError::DuplicateId { .. } => ExitCode::ConfigError,
            _ => ExitCode::GeneralError,
        }
    }

    pub fn from_query_error(error: &QueryError) -> Self {
        match error {
            QueryError::Index(e) => Self::from_error(e),
            QueryError::MissingItem { .. } => ExitCode::BlockingError,
            QueryError::QueryFailed { .. } => ExitCode::GeneralError,
        }
    }

    pub fn from_eval_error(error: &EvalError) -> Self {
        match error {
            EvalError::RowCountMismatch { .. } => ExitCode::ConfigError,
            EvalError::Empty => ExitCode::NotFound,
            EvalError::Index(e) => Self::from_error(e),
        }
    }

    /// Check if this exit code indicates a blocking error.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, ExitCode::BlockingError)
    }

    /// Check if this exit code indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }

    /// Get a human-readable description of the exit code.
    pub fn description(&self) -> &str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::BlockingError => "Blocking error - automation should halt",
            ExitCode::NotFound => "Not found",
            ExitCode::IoError => "I/O error",
            ExitCode::ConfigError => "Configuration error",
            ExitCode::IndexCorrupted => "Index corrupted",
        }
    }
}
