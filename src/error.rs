//! Error types for the retrieval engine
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages. Errors are grouped by the
//! layer that raises them: the ANN index, the embedder boundary, the index
//! builder, the query service and the evaluator.

use std::path::PathBuf;
use thiserror::Error;

use crate::vector::{VectorError, VectorKey};

/// Errors raised by the ANN index and its persistence
#[derive(Error, Debug)]
pub enum IndexError {
    /// Invalid parameters, invalid `k`, or other usage errors
    #[error("Invalid configuration: {reason}")]
    ConfigError { reason: String },

    /// Vector validation and storage errors
    #[error(transparent)]
    Vector(#[from] VectorError),

    #[error("Index is sealed for search; no further vectors can be inserted")]
    Sealed,

    /// Graph and vector store disagree on the number of entries
    #[error("Index consistency violated: graph has {graph} nodes but store holds {store} vectors")]
    Consistency { graph: usize, store: usize },

    #[error("Failed to persist index to '{path}': {source}")]
    PersistenceError {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to load index from '{path}': {source}")]
    LoadError {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Index appears to be corrupted: {reason}")]
    IndexCorrupted { reason: String },
}

impl IndexError {
    /// Shorthand for a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::ConfigError {
            reason: reason.into(),
        }
    }

    /// True for errors that indicate caller or configuration mistakes.
    ///
    /// These are fatal and never retried.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigError { .. }
                | Self::Vector(
                    VectorError::DimensionMismatch { .. }
                        | VectorError::InvalidDimension { .. }
                        | VectorError::NonFiniteComponent { .. }
                        | VectorError::ComponentOutOfRange { .. }
                )
        )
    }

    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::ConfigError { .. } => "CONFIG_ERROR",
            Self::Vector(VectorError::DimensionMismatch { .. }) => "DIMENSION_MISMATCH",
            Self::Vector(VectorError::DuplicateKey(_)) => "DUPLICATE_KEY",
            Self::Vector(VectorError::VectorNotFound(_)) => "NOT_FOUND",
            Self::Vector(_) => "VECTOR_ERROR",
            Self::Sealed => "INDEX_SEALED",
            Self::Consistency { .. } => "CONSISTENCY_ERROR",
            Self::PersistenceError { .. } => "PERSISTENCE_ERROR",
            Self::LoadError { .. } => "LOAD_ERROR",
            Self::IndexCorrupted { .. } => "INDEX_CORRUPTED",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Vector(VectorError::DimensionMismatch { .. }) => vec![
                "The embedder and the index disagree on dimensionality",
                "Rebuild the index with 'mongoose build' using the current embedding model",
            ],
            Self::Vector(VectorError::DuplicateKey(_)) => vec![
                "Keys are unique per index; start from a fresh index before re-building",
                "If the corpus supplies ids, make sure they are unique",
            ],
            Self::Sealed => vec!["Build a new index instead of inserting into a sealed one"],
            Self::Consistency { .. } | Self::IndexCorrupted { .. } => vec![
                "Run 'mongoose build' to rebuild the index from the corpus",
                "Check for disk errors or filesystem corruption",
            ],
            Self::LoadError { .. } | Self::PersistenceError { .. } => vec![
                "Check that the index directory exists and is readable",
                "Run 'mongoose build' if you continue to have issues",
            ],
            _ => vec![],
        }
    }
}

/// Errors signalled by an embedding generator
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("Embedding request failed: {0}")]
    Transport(String),

    #[error("Embedding request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Embedding service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("Embedding service returned {actual} vectors for {expected} inputs")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Embedding model error: {0}")]
    Model(String),

    #[error("Embedding call was cancelled")]
    Cancelled,
}

impl EmbedError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout { .. } | Self::MalformedResponse(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::LengthMismatch { .. } | Self::Model(_) | Self::Cancelled => false,
        }
    }
}

/// Errors raised while building an index from a corpus
#[derive(Error, Debug)]
pub enum BuildError {
    /// A batch kept failing after every retry; earlier batches stay indexed
    #[error(
        "Build failed at batch {batch} ({item_count} items starting at corpus position {first_item}) after {attempts} attempt(s): {source}"
    )]
    BuildFailed {
        batch: usize,
        first_item: usize,
        item_count: usize,
        attempts: u32,
        #[source]
        source: EmbedError,
    },

    #[error("Build cancelled before batch {batch} was indexed")]
    Cancelled { batch: usize },

    /// The canary embedding used to discover the dimensionality failed
    #[error("Could not determine embedding dimension after {attempts} attempt(s): {source}")]
    Probe {
        attempts: u32,
        #[source]
        source: EmbedError,
    },

    #[error("Corpus id {id} appears more than once")]
    DuplicateId { id: u64 },

    #[error(transparent)]
    Index(#[from] IndexError),
}

impl BuildError {
    pub fn status_code(&self) -> String {
        match self {
            Self::BuildFailed { .. } => "BUILD_FAILED".to_string(),
            Self::Cancelled { .. } => "BUILD_CANCELLED".to_string(),
            Self::Probe { .. } => "EMBEDDER_UNAVAILABLE".to_string(),
            Self::DuplicateId { .. } => "DUPLICATE_KEY".to_string(),
            Self::Index(e) => e.status_code(),
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::BuildFailed { .. } => vec![
                "Items from earlier batches are indexed and can still be queried",
                "Re-run the build once the embedding service is reachable",
            ],
            Self::Probe { .. } => vec![
                "Check the embedding endpoint in .mongoose/settings.toml",
                "For the local model, ensure it can be downloaded on first use",
            ],
            Self::DuplicateId { .. } => vec!["Corpus ids must be unique"],
            Self::Index(e) => e.recovery_suggestions(),
            Self::Cancelled { .. } => vec![],
        }
    }
}

/// Errors raised while answering a query
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Query '{query}' failed after {attempts} attempt(s): {source}")]
    QueryFailed {
        query: String,
        attempts: u32,
        #[source]
        source: EmbedError,
    },

    #[error(transparent)]
    Index(#[from] IndexError),

    /// Internal consistency failure: the builder lookup lost track of a key
    #[error("Index returned key {key} with no corpus item; builder and index are out of sync")]
    MissingItem { key: VectorKey },
}

impl QueryError {
    pub fn status_code(&self) -> String {
        match self {
            Self::QueryFailed { .. } => "QUERY_FAILED".to_string(),
            Self::Index(e) => e.status_code(),
            Self::MissingItem { .. } => "CONSISTENCY_ERROR".to_string(),
        }
    }
}

/// Errors raised by the retrieval evaluator
#[derive(Error, Debug)]
pub enum EvalError {
    #[error(
        "Row count mismatch: reference has {reference} rows but queries have {queries}\nSuggestion: Both matrices must list the same items in the same order"
    )]
    RowCountMismatch { reference: usize, queries: usize },

    #[error("Nothing to evaluate: the reference matrix has no rows")]
    Empty,

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Result type alias for build operations
pub type BuildResult<T> = Result<T, BuildError>;

/// Result type alias for query operations
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(EmbedError::Transport("reset".into()).is_transient());
        assert!(EmbedError::Timeout { timeout_ms: 10 }.is_transient());
        assert!(
            EmbedError::Status {
                status: 503,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            EmbedError::Status {
                status: 429,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !EmbedError::Status {
                status: 400,
                body: String::new()
            }
            .is_transient()
        );
        assert!(!EmbedError::Cancelled.is_transient());
        assert!(
            !EmbedError::LengthMismatch {
                expected: 2,
                actual: 1
            }
            .is_transient()
        );
    }

    #[test]
    fn test_dimension_mismatch_is_config_error() {
        let err = IndexError::from(VectorError::DimensionMismatch {
            expected: 4,
            actual: 3,
        });
        assert!(err.is_config_error());
        assert_eq!(err.status_code(), "DIMENSION_MISMATCH");
        assert!(!err.recovery_suggestions().is_empty());

        let dup = IndexError::from(VectorError::DuplicateKey(VectorKey::new(1)));
        assert!(!dup.is_config_error());
    }

    #[test]
    fn test_build_failed_names_the_batch() {
        let err = BuildError::BuildFailed {
            batch: 2,
            first_item: 64,
            item_count: 32,
            attempts: 3,
            source: EmbedError::Timeout { timeout_ms: 500 },
        };
        let message = err.to_string();
        assert!(message.contains("batch 2"));
        assert!(message.contains("position 64"));
        assert_eq!(err.status_code(), "BUILD_FAILED");
    }
}
