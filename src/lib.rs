//! Embedding-indexed approximate nearest neighbor search.
//!
//! Text goes through an [`EmbeddingGenerator`](vector::EmbeddingGenerator)
//! into an [`HnswIndex`], which answers k-nearest-neighbor queries under
//! cosine distance. [`IndexBuilder`] and [`QueryService`] wire the two
//! together for a corpus, and [`RetrievalEvaluator`] measures recall between
//! paired embedding matrices.

pub mod config;
pub mod display;
pub mod error;
pub mod hnsw;
pub mod io;
pub mod semantic;
pub mod vector;

// Explicit exports for better API clarity
pub use config::Settings;
pub use error::{
    BuildError, BuildResult, EmbedError, EvalError, IndexError, IndexResult, QueryError,
    QueryResult,
};
pub use hnsw::{HnswConfig, HnswIndex, IndexPhase};
pub use semantic::{
    BuildReport, CorpusItem, GroundingContext, IndexBuilder, QueryService, RecallReport,
    RetrievalEvaluator, RetrievedItem, RetryPolicy,
};
pub use vector::{
    Match, Matrix, Metric, Precision, VectorDimension, VectorError, VectorKey, VectorStore,
};
