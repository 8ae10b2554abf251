//! Vector primitives: keys, distances, storage, matrices and embedders.
//!
//! Everything the ANN graph needs beneath it lives here. The graph itself is
//! in [`crate::hnsw`]; corpus-level orchestration is in [`crate::semantic`].

mod distance;
mod embedding;
mod matrix;
mod store;
mod types;

pub use distance::{cosine_distance, cosine_similarity, normalize};
pub use embedding::{
    EmbeddingGenerator, FastEmbedGenerator, HttpEmbeddingGenerator, create_embedding_generator,
    model_to_string, parse_embedding_model,
};
pub use matrix::{Matrix, load_matrix, precision_for_path, save_matrix};
pub use store::{Slot, VectorStore};
pub use types::{Match, Metric, Precision, VectorDimension, VectorError, VectorKey};
