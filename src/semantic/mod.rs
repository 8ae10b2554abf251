//! Corpus-level retrieval built on the HNSW index
//!
//! This module turns text into a searchable index and back:
//! [`IndexBuilder`] embeds a corpus and fills an index, [`QueryService`]
//! answers queries against it, and [`RetrievalEvaluator`] measures how well
//! one embedding space retrieves its pair in another.

mod builder;
mod evaluator;
mod metadata;
mod query;
mod retry;

pub use builder::{
    BuildReport, CorpusItem, DEFAULT_BATCH_SIZE, IndexBuilder, PROBE_TEXT, load_corpus,
};
pub use evaluator::{RECALL_DEPTH, RecallReport, RetrievalEvaluator, SymmetricReport};
pub use metadata::{IndexMetadata, METADATA_FILE};
pub use query::{
    CONTEXT_UNAVAILABLE, GroundingContext, INDEX_FILE, ITEMS_FILE, QueryService, RetrievedItem,
};
pub use retry::{RetryError, RetryPolicy};

/// Built-in corpus used by `mongoose demo`
pub mod demo {
    use super::CorpusItem;

    /// Docstrings indexed by the demo
    pub const DEMO_TEXTS: [&str; 4] = [
        "torch.add(*demo)",
        "torch.mul(*demo)",
        "torch.div(*demo)",
        "torch.sub(*demo)",
    ];

    /// Neighbors returned per demo query
    pub const DEMO_K: usize = 10;

    pub fn corpus() -> Vec<CorpusItem> {
        DEMO_TEXTS.iter().map(|text| CorpusItem::new(*text)).collect()
    }
}
