//! End-to-end query answering over a built index.
//!
//! A [`QueryService`] owns a sealed [`HnswIndex`], the key to item lookup,
//! and the embedder that produced the vectors. It can be saved to and loaded
//! from an index directory:
//!
//! ```text
//! <dir>/index.bin      HNSW snapshot
//! <dir>/items.json     key -> item text
//! <dir>/metadata.json  model, dimension, count, timestamps
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{EmbedError, IndexError, IndexResult, QueryError, QueryResult};
use crate::hnsw::HnswIndex;
use crate::semantic::metadata::IndexMetadata;
use crate::semantic::retry::RetryPolicy;
use crate::vector::{EmbeddingGenerator, Match, VectorKey};

pub const INDEX_FILE: &str = "index.bin";
pub const ITEMS_FILE: &str = "items.json";

/// Message handed to the conversation layer when retrieval fails.
pub const CONTEXT_UNAVAILABLE: &str = "context retrieval unavailable";

/// One ranked query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedItem {
    pub key: VectorKey,
    pub text: String,
    pub distance: f32,
}

impl RetrievedItem {
    /// Cosine similarity to the query.
    #[must_use]
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

/// Retrieval outcome for prompt grounding.
///
/// Never an error: a failed query degrades to `Unavailable`.
#[derive(Debug, Clone, PartialEq)]
pub enum GroundingContext {
    Available(Vec<RetrievedItem>),
    Unavailable { reason: String },
}

impl GroundingContext {
    /// Text to splice into a prompt: one item per line, or the
    /// unavailability notice.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Available(items) => items
                .iter()
                .map(|item| item.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Unavailable { .. } => CONTEXT_UNAVAILABLE.to_string(),
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredItem {
    key: u64,
    text: String,
}

/// Answers `query(text, k)` against a read-only index.
pub struct QueryService {
    index: Arc<HnswIndex>,
    items: Arc<HashMap<VectorKey, String>>,
    embedder: Arc<dyn EmbeddingGenerator>,
    retry: RetryPolicy,
}

impl QueryService {
    pub fn new(
        index: HnswIndex,
        items: HashMap<VectorKey, String>,
        embedder: Arc<dyn EmbeddingGenerator>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            index: Arc::new(index),
            items: Arc::new(items),
            embedder,
            retry,
        }
    }

    /// Embeds `text` and returns the `k` nearest items, closest first.
    pub async fn query(&self, text: &str, k: usize) -> QueryResult<Vec<RetrievedItem>> {
        self.query_with_cancel(text, k, &CancellationToken::new())
            .await
    }

    pub async fn query_with_cancel(
        &self,
        text: &str,
        k: usize,
        cancel: &CancellationToken,
    ) -> QueryResult<Vec<RetrievedItem>> {
        if k == 0 {
            return Err(IndexError::config("k must be at least 1").into());
        }

        let started = Instant::now();
        let input = vec![text.to_string()];
        let embedder = Arc::clone(&self.embedder);
        let query_failed = |attempts, source| QueryError::QueryFailed {
            query: text.to_string(),
            attempts,
            source,
        };

        let (mut vectors, attempts) = self
            .retry
            .run("query embedding", cancel, || {
                let embedder = Arc::clone(&embedder);
                let input = input.clone();
                async move { embedder.generate_embeddings(&input).await }
            })
            .await
            .map_err(|failure| query_failed(failure.attempts, failure.source))?;

        if vectors.len() != 1 {
            return Err(query_failed(
                attempts,
                EmbedError::LengthMismatch {
                    expected: 1,
                    actual: vectors.len(),
                },
            ));
        }
        let vector = vectors.swap_remove(0);

        let results = self.search_vector(&vector, k)?;
        debug!(
            "Query answered with {} results in {:.1}ms",
            results.len(),
            started.elapsed().as_secs_f64() * 1000.0
        );
        Ok(results)
    }

    /// Searches with a precomputed query embedding.
    pub fn search_vector(&self, vector: &[f32], k: usize) -> QueryResult<Vec<RetrievedItem>> {
        let matches = self.index.search(vector, k)?;
        self.resolve(matches)
    }

    /// Like [`query`](Self::query), but reports failure as
    /// [`GroundingContext::Unavailable`] instead of an error.
    pub async fn grounding_context(&self, text: &str, k: usize) -> GroundingContext {
        match self.query(text, k).await {
            Ok(items) => GroundingContext::Available(items),
            Err(e) => {
                warn!("Retrieval failed, answering without context: {e}");
                GroundingContext::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    #[must_use]
    pub fn index(&self) -> &HnswIndex {
        &self.index
    }

    #[must_use]
    pub fn item(&self, key: VectorKey) -> Option<&str> {
        self.items.get(&key).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Writes index, items and metadata into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> IndexResult<()> {
        std::fs::create_dir_all(dir).map_err(|e| IndexError::PersistenceError {
            path: dir.to_path_buf(),
            source: Box::new(e),
        })?;

        self.index.save(&dir.join(INDEX_FILE))?;

        let mut stored: Vec<StoredItem> = self
            .items
            .iter()
            .map(|(key, text)| StoredItem {
                key: key.get(),
                text: text.clone(),
            })
            .collect();
        stored.sort_by_key(|item| item.key);
        let items_path = dir.join(ITEMS_FILE);
        let json = serde_json::to_string_pretty(&stored).map_err(|e| {
            IndexError::PersistenceError {
                path: items_path.clone(),
                source: Box::new(e),
            }
        })?;
        std::fs::write(&items_path, json).map_err(|e| IndexError::PersistenceError {
            path: items_path,
            source: Box::new(e),
        })?;

        let index = &self.index;
        IndexMetadata::new(
            self.embedder.model_name(),
            index.dimension().get(),
            self.items.len(),
            index.config().metric,
            index.config().precision,
        )
        .save(dir)
    }

    /// Loads a directory written by [`save`](Self::save).
    ///
    /// Fails with `IndexCorrupted` if the items and the index disagree.
    pub fn load(
        dir: &Path,
        embedder: Arc<dyn EmbeddingGenerator>,
        retry: RetryPolicy,
    ) -> IndexResult<Self> {
        let metadata = IndexMetadata::load(dir)?;
        let mut index = HnswIndex::load(&dir.join(INDEX_FILE))?;
        index.seal();

        if metadata.dimension != index.dimension().get() {
            return Err(IndexError::IndexCorrupted {
                reason: format!(
                    "metadata says {} dimensions but the index has {}",
                    metadata.dimension,
                    index.dimension().get()
                ),
            });
        }
        if metadata.model_name != embedder.model_name() {
            warn!(
                "Index was built with '{}' but queries will use '{}'",
                metadata.model_name,
                embedder.model_name()
            );
        }

        let items_path = dir.join(ITEMS_FILE);
        let json = std::fs::read_to_string(&items_path).map_err(|e| IndexError::LoadError {
            path: items_path.clone(),
            source: Box::new(e),
        })?;
        let stored: Vec<StoredItem> =
            serde_json::from_str(&json).map_err(|e| IndexError::IndexCorrupted {
                reason: format!("Failed to parse {}: {e}", items_path.display()),
            })?;
        let items: HashMap<VectorKey, String> = stored
            .into_iter()
            .map(|item| (VectorKey::new(item.key), item.text))
            .collect();

        if items.len() != index.len()
            || index.store().iter().any(|(key, _)| !items.contains_key(&key))
        {
            return Err(IndexError::IndexCorrupted {
                reason: format!(
                    "{} items on disk do not match the {} indexed vectors",
                    items.len(),
                    index.len()
                ),
            });
        }

        debug!("Loaded {} items from {}", items.len(), dir.display());
        Ok(Self::new(index, items, embedder, retry))
    }

    fn resolve(&self, matches: Vec<Match>) -> QueryResult<Vec<RetrievedItem>> {
        matches
            .into_iter()
            .map(|m| {
                let text = self
                    .items
                    .get(&m.key)
                    .ok_or(QueryError::MissingItem { key: m.key })?;
                Ok(RetrievedItem {
                    key: m.key,
                    text: text.clone(),
                    distance: m.distance,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hnsw::HnswConfig;
    use crate::vector::VectorDimension;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Maps known words to axis vectors; anything else fails.
    struct AxisEmbedder;

    #[async_trait]
    impl EmbeddingGenerator for AxisEmbedder {
        async fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            texts
                .iter()
                .map(|text| match text.as_str() {
                    "x" => Ok(vec![1.0, 0.0, 0.0]),
                    "y" => Ok(vec![0.0, 1.0, 0.0]),
                    "z" => Ok(vec![0.0, 0.0, 1.0]),
                    other => Err(EmbedError::Status {
                        status: 400,
                        body: format!("cannot embed {other}"),
                    }),
                })
                .collect()
        }

        fn model_name(&self) -> String {
            "axis".to_string()
        }
    }

    fn service(items: &[(u64, &str, [f32; 3])]) -> QueryService {
        let mut index =
            HnswIndex::new(VectorDimension::new(3).unwrap(), HnswConfig::seeded(3)).unwrap();
        let mut lookup = HashMap::new();
        for (key, text, vector) in items {
            index.insert(VectorKey::new(*key), vector).unwrap();
            lookup.insert(VectorKey::new(*key), text.to_string());
        }
        index.seal();
        QueryService::new(index, lookup, Arc::new(AxisEmbedder), RetryPolicy::immediate(2))
    }

    fn sample() -> QueryService {
        service(&[
            (0, "east", [1.0, 0.1, 0.0]),
            (1, "north", [0.0, 1.0, 0.1]),
            (2, "up", [0.1, 0.0, 1.0]),
        ])
    }

    #[tokio::test]
    async fn test_query_ranks_items() {
        let results = sample().query("y", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "north");
        assert!(results[0].distance <= results[1].distance);
        assert!(results[0].similarity() > 0.9);
    }

    #[tokio::test]
    async fn test_zero_k_fails_before_embedding() {
        let err = sample().query("not-a-word", 0).await.unwrap_err();
        assert!(matches!(err, QueryError::Index(IndexError::ConfigError { .. })));
    }

    #[tokio::test]
    async fn test_embed_failure_is_query_failed() {
        let err = sample().query("w", 1).await.unwrap_err();
        match err {
            QueryError::QueryFailed { query, attempts, .. } => {
                assert_eq!(query, "w");
                // 400 is permanent; no retry
                assert_eq!(attempts, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_item_is_consistency_error() {
        let mut index =
            HnswIndex::new(VectorDimension::new(3).unwrap(), HnswConfig::seeded(3)).unwrap();
        index.insert(VectorKey::new(5), &[1.0, 0.0, 0.0]).unwrap();
        let service = QueryService::new(
            index,
            HashMap::new(),
            Arc::new(AxisEmbedder),
            RetryPolicy::immediate(1),
        );
        let err = service.query("x", 1).await.unwrap_err();
        assert!(matches!(err, QueryError::MissingItem { key } if key.get() == 5));
        assert_eq!(err.status_code(), "CONSISTENCY_ERROR");
    }

    #[tokio::test]
    async fn test_grounding_context_degrades() {
        let service = sample();
        let ok = service.grounding_context("x", 1).await;
        assert!(ok.is_available());
        assert_eq!(ok.render(), "east");

        let degraded = service.grounding_context("unknown", 1).await;
        assert!(!degraded.is_available());
        assert_eq!(degraded.render(), CONTEXT_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_save_and_load_directory() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("index");
        let original = sample();
        original.save(&dir).unwrap();

        assert!(dir.join(INDEX_FILE).exists());
        assert!(dir.join(ITEMS_FILE).exists());
        assert!(IndexMetadata::exists(&dir));

        let loaded =
            QueryService::load(&dir, Arc::new(AxisEmbedder), RetryPolicy::immediate(1)).unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(loaded.index().is_sealed());
        assert_eq!(
            loaded.query("z", 3).await.unwrap(),
            original.query("z", 3).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_load_rejects_mismatched_items() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        sample().save(dir).unwrap();
        std::fs::write(dir.join(ITEMS_FILE), r#"[{"key": 0, "text": "east"}]"#).unwrap();

        let result = QueryService::load(dir, Arc::new(AxisEmbedder), RetryPolicy::immediate(1));
        assert!(matches!(result, Err(IndexError::IndexCorrupted { .. })));
    }
}
