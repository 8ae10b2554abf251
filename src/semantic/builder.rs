//! Corpus ingestion: embed texts in batches and insert them into an index.
//!
//! The builder owns the [`HnswIndex`] it fills and the key to item lookup.
//! Work is committed one batch at a time: a batch is embedded (with
//! retries), validated as a whole, then inserted. When a later batch fails,
//! everything committed before it stays indexed and queryable.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{BuildError, BuildResult, EmbedError, IndexError};
use crate::hnsw::{HnswConfig, HnswIndex};
use crate::semantic::query::QueryService;
use crate::semantic::retry::RetryPolicy;
use crate::vector::{EmbeddingGenerator, VectorDimension, VectorError, VectorKey};

/// Text embedded once to discover the embedder's dimensionality.
pub const PROBE_TEXT: &str = "Hi";

/// Default number of texts per embedder call.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// One corpus entry: optional stable id plus the text to embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusItem {
    #[serde(default)]
    pub id: Option<u64>,
    pub text: String,
}

impl CorpusItem {
    /// Item keyed in insertion order.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
        }
    }

    /// Item with a caller-supplied key.
    pub fn with_id(id: u64, text: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            text: text.into(),
        }
    }
}

/// Reads a corpus file.
///
/// Each non-blank line is either a JSON object `{"id": 7, "text": "..."}`
/// (the `id` is optional) or, if it does not start with `{`, plain text.
pub fn load_corpus(path: &Path) -> Result<Vec<CorpusItem>, VectorError> {
    let content = std::fs::read_to_string(path)?;
    let mut items = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('{') {
            let item: CorpusItem = serde_json::from_str(trimmed).map_err(|e| {
                VectorError::InvalidMatrix(format!(
                    "{}:{}: invalid corpus entry: {e}",
                    path.display(),
                    line_no + 1
                ))
            })?;
            items.push(item);
        } else {
            items.push(CorpusItem::new(trimmed));
        }
    }
    Ok(items)
}

/// Summary of a completed build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    /// Items inserted by this call
    pub indexed: usize,
    /// Embedder batches sent by this call
    pub batches: usize,
    pub dimension: usize,
    /// Attempts beyond the first, summed over all batches
    pub retries: u32,
    pub elapsed: Duration,
}

/// Fills an [`HnswIndex`] from a corpus through an [`EmbeddingGenerator`].
pub struct IndexBuilder {
    embedder: Arc<dyn EmbeddingGenerator>,
    config: HnswConfig,
    batch_size: usize,
    retry: RetryPolicy,
    progress: ProgressBar,
    index: Option<HnswIndex>,
    items: HashMap<VectorKey, String>,
    next_key: u64,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn EmbeddingGenerator>, config: HnswConfig) -> Self {
        Self {
            embedder,
            config,
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::default(),
            progress: ProgressBar::hidden(),
            index: None,
            items: HashMap::new(),
            next_key: 0,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Reports one tick per indexed item on `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Fixes the dimension up front so no probe call is made.
    pub fn with_dimension(mut self, dimension: usize) -> Result<Self, IndexError> {
        let dimension = VectorDimension::new(dimension)?;
        self.index = Some(HnswIndex::new(dimension, self.config.clone())?);
        Ok(self)
    }

    /// Embeds and indexes `items`.
    pub async fn build(&mut self, items: Vec<CorpusItem>) -> BuildResult<BuildReport> {
        self.build_with_cancel(items, &CancellationToken::new()).await
    }

    /// Like [`build`](Self::build), abandoning the pending batch when
    /// `cancel` fires.
    ///
    /// Batch numbers in errors are 1-based; `first_item` is the 0-based
    /// position in `items`.
    pub async fn build_with_cancel(
        &mut self,
        items: Vec<CorpusItem>,
        cancel: &CancellationToken,
    ) -> BuildResult<BuildReport> {
        let started = Instant::now();
        let keyed = self.assign_keys(items)?;
        self.ensure_index(cancel).await?;

        let batch_count = keyed.len().div_ceil(self.batch_size);
        self.progress.set_length(keyed.len() as u64);
        info!(
            "Indexing {} items in {batch_count} batches of up to {}",
            keyed.len(),
            self.batch_size
        );

        let mut report = BuildReport {
            indexed: 0,
            batches: 0,
            dimension: self.dimension().unwrap_or_default(),
            retries: 0,
            elapsed: Duration::ZERO,
        };

        for (batch_index, chunk) in keyed.chunks(self.batch_size).enumerate() {
            let batch = batch_index + 1;
            let first_item = batch_index * self.batch_size;
            if cancel.is_cancelled() {
                return Err(BuildError::Cancelled { batch });
            }

            let texts: Vec<String> = chunk.iter().map(|(_, text)| text.clone()).collect();
            let embedder = Arc::clone(&self.embedder);
            let outcome = self
                .retry
                .run(&format!("batch {batch}/{batch_count}"), cancel, || {
                    let embedder = Arc::clone(&embedder);
                    let texts = texts.clone();
                    async move { embedder.generate_embeddings(&texts).await }
                })
                .await;

            let (vectors, attempts) = match outcome {
                Ok((vectors, attempts)) => {
                    report.retries += attempts - 1;
                    (vectors, attempts)
                }
                Err(failure) => {
                    if matches!(failure.source, EmbedError::Cancelled) {
                        return Err(BuildError::Cancelled { batch });
                    }
                    return Err(BuildError::BuildFailed {
                        batch,
                        first_item,
                        item_count: chunk.len(),
                        attempts: failure.attempts,
                        source: failure.source,
                    });
                }
            };

            if vectors.len() != chunk.len() {
                return Err(BuildError::BuildFailed {
                    batch,
                    first_item,
                    item_count: chunk.len(),
                    attempts,
                    source: EmbedError::LengthMismatch {
                        expected: chunk.len(),
                        actual: vectors.len(),
                    },
                });
            }

            self.commit_batch(chunk, &vectors)?;
            report.indexed += chunk.len();
            report.batches += 1;
            self.progress.inc(chunk.len() as u64);
            debug!("Committed batch {batch}/{batch_count} ({} items)", chunk.len());
        }

        report.elapsed = started.elapsed();
        info!(
            "Indexed {} items in {:.2}s",
            report.indexed,
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    /// Seals the index and hands it to a [`QueryService`].
    ///
    /// Works after a failed build too; the service then answers from the
    /// batches that were committed.
    pub fn finish(mut self) -> BuildResult<QueryService> {
        let mut index = self.index.take().ok_or_else(|| {
            IndexError::config("nothing was built; the index dimension is still unknown")
        })?;
        index.seal();
        self.progress.finish_and_clear();
        Ok(QueryService::new(
            index,
            self.items,
            self.embedder,
            self.retry,
        ))
    }

    /// Index being filled, once the dimension is known.
    #[must_use]
    pub fn index(&self) -> Option<&HnswIndex> {
        self.index.as_ref()
    }

    /// Item text for `key`.
    #[must_use]
    pub fn item(&self, key: VectorKey) -> Option<&str> {
        self.items.get(&key).map(String::as_str)
    }

    /// Number of committed items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn dimension(&self) -> Option<usize> {
        self.index.as_ref().map(|index| index.dimension().get())
    }

    /// Resolves a key for every item before any embedding happens.
    ///
    /// Supplied ids must be unique within the corpus and against items
    /// already indexed. Items without an id take the next unused key.
    fn assign_keys(&mut self, items: Vec<CorpusItem>) -> BuildResult<Vec<(VectorKey, String)>> {
        let mut supplied = HashSet::new();
        for id in items.iter().filter_map(|item| item.id) {
            if !supplied.insert(id) || self.items.contains_key(&VectorKey::new(id)) {
                return Err(BuildError::DuplicateId { id });
            }
        }

        let mut keyed = Vec::with_capacity(items.len());
        for item in items {
            let key = match item.id {
                Some(id) => id,
                None => {
                    while supplied.contains(&self.next_key)
                        || self.items.contains_key(&VectorKey::new(self.next_key))
                    {
                        self.next_key += 1;
                    }
                    let key = self.next_key;
                    self.next_key += 1;
                    key
                }
            };
            keyed.push((VectorKey::new(key), item.text));
        }
        Ok(keyed)
    }

    async fn ensure_index(&mut self, cancel: &CancellationToken) -> BuildResult<()> {
        if self.index.is_some() {
            return Ok(());
        }

        let embedder = Arc::clone(&self.embedder);
        let probe = vec![PROBE_TEXT.to_string()];
        let (vectors, _) = self
            .retry
            .run("dimension probe", cancel, || {
                let embedder = Arc::clone(&embedder);
                let probe = probe.clone();
                async move { embedder.generate_embeddings(&probe).await }
            })
            .await
            .map_err(|failure| match failure.source {
                EmbedError::Cancelled => BuildError::Cancelled { batch: 0 },
                source => BuildError::Probe {
                    attempts: failure.attempts,
                    source,
                },
            })?;

        let dimension = vectors.first().map(Vec::len).ok_or(BuildError::Probe {
            attempts: 1,
            source: EmbedError::LengthMismatch {
                expected: 1,
                actual: 0,
            },
        })?;
        let dimension = VectorDimension::new(dimension).map_err(IndexError::from)?;
        debug!(
            "Embedder {} produces {}-dimensional vectors",
            self.embedder.model_name(),
            dimension.get()
        );
        self.index = Some(HnswIndex::new(dimension, self.config.clone())?);
        Ok(())
    }

    /// Inserts a batch whose vectors have already been embedded.
    ///
    /// Every vector is checked before the first insert, so a bad batch
    /// leaves the index untouched.
    fn commit_batch(&mut self, chunk: &[(VectorKey, String)], vectors: &[Vec<f32>]) -> BuildResult<()> {
        let index = self
            .index
            .as_mut()
            .ok_or_else(|| IndexError::config("index was not initialized"))?;

        // Nothing is inserted unless every vector in the batch is usable.
        for vector in vectors {
            index.store().check_vector(vector).map_err(IndexError::from)?;
        }

        for ((key, text), vector) in chunk.iter().zip(vectors) {
            index.insert(*key, vector)?;
            self.items.insert(*key, text.clone());
        }
        index.check_consistency()?;
        Ok(())
    }
}
