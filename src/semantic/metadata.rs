//! Metadata tracking for index persistence.
//!
//! Records which embedding model produced the vectors, their dimension and
//! count, so a saved index is never queried with a mismatched embedder.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{IndexError, IndexResult};
use crate::vector::{Metric, Precision};

/// File name of the metadata sidecar inside an index directory.
pub const METADATA_FILE: &str = "metadata.json";

/// Metadata for a persisted index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Name of the embedding model used
    pub model_name: String,

    /// Dimension of embeddings
    pub dimension: usize,

    /// Number of indexed items
    pub item_count: usize,

    pub metric: Metric,

    pub precision: Precision,

    /// Unix timestamp when created
    pub created_at: u64,

    /// Unix timestamp when last updated
    pub updated_at: u64,

    /// Version of the metadata format
    pub version: u32,
}

fn utc_timestamp() -> u64 {
    Utc::now().timestamp() as u64
}

impl IndexMetadata {
    /// Current metadata version
    pub const CURRENT_VERSION: u32 = 1;

    /// Create new metadata with current timestamp
    pub fn new(
        model_name: String,
        dimension: usize,
        item_count: usize,
        metric: Metric,
        precision: Precision,
    ) -> Self {
        let now = utc_timestamp();
        Self {
            model_name,
            dimension,
            item_count,
            metric,
            precision,
            created_at: now,
            updated_at: now,
            version: Self::CURRENT_VERSION,
        }
    }

    /// Update the item count and timestamp
    pub fn update(&mut self, item_count: usize) {
        self.item_count = item_count;
        self.updated_at = utc_timestamp();
    }

    fn file(dir: &Path) -> PathBuf {
        dir.join(METADATA_FILE)
    }

    /// Save metadata into `dir`
    pub fn save(&self, dir: &Path) -> IndexResult<()> {
        let path = Self::file(dir);
        let json = serde_json::to_string_pretty(self).map_err(|e| IndexError::PersistenceError {
            path: path.clone(),
            source: Box::new(e),
        })?;
        std::fs::write(&path, json).map_err(|e| IndexError::PersistenceError {
            path,
            source: Box::new(e),
        })
    }

    /// Load metadata from `dir`
    pub fn load(dir: &Path) -> IndexResult<Self> {
        let path = Self::file(dir);
        let json = std::fs::read_to_string(&path).map_err(|e| IndexError::LoadError {
            path: path.clone(),
            source: Box::new(e),
        })?;

        let metadata: Self = serde_json::from_str(&json).map_err(|e| IndexError::IndexCorrupted {
            reason: format!("Failed to parse {}: {e}", path.display()),
        })?;

        // Check version compatibility
        if metadata.version > Self::CURRENT_VERSION {
            return Err(IndexError::IndexCorrupted {
                reason: format!(
                    "Metadata version {} is newer than supported version {}",
                    metadata.version,
                    Self::CURRENT_VERSION
                ),
            });
        }

        Ok(metadata)
    }

    /// Check if metadata file exists
    pub fn exists(dir: &Path) -> bool {
        Self::file(dir).exists()
    }
}
