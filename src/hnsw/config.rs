//! HNSW construction and search parameters.

use serde::{Deserialize, Serialize};

use crate::error::IndexError;
use crate::vector::{Metric, Precision};

/// Upper bound on `max_layers`; 2^64 nodes would not need more.
const MAX_LAYERS_LIMIT: usize = 64;

/// Parameters fixed when an index is constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Max neighbors per node on layers above 0 (M)
    #[serde(default = "default_connectivity")]
    pub connectivity: usize,

    /// Max neighbors per node on layer 0, typically 2*M
    #[serde(default = "default_connectivity_base")]
    pub connectivity_base: usize,

    /// Candidate list size during insertion (efConstruction)
    #[serde(default = "default_expansion_add")]
    pub expansion_add: usize,

    /// Candidate list size during search (efSearch)
    #[serde(default = "default_expansion_search")]
    pub expansion_search: usize,

    /// Hard cap on the number of layers
    #[serde(default = "default_max_layers")]
    pub max_layers: usize,

    /// Seed for layer assignment; `None` draws one from the OS
    #[serde(default)]
    pub seed: Option<u64>,

    /// How vectors are held in memory
    #[serde(default)]
    pub precision: Precision,

    #[serde(default)]
    pub metric: Metric,
}

fn default_connectivity() -> usize {
    16
}
fn default_connectivity_base() -> usize {
    32
}
fn default_expansion_add() -> usize {
    128
}
fn default_expansion_search() -> usize {
    64
}
fn default_max_layers() -> usize {
    16
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            connectivity: default_connectivity(),
            connectivity_base: default_connectivity_base(),
            expansion_add: default_expansion_add(),
            expansion_search: default_expansion_search(),
            max_layers: default_max_layers(),
            seed: None,
            precision: Precision::default(),
            metric: Metric::default(),
        }
    }
}

impl HnswConfig {
    /// Same defaults with a fixed RNG seed, for reproducible graphs.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    #[must_use]
    pub fn with_connectivity(mut self, connectivity: usize) -> Self {
        self.connectivity = connectivity;
        self.connectivity_base = connectivity * 2;
        self
    }

    #[must_use]
    pub fn with_expansion(mut self, expansion_add: usize, expansion_search: usize) -> Self {
        self.expansion_add = expansion_add;
        self.expansion_search = expansion_search;
        self
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.connectivity < 2 {
            return Err(IndexError::config(format!(
                "connectivity must be at least 2, got {}",
                self.connectivity
            )));
        }
        if self.connectivity_base < self.connectivity {
            return Err(IndexError::config(format!(
                "connectivity_base ({}) must not be smaller than connectivity ({})",
                self.connectivity_base, self.connectivity
            )));
        }
        if self.expansion_add == 0 {
            return Err(IndexError::config("expansion_add must be positive"));
        }
        if self.expansion_search == 0 {
            return Err(IndexError::config("expansion_search must be positive"));
        }
        if self.max_layers == 0 || self.max_layers > MAX_LAYERS_LIMIT {
            return Err(IndexError::config(format!(
                "max_layers must be between 1 and {MAX_LAYERS_LIMIT}, got {}",
                self.max_layers
            )));
        }
        Ok(())
    }

    /// Level normalization factor `1 / ln(M)`.
    #[must_use]
    pub fn level_multiplier(&self) -> f64 {
        1.0 / (self.connectivity as f64).ln()
    }

    /// Degree bound for a given layer.
    #[must_use]
    pub fn max_degree(&self, layer: usize) -> usize {
        if layer == 0 {
            self.connectivity_base
        } else {
            self.connectivity
        }
    }
}
