//! Configuration module for the retrieval engine.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `MG_` and use double underscores
//! to separate nested levels:
//! - `MG_INDEX__CONNECTIVITY=32` sets `index.connectivity`
//! - `MG_EMBEDDING__PROVIDER=http` sets `embedding.provider`
//! - `MG_EVALUATION__PARALLEL_THREADS=4` sets `evaluation.parallel_threads`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::hnsw::HnswConfig;
use crate::semantic::RetryPolicy;

/// Directory holding settings and, by default, the index.
pub const CONFIG_DIR: &str = ".mongoose";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory where `build` writes and `query` reads the index
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Global debug mode
    #[serde(default)]
    pub debug: bool,

    /// HNSW parameters
    #[serde(default)]
    pub index: HnswConfig,

    /// Embedder selection and call policy
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Retrieval evaluation settings
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

/// Which embedder backs the builder and query service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local ONNX model via fastembed
    #[default]
    Fastembed,
    /// OpenAI-compatible `/embeddings` endpoint
    Http,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    /// Model name; a fastembed model id or the remote model string
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Endpoint for the http provider
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Texts per embedder call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Attempts per batch or query, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Where fastembed caches downloaded models
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EvaluationConfig {
    /// Number of threads used to run evaluation queries
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,

    /// Neighbors fetched per query; recall@10 needs at least 10
    #[serde(default = "default_eval_k")]
    pub k: usize,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_index_path() -> PathBuf {
    PathBuf::from(".mongoose/index")
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_endpoint() -> String {
    "http://127.0.0.1:7997/embeddings".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    200
}
fn default_max_backoff_ms() -> u64 {
    2_000
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from(".mongoose/models")
}
fn default_parallel_threads() -> usize {
    num_cpus::get()
}
fn default_eval_k() -> usize {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            debug: false,
            index: HnswConfig::default(),
            embedding: EmbeddingConfig::default(),
            evaluation: EvaluationConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model: default_embedding_model(),
            endpoint: default_endpoint(),
            batch_size: default_batch_size(),
            timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            cache_dir: default_cache_dir(),
        }
    }
}

impl EmbeddingConfig {
    /// Retry policy for embedder calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            parallel_threads: default_parallel_threads(),
            k: default_eval_k(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(".mongoose/settings.toml"));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels; single underscores
            // stay inside field names
            .merge(Env::prefixed("MG_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find `.mongoose/settings.toml` in the current directory or an ancestor
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join("settings.toml"));
            }
        }

        None
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        Self::init_config_file_in(Path::new("."), force)
    }

    /// Same as [`init_config_file`](Self::init_config_file) rooted at `root`
    pub fn init_config_file_in(
        root: &Path,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = format!(
            r#"# Mongoose Configuration File

# Version of the configuration schema
version = 1

# Directory where 'mongoose build' writes the index
index_path = ".mongoose/index"

# Global debug mode
debug = false

[index]
# Max neighbors per node on upper layers (M)
connectivity = 16

# Max neighbors per node on layer 0
connectivity_base = 32

# Candidate list size while inserting (efConstruction)
expansion_add = 128

# Candidate list size while searching (efSearch)
expansion_search = 64

# Hard cap on graph layers
max_layers = 16

# Fixed seed for reproducible graphs
# seed = 42

# In-memory vector precision: "f16" or "f32"
precision = "f16"

[embedding]
# "fastembed" (local model) or "http" (OpenAI-compatible endpoint)
provider = "fastembed"

# fastembed model id, or the model string sent to the endpoint
model = "AllMiniLML6V2"

# Only used by the http provider
endpoint = "http://127.0.0.1:7997/embeddings"

batch_size = 32
timeout_ms = 30000

# Attempts per batch or query, including the first
max_attempts = 3
initial_backoff_ms = 200
max_backoff_ms = 2000

[evaluation]
# Threads for evaluation queries (defaults to CPU count)
# parallel_threads = {}

k = 10
"#,
            num_cpus::get()
        );

        std::fs::write(&config_path, template)?;
        Ok(config_path)
    }
}
