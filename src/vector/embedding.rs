//! Embedding generation for corpus items and queries.
//!
//! [`EmbeddingGenerator`] is the only boundary in the crate that may block
//! for a long time (model inference or a network round trip), so it is
//! async. Two implementations ship with the crate:
//!
//! - [`FastEmbedGenerator`]: local ONNX model through fastembed
//! - [`HttpEmbeddingGenerator`]: an OpenAI-compatible `/embeddings` endpoint
//!
//! Generators do not retry; bounded retries live in
//! [`crate::semantic::RetryPolicy`] at the builder and query boundaries.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{EmbeddingConfig, EmbeddingProvider};
use crate::error::EmbedError;
use crate::vector::VectorError;

/// Trait for generating embeddings from text.
///
/// The returned vectors are in the same order as `texts` and there is
/// exactly one per input. An empty input yields an empty output, never an
/// error.
#[async_trait]
pub trait EmbeddingGenerator: Send + Sync {
    /// Generate embeddings for a batch of texts.
    async fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Human-readable model identifier, recorded in index metadata.
    fn model_name(&self) -> String;
}

/// Local embedding model backed by fastembed.
///
/// Inference runs on the blocking thread pool so the async caller is not
/// stalled.
pub struct FastEmbedGenerator {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
}

impl FastEmbedGenerator {
    /// Load (downloading on first use) the given model into `cache_dir`.
    ///
    /// # Errors
    /// Returns an error if the model fails to initialize or download.
    pub fn new(
        model: EmbeddingModel,
        cache_dir: PathBuf,
        show_download_progress: bool,
    ) -> Result<Self, VectorError> {
        let model_name = model_to_string(&model);
        let text_model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir)
                .with_show_download_progress(show_download_progress),
        )
        .map_err(|e| VectorError::EmbeddingFailed(
            format!("Failed to initialize embedding model: {e}. Ensure you have internet connection for first-time model download")
        ))?;

        Ok(Self {
            model: Arc::new(Mutex::new(text_model)),
            model_name,
        })
    }
}

#[async_trait]
impl EmbeddingGenerator for FastEmbedGenerator {
    async fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = Arc::clone(&self.model);
        let owned: Vec<String> = texts.to_vec();
        let expected = owned.len();
        let embeddings = tokio::task::spawn_blocking(move || model.lock().embed(owned, None))
            .await
            .map_err(|e| EmbedError::Model(format!("Embedding task panicked: {e}")))?
            .map_err(|e| EmbedError::Model(format!("Failed to generate embeddings: {e}")))?;

        if embeddings.len() != expected {
            return Err(EmbedError::LengthMismatch {
                expected,
                actual: embeddings.len(),
            });
        }
        Ok(embeddings)
    }

    fn model_name(&self) -> String {
        self.model_name.clone()
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

/// Client for an OpenAI-compatible embeddings endpoint.
///
/// Sends `{"model": .., "input": [..]}` and expects
/// `{"data": [{"embedding": [..]}, ..]}` back.
pub struct HttpEmbeddingGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl HttpEmbeddingGenerator {
    /// Create a client with a per-request timeout.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EmbedError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbedError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            timeout,
        })
    }

    fn classify(&self, error: reqwest::Error) -> EmbedError {
        if error.is_timeout() {
            EmbedError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else if error.is_decode() {
            EmbedError::MalformedResponse(error.to_string())
        } else {
            EmbedError::Transport(error.to_string())
        }
    }
}

#[async_trait]
impl EmbeddingGenerator for HttpEmbeddingGenerator {
    async fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(EmbedError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| self.classify(e))?;
        let mut data = parsed.data;
        if data.iter().all(|d| d.index.is_some()) {
            data.sort_by_key(|d| d.index);
        }
        if data.len() != texts.len() {
            return Err(EmbedError::LengthMismatch {
                expected: texts.len(),
                actual: data.len(),
            });
        }

        debug!(
            "Embedded {} texts via {} ({})",
            texts.len(),
            self.endpoint,
            self.model
        );
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    fn model_name(&self) -> String {
        format!("http:{}", self.model)
    }
}

/// Build the embedding generator selected in the settings.
pub fn create_embedding_generator(
    config: &EmbeddingConfig,
    show_download_progress: bool,
) -> Result<Arc<dyn EmbeddingGenerator>, VectorError> {
    match config.provider {
        EmbeddingProvider::Fastembed => {
            let model = parse_embedding_model(&config.model)?;
            let generator =
                FastEmbedGenerator::new(model, config.cache_dir.clone(), show_download_progress)?;
            Ok(Arc::new(generator))
        }
        EmbeddingProvider::Http => {
            let generator = HttpEmbeddingGenerator::new(
                config.endpoint.clone(),
                config.model.clone(),
                Duration::from_millis(config.timeout_ms),
            )
            .map_err(|e| VectorError::EmbeddingFailed(e.to_string()))?;
            Ok(Arc::new(generator))
        }
    }
}

/// Parse a fastembed model name as written in the settings file.
pub fn parse_embedding_model(name: &str) -> Result<EmbeddingModel, VectorError> {
    match name {
        "AllMiniLML6V2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "AllMiniLML12V2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "BGESmallENV15" => Ok(EmbeddingModel::BGESmallENV15),
        "BGEBaseENV15" => Ok(EmbeddingModel::BGEBaseENV15),
        "BGELargeENV15" => Ok(EmbeddingModel::BGELargeENV15),
        "NomicEmbedTextV15" => Ok(EmbeddingModel::NomicEmbedTextV15),
        "JinaEmbeddingsV2BaseCode" => Ok(EmbeddingModel::JinaEmbeddingsV2BaseCode),
        "MultilingualE5Small" => Ok(EmbeddingModel::MultilingualE5Small),
        other => Err(VectorError::EmbeddingFailed(format!(
            "Unknown embedding model '{other}'. Supported: AllMiniLML6V2, AllMiniLML12V2, BGESmallENV15, BGEBaseENV15, BGELargeENV15, NomicEmbedTextV15, JinaEmbeddingsV2BaseCode, MultilingualE5Small"
        ))),
    }
}

/// Inverse of [`parse_embedding_model`] for the supported models.
pub fn model_to_string(model: &EmbeddingModel) -> String {
    match model {
        EmbeddingModel::AllMiniLML6V2 => "AllMiniLML6V2",
        EmbeddingModel::AllMiniLML12V2 => "AllMiniLML12V2",
        EmbeddingModel::BGESmallENV15 => "BGESmallENV15",
        EmbeddingModel::BGEBaseENV15 => "BGEBaseENV15",
        EmbeddingModel::BGELargeENV15 => "BGELargeENV15",
        EmbeddingModel::NomicEmbedTextV15 => "NomicEmbedTextV15",
        EmbeddingModel::JinaEmbeddingsV2BaseCode => "JinaEmbeddingsV2BaseCode",
        EmbeddingModel::MultilingualE5Small => "MultilingualE5Small",
        _ => "custom",
    }
    .to_string()
}
