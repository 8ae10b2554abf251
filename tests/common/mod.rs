//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use mongoose::error::EmbedError;
use mongoose::vector::{EmbeddingGenerator, normalize};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

pub const HASH_DIMENSION: usize = 32;

/// Marker that makes [`FlakyEmbedder`] reject a batch.
pub const POISON: &str = "<poison>";

pub struct TestProject {
    pub dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn add_file(&self, path: &str, content: &str) -> PathBuf {
        let file_path = self.dir.path().join(path);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        std::fs::write(&file_path, content).expect("Failed to write file");
        file_path
    }

    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }
}

/// Bag-of-words embedder: each whitespace token adds a signed unit to a
/// hashed bucket. Texts sharing tokens end up close under cosine distance.
pub struct HashEmbedder {
    pub calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn embed(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; HASH_DIMENSION];
        for token in text.split_whitespace() {
            let h = fnv1a(token.as_bytes());
            let bucket = (h % HASH_DIMENSION as u64) as usize;
            let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        // Keep empty or cancelling texts away from the zero vector.
        v[0] += 0.01;
        v
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingGenerator for HashEmbedder {
    async fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::embed(t)).collect())
    }

    fn model_name(&self) -> String {
        "hash-test".to_string()
    }
}

/// Like [`HashEmbedder`], but any batch containing [`POISON`] fails with a
/// transient transport error every time it is sent.
pub struct FlakyEmbedder {
    pub calls: AtomicUsize,
    pub failures: AtomicUsize,
}

impl FlakyEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl EmbeddingGenerator for FlakyEmbedder {
    async fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if texts.iter().any(|t| t.contains(POISON)) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(EmbedError::Transport("connection reset by peer".to_string()));
        }
        Ok(texts.iter().map(|t| HashEmbedder::embed(t)).collect())
    }

    fn model_name(&self) -> String {
        "hash-test".to_string()
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

/// `count` random unit vectors, reproducible from `seed`.
pub fn random_unit_vectors(count: usize, dimension: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let mut v: Vec<f32> = (0..dimension)
                .map(|_| rng.random_range(-1.0f32..1.0))
                .collect();
            normalize(&mut v);
            v
        })
        .collect()
}

/// Copies of `vectors` with small random noise added, paired row by row.
pub fn perturbed(vectors: &[Vec<f32>], noise: f32, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    vectors
        .iter()
        .map(|v| {
            v.iter()
                .map(|x| x + rng.random_range(-noise..noise))
                .collect()
        })
        .collect()
}
