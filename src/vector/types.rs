//! Type-safe wrappers and core types for vector search functionality.
//!
//! Newtypes here keep keys, dimensions and distances from being mixed up with
//! the plain integers and floats they wrap.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

/// Stable key identifying one vector inside one index instance.
///
/// Keys are assigned in insertion order (0, 1, 2, ...) unless the corpus
/// supplies its own ids. A key is never reused within an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorKey(u64);

impl VectorKey {
    /// Creates a key from its raw value.
    #[must_use]
    pub const fn new(key: u64) -> Self {
        Self(key)
    }

    /// Returns the underlying u64 value.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Converts to little-endian bytes for storage.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// Creates from little-endian bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }
}

impl std::fmt::Display for VectorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for VectorKey {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Type-safe wrapper for vector dimensions.
///
/// Fixed when an index is constructed; every vector that enters the index is
/// validated against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    ///
    /// Never truncates or pads: any length other than `D` is rejected.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl TryFrom<usize> for VectorDimension {
    type Error = VectorError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VectorDimension> for usize {
    fn from(value: VectorDimension) -> Self {
        value.0
    }
}

/// Storage precision for vector components.
///
/// Distances are always computed in f32; `F16` only changes how vectors are
/// held in memory and on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    F32,
    #[default]
    F16,
}

impl Precision {
    /// Bytes used per stored component.
    #[must_use]
    pub const fn bytes_per_component(&self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F16 => 2,
        }
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::F32 => write!(f, "f32"),
            Self::F16 => write!(f, "f16"),
        }
    }
}

/// Distance metric used by an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Metric {
    /// `1 - cos(a, b)`; zero vectors have similarity 0.
    #[default]
    #[serde(rename = "cos")]
    Cosine,
}

impl Metric {
    /// Distance between two equal-length vectors under this metric.
    #[must_use]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => crate::vector::cosine_distance(a, b),
        }
    }
}

/// A single search hit: a key and its distance to the query.
///
/// Ordered ascending by distance, ties broken by ascending key, so sorting a
/// slice of matches gives the deterministic result order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub key: VectorKey,
    pub distance: f32,
}

impl Match {
    #[must_use]
    pub fn new(key: VectorKey, distance: f32) -> Self {
        Self { key, distance }
    }

    /// Cosine similarity corresponding to this distance.
    #[must_use]
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

impl Eq for Match {}

impl PartialOrd for Match {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Match {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.key.cmp(&other.key))
    }
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error(
        "Duplicate vector key: {0}\nSuggestion: Keys are unique per index; reset the index before re-building"
    )]
    DuplicateKey(VectorKey),

    #[error("Vector not found: key {0}\nSuggestion: Verify the vector was properly indexed")]
    VectorNotFound(VectorKey),

    #[error(
        "Vector component {index} is not finite ({value})\nSuggestion: Check the embedding model output"
    )]
    NonFiniteComponent { index: usize, value: f32 },

    #[error(
        "Vector component {index} ({value}) exceeds the half-precision limit of {limit}\nSuggestion: Normalize embeddings or build with f32 precision"
    )]
    ComponentOutOfRange { index: usize, value: f32, limit: f32 },

    #[error("Vector store is full ({0} vectors)\nSuggestion: Split the corpus across indexes")]
    CapacityExhausted(usize),

    #[error("Storage error: {0}\nSuggestion: Check disk space and file permissions")]
    Storage(#[from] std::io::Error),

    #[error("Invalid matrix file: {0}\nSuggestion: Expected a .fbin or .hbin matrix")]
    InvalidMatrix(String),

    #[error(
        "Embedding generation failed: {0}\nSuggestion: Verify the embedding model is properly initialized"
    )]
    EmbeddingFailed(String),
}
