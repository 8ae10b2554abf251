//! Hierarchical Navigable Small World graph index.
//!
//! A multi-layer proximity graph over the vectors of a
//! [`VectorStore`](crate::vector::VectorStore). Upper layers are sparse and
//! route a query toward its neighborhood; layer 0 holds every vector and is
//! searched with a bounded best-first expansion.
//!
//! # Example
//!
//! ```
//! use mongoose::hnsw::{HnswConfig, HnswIndex};
//! use mongoose::vector::{VectorDimension, VectorKey};
//!
//! let mut index = HnswIndex::new(VectorDimension::new(2).unwrap(), HnswConfig::seeded(7)).unwrap();
//! index.insert(VectorKey::new(1), &[1.0, 0.0]).unwrap();
//! index.insert(VectorKey::new(2), &[0.0, 1.0]).unwrap();
//! index.seal();
//!
//! let hits = index.search(&[0.9, 0.1], 1).unwrap();
//! assert_eq!(hits[0].key, VectorKey::new(1));
//! ```

mod config;
mod graph;
mod index;
mod persistence;

pub use config::HnswConfig;
pub use graph::{LayeredGraph, NodeLinks, random_level};
pub use index::{HnswIndex, IndexPhase};
