//! Binary snapshot of an [`HnswIndex`].
//!
//! # File Format
//!
//! - Header (8 bytes): magic `MHNS`, format version (u32 little-endian)
//! - Payload: bincode-encoded [`IndexSnapshot`]
//!
//! Vectors are written in f32 regardless of the in-memory precision; an f16
//! store reloads to the exact same values. Loading validates every neighbor
//! slot and the entry point before handing the index back.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{IndexError, IndexResult};
use crate::hnsw::config::HnswConfig;
use crate::hnsw::graph::{LayeredGraph, NodeLinks};
use crate::hnsw::index::HnswIndex;
use crate::vector::{Slot, VectorDimension, VectorKey, VectorStore};

/// Magic bytes to identify index snapshot files.
const MAGIC_BYTES: &[u8; 4] = b"MHNS";

/// Current snapshot format version.
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct IndexSnapshot {
    dimension: usize,
    config: HnswConfig,
    sealed: bool,
    entry_point: Option<u64>,
    nodes: Vec<NodeSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeSnapshot {
    key: u64,
    vector: Vec<f32>,
    layers: Vec<Vec<Slot>>,
}

fn corrupted(reason: impl Into<String>) -> IndexError {
    IndexError::IndexCorrupted {
        reason: reason.into(),
    }
}

impl HnswIndex {
    /// Writes the index to `path`.
    ///
    /// The snapshot goes to a temporary sibling first and is renamed into
    /// place, so a crash never leaves a truncated file at `path`.
    pub fn save(&self, path: &Path) -> IndexResult<()> {
        let persistence_error = |source: Box<dyn std::error::Error + Send + Sync>| {
            IndexError::PersistenceError {
                path: path.to_path_buf(),
                source,
            }
        };

        let snapshot = self.snapshot();
        let tmp_path = path.with_extension("bin.tmp");
        {
            let file = File::create(&tmp_path).map_err(|e| persistence_error(Box::new(e)))?;
            let mut writer = BufWriter::new(file);
            writer
                .write_all(MAGIC_BYTES)
                .and_then(|()| writer.write_all(&FORMAT_VERSION.to_le_bytes()))
                .map_err(|e| persistence_error(Box::new(e)))?;
            bincode::serde::encode_into_std_write(
                &snapshot,
                &mut writer,
                bincode::config::standard(),
            )
            .map_err(|e| persistence_error(Box::new(e)))?;
            writer.flush().map_err(|e| persistence_error(Box::new(e)))?;
        }
        fs::rename(&tmp_path, path).map_err(|e| persistence_error(Box::new(e)))?;

        debug!(
            "Saved index with {} vectors to {}",
            snapshot.nodes.len(),
            path.display()
        );
        Ok(())
    }

    /// Reads an index written by [`save`](Self::save).
    pub fn load(path: &Path) -> IndexResult<Self> {
        let file = File::open(path).map_err(|e| IndexError::LoadError {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        let mut reader = BufReader::new(file);

        let mut header = [0u8; 8];
        reader
            .read_exact(&mut header)
            .map_err(|_| corrupted("file is shorter than the snapshot header"))?;
        if &header[..4] != MAGIC_BYTES {
            return Err(corrupted("bad magic bytes"));
        }
        let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if version != FORMAT_VERSION {
            return Err(corrupted(format!(
                "unsupported format version {version} (expected {FORMAT_VERSION})"
            )));
        }

        let snapshot: IndexSnapshot =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
                .map_err(|e| corrupted(format!("undecodable payload: {e}")))?;

        let index = Self::restore(snapshot)?;
        debug!("Loaded index with {} vectors from {}", index.len(), path.display());
        Ok(index)
    }

    fn snapshot(&self) -> IndexSnapshot {
        let nodes = self
            .store()
            .iter()
            .zip(self.graph().nodes())
            .map(|((key, vector), links)| NodeSnapshot {
                key: key.get(),
                vector: vector.into_owned(),
                layers: links.layers().to_vec(),
            })
            .collect();

        IndexSnapshot {
            dimension: self.dimension().get(),
            config: self.config().clone(),
            sealed: self.is_sealed(),
            entry_point: self.entry_point().map(|key| key.get()),
            nodes,
        }
    }

    fn restore(snapshot: IndexSnapshot) -> IndexResult<Self> {
        let dimension = VectorDimension::new(snapshot.dimension)
            .map_err(|e| corrupted(format!("invalid dimension: {e}")))?;
        snapshot
            .config
            .validate()
            .map_err(|e| corrupted(e.to_string()))?;

        let count = snapshot.nodes.len();
        let mut store = VectorStore::new(dimension, snapshot.config.precision);
        let mut nodes = Vec::with_capacity(count);

        for node in snapshot.nodes {
            if node.layers.is_empty() || node.layers.len() > snapshot.config.max_layers {
                return Err(corrupted(format!(
                    "key {} has {} layers",
                    node.key,
                    node.layers.len()
                )));
            }
            if let Some(bad) = node.layers.iter().flatten().find(|&&n| n as usize >= count) {
                return Err(corrupted(format!(
                    "key {} links to slot {bad} but only {count} vectors exist",
                    node.key
                )));
            }
            store
                .put(VectorKey::new(node.key), &node.vector)
                .map_err(|e| corrupted(format!("vector for key {}: {e}", node.key)))?;
            nodes.push(NodeLinks::from_layers(node.layers));
        }
        let graph = LayeredGraph::from_nodes(nodes);

        let entry_point = match snapshot.entry_point {
            Some(key) => {
                let slot = store
                    .slot_of(VectorKey::new(key))
                    .ok_or_else(|| corrupted(format!("entry point key {key} is not stored")))?;
                let top = graph.nodes().iter().map(NodeLinks::level).max().unwrap_or(0);
                if graph.level(slot) != Some(top) {
                    return Err(corrupted("entry point is not on the top layer"));
                }
                Some(slot)
            }
            None if count == 0 => None,
            None => return Err(corrupted("non-empty index without an entry point")),
        };

        Self::from_parts(snapshot.config, store, graph, entry_point, snapshot.sealed)
    }
}
