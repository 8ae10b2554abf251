//! HNSW index implementation.
//!
//! Implements the Hierarchical Navigable Small World algorithm for
//! approximate nearest neighbor search over a [`VectorStore`].
//!
//! # Phases
//!
//! ```text
//! Empty --insert--> Building --seal--> Searchable
//! ```
//!
//! `insert` takes `&mut self` and `search` takes `&self`, so a search can
//! never observe a half-linked node: the borrow checker enforces the
//! single-writer / many-readers discipline. Searching while still building
//! is allowed; `seal` freezes the index once the build is complete.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::trace;

use crate::error::{IndexError, IndexResult};
use crate::hnsw::config::HnswConfig;
use crate::hnsw::graph::{LayeredGraph, random_level};
use crate::vector::{Match, Slot, VectorDimension, VectorError, VectorKey, VectorStore};

/// Lifecycle phase of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPhase {
    Empty,
    Building,
    Searchable,
}

/// Candidate during graph traversal.
///
/// Ordered by distance, then by key, so heaps and sorts agree with the
/// final result order.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    slot: Slot,
    key: VectorKey,
    distance: f32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.key.cmp(&other.key))
    }
}

/// Graph-based approximate nearest neighbor index.
pub struct HnswIndex {
    config: HnswConfig,
    store: VectorStore,
    graph: LayeredGraph,
    entry_point: Option<Slot>,
    max_level: usize,
    rng: StdRng,
    sealed: bool,
}

impl std::fmt::Debug for HnswIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HnswIndex")
            .field("dimension", &self.store.dimension().get())
            .field("len", &self.store.len())
            .field("max_level", &self.max_level)
            .field("sealed", &self.sealed)
            .field("config", &self.config)
            .finish()
    }
}

impl HnswIndex {
    /// Creates an empty index for `dimension`-component vectors.
    pub fn new(dimension: VectorDimension, config: HnswConfig) -> IndexResult<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            store: VectorStore::new(dimension, config.precision),
            graph: LayeredGraph::new(),
            entry_point: None,
            max_level: 0,
            rng,
            sealed: false,
            config,
        })
    }

    pub(crate) fn from_parts(
        config: HnswConfig,
        store: VectorStore,
        graph: LayeredGraph,
        entry_point: Option<Slot>,
        sealed: bool,
    ) -> IndexResult<Self> {
        let max_level = entry_point
            .and_then(|ep| graph.level(ep))
            .unwrap_or(0);
        let mut index = Self::new(store.dimension(), config)?;
        index.store = store;
        index.graph = graph;
        index.entry_point = entry_point;
        index.max_level = max_level;
        index.sealed = sealed;
        index.check_consistency()?;
        Ok(index)
    }

    /// Inserts `vector` under `key`.
    ///
    /// The vector is validated and stored first; nothing is linked into the
    /// graph if validation fails.
    pub fn insert(&mut self, key: VectorKey, vector: &[f32]) -> IndexResult<()> {
        if self.sealed {
            return Err(IndexError::Sealed);
        }

        let slot = self.store.put(key, vector)?;
        let level = random_level(
            &mut self.rng,
            self.config.level_multiplier(),
            self.config.max_layers,
        );
        let node = self.graph.add_node(level);
        debug_assert_eq!(node, slot, "graph and store slots diverged");

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(slot);
            self.max_level = level;
            trace!("Key {key} is the first entry point at level {level}");
            return Ok(());
        };

        // Link against the stored form so quantized indexes stay self-consistent
        let query = self.store.vector_at(slot).into_owned();

        let mut entry_points = vec![self.candidate(&query, entry)];
        for layer in (level + 1..=self.max_level).rev() {
            entry_points = self.search_layer(&query, &entry_points, 1, layer);
        }

        for layer in (0..=level.min(self.max_level)).rev() {
            let candidates =
                self.search_layer(&query, &entry_points, self.config.expansion_add, layer);

            let selected: Vec<Slot> = candidates
                .iter()
                .filter(|c| c.slot != slot)
                .take(self.config.connectivity)
                .map(|c| c.slot)
                .collect();

            let max_degree = self.config.max_degree(layer);
            for &neighbor in &selected {
                if self.graph.add_edge(neighbor, slot, layer) > max_degree {
                    self.prune(neighbor, layer, max_degree);
                }
            }
            self.graph.set_neighbors(slot, layer, selected);

            if !candidates.is_empty() {
                entry_points = candidates;
            }
        }

        if level > self.max_level {
            trace!("Key {key} becomes entry point at level {level}");
            self.entry_point = Some(slot);
            self.max_level = level;
        }
        Ok(())
    }

    /// Returns up to `k` approximate nearest neighbors of `query`.
    ///
    /// Results are ascending by distance with ties broken by ascending key.
    /// An empty index yields an empty result.
    pub fn search(&self, query: &[f32], k: usize) -> IndexResult<Vec<Match>> {
        self.search_with_expansion(query, k, self.config.expansion_search)
    }

    /// Like [`search`](Self::search) with an explicit candidate list size.
    pub fn search_with_expansion(
        &self,
        query: &[f32],
        k: usize,
        expansion: usize,
    ) -> IndexResult<Vec<Match>> {
        self.validate_query(query, k)?;
        if expansion == 0 {
            return Err(IndexError::config("expansion must be positive"));
        }

        let Some(entry) = self.entry_point else {
            return Ok(Vec::new());
        };

        let mut entry_points = vec![self.candidate(query, entry)];
        for layer in (1..=self.max_level).rev() {
            entry_points = self.search_layer(query, &entry_points, 1, layer);
        }

        let found = self.search_layer(query, &entry_points, expansion.max(k), 0);
        Ok(found
            .into_iter()
            .take(k)
            .map(|c| Match::new(c.key, c.distance))
            .collect())
    }

    /// Exhaustive search over every stored vector.
    ///
    /// Same ordering contract as [`search`](Self::search); used as ground
    /// truth when measuring recall.
    pub fn exact_search(&self, query: &[f32], k: usize) -> IndexResult<Vec<Match>> {
        self.validate_query(query, k)?;
        let mut all: Vec<Match> = self
            .store
            .iter()
            .map(|(key, vector)| Match::new(key, self.config.metric.distance(query, &vector)))
            .collect();
        all.sort();
        all.truncate(k);
        Ok(all)
    }

    /// Changes the default search expansion (efSearch).
    pub fn set_expansion_search(&mut self, expansion: usize) -> IndexResult<()> {
        if expansion == 0 {
            return Err(IndexError::config("expansion_search must be positive"));
        }
        self.config.expansion_search = expansion;
        Ok(())
    }

    /// Freezes the index: later inserts fail with [`IndexError::Sealed`].
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    #[must_use]
    pub fn phase(&self) -> IndexPhase {
        if self.sealed {
            IndexPhase::Searchable
        } else if self.store.is_empty() {
            IndexPhase::Empty
        } else {
            IndexPhase::Building
        }
    }

    /// Verifies that graph and store hold the same number of entries.
    pub fn check_consistency(&self) -> IndexResult<()> {
        if self.graph.len() != self.store.len() {
            return Err(IndexError::Consistency {
                graph: self.graph.len(),
                store: self.store.len(),
            });
        }
        Ok(())
    }

    /// Reads back a stored vector.
    pub fn get(&self, key: VectorKey) -> IndexResult<Vec<f32>> {
        Ok(self.store.get(key)?)
    }

    #[must_use]
    pub fn contains(&self, key: VectorKey) -> bool {
        self.store.contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.store.dimension()
    }

    #[must_use]
    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    /// Highest layer currently in use.
    #[must_use]
    pub fn max_level(&self) -> usize {
        self.max_level
    }

    /// Key of the global entry point, if any.
    #[must_use]
    pub fn entry_point(&self) -> Option<VectorKey> {
        self.entry_point.map(|slot| self.store.key_at(slot))
    }

    #[must_use]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub(crate) fn graph(&self) -> &LayeredGraph {
        &self.graph
    }

    /// Neighbor keys of `key` on `layer`, nearest-first order not guaranteed.
    #[must_use]
    pub fn neighbors(&self, key: VectorKey, layer: usize) -> Vec<VectorKey> {
        self.store
            .slot_of(key)
            .map(|slot| {
                self.graph
                    .neighbors(slot, layer)
                    .iter()
                    .map(|&n| self.store.key_at(n))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn validate_query(&self, query: &[f32], k: usize) -> IndexResult<()> {
        if k == 0 {
            return Err(IndexError::config("k must be at least 1"));
        }
        self.store.dimension().validate_vector(query)?;
        if let Some((index, &value)) = query.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(VectorError::NonFiniteComponent { index, value }.into());
        }
        Ok(())
    }

    fn candidate(&self, query: &[f32], slot: Slot) -> Candidate {
        Candidate {
            slot,
            key: self.store.key_at(slot),
            distance: self
                .config
                .metric
                .distance(query, &self.store.vector_at(slot)),
        }
    }

    /// Best-first search of one layer.
    ///
    /// Returns at most `ef` candidates, closest first.
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[Candidate],
        ef: usize,
        layer: usize,
    ) -> Vec<Candidate> {
        // Min-heap for candidates (closest first)
        let mut frontier: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        // Max-heap for results (furthest first, for pruning)
        let mut results: BinaryHeap<Candidate> = BinaryHeap::new();
        let mut visited: HashSet<Slot> = HashSet::new();

        for &ep in entry_points {
            if visited.insert(ep.slot) {
                frontier.push(Reverse(ep));
                results.push(ep);
            }
        }
        while results.len() > ef {
            results.pop();
        }

        while let Some(Reverse(current)) = frontier.pop() {
            if results.len() >= ef
                && results
                    .peek()
                    .is_some_and(|worst| current.distance > worst.distance)
            {
                break;
            }

            for &neighbor in self.graph.neighbors(current.slot, layer) {
                if !visited.insert(neighbor) {
                    continue;
                }
                let candidate = self.candidate(query, neighbor);

                let improves = results.len() < ef
                    || results.peek().is_some_and(|worst| candidate < *worst);
                if improves {
                    frontier.push(Reverse(candidate));
                    results.push(candidate);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        results.into_sorted_vec()
    }

    /// Shrinks the neighbor list of `node` on `layer` to its `max_degree`
    /// nearest entries.
    fn prune(&mut self, node: Slot, layer: usize, max_degree: usize) {
        let base = self.store.vector_at(node).into_owned();
        let mut scored: Vec<Candidate> = self
            .graph
            .neighbors(node, layer)
            .iter()
            .map(|&n| self.candidate(&base, n))
            .collect();
        scored.sort();
        scored.truncate(max_degree);
        self.graph
            .set_neighbors(node, layer, scored.into_iter().map(|c| c.slot).collect());
    }
}
