//! Layered adjacency lists and level assignment.
//!
//! Node ids are store slots, so node `n` in the graph is vector `n` in the
//! [`VectorStore`](crate::vector::VectorStore). A node present at level `L`
//! has neighbor lists for layers `0..=L`.

use rand::Rng;

use crate::vector::Slot;

/// Neighbor lists of one node, indexed by layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeLinks {
    layers: Vec<Vec<Slot>>,
}

impl NodeLinks {
    /// Empty lists for a node living on layers `0..=level`.
    #[must_use]
    pub fn new(level: usize) -> Self {
        Self {
            layers: vec![Vec::new(); level + 1],
        }
    }

    pub(crate) fn from_layers(layers: Vec<Vec<Slot>>) -> Self {
        Self { layers }
    }

    /// Highest layer this node appears on.
    #[must_use]
    pub fn level(&self) -> usize {
        self.layers.len().saturating_sub(1)
    }

    #[must_use]
    pub fn layers(&self) -> &[Vec<Slot>] {
        &self.layers
    }
}

/// All nodes of an HNSW graph.
#[derive(Debug, Clone, Default)]
pub struct LayeredGraph {
    nodes: Vec<NodeLinks>,
}

impl LayeredGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_nodes(nodes: Vec<NodeLinks>) -> Self {
        Self { nodes }
    }

    /// Appends a node and returns its id.
    pub fn add_node(&mut self, level: usize) -> Slot {
        self.nodes.push(NodeLinks::new(level));
        (self.nodes.len() - 1) as Slot
    }

    /// Neighbors of `node` on `layer`; empty if the node is not on that layer.
    #[must_use]
    pub fn neighbors(&self, node: Slot, layer: usize) -> &[Slot] {
        self.nodes
            .get(node as usize)
            .and_then(|links| links.layers.get(layer))
            .map_or(&[], Vec::as_slice)
    }

    /// Replaces the neighbor list of `node` on `layer`.
    pub fn set_neighbors(&mut self, node: Slot, layer: usize, neighbors: Vec<Slot>) {
        if let Some(list) = self
            .nodes
            .get_mut(node as usize)
            .and_then(|links| links.layers.get_mut(layer))
        {
            *list = neighbors;
        }
    }

    /// Adds a directed edge, ignoring duplicates and self-loops.
    ///
    /// Returns the new degree of `from` on `layer`.
    pub fn add_edge(&mut self, from: Slot, to: Slot, layer: usize) -> usize {
        match self
            .nodes
            .get_mut(from as usize)
            .and_then(|links| links.layers.get_mut(layer))
        {
            Some(list) => {
                if from != to && !list.contains(&to) {
                    list.push(to);
                }
                list.len()
            }
            None => 0,
        }
    }

    /// Level of `node`, or `None` for unknown ids.
    #[must_use]
    pub fn level(&self, node: Slot) -> Option<usize> {
        self.nodes.get(node as usize).map(NodeLinks::level)
    }

    #[must_use]
    pub fn nodes(&self) -> &[NodeLinks] {
        &self.nodes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Draw a level for a new node.
///
/// Uses `floor(-ln(U) * m_L)` with `U` uniform in `(0, 1]` and
/// `m_L = 1 / ln(M)`, so a node reaches layer `L` with probability about
/// `M^-L`. Capped at `max_layers - 1`.
pub fn random_level<R: Rng + ?Sized>(rng: &mut R, level_multiplier: f64, max_layers: usize) -> usize {
    let uniform: f64 = 1.0 - rng.random::<f64>();
    let level = (-uniform.ln() * level_multiplier).floor() as usize;
    level.min(max_layers.saturating_sub(1))
}
