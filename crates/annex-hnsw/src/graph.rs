//! Adjacency storage for one HNSW layer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Internal node id: the row position of the vector.
pub type NodeId = u32;

/// Out-neighbours of a node at one layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighbors {
    pub ids: Vec<NodeId>,
}

impl Neighbors {
    pub fn new() -> Self {
        Self { ids: Vec::new() }
    }

    /// Add a neighbour. Returns false if already present.
    pub fn add(&mut self, id: NodeId) -> bool {
        if self.ids.contains(&id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.ids.iter()
    }
}

impl FromIterator<NodeId> for Neighbors {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        let mut neighbors = Neighbors::new();
        for id in iter {
            neighbors.add(id);
        }
        neighbors
    }
}

/// Graph for a single HNSW layer.
///
/// Layer 0 holds every node with degree up to `M_max0`; upper layers hold
/// the nodes sampled into them with degree up to `M`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerGraph {
    adjacency: HashMap<NodeId, Neighbors>,
    max_degree: usize,
}

impl LayerGraph {
    pub fn new(max_degree: usize) -> Self {
        Self {
            adjacency: HashMap::new(),
            max_degree,
        }
    }

    pub fn neighbors(&self, node_id: NodeId) -> Option<&Neighbors> {
        self.adjacency.get(&node_id)
    }

    /// Replace the neighbour list of `node_id`, inserting the node if new.
    pub fn set_neighbors(&mut self, node_id: NodeId, neighbors: Neighbors) {
        self.adjacency.insert(node_id, neighbors);
    }

    /// Add a directed edge. Returns the new out-degree of `from`.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> usize {
        let list = self.adjacency.entry(from).or_default();
        list.add(to);
        list.len()
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.adjacency.contains_key(&node_id)
    }

    /// Number of nodes in this layer.
    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    pub fn max_degree(&self) -> usize {
        self.max_degree
    }

    /// Nodes and their neighbour lists.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Neighbors)> {
        self.adjacency.iter().map(|(&id, n)| (id, n))
    }

    /// Total number of directed edges.
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(Neighbors::len).sum()
    }
}
