//! Disk-resident graph storage for Vamana.
//!
//! Stores the Vamana graph on disk using mmap for memory-efficient access.

use crate::{Result, VamanaError};
use bytes::Buf;
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Node ID type (u32 supports ~4 billion vectors).
pub type NodeId = u32;

const HEADER_SIZE: usize = 8;
const EMPTY_SLOT: NodeId = NodeId::MAX;

/// Disk-resident graph.
///
/// The graph is stored with fixed-size adjacency lists for efficient random access.
/// Format:
/// - Header: num_nodes (u32), max_degree (u32)
/// - Adjacency: [node_0_neighbors...][node_1_neighbors...]...
///   - Each node has max_degree slots (u32 each), unused filled with u32::MAX
#[derive(Debug)]
pub struct DiskGraph {
    mmap: memmap2::Mmap,
    num_nodes: usize,
    max_degree: usize,
}

impl DiskGraph {
    /// Open an existing disk graph.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: index files are written once during build and never
        // modified while mapped.
        let mmap = unsafe { memmap2::Mmap::map(&file)? };

        if mmap.len() < HEADER_SIZE {
            return Err(VamanaError::Graph(format!(
                "{} is shorter than its header",
                path.display()
            )));
        }
        let mut header = &mmap[..HEADER_SIZE];
        let num_nodes = header.get_u32_le() as usize;
        let max_degree = header.get_u32_le() as usize;

        let expected = HEADER_SIZE + num_nodes * max_degree * 4;
        if mmap.len() != expected {
            return Err(VamanaError::Graph(format!(
                "{} holds {} bytes, expected {} for {} nodes of degree {}",
                path.display(),
                mmap.len(),
                expected,
                num_nodes,
                max_degree
            )));
        }

        Ok(Self {
            mmap,
            num_nodes,
            max_degree,
        })
    }

    /// Append the neighbors of `node_id` to `out`.
    pub fn neighbors_into(&self, node_id: NodeId, out: &mut Vec<NodeId>) {
        if node_id as usize >= self.num_nodes {
            return;
        }
        let start = HEADER_SIZE + (node_id as usize) * self.max_degree * 4;
        let mut slots = &self.mmap[start..start + self.max_degree * 4];

        while slots.has_remaining() {
            let neighbor = slots.get_u32_le();
            if neighbor == EMPTY_SLOT {
                break; // End of neighbors
            }
            out.push(neighbor);
        }
    }

    /// Get neighbors of a node.
    pub fn neighbors(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut neighbors = Vec::with_capacity(self.max_degree);
        self.neighbors_into(node_id, &mut neighbors);
        neighbors
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn max_degree(&self) -> usize {
        self.max_degree
    }

    /// First neighbor id that does not name a node, if any.
    pub fn find_dangling(&self) -> Option<(NodeId, NodeId)> {
        let mut scratch = Vec::with_capacity(self.max_degree);
        for node in 0..self.num_nodes as NodeId {
            scratch.clear();
            self.neighbors_into(node, &mut scratch);
            if let Some(&bad) = scratch.iter().find(|&&n| n as usize >= self.num_nodes) {
                return Some((node, bad));
            }
        }
        None
    }
}

/// In-memory adjacency lists of the nodes nearest the entry point.
///
/// Filled breadth-first from the entry point until the byte budget runs
/// out; searches consult it before touching the mapped graph.
#[derive(Debug, Default)]
pub struct NodeCache {
    neighbors: HashMap<NodeId, Vec<NodeId>>,
}

impl NodeCache {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Cache lists reachable from `start` while they fit in `budget_bytes`.
    pub fn warm(graph: &DiskGraph, start: NodeId, budget_bytes: usize) -> Self {
        let per_node = (graph.max_degree() * 4).max(1);
        let capacity = (budget_bytes / per_node).min(graph.num_nodes());
        let mut neighbors = HashMap::with_capacity(capacity);
        if capacity == 0 {
            return Self { neighbors };
        }

        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            if neighbors.len() >= capacity {
                break;
            }
            if neighbors.contains_key(&node) {
                continue;
            }
            let list = graph.neighbors(node);
            queue.extend(list.iter().copied());
            neighbors.insert(node, list);
        }
        Self { neighbors }
    }

    pub fn get(&self, node_id: NodeId) -> Option<&[NodeId]> {
        self.neighbors.get(&node_id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

/// Builder for disk graph.
#[derive(Debug)]
pub struct DiskGraphBuilder {
    adjacency: Vec<Vec<NodeId>>,
    max_degree: usize,
}

impl DiskGraphBuilder {
    /// A builder holding `num_nodes` nodes without edges.
    pub fn new(num_nodes: usize, max_degree: usize) -> Self {
        Self {
            adjacency: vec![Vec::with_capacity(max_degree); num_nodes],
            max_degree,
        }
    }

    /// Set neighbors for a node.
    pub fn set_neighbors(&mut self, node_id: NodeId, neighbors: Vec<NodeId>) {
        debug_assert!(neighbors.len() <= self.max_degree);
        self.adjacency[node_id as usize] = neighbors;
    }

    /// Get neighbors (during construction).
    pub fn neighbors(&self, node_id: NodeId) -> &[NodeId] {
        &self.adjacency[node_id as usize]
    }

    /// Add an edge (if not over max_degree).
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> bool {
        let neighbors = &mut self.adjacency[from as usize];
        if neighbors.len() < self.max_degree && !neighbors.contains(&to) {
            neighbors.push(to);
            true
        } else {
            false
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.adjacency.len()
    }

    pub fn max_degree(&self) -> usize {
        self.max_degree
    }

    /// Total number of directed edges.
    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum()
    }

    /// Write graph to disk.
    pub fn write(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        // Write header
        writer.write_all(&(self.adjacency.len() as u32).to_le_bytes())?;
        writer.write_all(&(self.max_degree as u32).to_le_bytes())?;

        // Write adjacency lists
        for neighbors in &self.adjacency {
            for &neighbor in neighbors {
                writer.write_all(&neighbor.to_le_bytes())?;
            }
            // Pad with u32::MAX
            for _ in neighbors.len()..self.max_degree {
                writer.write_all(&EMPTY_SLOT.to_le_bytes())?;
            }
        }

        writer.flush()?;
        Ok(())
    }
}
