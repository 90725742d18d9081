//! HNSW layer management.

use crate::graph::{LayerGraph, NodeId};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// The stack of layer graphs, bottom layer first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layers {
    layers: Vec<LayerGraph>,
    /// Max connections per node in layers above 0.
    m: usize,
    /// Max connections in layer 0.
    m_max0: usize,
}

impl Layers {
    /// # Arguments
    ///
    /// * `max_layers` - Maximum number of layers
    /// * `m` - Max connections per node (layers > 0)
    /// * `m_max0` - Max connections in layer 0 (typically 2*M)
    pub fn new(max_layers: usize, m: usize, m_max0: usize) -> Self {
        let layers = (0..max_layers)
            .map(|layer| {
                let max_degree = if layer == 0 { m_max0 } else { m };
                LayerGraph::new(max_degree)
            })
            .collect();

        Self { layers, m, m_max0 }
    }

    pub fn get(&self, layer: usize) -> Option<&LayerGraph> {
        self.layers.get(layer)
    }

    pub fn get_mut(&mut self, layer: usize) -> Option<&mut LayerGraph> {
        self.layers.get_mut(layer)
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Degree cap at `layer`.
    pub fn max_degree(&self, layer: usize) -> usize {
        if layer == 0 {
            self.m_max0
        } else {
            self.m
        }
    }

    pub fn contains_at(&self, layer: usize, node_id: NodeId) -> bool {
        self.layers
            .get(layer)
            .map(|l| l.contains(node_id))
            .unwrap_or(false)
    }

    /// Node count of every layer, bottom first, stopping at the first
    /// empty layer.
    pub fn histogram(&self) -> Vec<usize> {
        self.layers
            .iter()
            .take_while(|l| !l.is_empty())
            .map(LayerGraph::len)
            .collect()
    }
}

/// Draw the top layer for a new node.
///
/// Uses floor(-ln(uniform(0,1)) * m_L) with m_L = 1/ln(M), so the
/// probability of reaching layer L is roughly 1/M^L.
pub fn random_layer<R: Rng>(rng: &mut R, m: usize, max_layers: usize) -> usize {
    let m_l = 1.0 / (m.max(2) as f64).ln();
    let uniform: f64 = rng.gen_range(0.0001..1.0); // Avoid ln(0)

    let layer = (-uniform.ln() * m_l).floor() as usize;
    layer.min(max_layers - 1)
}
