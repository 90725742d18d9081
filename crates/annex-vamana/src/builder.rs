//! Vamana index builder.
//!
//! Builds a Vamana graph over prepared vectors and writes every index file
//! under one prefix.

use crate::files::{self, DiskMeta, IndexFiles};
use crate::graph::{DiskGraphBuilder, NodeId};
use crate::pq::{PQConfig, ProductQuantizer};
use crate::{Result, VamanaError};
use annex_core::{l2_distance_squared, MetricType, Version};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

/// Vamana build and search configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct VamanaParams {
    /// Maximum out-degree (R). Default: 64.
    pub max_degree: usize,

    /// Search list size (L) during construction, and the default for
    /// queries. Default: 100.
    pub search_list_size: usize,

    /// Pruning parameter (alpha). Default: 1.2.
    pub alpha: f32,

    /// Number of build passes. Default: 2.
    pub num_passes: usize,

    /// Nodes expanded per search round. Default: 8.
    pub beamwidth: usize,

    /// Memory for cached adjacency lists near the entry point.
    /// Default: 0 (no cache).
    pub search_cache_budget_gb: f64,

    /// Seed for the initial random graph and insertion order. Default: 42.
    pub seed: u64,

    /// Product Quantization config.
    pub pq_config: PQConfig,
}

impl Default for VamanaParams {
    fn default() -> Self {
        Self {
            max_degree: 64,
            search_list_size: 100,
            alpha: 1.2,
            num_passes: 2,
            beamwidth: 8,
            search_cache_budget_gb: 0.0,
            seed: 42,
            pq_config: PQConfig::default(),
        }
    }
}

/// Candidate during search.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    node_id: NodeId,
    distance: f32,
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.node_id.cmp(&other.node_id))
    }
}

/// Vamana index builder.
///
/// The graph is always built with squared L2 over the prepared vectors; for
/// COSINE those are unit vectors, so neighbourhoods match the metric.
#[derive(Debug)]
pub struct VamanaBuilder {
    dimensions: usize,
    metric: MetricType,
    params: VamanaParams,
    /// Prepared vectors, `rows x dimensions`
    vectors: Vec<f32>,
    ids: Vec<i64>,
}

impl VamanaBuilder {
    pub fn new(dimensions: usize, metric: MetricType, params: VamanaParams) -> Self {
        Self {
            dimensions,
            metric,
            params,
            vectors: Vec::new(),
            ids: Vec::new(),
        }
    }

    /// Add a vector to be indexed. It must already be prepared for the
    /// metric.
    pub fn add(&mut self, id: i64, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(VamanaError::Build(format!(
                "Dimension mismatch: expected {}, got {}",
                self.dimensions,
                vector.len()
            )));
        }

        self.ids.push(id);
        self.vectors.extend_from_slice(vector);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Build the Vamana index and write all of its files.
    ///
    /// Returns the summary also written to the `.meta` file.
    pub fn build(self, files: &IndexFiles, version: Version) -> Result<DiskMeta> {
        if self.vectors.is_empty() {
            return Err(VamanaError::Build("No vectors to build".to_string()));
        }
        let n = self.len();

        // 1. Train Product Quantization
        let pq = ProductQuantizer::train(&self.vectors, self.dimensions, &self.params.pq_config)?;

        // 2. Encode all vectors
        let codes = pq.encode_all(&self.vectors);

        // 3. Build Vamana graph
        let medoid = self.medoid();
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut graph = DiskGraphBuilder::new(n, self.params.max_degree);
        self.initialize_random_graph(&mut graph, &mut rng);

        for pass in 0..self.params.num_passes {
            let alpha = if pass + 1 < self.params.num_passes {
                1.0
            } else {
                self.params.alpha
            };
            self.prune_pass(&mut graph, medoid, alpha, &mut rng);
            tracing::debug!(pass, alpha, edges = graph.edge_count(), "vamana pass done");
        }

        // 4. Write files
        files.ensure_parent()?;
        graph.write(&files.graph())?;
        files::write_pq(&files.pq(), &pq, &codes)?;
        files::write_vectors(&files.vectors(), &self.vectors, self.dimensions)?;
        files::write_ids(&files.ids(), &self.ids)?;

        let meta = DiskMeta {
            version: version.number(),
            metric: self.metric,
            dim: self.dimensions,
            count: n,
            medoid,
            max_degree: self.params.max_degree,
            search_list_size: self.params.search_list_size,
            beamwidth: self.params.beamwidth,
            alpha: self.params.alpha,
            num_subspaces: pq.num_subspaces(),
        };
        files::write_meta(&files.meta(), &meta)?;

        tracing::info!(
            count = n,
            dim = self.dimensions,
            medoid,
            edges = graph.edge_count(),
            prefix = %files.prefix().display(),
            "built vamana index"
        );
        Ok(meta)
    }

    fn vector(&self, node: NodeId) -> &[f32] {
        let start = node as usize * self.dimensions;
        &self.vectors[start..start + self.dimensions]
    }

    fn compute_distance(&self, query: &[f32], node: NodeId) -> f32 {
        l2_distance_squared(query, self.vector(node))
    }

    /// Node closest to the mean vector; every search starts there.
    fn medoid(&self) -> NodeId {
        let n = self.len();
        let mut mean = vec![0.0f64; self.dimensions];
        for row in self.vectors.chunks_exact(self.dimensions) {
            for (m, &v) in mean.iter_mut().zip(row) {
                *m += f64::from(v);
            }
        }
        let mean: Vec<f32> = mean.into_iter().map(|m| (m / n as f64) as f32).collect();

        (0..n as NodeId)
            .map(|node| Candidate {
                node_id: node,
                distance: self.compute_distance(&mean, node),
            })
            .min()
            .map_or(0, |c| c.node_id)
    }

    /// Initialize graph with random edges.
    fn initialize_random_graph(&self, graph: &mut DiskGraphBuilder, rng: &mut StdRng) {
        let n = self.len();
        if n < 2 {
            return;
        }
        let degree = self.params.max_degree.min(n - 1);

        for node in 0..n as NodeId {
            // Sample from the other n - 1 nodes, skipping over `node`
            let picked = sample(rng, n - 1, degree);
            let neighbors = picked
                .into_iter()
                .map(|i| {
                    let i = i as NodeId;
                    if i >= node {
                        i + 1
                    } else {
                        i
                    }
                })
                .collect();
            graph.set_neighbors(node, neighbors);
        }
    }

    /// Perform a pruning pass over all nodes in random order.
    fn prune_pass(&self, graph: &mut DiskGraphBuilder, medoid: NodeId, alpha: f32, rng: &mut StdRng) {
        let mut order: Vec<NodeId> = (0..self.len() as NodeId).collect();
        order.shuffle(rng);

        for node in order {
            let query = self.vector(node);
            let mut candidates = self.greedy_search(graph, medoid, query, self.params.search_list_size);
            for &existing in graph.neighbors(node) {
                candidates.push(Candidate {
                    node_id: existing,
                    distance: self.compute_distance(query, existing),
                });
            }

            let pruned = self.robust_prune(candidates, node, alpha);
            graph.set_neighbors(node, pruned.clone());

            // Add reverse edges, re-pruning neighbours that are full
            for &neighbor in &pruned {
                if graph.neighbors(neighbor).contains(&node) || graph.add_edge(neighbor, node) {
                    continue;
                }
                let base = self.vector(neighbor);
                let candidates: Vec<Candidate> = graph
                    .neighbors(neighbor)
                    .iter()
                    .copied()
                    .chain(std::iter::once(node))
                    .map(|other| Candidate {
                        node_id: other,
                        distance: self.compute_distance(base, other),
                    })
                    .collect();
                let reselected = self.robust_prune(candidates, neighbor, alpha);
                graph.set_neighbors(neighbor, reselected);
            }
        }
    }

    /// Greedy search in the graph, returning up to `list_size` nodes
    /// closest first.
    fn greedy_search(
        &self,
        graph: &DiskGraphBuilder,
        entry: NodeId,
        query: &[f32],
        list_size: usize,
    ) -> Vec<Candidate> {
        let mut candidates: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        let mut results: BinaryHeap<Candidate> = BinaryHeap::new();
        let mut visited: HashSet<NodeId> = HashSet::new();

        let start = Candidate {
            node_id: entry,
            distance: self.compute_distance(query, entry),
        };
        candidates.push(Reverse(start));
        results.push(start);
        visited.insert(entry);

        while let Some(Reverse(current)) = candidates.pop() {
            if results.len() >= list_size {
                if let Some(worst) = results.peek() {
                    if current.distance > worst.distance {
                        break;
                    }
                }
            }

            for &neighbor in graph.neighbors(current.node_id) {
                if !visited.insert(neighbor) {
                    continue;
                }

                let dist = self.compute_distance(query, neighbor);
                let should_add =
                    results.len() < list_size || results.peek().map(|w| dist < w.distance).unwrap_or(true);

                if should_add {
                    let candidate = Candidate {
                        node_id: neighbor,
                        distance: dist,
                    };
                    candidates.push(Reverse(candidate));
                    results.push(candidate);

                    while results.len() > list_size {
                        results.pop();
                    }
                }
            }
        }

        results.into_sorted_vec()
    }

    /// Robust pruning: repeatedly keep the closest remaining candidate and
    /// drop every candidate it dominates.
    ///
    /// Distances are squared, so the alpha test compares against alpha^2.
    fn robust_prune(&self, mut candidates: Vec<Candidate>, node: NodeId, alpha: f32) -> Vec<NodeId> {
        let alpha_sq = alpha * alpha;
        candidates.retain(|c| c.node_id != node);
        candidates.sort();
        candidates.dedup_by_key(|c| c.node_id);

        let mut result = Vec::with_capacity(self.params.max_degree);
        let mut remaining = candidates;
        while !remaining.is_empty() && result.len() < self.params.max_degree {
            let best = remaining.remove(0);
            result.push(best.node_id);

            let best_vector = self.vector(best.node_id);
            remaining.retain(|c| {
                let dist_to_best = l2_distance_squared(self.vector(c.node_id), best_vector);
                // Keep if c is closer to node than alpha * dist_to_best
                c.distance < alpha_sq * dist_to_best
            });
        }

        result
    }
}
