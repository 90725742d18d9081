//! HNSW index implementation.
//!
//! Implements the Hierarchical Navigable Small World algorithm on top of the
//! [`IndexNode`] contract. Nodes are row positions; vectors are stored
//! prepared for the metric (normalized for COSINE) in one flat buffer.

use crate::graph::{Neighbors, NodeId};
use crate::layer::{random_layer, Layers};
use crate::visited::VisitedSet;
use crate::HnswError;
use annex_core::{
    check_bitset, check_dim_key, check_metric, check_queries, check_vectors, pack_top_k,
    resolve_ids, seal, unseal, AnnIterator, BinarySet, BitsetView, Config, ConfigSchema, Dataset,
    GraphSource, GraphWalkIterator, IdMap, IndexError, IndexNode, IndexState, MetricType,
    Neighbor, Operation, ParamSpec, RangeSearchResult, Result, TopK, ValidatedConfig, Version,
    VersionRange,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

const BLOB_NAME: &str = "HNSW";

/// Mask density above which a query scans the unmasked rows directly.
const BRUTE_FORCE_RATIO: f32 = 0.9;

/// Starting search list for range search.
const RANGE_MIN_EF: usize = 32;

/// HNSW build and search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HnswParams {
    /// Max connections per node (M parameter).
    /// Default: 16
    pub m: usize,

    /// Max connections in layer 0, always 2*M.
    pub m_max0: usize,

    /// Beam width during construction.
    /// Higher = better quality, slower build.
    /// Default: 200
    pub ef_construction: usize,

    /// Beam width during search when the query does not set `ef`.
    /// Default: 100
    pub ef: usize,

    /// Maximum number of layers.
    /// Default: 16 (supports ~10^7 vectors)
    pub max_layers: usize,

    /// Seed for layer sampling. Default: 42.
    pub seed: u64,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            m_max0: 32,
            ef_construction: 200,
            ef: 100,
            max_layers: 16,
            seed: 42,
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

#[derive(Serialize, Deserialize)]
struct HnswBlob {
    metric: MetricType,
    dim: usize,
    params: HnswParams,
    vectors: Vec<f32>,
    levels: Vec<u8>,
    layers: Layers,
    entry_point: Option<NodeId>,
    max_layer: usize,
    ids: Vec<i64>,
}

/// HNSW index.
#[derive(Debug)]
pub struct HnswIndex {
    version: Version,
    state: IndexState,
    metric: MetricType,
    dim: usize,
    params: HnswParams,

    /// Prepared vectors, `count x dim`.
    vectors: Vec<f32>,

    /// Top layer of each node.
    levels: Vec<u8>,

    layers: Layers,

    /// Entry point (a node on the highest layer).
    entry_point: Option<NodeId>,

    /// Current max layer in use.
    max_layer: usize,

    ids: IdMap,
    rng: StdRng,

    /// Scratch for inserts.
    visited: VisitedSet,
}

impl HnswIndex {
    pub const TYPE: &'static str = "HNSW";

    /// Versions an HNSW index can be created or loaded under.
    pub const VERSIONS: VersionRange = VersionRange::new(Version::minimal(), Version::current());

    pub fn new(version: Version) -> Self {
        let params = HnswParams::default();
        Self {
            version,
            state: IndexState::Uninitialized,
            metric: MetricType::L2,
            dim: 0,
            layers: Layers::new(params.max_layers, params.m, params.m_max0),
            rng: StdRng::seed_from_u64(params.seed),
            params,
            vectors: Vec::new(),
            levels: Vec::new(),
            entry_point: None,
            max_layer: 0,
            ids: IdMap::new(),
            visited: VisitedSet::default(),
        }
    }

    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    pub fn metric(&self) -> MetricType {
        self.metric
    }

    /// Node count of every populated layer, bottom first.
    pub fn level_histogram(&self) -> Vec<usize> {
        self.layers.histogram()
    }

    fn vector(&self, node_id: NodeId) -> &[f32] {
        let start = node_id as usize * self.dim;
        &self.vectors[start..start + self.dim]
    }

    fn distance_to_node(&self, query: &[f32], node_id: NodeId) -> f32 {
        self.metric.distance(query, self.vector(node_id))
    }

    fn node_distance(&self, a: NodeId, b: NodeId) -> f32 {
        self.metric.distance(self.vector(a), self.vector(b))
    }

    /// Greedy walk from `entry` through layers `top` down to `bottom`,
    /// moving to the closest neighbour until no neighbour improves.
    fn greedy_descend(&self, query: &[f32], entry: NodeId, top: usize, bottom: usize) -> NodeId {
        let mut current = entry;
        let mut best = self.distance_to_node(query, current);

        for layer in (bottom..=top).rev() {
            let Some(graph) = self.layers.get(layer) else {
                continue;
            };
            loop {
                let mut changed = false;
                if let Some(neighbors) = graph.neighbors(current) {
                    for &neighbor_id in neighbors.iter() {
                        let dist = self.distance_to_node(query, neighbor_id);
                        if dist < best {
                            best = dist;
                            current = neighbor_id;
                            changed = true;
                        }
                    }
                }
                if !changed {
                    break;
                }
            }
        }
        current
    }

    /// Beam search over one layer.
    ///
    /// Masked nodes are traversed but never enter the result set. Returns
    /// up to `ef` unmasked candidates, closest first.
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[NodeId],
        ef: usize,
        layer: usize,
        visited: &mut VisitedSet,
        bitset: &BitsetView<'_>,
    ) -> Vec<Candidate> {
        // Min-heap for candidates (closest first)
        let mut candidates: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        // Max-heap for results (furthest first, for pruning)
        let mut results: BinaryHeap<Candidate> = BinaryHeap::new();

        for &ep in entry_points {
            if !visited.insert(ep) {
                continue;
            }
            let candidate = Candidate {
                node_id: ep,
                distance: self.distance_to_node(query, ep),
            };
            candidates.push(Reverse(candidate));
            if !bitset.test(ep as usize) {
                results.push(candidate);
            }
        }

        let Some(graph) = self.layers.get(layer) else {
            return Vec::new();
        };

        while let Some(Reverse(current)) = candidates.pop() {
            if results.len() >= ef {
                if let Some(worst) = results.peek() {
                    if current.distance > worst.distance {
                        break;
                    }
                }
            }

            let Some(neighbors) = graph.neighbors(current.node_id) else {
                continue;
            };
            for &neighbor_id in neighbors.iter() {
                if !visited.insert(neighbor_id) {
                    continue;
                }
                let dist = self.distance_to_node(query, neighbor_id);

                let should_add = results.len() < ef
                    || results.peek().map(|w| dist < w.distance).unwrap_or(true);
                if !should_add {
                    continue;
                }

                let candidate = Candidate {
                    node_id: neighbor_id,
                    distance: dist,
                };
                candidates.push(Reverse(candidate));
                if !bitset.test(neighbor_id as usize) {
                    results.push(candidate);
                    while results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        results.into_sorted_vec()
    }

    /// Diversity heuristic: keep a candidate only if it is closer to the
    /// base node than to every neighbour kept so far, then top up with the
    /// closest rejected candidates.
    ///
    /// `candidates` must be sorted closest first.
    fn select_neighbors(&self, candidates: &[Candidate], m: usize) -> Vec<NodeId> {
        let mut selected: Vec<NodeId> = Vec::with_capacity(m);
        let mut pruned: Vec<NodeId> = Vec::new();

        for candidate in candidates {
            if selected.len() >= m {
                break;
            }
            let diverse = selected
                .iter()
                .all(|&kept| self.node_distance(candidate.node_id, kept) > candidate.distance);
            if diverse {
                selected.push(candidate.node_id);
            } else {
                pruned.push(candidate.node_id);
            }
        }

        for node_id in pruned {
            if selected.len() >= m {
                break;
            }
            selected.push(node_id);
        }
        selected
    }

    /// Re-select the neighbours of `node_id` at `layer` down to `max_degree`.
    fn shrink(&self, node_id: NodeId, layer: usize, max_degree: usize) -> Neighbors {
        let Some(current) = self.layers.get(layer).and_then(|g| g.neighbors(node_id)) else {
            return Neighbors::new();
        };
        let mut scored: Vec<Candidate> = current
            .iter()
            .map(|&other| Candidate {
                node_id: other,
                distance: self.node_distance(node_id, other),
            })
            .collect();
        scored.sort();
        self.select_neighbors(&scored, max_degree).into_iter().collect()
    }

    /// Link `node_id` to `neighbors` at `layer` and add the back edges,
    /// shrinking any neighbour pushed over the degree cap.
    fn connect_node(&mut self, node_id: NodeId, neighbors: &[NodeId], layer: usize) {
        let max_degree = self.layers.max_degree(layer);
        if let Some(graph) = self.layers.get_mut(layer) {
            graph.set_neighbors(node_id, neighbors.iter().copied().collect());
        }

        for &neighbor_id in neighbors {
            let degree = match self.layers.get_mut(layer) {
                Some(graph) => graph.add_edge(neighbor_id, node_id),
                None => continue,
            };
            if degree > max_degree {
                let shrunk = self.shrink(neighbor_id, layer, max_degree);
                if let Some(graph) = self.layers.get_mut(layer) {
                    graph.set_neighbors(neighbor_id, shrunk);
                }
            }
        }
    }

    /// Wire the already-stored vector at `node_id` into the graph.
    fn insert_node(&mut self, node_id: NodeId) {
        let node_layer = random_layer(&mut self.rng, self.params.m, self.params.max_layers);
        self.levels.push(node_layer as u8);

        let Some(entry_point) = self.entry_point else {
            for layer in 0..=node_layer {
                if let Some(graph) = self.layers.get_mut(layer) {
                    graph.set_neighbors(node_id, Neighbors::new());
                }
            }
            self.entry_point = Some(node_id);
            self.max_layer = node_layer;
            return;
        };

        let query = self.vector(node_id).to_vec();
        let current_max_layer = self.max_layer;

        // Search from top layer down to node_layer + 1
        let descended = self.greedy_descend(&query, entry_point, current_max_layer, node_layer + 1);
        let mut ep = vec![descended];

        let mut visited = std::mem::take(&mut self.visited);
        visited.ensure_capacity(self.levels.len());

        // Insert into each layer from node_layer down to 0
        for layer in (0..=node_layer.min(current_max_layer)).rev() {
            visited.clear();
            let candidates = self.search_layer(
                &query,
                &ep,
                self.params.ef_construction,
                layer,
                &mut visited,
                &BitsetView::empty(),
            );
            let neighbors = self.select_neighbors(&candidates, self.layers.max_degree(layer));
            self.connect_node(node_id, &neighbors, layer);

            if !candidates.is_empty() {
                ep = candidates.iter().map(|c| c.node_id).collect();
            }
        }
        self.visited = visited;

        // Update entry point if new node has higher layer
        if node_layer > current_max_layer {
            for layer in current_max_layer + 1..=node_layer {
                if let Some(graph) = self.layers.get_mut(layer) {
                    graph.set_neighbors(node_id, Neighbors::new());
                }
            }
            self.entry_point = Some(node_id);
            self.max_layer = node_layer;
        }
    }

    /// Every unmasked row scored against `query`.
    fn exact_scan<'s>(
        &'s self,
        query: &'s [f32],
        bitset: &'s BitsetView<'s>,
    ) -> impl Iterator<Item = Neighbor> + 's {
        (0..self.count() as NodeId)
            .filter(move |&node| !bitset.test(node as usize))
            .map(move |node| Neighbor::new(self.ids.id(node), self.distance_to_node(query, node)))
    }

    /// Unmasked layer-0 neighbourhood of `query` with a search list of `ef`.
    fn search_base(
        &self,
        query: &[f32],
        ef: usize,
        visited: &mut VisitedSet,
        bitset: &BitsetView<'_>,
    ) -> Vec<Candidate> {
        let Some(entry_point) = self.entry_point else {
            return Vec::new();
        };
        let ep = self.greedy_descend(query, entry_point, self.max_layer, 1);
        visited.clear();
        self.search_layer(query, &[ep], ef, 0, visited, bitset)
    }

    fn knn(&self, query: &[f32], topk: usize, ef: usize, bitset: &BitsetView<'_>) -> Vec<Neighbor> {
        if bitset.filter_ratio() > BRUTE_FORCE_RATIO {
            let mut top = TopK::bounded(topk, self.count());
            for neighbor in self.exact_scan(query, bitset) {
                top.push(neighbor);
            }
            return top.into_sorted_vec();
        }

        let mut visited = VisitedSet::new(self.count());
        let mut found: Vec<Neighbor> = self
            .search_base(query, ef.max(topk), &mut visited, bitset)
            .into_iter()
            .map(|c| Neighbor::new(self.ids.id(c.node_id), c.distance))
            .collect();
        found.sort();
        found.truncate(topk);
        found
    }

    /// Range search doubles the search list until the list reaches past
    /// `upper` or covers the whole index.
    ///
    /// The walk and its stopping point ignore `bitset`; masked rows are
    /// dropped from the hits only. A larger mask therefore never yields a
    /// larger result.
    fn range(
        &self,
        query: &[f32],
        ef: usize,
        (upper, lower): (f32, Option<f32>),
        bitset: &BitsetView<'_>,
    ) -> Vec<Neighbor> {
        let in_range = |d: f32| d <= upper && lower.map_or(true, |l| d >= l);
        if bitset.filter_ratio() >= 1.0 {
            return Vec::new();
        }

        let count = self.count();
        let mut ef = ef.max(RANGE_MIN_EF).min(count);
        let mut visited = VisitedSet::new(count);
        loop {
            let found = self.search_base(query, ef, &mut visited, &BitsetView::empty());
            let within = found.iter().filter(|c| c.distance <= upper).count();
            if within < found.len() || found.len() < ef || ef >= count {
                let mut hits: Vec<Neighbor> = found
                    .into_iter()
                    .filter(|c| !bitset.test(c.node_id as usize) && in_range(c.distance))
                    .map(|c| Neighbor::new(self.ids.id(c.node_id), c.distance))
                    .collect();
                hits.sort();
                return hits;
            }
            ef = (ef * 2).min(count);
        }
    }

    /// Common checks in front of every query.
    fn begin<'q>(
        &self,
        queries: &'q Dataset<'_>,
        cfg: &Config,
        op: Operation,
        bitset: &BitsetView<'_>,
    ) -> Result<(ValidatedConfig, &'q [f32])> {
        self.state.require_ready()?;
        let valid = self.create_config().validate(cfg, op, self.version)?;
        check_metric(&valid, self.metric)?;
        let tensor = check_queries(queries, self.dim)?;
        check_bitset(bitset, self.count())?;
        if self.count() == 0 {
            return Err(IndexError::IndexEmpty);
        }
        Ok((valid, tensor))
    }

    fn ef(&self, valid: &ValidatedConfig) -> usize {
        valid.opt_usize("ef").unwrap_or(self.params.ef)
    }

    fn check_blob(blob: &HnswBlob) -> std::result::Result<(), HnswError> {
        let count = blob.ids.len();
        if blob.vectors.len() != count * blob.dim {
            return Err(HnswError::VectorCount {
                rows: count,
                values: blob.vectors.len(),
            });
        }
        if blob.levels.len() != count {
            return Err(HnswError::LevelCount {
                expected: count,
                actual: blob.levels.len(),
            });
        }
        match blob.entry_point {
            Some(ep) if !blob.layers.contains_at(blob.max_layer, ep) => {
                return Err(HnswError::EntryPoint(ep))
            }
            None if count > 0 => return Err(HnswError::Graph("missing entry point".to_string())),
            _ => {}
        }
        for layer in 0..blob.layers.num_layers() {
            let Some(graph) = blob.layers.get(layer) else {
                continue;
            };
            for (node, neighbors) in graph.iter() {
                let dangling = std::iter::once(&node)
                    .chain(neighbors.iter())
                    .find(|&&n| n as usize >= count);
                if let Some(&n) = dangling {
                    return Err(HnswError::DanglingEdge { layer, node: n });
                }
            }
        }
        Ok(())
    }
}

impl GraphSource for HnswIndex {
    fn len(&self) -> usize {
        self.count()
    }

    fn entry_points(&self, query: &[f32]) -> Vec<NodeId> {
        self.entry_point
            .map(|ep| vec![self.greedy_descend(query, ep, self.max_layer, 1)])
            .unwrap_or_default()
    }

    fn neighbors(&self, node: NodeId, out: &mut Vec<NodeId>) {
        if let Some(neighbors) = self.layers.get(0).and_then(|g| g.neighbors(node)) {
            out.extend(neighbors.iter().copied());
        }
    }

    fn distance(&self, query: &[f32], node: NodeId) -> f32 {
        self.distance_to_node(query, node)
    }

    fn external_id(&self, node: NodeId) -> i64 {
        self.ids.id(node)
    }
}

impl IndexNode for HnswIndex {
    fn index_type(&self) -> &str {
        Self::TYPE
    }

    fn version(&self) -> Version {
        self.version
    }

    fn state(&self) -> IndexState {
        self.state
    }

    fn create_config(&self) -> ConfigSchema {
        ConfigSchema::base(Self::TYPE)
            .with(ParamSpec::integer("m", 2, 512).with_default(16))
            .with(ParamSpec::integer("ef_construction", 1, 65536).with_default(200))
            .with(ParamSpec::integer("ef", 1, 65536))
            .with(ParamSpec::integer("seed", 0, i64::MAX).with_default(42))
    }

    fn train(&mut self, dataset: &Dataset<'_>, cfg: &Config) -> Result<()> {
        let valid = self.create_config().validate(cfg, Operation::Train, self.version)?;
        let metric = valid.metric()?;
        let dim = dataset.dim();
        if dim == 0 {
            return Err(IndexError::InvalidParameter(
                "dataset dimension must be positive".to_string(),
            ));
        }
        check_dim_key(&valid, dim)?;

        let m = valid.usize("m")?;
        let params = HnswParams {
            m,
            m_max0: m * 2,
            ef_construction: valid.usize("ef_construction")?,
            ef: valid.opt_usize("ef").unwrap_or(HnswParams::default().ef),
            max_layers: HnswParams::default().max_layers,
            seed: valid.opt_u64("seed").unwrap_or(HnswParams::default().seed),
        };

        tracing::info!(
            dim,
            metric = %metric,
            m = params.m,
            ef_construction = params.ef_construction,
            "configured hnsw graph"
        );

        self.metric = metric;
        self.dim = dim;
        self.layers = Layers::new(params.max_layers, params.m, params.m_max0);
        self.rng = StdRng::seed_from_u64(params.seed);
        self.params = params;
        self.vectors.clear();
        self.levels.clear();
        self.entry_point = None;
        self.max_layer = 0;
        self.ids = IdMap::new();
        self.state = IndexState::Trained;
        Ok(())
    }

    fn add(&mut self, dataset: &Dataset<'_>, cfg: &Config) -> Result<()> {
        self.state.require_trained()?;
        let valid = self.create_config().validate(cfg, Operation::Add, self.version)?;
        check_metric(&valid, self.metric)?;
        if dataset.dim() != self.dim && !dataset.is_empty() {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                actual: dataset.dim(),
            });
        }
        let tensor = dataset.tensor().unwrap_or(&[]);
        check_vectors(tensor)?;
        let ids = resolve_ids(dataset, self.count(), |id| self.ids.contains(id))?;

        let prepared = self.metric.prepare_rows(tensor, self.dim);
        self.vectors.reserve(prepared.len());
        for (row, &id) in prepared.chunks_exact(self.dim).zip(&ids) {
            self.vectors.extend_from_slice(row);
            let node_id = self.ids.push(id);
            self.insert_node(node_id);
        }

        tracing::debug!(
            rows = ids.len(),
            total = self.count(),
            max_layer = self.max_layer,
            "hnsw add"
        );
        self.state = IndexState::Ready;
        Ok(())
    }

    fn search(
        &self,
        queries: &Dataset<'_>,
        cfg: &Config,
        bitset: BitsetView<'_>,
    ) -> Result<Dataset<'static>> {
        let (valid, tensor) = self.begin(queries, cfg, Operation::Search, &bitset)?;
        let topk = valid.topk()?;
        let ef = self.ef(&valid);

        let results = tensor
            .chunks_exact(self.dim)
            .map(|q| self.knn(&self.metric.prepare(q), topk, ef, &bitset))
            .collect();
        Ok(pack_top_k(results, topk, self.metric))
    }

    fn range_search(
        &self,
        queries: &Dataset<'_>,
        cfg: &Config,
        bitset: BitsetView<'_>,
    ) -> Result<RangeSearchResult> {
        let (valid, tensor) = self.begin(queries, cfg, Operation::RangeSearch, &bitset)?;
        let bounds = valid.range_bounds(self.metric)?;
        let ef = self.ef(&valid);

        let results = tensor
            .chunks_exact(self.dim)
            .map(|q| self.range(&self.metric.prepare(q), ef, bounds, &bitset))
            .collect();
        Ok(RangeSearchResult::from_neighbors(results, self.metric))
    }

    fn ann_iterator<'a>(
        &'a self,
        queries: &Dataset<'_>,
        cfg: &Config,
        bitset: BitsetView<'a>,
    ) -> Result<Vec<Box<dyn AnnIterator + 'a>>> {
        if !self.version.supports_iterators() {
            return Err(IndexError::Unsupported(format!(
                "ann iterators need version 2, index is {}",
                self.version
            )));
        }
        let (_, tensor) = self.begin(queries, cfg, Operation::Iterator, &bitset)?;

        Ok(tensor
            .chunks_exact(self.dim)
            .map(|q| {
                let query = self.metric.prepare(q).into_owned();
                Box::new(GraphWalkIterator::new(self, query, bitset, self.metric))
                    as Box<dyn AnnIterator + 'a>
            })
            .collect())
    }

    fn get_vector_by_ids(&self, ids: &[i64]) -> Result<Dataset<'static>> {
        self.state.require_ready()?;
        if !self.has_raw_data(self.metric) {
            return Err(IndexError::RawDataUnavailable(format!(
                "{} ({})",
                self.metric,
                Self::TYPE
            )));
        }
        let positions = self.ids.positions_of(ids)?;
        let mut out = Vec::with_capacity(positions.len() * self.dim);
        for pos in positions {
            out.extend_from_slice(self.vector(pos));
        }
        Dataset::new(ids.len(), self.dim, out)
    }

    fn has_raw_data(&self, metric: MetricType) -> bool {
        metric != MetricType::Cosine
    }

    fn get_index_meta(&self, cfg: &Config) -> Result<serde_json::Value> {
        self.state.require_ready()?;
        self.create_config().validate(cfg, Operation::Meta, self.version)?;
        Ok(serde_json::json!({
            "index_type": Self::TYPE,
            "version": self.version.number(),
            "metric_type": self.metric.as_str(),
            "dim": self.dim,
            "count": self.count(),
            "m": self.params.m,
            "ef_construction": self.params.ef_construction,
            "ef": self.params.ef,
            "max_layer": self.max_layer,
            "entry_point": self.entry_point.map(|ep| self.ids.id(ep)),
            "level_histogram": self.level_histogram(),
            "base_edges": self.layers.get(0).map_or(0, |g| g.edge_count()),
        }))
    }

    fn serialize(&self, binset: &mut BinarySet) -> Result<()> {
        self.state.require_ready()?;
        let blob = HnswBlob {
            metric: self.metric,
            dim: self.dim,
            params: self.params.clone(),
            vectors: self.vectors.clone(),
            levels: self.levels.clone(),
            layers: self.layers.clone(),
            entry_point: self.entry_point,
            max_layer: self.max_layer,
            ids: self.ids.ids().to_vec(),
        };
        binset.append(BLOB_NAME, seal(self.version, &blob)?);
        Ok(())
    }

    fn deserialize(&mut self, binset: &BinarySet, cfg: &Config) -> Result<()> {
        let valid = self.create_config().validate(cfg, Operation::Deserialize, self.version)?;
        let (written, blob): (Version, HnswBlob) =
            unseal(binset.require(BLOB_NAME)?, Self::VERSIONS, self.version)?;
        check_metric(&valid, blob.metric)?;
        Self::check_blob(&blob)?;

        let count = blob.ids.len();
        self.state = IndexState::Uninitialized;
        self.metric = blob.metric;
        self.dim = blob.dim;
        // Later adds draw levels from a stream distinct from the original build
        self.rng = StdRng::seed_from_u64(blob.params.seed ^ count as u64);
        self.params = blob.params;
        self.vectors = blob.vectors;
        self.levels = blob.levels;
        self.layers = blob.layers;
        self.entry_point = blob.entry_point;
        self.max_layer = blob.max_layer;
        self.ids = IdMap::from_ids(blob.ids);
        self.visited = VisitedSet::new(count);
        self.state = IndexState::Ready;

        tracing::info!(
            count,
            max_layer = self.max_layer,
            written = %written,
            "loaded hnsw index"
        );
        Ok(())
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn size(&self) -> usize {
        let edges: usize = (0..self.layers.num_layers())
            .filter_map(|layer| self.layers.get(layer))
            .map(|g| g.edge_count() * 4 + g.len() * 8)
            .sum();
        self.vectors.len() * 4 + self.levels.len() + edges + self.ids.size_bytes()
    }

    fn count(&self) -> usize {
        self.ids.len()
    }
}
