//! Vamana index for search operations.
//!
//! Provides disk-resident vector search using the Vamana graph with
//! two-phase search: PQ beam search + exact re-ranking.
//!
//! Lifecycle: `train` reads the raw data file, builds and writes the index
//! files and stages them with the file manager; `add` opens the written
//! files and makes the index queryable. The index is immutable afterwards.

use crate::builder::{VamanaBuilder, VamanaParams};
use crate::files::{self, DiskMeta, IndexFiles, VectorFile};
use crate::graph::{DiskGraph, NodeCache, NodeId};
use crate::pq::{DistanceTable, PQConfig, ProductQuantizer};
use crate::VamanaError;
use annex_core::{
    check_bitset, check_dim_key, check_metric, check_queries, check_vectors, pack_top_k,
    resolve_ids, seal, unseal, AnnIterator, BinarySet, BitsetView, Config, ConfigSchema, Dataset,
    FileManager, GraphSource, GraphWalkIterator, IdMap, IndexError, IndexNode, IndexState,
    MetricType, Neighbor, Operation, ParamKind, ParamSpec, RangeSearchResult, Result, TopK,
    ValidatedConfig, Version, VersionRange,
};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const BLOB_NAME: &str = "index_prefix";

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Mask density above which a query scans the unmasked rows directly.
const BRUTE_FORCE_RATIO: f32 = 0.9;

/// Starting search list for range search.
const RANGE_MIN_LIST: usize = 32;

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

/// An opened index: mapped graph and vectors, in-memory codes and ids.
#[derive(Debug)]
struct DiskIndex {
    files: IndexFiles,
    meta: DiskMeta,
    graph: DiskGraph,
    pq: ProductQuantizer,
    /// PQ codes for all vectors, `count x num_subspaces`
    codes: Vec<u8>,
    vectors: VectorFile,
    ids: IdMap,
    cache: NodeCache,
}

impl DiskIndex {
    fn open(files: IndexFiles, cache_budget_gb: f64) -> std::result::Result<Self, VamanaError> {
        let meta = files::read_meta(&files.meta())?;
        let graph = DiskGraph::open(&files.graph())?;
        let (pq, codes) = files::read_pq(&files.pq())?;
        let vectors = VectorFile::open(&files.vectors())?;
        let ids = files::read_ids(&files.ids())?;

        let count = meta.count;
        let counts = [
            ("graph", graph.num_nodes()),
            ("vectors", vectors.rows()),
            ("ids", ids.len()),
            ("pq codes", codes.len() / pq.num_subspaces().max(1)),
        ];
        if let Some((file, found)) = counts.iter().find(|(_, n)| *n != count) {
            return Err(VamanaError::Format(format!(
                "meta lists {} vectors, {} holds {}",
                count, file, found
            )));
        }
        if vectors.dim() != meta.dim || pq.dimensions() != meta.dim {
            return Err(VamanaError::Format(format!(
                "meta dimension {} disagrees with vectors {} / pq {}",
                meta.dim,
                vectors.dim(),
                pq.dimensions()
            )));
        }
        if meta.medoid as usize >= count {
            return Err(VamanaError::Graph(format!(
                "entry point {} is out of range",
                meta.medoid
            )));
        }
        if let Some((node, bad)) = graph.find_dangling() {
            return Err(VamanaError::Graph(format!(
                "node {} references missing node {}",
                node, bad
            )));
        }

        let budget = (cache_budget_gb * GIB) as usize;
        let cache = NodeCache::warm(&graph, meta.medoid, budget);

        tracing::info!(
            count,
            dim = meta.dim,
            cached_nodes = cache.len(),
            prefix = %files.prefix().display(),
            "opened vamana index"
        );

        Ok(Self {
            files,
            meta,
            graph,
            pq,
            codes,
            vectors,
            ids: IdMap::from_ids(ids),
            cache,
        })
    }

    fn count(&self) -> usize {
        self.meta.count
    }

    fn metric(&self) -> MetricType {
        self.meta.metric
    }

    fn code(&self, node: NodeId) -> &[u8] {
        let m = self.pq.num_subspaces();
        let start = node as usize * m;
        &self.codes[start..start + m]
    }

    fn neighbors_into(&self, node: NodeId, out: &mut Vec<NodeId>) {
        match self.cache.get(node) {
            Some(cached) => out.extend_from_slice(cached),
            None => self.graph.neighbors_into(node, out),
        }
    }

    fn exact_distance(&self, query: &[f32], node: NodeId, scratch: &mut Vec<f32>) -> f32 {
        self.vectors.read_row(node, scratch);
        self.metric().distance(query, scratch)
    }

    /// Beam search using PQ distances.
    ///
    /// Each round expands up to `beamwidth` of the closest unexpanded
    /// nodes. Masked nodes are expanded but never kept. Returns up to
    /// `list_size` unmasked candidates, closest first by PQ distance.
    fn beam_search(
        &self,
        table: &DistanceTable,
        list_size: usize,
        beamwidth: usize,
        bitset: &BitsetView<'_>,
    ) -> Vec<Candidate> {
        let mut frontier: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        let mut results: BinaryHeap<Candidate> = BinaryHeap::new();
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut beam: Vec<NodeId> = Vec::with_capacity(beamwidth);
        let mut scratch: Vec<NodeId> = Vec::new();

        let entry = self.meta.medoid;
        let start = Candidate {
            node_id: entry,
            distance: table.distance(self.code(entry)),
        };
        visited.insert(entry);
        frontier.push(Reverse(start));
        if !bitset.test(entry as usize) {
            results.push(start);
        }

        loop {
            beam.clear();
            while beam.len() < beamwidth {
                let Some(Reverse(next)) = frontier.pop() else {
                    break;
                };
                let beyond_list = results.len() >= list_size
                    && results.peek().map_or(false, |w| next.distance > w.distance);
                if beyond_list {
                    // Everything left in the frontier is farther still
                    frontier.clear();
                    break;
                }
                beam.push(next.node_id);
            }
            if beam.is_empty() {
                break;
            }

            for &node in &beam {
                scratch.clear();
                self.neighbors_into(node, &mut scratch);
                for &neighbor in &scratch {
                    if !visited.insert(neighbor) {
                        continue;
                    }
                    let dist = table.distance(self.code(neighbor));

                    let should_add = results.len() < list_size
                        || results.peek().map_or(true, |w| dist < w.distance);
                    if !should_add {
                        continue;
                    }

                    let candidate = Candidate {
                        node_id: neighbor,
                        distance: dist,
                    };
                    frontier.push(Reverse(candidate));
                    if !bitset.test(neighbor as usize) {
                        results.push(candidate);
                        while results.len() > list_size {
                            results.pop();
                        }
                    }
                }
            }
        }

        results.into_sorted_vec()
    }

    /// Replace PQ distances with exact ones read from the vectors file.
    fn rerank(&self, query: &[f32], found: Vec<Candidate>) -> Vec<Neighbor> {
        let mut scratch = Vec::with_capacity(self.meta.dim);
        let mut exact: Vec<Neighbor> = found
            .into_iter()
            .map(|c| {
                let d = self.exact_distance(query, c.node_id, &mut scratch);
                Neighbor::new(self.ids.id(c.node_id), d)
            })
            .collect();
        exact.sort();
        exact
    }

    /// Score every unmasked row exactly.
    fn exact_scan(&self, query: &[f32], bitset: &BitsetView<'_>, mut visit: impl FnMut(Neighbor)) {
        let mut scratch = Vec::with_capacity(self.meta.dim);
        for node in 0..self.count() as NodeId {
            if bitset.test(node as usize) {
                continue;
            }
            let d = self.exact_distance(query, node, &mut scratch);
            visit(Neighbor::new(self.ids.id(node), d));
        }
    }

    fn knn(
        &self,
        query: &[f32],
        topk: usize,
        list_size: usize,
        beamwidth: usize,
        bitset: &BitsetView<'_>,
    ) -> Vec<Neighbor> {
        if bitset.filter_ratio() > BRUTE_FORCE_RATIO {
            let mut top = TopK::bounded(topk, self.count());
            self.exact_scan(query, bitset, |n| {
                top.push(n);
            });
            return top.into_sorted_vec();
        }

        // Phase 1: PQ beam search
        let table = self.pq.distance_table(query, self.metric());
        let found = self.beam_search(&table, list_size.max(topk), beamwidth, bitset);

        // Phase 2: Re-rank with exact distances
        let mut hits = self.rerank(query, found);
        hits.truncate(topk);
        hits
    }

    /// Range search doubles the search list until it reaches past `upper`
    /// or covers the whole index.
    ///
    /// The beam search and its stopping point ignore `bitset`; masked rows
    /// are dropped from the hits only, so growing the mask can only shrink
    /// the result.
    fn range(
        &self,
        query: &[f32],
        list_size: usize,
        beamwidth: usize,
        (upper, lower): (f32, Option<f32>),
        bitset: &BitsetView<'_>,
    ) -> Vec<Neighbor> {
        let in_range = |d: f32| d <= upper && lower.map_or(true, |l| d >= l);
        if bitset.filter_ratio() >= 1.0 {
            return Vec::new();
        }

        let count = self.count();
        let table = self.pq.distance_table(query, self.metric());
        let unmasked = BitsetView::empty();
        let mut scratch = Vec::with_capacity(self.meta.dim);
        let mut list_size = list_size.max(RANGE_MIN_LIST).min(count);
        loop {
            let found: Vec<Candidate> = self
                .beam_search(&table, list_size, beamwidth, &unmasked)
                .into_iter()
                .map(|c| Candidate {
                    node_id: c.node_id,
                    distance: self.exact_distance(query, c.node_id, &mut scratch),
                })
                .collect();
            let within = found.iter().filter(|c| c.distance <= upper).count();
            if within < found.len() || found.len() < list_size || list_size >= count {
                let mut hits: Vec<Neighbor> = found
                    .into_iter()
                    .filter(|c| !bitset.test(c.node_id as usize) && in_range(c.distance))
                    .map(|c| Neighbor::new(self.ids.id(c.node_id), c.distance))
                    .collect();
                hits.sort();
                return hits;
            }
            list_size = (list_size * 2).min(count);
        }
    }
}

impl GraphSource for DiskIndex {
    fn len(&self) -> usize {
        self.count()
    }

    fn entry_points(&self, _query: &[f32]) -> Vec<NodeId> {
        vec![self.meta.medoid]
    }

    fn neighbors(&self, node: NodeId, out: &mut Vec<NodeId>) {
        self.neighbors_into(node, out);
    }

    fn distance(&self, query: &[f32], node: NodeId) -> f32 {
        let mut scratch = Vec::with_capacity(self.meta.dim);
        self.exact_distance(query, node, &mut scratch)
    }

    fn external_id(&self, node: NodeId) -> i64 {
        self.ids.id(node)
    }
}

/// Disk-resident Vamana index.
#[derive(Debug)]
pub struct VamanaIndex {
    version: Version,
    state: IndexState,
    file_manager: Arc<dyn FileManager>,
    metric: MetricType,
    dim: usize,
    params: VamanaParams,

    /// Files written by the last successful train.
    files: Option<IndexFiles>,

    disk: Option<DiskIndex>,
}

impl VamanaIndex {
    pub const TYPE: &'static str = "DISKANN";

    /// Versions a DISKANN index can be created or loaded under.
    pub const VERSIONS: VersionRange = VersionRange::new(Version::new(2), Version::current());

    pub fn new(version: Version, file_manager: Arc<dyn FileManager>) -> Self {
        Self {
            version,
            state: IndexState::Uninitialized,
            file_manager,
            metric: MetricType::L2,
            dim: 0,
            params: VamanaParams::default(),
            files: None,
            disk: None,
        }
    }

    pub fn params(&self) -> &VamanaParams {
        &self.params
    }

    /// Prefix of the index files, once trained or loaded.
    pub fn index_prefix(&self) -> Option<&Path> {
        self.files.as_ref().map(IndexFiles::prefix)
    }

    fn disk(&self) -> Result<&DiskIndex> {
        self.disk.as_ref().ok_or(IndexError::NotReady)
    }

    /// Common checks in front of every query.
    fn begin<'q>(
        &self,
        queries: &'q Dataset<'_>,
        cfg: &Config,
        op: Operation,
        bitset: &BitsetView<'_>,
    ) -> Result<(ValidatedConfig, &'q [f32], &DiskIndex)> {
        self.state.require_ready()?;
        let disk = self.disk()?;
        let valid = self.create_config().validate(cfg, op, self.version)?;
        check_metric(&valid, self.metric)?;
        let tensor = check_queries(queries, self.dim)?;
        check_bitset(bitset, disk.count())?;
        if disk.count() == 0 {
            return Err(IndexError::IndexEmpty);
        }
        Ok((valid, tensor, disk))
    }

    fn search_list_size(&self, valid: &ValidatedConfig) -> usize {
        valid
            .opt_usize("search_list_size")
            .unwrap_or(self.params.search_list_size)
    }

    fn beamwidth(&self, valid: &ValidatedConfig) -> usize {
        valid.opt_usize("beamwidth").unwrap_or(self.params.beamwidth)
    }

    /// Fetch the files under `prefix` through the file manager and open
    /// them.
    fn load(&mut self, prefix: &Path, valid: &ValidatedConfig) -> Result<Version> {
        let files = IndexFiles::new(prefix);
        for path in files.all() {
            self.file_manager.load_file(&path)?;
        }
        let budget = valid.opt_f64("search_cache_budget_gb").unwrap_or(0.0);
        let disk = DiskIndex::open(files.clone(), budget)?;
        check_metric(valid, disk.metric())?;

        let written = Version::new(disk.meta.version);
        if !Self::VERSIONS.contains(written) || written > self.version {
            return Err(IndexError::Serialization(format!(
                "index files written under {} cannot be loaded by a {} index",
                written, self.version
            )));
        }

        self.state = IndexState::Uninitialized;
        self.metric = disk.metric();
        self.dim = disk.meta.dim;
        self.params = VamanaParams {
            max_degree: disk.meta.max_degree,
            search_list_size: disk.meta.search_list_size,
            beamwidth: disk.meta.beamwidth,
            alpha: disk.meta.alpha,
            search_cache_budget_gb: budget,
            pq_config: PQConfig {
                num_subspaces: disk.meta.num_subspaces,
                ..PQConfig::default()
            },
            ..VamanaParams::default()
        };
        self.files = Some(files);
        self.disk = Some(disk);
        self.state = IndexState::Ready;
        Ok(written)
    }

    /// Remove the files of a build that did not complete: the staged copies
    /// through the file manager, then whatever is left locally.
    fn discard(&self, files: &IndexFiles, staged: &[PathBuf]) {
        for path in staged {
            if let Err(err) = self.file_manager.remove_file(path) {
                tracing::warn!(path = %path.display(), error = %err, "failed to unstage index file");
            }
        }
        for path in files.all() {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "failed to remove index file")
                }
            }
        }
    }
}

impl IndexNode for VamanaIndex {
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
            .with(ParamSpec::new("index_prefix", ParamKind::Path).required_for(&[Operation::Train]))
            .with(ParamSpec::new("data_path", ParamKind::Path).required_for(&[Operation::Train]))
            .with(ParamSpec::positive_float("pq_code_budget_gb").required_for(&[Operation::Train]))
            .with(ParamSpec::positive_float("build_dram_budget_gb").required_for(&[Operation::Train]))
            .with(ParamSpec::integer("max_degree", 1, 512).with_default(64))
            .with(ParamSpec::integer("search_list_size", 1, 65536))
            .with(ParamSpec::integer("beamwidth", 1, 128))
            .with(ParamSpec::float("search_cache_budget_gb", 0.0, f64::MAX))
    }

    /// Build the index files from the raw data file at `data_path`.
    ///
    /// The dataset contributes only its optional id column, which must
    /// cover every row of the raw data.
    fn train(&mut self, dataset: &Dataset<'_>, cfg: &Config) -> Result<()> {
        let valid = self.create_config().validate(cfg, Operation::Train, self.version)?;
        let metric = valid.metric()?;
        let files = IndexFiles::new(valid.str("index_prefix")?);
        let data_path = PathBuf::from(valid.str("data_path")?);

        let (rows, dim) = files::read_raw_header(&data_path)?;
        if rows == 0 {
            return Err(IndexError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        if dim == 0 {
            return Err(IndexError::InvalidParameter(
                "raw data dimension must be positive".to_string(),
            ));
        }
        check_dim_key(&valid, dim)?;

        let ids = match dataset.ids() {
            Some(_) if dataset.rows() != rows => {
                return Err(IndexError::InvalidParameter(format!(
                    "id column covers {} rows, raw data holds {}",
                    dataset.rows(),
                    rows
                )))
            }
            Some(_) => resolve_ids(dataset, 0, |_| false)?,
            None => (0..rows as i64).collect(),
        };

        let max_degree = valid.usize("max_degree")?;
        let needed_gb = (rows * dim * 4 + rows * max_degree * 4) as f64 / GIB;
        let dram_budget = valid.f64("build_dram_budget_gb")?;
        if needed_gb > dram_budget {
            return Err(IndexError::InvalidParameter(format!(
                "build needs {:.4} GiB, build_dram_budget_gb is {}",
                needed_gb, dram_budget
            )));
        }

        let (_, _, data) = files::read_raw_data(&data_path)?;
        check_vectors(&data)?;

        let defaults = VamanaParams::default();
        let num_subspaces =
            PQConfig::subspaces_for_budget(dim, rows, valid.f64("pq_code_budget_gb")?);
        let params = VamanaParams {
            max_degree,
            search_list_size: valid
                .opt_usize("search_list_size")
                .unwrap_or(defaults.search_list_size),
            beamwidth: valid.opt_usize("beamwidth").unwrap_or(defaults.beamwidth),
            search_cache_budget_gb: valid
                .opt_f64("search_cache_budget_gb")
                .unwrap_or(defaults.search_cache_budget_gb),
            pq_config: PQConfig {
                num_subspaces,
                ..PQConfig::default()
            },
            ..defaults
        };

        tracing::info!(
            rows,
            dim,
            metric = %metric,
            max_degree,
            num_subspaces,
            data_path = %data_path.display(),
            "building vamana index"
        );

        // The open index maps these files; release it before they are rewritten
        if self.files.as_ref() == Some(&files) {
            self.disk = None;
            self.files = None;
            self.state = IndexState::Uninitialized;
        }

        let prepared = metric.prepare_rows(&data, dim);
        let mut builder = VamanaBuilder::new(dim, metric, params.clone());
        for (row, &id) in prepared.chunks_exact(dim).zip(&ids) {
            builder.add(id, row)?;
        }
        if let Err(err) = builder.build(&files, self.version) {
            self.discard(&files, &[]);
            return Err(err.into());
        }

        let all = files.all();
        for (staged, path) in all.iter().enumerate() {
            if let Err(err) = self.file_manager.add_file(path) {
                self.discard(&files, &all[..staged]);
                return Err(err);
            }
        }

        self.metric = metric;
        self.dim = dim;
        self.params = params;
        self.files = Some(files);
        self.disk = None;
        self.state = IndexState::Trained;
        Ok(())
    }

    /// Open the files written by `train`. Vectors come from the raw data
    /// file, so the dataset's rows are not ingested.
    fn add(&mut self, dataset: &Dataset<'_>, cfg: &Config) -> Result<()> {
        self.state.require_trained()?;
        if self.state == IndexState::Ready {
            return Err(IndexError::Unsupported(format!(
                "{} cannot take vectors after build",
                Self::TYPE
            )));
        }
        let valid = self.create_config().validate(cfg, Operation::Add, self.version)?;
        check_metric(&valid, self.metric)?;
        let files = self.files.clone().ok_or(IndexError::NotTrained)?;

        if !dataset.is_empty() {
            tracing::debug!(
                rows = dataset.rows(),
                "dataset rows not ingested; vectors come from data_path"
            );
        }

        let budget = valid
            .opt_f64("search_cache_budget_gb")
            .unwrap_or(self.params.search_cache_budget_gb);
        self.disk = Some(DiskIndex::open(files, budget)?);
        self.state = IndexState::Ready;
        Ok(())
    }

    fn search(
        &self,
        queries: &Dataset<'_>,
        cfg: &Config,
        bitset: BitsetView<'_>,
    ) -> Result<Dataset<'static>> {
        let (valid, tensor, disk) = self.begin(queries, cfg, Operation::Search, &bitset)?;
        let topk = valid.topk()?;
        let list_size = self.search_list_size(&valid);
        let beamwidth = self.beamwidth(&valid);

        let results = tensor
            .chunks_exact(self.dim)
            .map(|q| disk.knn(&self.metric.prepare(q), topk, list_size, beamwidth, &bitset))
            .collect();
        Ok(pack_top_k(results, topk, self.metric))
    }

    fn range_search(
        &self,
        queries: &Dataset<'_>,
        cfg: &Config,
        bitset: BitsetView<'_>,
    ) -> Result<RangeSearchResult> {
        let (valid, tensor, disk) = self.begin(queries, cfg, Operation::RangeSearch, &bitset)?;
        let bounds = valid.range_bounds(self.metric)?;
        let list_size = self.search_list_size(&valid);
        let beamwidth = self.beamwidth(&valid);

        let results = tensor
            .chunks_exact(self.dim)
            .map(|q| disk.range(&self.metric.prepare(q), list_size, beamwidth, bounds, &bitset))
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
        let (_, tensor, disk) = self.begin(queries, cfg, Operation::Iterator, &bitset)?;

        Ok(tensor
            .chunks_exact(self.dim)
            .map(|q| {
                let query = self.metric.prepare(q).into_owned();
                Box::new(GraphWalkIterator::new(disk, query, bitset, self.metric))
                    as Box<dyn AnnIterator + 'a>
            })
            .collect())
    }

    fn get_vector_by_ids(&self, ids: &[i64]) -> Result<Dataset<'static>> {
        self.state.require_ready()?;
        let disk = self.disk()?;
        if !self.has_raw_data(self.metric) {
            return Err(IndexError::RawDataUnavailable(format!(
                "{} ({})",
                self.metric,
                Self::TYPE
            )));
        }
        let positions = disk.ids.positions_of(ids)?;
        let mut out = Vec::with_capacity(positions.len() * self.dim);
        let mut row = Vec::with_capacity(self.dim);
        for pos in positions {
            disk.vectors.read_row(pos, &mut row);
            out.extend_from_slice(&row);
        }
        Dataset::new(ids.len(), self.dim, out)
    }

    fn has_raw_data(&self, metric: MetricType) -> bool {
        metric != MetricType::Cosine
    }

    fn get_index_meta(&self, cfg: &Config) -> Result<serde_json::Value> {
        self.state.require_ready()?;
        self.create_config().validate(cfg, Operation::Meta, self.version)?;
        let disk = self.disk()?;
        Ok(serde_json::json!({
            "index_type": Self::TYPE,
            "version": self.version.number(),
            "metric_type": self.metric.as_str(),
            "dim": self.dim,
            "count": disk.count(),
            "index_prefix": disk.files.prefix().display().to_string(),
            "max_degree": disk.meta.max_degree,
            "search_list_size": self.params.search_list_size,
            "beamwidth": self.params.beamwidth,
            "pq_subspaces": disk.pq.num_subspaces(),
            "entry_point": disk.ids.id(disk.meta.medoid),
            "cached_nodes": disk.cache.len(),
            "disk_bytes": disk.files.disk_size(),
        }))
    }

    /// The blob holds only the index prefix; the files themselves stay
    /// with the file manager.
    fn serialize(&self, binset: &mut BinarySet) -> Result<()> {
        self.state.require_ready()?;
        let disk = self.disk()?;
        let prefix = disk.files.prefix().to_string_lossy().into_owned();
        binset.append(BLOB_NAME, seal(self.version, &prefix)?);
        Ok(())
    }

    fn deserialize(&mut self, binset: &BinarySet, cfg: &Config) -> Result<()> {
        let valid = self.create_config().validate(cfg, Operation::Deserialize, self.version)?;
        let (_, prefix): (Version, String) =
            unseal(binset.require(BLOB_NAME)?, Self::VERSIONS, self.version)?;
        self.load(Path::new(&prefix), &valid)?;
        Ok(())
    }

    /// Load from `path`, read either as an index prefix whose `.meta` file
    /// the file manager knows, or as a file written by `serialize_to_file`.
    fn deserialize_from_file(&mut self, path: &Path, cfg: &Config) -> Result<()> {
        let files = IndexFiles::new(path);
        if self.file_manager.is_existed(&files.meta())? {
            let valid = self.create_config().validate(cfg, Operation::Deserialize, self.version)?;
            self.load(path, &valid)?;
            return Ok(());
        }
        let bytes = std::fs::read(path)?;
        let binset = BinarySet::from_bytes(&bytes)?;
        self.deserialize(&binset, cfg)
    }

    fn dim(&self) -> usize {
        self.dim
    }

    /// Bytes of the index files on disk.
    fn size(&self) -> usize {
        self.files.as_ref().map_or(0, IndexFiles::disk_size)
    }

    fn count(&self) -> usize {
        self.disk.as_ref().map_or(0, DiskIndex::count)
    }
}
