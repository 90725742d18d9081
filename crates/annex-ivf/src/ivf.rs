//! Inverted-file index.
//!
//! Vectors are partitioned by their nearest k-means centroid. A query ranks
//! the centroids and scans only the `nprobe` closest partitions. Partitions
//! hold either raw vectors (`IVF_FLAT`) or 8-bit scalar codes (`IVF_SQ8`).
//!
//! Every partition also tracks its covering radius, the largest distance
//! from the centroid to a stored vector. The iterator uses it to bound how
//! close an unopened partition can be, which makes iteration exact.

use crate::iterator::IvfIterator;
use crate::sq8::ScalarQuantizer;
use crate::IvfError;
use annex_core::kmeans::{self, KMeansParams};
use annex_core::{
    check_bitset, check_dim_key, check_metric, check_queries, check_vectors, inner_product,
    l2_distance_squared, pack_top_k, resolve_ids, seal, unseal, AnnIterator, BinarySet,
    BitsetView, Config, ConfigSchema, Dataset, IdMap, IndexError, IndexNode, IndexState,
    MetricType, Neighbor, Operation, ParamSpec, RangeSearchResult, Result, TopK,
    ValidatedConfig, Version, VersionRange,
};
use serde::{Deserialize, Serialize};

const BLOB_NAME: &str = "IVF";

/// How partitions store vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IvfKind {
    Flat,
    Sq8,
}

impl IvfKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Flat => "IVF_FLAT",
            Self::Sq8 => "IVF_SQ8",
        }
    }
}

/// IVF build and search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IvfParams {
    /// Number of partitions (k-means centroids).
    pub nlist: usize,

    /// Partitions scanned per query. Default: 8.
    pub nprobe: usize,

    /// K-means iterations. Default: 25.
    pub max_iterations: usize,

    /// K-means seed. Default: 42.
    pub seed: u64,
}

impl Default for IvfParams {
    fn default() -> Self {
        Self {
            nlist: 128,
            nprobe: 8,
            max_iterations: 25,
            seed: 42,
        }
    }
}

/// One partition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct InvertedList {
    /// Row positions of the members, in insertion order.
    pub(crate) positions: Vec<u32>,
    /// Raw vectors (`IVF_FLAT`).
    pub(crate) vectors: Vec<f32>,
    /// Scalar codes (`IVF_SQ8`).
    pub(crate) codes: Vec<u8>,
    /// Largest true L2 distance from the centroid to a member.
    pub(crate) radius: f32,
}

impl InvertedList {
    pub(crate) fn len(&self) -> usize {
        self.positions.len()
    }
}

#[derive(Serialize, Deserialize)]
struct IvfBlob {
    kind: IvfKind,
    metric: MetricType,
    dim: usize,
    params: IvfParams,
    centroids: Vec<f32>,
    lists: Vec<InvertedList>,
    quantizer: Option<ScalarQuantizer>,
    ids: Vec<i64>,
}

/// Inverted-file index over raw or scalar-quantized vectors.
#[derive(Debug)]
pub struct IvfIndex {
    kind: IvfKind,
    version: Version,
    state: IndexState,
    metric: MetricType,
    dim: usize,
    params: IvfParams,
    /// `nlist x dim`, row-major.
    centroids: Vec<f32>,
    lists: Vec<InvertedList>,
    quantizer: Option<ScalarQuantizer>,
    /// Position -> (list, offset within list).
    locations: Vec<(u32, u32)>,
    ids: IdMap,
}

impl IvfIndex {
    /// Versions an IVF index can be created or loaded under.
    pub const VERSIONS: VersionRange = VersionRange::new(Version::minimal(), Version::current());

    pub fn new(kind: IvfKind, version: Version) -> Self {
        Self {
            kind,
            version,
            state: IndexState::Uninitialized,
            metric: MetricType::L2,
            dim: 0,
            params: IvfParams::default(),
            centroids: Vec::new(),
            lists: Vec::new(),
            quantizer: None,
            locations: Vec::new(),
            ids: IdMap::new(),
        }
    }

    /// `IVF_FLAT` index.
    pub fn flat(version: Version) -> Self {
        Self::new(IvfKind::Flat, version)
    }

    /// `IVF_SQ8` index.
    pub fn sq8(version: Version) -> Self {
        Self::new(IvfKind::Sq8, version)
    }

    pub fn kind(&self) -> IvfKind {
        self.kind
    }

    pub fn params(&self) -> &IvfParams {
        &self.params
    }

    pub fn metric(&self) -> MetricType {
        self.metric
    }

    /// Number of vectors in each partition.
    pub fn partition_sizes(&self) -> Vec<usize> {
        self.lists.iter().map(InvertedList::len).collect()
    }

    pub(crate) fn lists(&self) -> &[InvertedList] {
        &self.lists
    }

    pub(crate) fn centroid(&self, list: usize) -> &[f32] {
        &self.centroids[list * self.dim..(list + 1) * self.dim]
    }

    /// Member `offset` of `list` as scored, decoding codes into `scratch`.
    pub(crate) fn member<'s>(
        &'s self,
        list: &'s InvertedList,
        offset: usize,
        scratch: &'s mut [f32],
    ) -> &'s [f32] {
        match &self.quantizer {
            Some(sq) => {
                sq.decode_into(&list.codes[offset * self.dim..(offset + 1) * self.dim], scratch);
                scratch
            }
            None => &list.vectors[offset * self.dim..(offset + 1) * self.dim],
        }
    }

    /// Score every unmasked member of `list` against `query`.
    pub(crate) fn scan_list(
        &self,
        list_idx: usize,
        query: &[f32],
        bitset: &BitsetView<'_>,
        scratch: &mut [f32],
        mut emit: impl FnMut(Neighbor),
    ) {
        let list = &self.lists[list_idx];
        for (offset, &pos) in list.positions.iter().enumerate() {
            if bitset.test(pos as usize) {
                continue;
            }
            let member = self.member(list, offset, scratch);
            let distance = self.metric.distance(query, member);
            emit(Neighbor::new(self.ids.id(pos), distance));
        }
    }

    /// Lower bound on the internal distance from `query` to any member of
    /// `list`.
    pub(crate) fn lower_bound(&self, list: usize, query: &[f32], query_norm: f32) -> f32 {
        let centroid = self.centroid(list);
        // Slack for rounding in the stored radius
        let radius = self.lists[list].radius * 1.0001 + 1e-6;
        match self.metric {
            MetricType::L2 => {
                let gap = (l2_distance_squared(query, centroid).sqrt() - radius).max(0.0);
                gap * gap
            }
            MetricType::IP | MetricType::Cosine => {
                -inner_product(query, centroid) - query_norm * radius
            }
        }
    }

    /// The `nprobe` partitions whose centroids are closest to `query`.
    fn probe(&self, query: &[f32], nprobe: usize) -> Vec<usize> {
        let mut ranked: Vec<Neighbor> = (0..self.lists.len())
            .map(|list| {
                let distance = self.metric.distance(query, self.centroid(list));
                Neighbor::new(list as i64, distance)
            })
            .collect();
        let nprobe = nprobe.min(ranked.len());
        if nprobe < ranked.len() {
            ranked.select_nth_unstable(nprobe);
            ranked.truncate(nprobe);
        }
        ranked.into_iter().map(|n| n.id as usize).collect()
    }

    fn nprobe(&self, valid: &ValidatedConfig) -> usize {
        valid.opt_usize("nprobe").unwrap_or(self.params.nprobe)
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

    /// Map every row position to its `(list, offset)` slot, checking that
    /// each list's payload matches its member count and that every row is
    /// stored exactly once.
    fn locate(
        kind: IvfKind,
        dim: usize,
        lists: &[InvertedList],
        count: usize,
    ) -> std::result::Result<Vec<(u32, u32)>, IvfError> {
        let mut locations = vec![(u32::MAX, u32::MAX); count];
        for (list_idx, list) in lists.iter().enumerate() {
            let expected = list.len() * dim;
            let stored = match kind {
                IvfKind::Flat => list.vectors.len(),
                IvfKind::Sq8 => list.codes.len(),
            };
            if stored != expected {
                return Err(IvfError::ListSize {
                    list: list_idx,
                    expected,
                    actual: stored,
                });
            }
            for (offset, &pos) in list.positions.iter().enumerate() {
                match locations.get_mut(pos as usize) {
                    Some(slot) if slot.0 == u32::MAX => *slot = (list_idx as u32, offset as u32),
                    _ => return Err(IvfError::BadPosition(pos)),
                }
            }
        }
        if let Some(missing) = locations.iter().position(|l| l.0 == u32::MAX) {
            return Err(IvfError::BadPosition(missing as u32));
        }
        Ok(locations)
    }
}

impl IndexNode for IvfIndex {
    fn index_type(&self) -> &str {
        self.kind.type_name()
    }

    fn version(&self) -> Version {
        self.version
    }

    fn state(&self) -> IndexState {
        self.state
    }

    fn create_config(&self) -> ConfigSchema {
        ConfigSchema::base(self.kind.type_name())
            .with(ParamSpec::integer("nlist", 1, 65536).required_for(&[Operation::Train]))
            .with(ParamSpec::integer("nprobe", 1, 65536))
            .with(ParamSpec::integer("max_iterations", 1, 1000).with_default(25))
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
        let tensor = dataset.tensor().ok_or_else(|| {
            IndexError::InvalidParameter("training dataset has no vectors".to_string())
        })?;
        check_vectors(tensor)?;

        let params = IvfParams {
            nlist: valid.usize("nlist")?,
            nprobe: valid.opt_usize("nprobe").unwrap_or(IvfParams::default().nprobe),
            max_iterations: valid.usize("max_iterations")?,
            seed: valid.opt_u64("seed").unwrap_or(IvfParams::default().seed),
        };
        if dataset.rows() < params.nlist {
            return Err(IndexError::InsufficientData {
                required: params.nlist,
                actual: dataset.rows(),
            });
        }

        let prepared = metric.prepare_rows(tensor, dim);
        let kmeans_params = KMeansParams {
            k: params.nlist,
            max_iterations: params.max_iterations,
            seed: params.seed,
            ..Default::default()
        };
        let centroids = kmeans::train(&prepared, dim, &kmeans_params);
        let quantizer = match self.kind {
            IvfKind::Sq8 => Some(ScalarQuantizer::train(&prepared, dim)),
            IvfKind::Flat => None,
        };

        tracing::info!(
            index_type = self.kind.type_name(),
            rows = dataset.rows(),
            dim,
            nlist = params.nlist,
            "trained ivf quantizer"
        );

        self.metric = metric;
        self.dim = dim;
        self.lists = vec![InvertedList::default(); params.nlist];
        self.params = params;
        self.centroids = centroids;
        self.quantizer = quantizer;
        self.locations.clear();
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
        let mut decoded = vec![0.0f32; self.dim];

        for (row, &id) in prepared.chunks_exact(self.dim).zip(&ids) {
            let (list_idx, _) = kmeans::nearest(&self.centroids, self.dim, row);
            let position = self.ids.push(id);
            let centroid = &self.centroids[list_idx * self.dim..(list_idx + 1) * self.dim];
            let list = &mut self.lists[list_idx];

            let scored: &[f32] = match &self.quantizer {
                Some(sq) => {
                    let start = list.codes.len();
                    sq.encode_into(row, &mut list.codes);
                    sq.decode_into(&list.codes[start..], &mut decoded);
                    decoded.as_slice()
                }
                None => {
                    list.vectors.extend_from_slice(row);
                    row
                }
            };
            list.radius = list.radius.max(l2_distance_squared(scored, centroid).sqrt());

            self.locations.push((list_idx as u32, list.positions.len() as u32));
            list.positions.push(position);
        }

        let empty = self.lists.iter().filter(|l| l.positions.is_empty()).count();
        if empty > 0 {
            tracing::warn!(empty, nlist = self.lists.len(), "ivf partitions left empty");
        }
        tracing::debug!(rows = ids.len(), total = self.count(), "ivf add");

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
        let nprobe = self.nprobe(&valid);
        let mut scratch = vec![0.0f32; self.dim];

        let results = tensor
            .chunks_exact(self.dim)
            .map(|q| {
                let query = self.metric.prepare(q);
                let mut top = TopK::bounded(topk, self.count());
                for list in self.probe(&query, nprobe) {
                    self.scan_list(list, &query, &bitset, &mut scratch, |n| {
                        top.push(n);
                    });
                }
                top.into_sorted_vec()
            })
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
        let (upper, lower) = valid.range_bounds(self.metric)?;
        let nprobe = self.nprobe(&valid);
        let mut scratch = vec![0.0f32; self.dim];

        let results = tensor
            .chunks_exact(self.dim)
            .map(|q| {
                let query = self.metric.prepare(q);
                let mut hits = Vec::new();
                for list in self.probe(&query, nprobe) {
                    self.scan_list(list, &query, &bitset, &mut scratch, |n| {
                        if n.distance <= upper && lower.map_or(true, |l| n.distance >= l) {
                            hits.push(n);
                        }
                    });
                }
                hits.sort();
                hits
            })
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
                Box::new(IvfIterator::new(self, query, bitset)) as Box<dyn AnnIterator + 'a>
            })
            .collect())
    }

    fn get_vector_by_ids(&self, ids: &[i64]) -> Result<Dataset<'static>> {
        self.state.require_ready()?;
        if !self.has_raw_data(self.metric) {
            return Err(IndexError::RawDataUnavailable(format!(
                "{} ({})",
                self.metric,
                self.kind.type_name()
            )));
        }
        let positions = self.ids.positions_of(ids)?;
        let mut out = Vec::with_capacity(positions.len() * self.dim);
        for pos in positions {
            let (list, offset) = self.locations[pos as usize];
            let list = &self.lists[list as usize];
            let offset = offset as usize;
            out.extend_from_slice(&list.vectors[offset * self.dim..(offset + 1) * self.dim]);
        }
        Dataset::new(ids.len(), self.dim, out)
    }

    fn has_raw_data(&self, metric: MetricType) -> bool {
        self.kind == IvfKind::Flat && metric != MetricType::Cosine
    }

    fn get_index_meta(&self, cfg: &Config) -> Result<serde_json::Value> {
        self.state.require_ready()?;
        self.create_config().validate(cfg, Operation::Meta, self.version)?;
        let sizes = self.partition_sizes();
        let empty = sizes.iter().filter(|&&s| s == 0).count();
        Ok(serde_json::json!({
            "index_type": self.kind.type_name(),
            "version": self.version.number(),
            "metric_type": self.metric.as_str(),
            "dim": self.dim,
            "count": self.count(),
            "nlist": self.params.nlist,
            "nprobe": self.params.nprobe,
            "partition_sizes": sizes,
            "empty_partitions": empty,
        }))
    }

    fn serialize(&self, binset: &mut BinarySet) -> Result<()> {
        self.state.require_ready()?;
        let blob = IvfBlob {
            kind: self.kind,
            metric: self.metric,
            dim: self.dim,
            params: self.params.clone(),
            centroids: self.centroids.clone(),
            lists: self.lists.clone(),
            quantizer: self.quantizer.clone(),
            ids: self.ids.ids().to_vec(),
        };
        binset.append(BLOB_NAME, seal(self.version, &blob)?);
        Ok(())
    }

    fn deserialize(&mut self, binset: &BinarySet, cfg: &Config) -> Result<()> {
        let valid = self.create_config().validate(cfg, Operation::Deserialize, self.version)?;
        let (written, blob): (Version, IvfBlob) =
            unseal(binset.require(BLOB_NAME)?, Self::VERSIONS, self.version)?;
        check_metric(&valid, blob.metric)?;
        if blob.kind != self.kind {
            return Err(IvfError::KindMismatch {
                expected: self.kind.type_name(),
                actual: blob.kind.type_name(),
            }
            .into());
        }
        if blob.centroids.len() != blob.lists.len() * blob.dim {
            return Err(IvfError::CentroidCount {
                nlist: blob.lists.len(),
                values: blob.centroids.len(),
            }
            .into());
        }

        let locations = Self::locate(blob.kind, blob.dim, &blob.lists, blob.ids.len())?;

        self.metric = blob.metric;
        self.dim = blob.dim;
        self.params = blob.params;
        self.centroids = blob.centroids;
        self.lists = blob.lists;
        self.quantizer = blob.quantizer;
        self.ids = IdMap::from_ids(blob.ids);
        self.locations = locations;
        self.state = IndexState::Ready;

        tracing::info!(
            index_type = self.kind.type_name(),
            count = self.count(),
            nlist = self.lists.len(),
            written = %written,
            "loaded ivf index"
        );
        Ok(())
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn size(&self) -> usize {
        let lists: usize = self
            .lists
            .iter()
            .map(|l| l.positions.len() * 4 + l.vectors.len() * 4 + l.codes.len())
            .sum();
        self.centroids.len() * 4 + lists + self.locations.len() * 8 + self.ids.size_bytes()
    }

    fn count(&self) -> usize {
        self.ids.len()
    }
}
