//! Exact linear-scan index (`FLAT`).
//!
//! Every query is compared against every stored vector, so results are
//! exact. Used for small collections and as the golden reference other
//! backends are measured against.
//!
//! # Performance
//!
//! - Add: O(n * d)
//! - Search: O(n * d) per query
//! - Memory: n * d * 4 bytes plus ids

use crate::binary_set::{seal, unseal, BinarySet};
use crate::bitset::BitsetView;
use crate::config::{Config, ConfigSchema, Operation, ValidatedConfig};
use crate::dataset::Dataset;
use crate::iterator::{AnnIterator, HeapIterator};
use crate::metric::MetricType;
use crate::neighbor::{pack_top_k, Neighbor, TopK};
use crate::node::{
    check_bitset, check_dim_key, check_metric, check_queries, check_vectors, resolve_ids, IdMap,
    IndexNode, IndexState,
};
use crate::range::RangeSearchResult;
use crate::version::{Version, VersionRange};
use crate::{IndexError, Result};
use serde::{Deserialize, Serialize};

const BLOB_NAME: &str = "FLAT";

/// Exact brute-force index.
#[derive(Debug)]
pub struct FlatIndex {
    version: Version,
    state: IndexState,
    metric: MetricType,
    dim: usize,
    /// Row-major, prepared for `metric`.
    vectors: Vec<f32>,
    ids: IdMap,
}

#[derive(Serialize, Deserialize)]
struct FlatBlob {
    metric: MetricType,
    dim: usize,
    vectors: Vec<f32>,
    ids: Vec<i64>,
}

impl FlatIndex {
    pub const TYPE: &'static str = "FLAT";

    /// Versions a FLAT index can be created or loaded under.
    pub const VERSIONS: VersionRange = VersionRange::new(Version::minimal(), Version::current());

    pub fn new(version: Version) -> Self {
        Self {
            version,
            state: IndexState::Uninitialized,
            metric: MetricType::L2,
            dim: 0,
            vectors: Vec::new(),
            ids: IdMap::new(),
        }
    }

    pub fn metric(&self) -> MetricType {
        self.metric
    }

    fn vector(&self, position: usize) -> &[f32] {
        &self.vectors[position * self.dim..(position + 1) * self.dim]
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

    /// Distances from `query` to every unmasked row.
    fn scan<'s>(
        &'s self,
        query: &'s [f32],
        bitset: &'s BitsetView<'s>,
    ) -> impl Iterator<Item = Neighbor> + 's {
        (0..self.count())
            .filter(move |&pos| !bitset.test(pos))
            .map(move |pos| {
                let distance = self.metric.distance(query, self.vector(pos));
                Neighbor::new(self.ids.id(pos as u32), distance)
            })
    }
}

impl IndexNode for FlatIndex {
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
    }

    fn train(&mut self, dataset: &Dataset<'_>, cfg: &Config) -> Result<()> {
        let valid = self.create_config().validate(cfg, Operation::Train, self.version)?;
        if dataset.dim() == 0 {
            return Err(IndexError::InvalidParameter(
                "dataset dimension must be positive".to_string(),
            ));
        }
        check_dim_key(&valid, dataset.dim())?;
        let metric = valid.metric()?;

        self.metric = metric;
        self.dim = dataset.dim();
        self.vectors.clear();
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
        self.vectors.extend_from_slice(&prepared);
        self.ids.extend(&ids);
        self.state = IndexState::Ready;

        tracing::debug!(rows = ids.len(), total = self.count(), "flat add");
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

        let results = tensor
            .chunks_exact(self.dim)
            .map(|q| {
                let query = self.metric.prepare(q);
                let mut top = TopK::bounded(topk, self.count());
                for candidate in self.scan(&query, &bitset) {
                    top.push(candidate);
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

        let results = tensor
            .chunks_exact(self.dim)
            .map(|q| {
                let query = self.metric.prepare(q);
                let mut hits: Vec<Neighbor> = self
                    .scan(&query, &bitset)
                    .filter(|n| n.distance <= upper && lower.map_or(true, |l| n.distance >= l))
                    .collect();
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
                let query = self.metric.prepare(q);
                let candidates = self.scan(&query, &bitset).collect();
                Box::new(HeapIterator::new(candidates, self.metric)) as Box<dyn AnnIterator + 'a>
            })
            .collect())
    }

    fn get_vector_by_ids(&self, ids: &[i64]) -> Result<Dataset<'static>> {
        self.state.require_ready()?;
        if !self.has_raw_data(self.metric) {
            return Err(IndexError::RawDataUnavailable(self.metric.to_string()));
        }
        let positions = self.ids.positions_of(ids)?;
        let mut out = Vec::with_capacity(positions.len() * self.dim);
        for pos in positions {
            out.extend_from_slice(self.vector(pos as usize));
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
        }))
    }

    fn serialize(&self, binset: &mut BinarySet) -> Result<()> {
        self.state.require_ready()?;
        let blob = FlatBlob {
            metric: self.metric,
            dim: self.dim,
            vectors: self.vectors.clone(),
            ids: self.ids.ids().to_vec(),
        };
        binset.append(BLOB_NAME, seal(self.version, &blob)?);
        Ok(())
    }

    fn deserialize(&mut self, binset: &BinarySet, cfg: &Config) -> Result<()> {
        let valid = self.create_config().validate(cfg, Operation::Deserialize, self.version)?;
        let (written, blob): (Version, FlatBlob) =
            unseal(binset.require(BLOB_NAME)?, Self::VERSIONS, self.version)?;
        check_metric(&valid, blob.metric)?;

        if blob.dim == 0 || blob.vectors.len() != blob.ids.len() * blob.dim {
            return Err(IndexError::Serialization(
                "flat blob vector count does not match ids".to_string(),
            ));
        }

        self.metric = blob.metric;
        self.dim = blob.dim;
        self.vectors = blob.vectors;
        self.ids = IdMap::from_ids(blob.ids);
        self.state = IndexState::Ready;

        tracing::info!(
            count = self.count(),
            dim = self.dim,
            written = %written,
            "loaded flat index"
        );
        Ok(())
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn size(&self) -> usize {
        self.vectors.len() * std::mem::size_of::<f32>() + self.ids.size_bytes()
    }

    fn count(&self) -> usize {
        self.ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitset::Bitset;

    fn l2_cfg() -> Config {
        Config::new().set("metric_type", "L2").set("topk", 3)
    }

    fn line_index(n: usize) -> FlatIndex {
        let data: Vec<f32> = (0..n).flat_map(|i| [i as f32, 0.0, 0.0]).collect();
        let base = Dataset::new(n, 3, data).unwrap();
        let mut index = FlatIndex::new(Version::current());
        index.build(&base, &l2_cfg()).unwrap();
        index
    }

    #[test]
    fn test_search_euclidean() {
        let index = line_index(10);
        let query = Dataset::new(1, 3, vec![0.0, 0.0, 0.0]).unwrap();

        let result = index.search(&query, &l2_cfg(), BitsetView::empty()).unwrap();
        assert_eq!(result.ids().unwrap(), &[0, 1, 2]);
        assert_eq!(result.distances().unwrap(), &[0.0, 1.0, 4.0]);
    }

    #[test]
    fn test_search_pads_short_results() {
        let index = line_index(2);
        let query = Dataset::new(1, 3, vec![0.0, 0.0, 0.0]).unwrap();

        let result = index.search(&query, &l2_cfg(), BitsetView::empty()).unwrap();
        assert_eq!(result.ids().unwrap(), &[0, 1, -1]);
        assert_eq!(result.distances().unwrap()[2], f32::INFINITY);
    }

    #[test]
    fn test_masked_rows_excluded() {
        let index = line_index(10);
        let mut mask = Bitset::new(10);
        mask.set(0);
        mask.set(2);

        let query = Dataset::new(1, 3, vec![0.0, 0.0, 0.0]).unwrap();
        let result = index.search(&query, &l2_cfg(), mask.view()).unwrap();
        assert_eq!(result.ids().unwrap(), &[1, 3, 4]);

        let wrong_len = Bitset::new(9);
        assert!(matches!(
            index.search(&query, &l2_cfg(), wrong_len.view()),
            Err(IndexError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_inner_product_order() {
        let data = vec![1.0, 1.0, 1.0, 0.1, 0.1, 0.1, -1.0, -1.0, -1.0];
        let base = Dataset::new(3, 3, data).unwrap();
        let cfg = Config::new().set("metric_type", "IP").set("topk", 3);
        let mut index = FlatIndex::new(Version::current());
        index.build(&base, &cfg).unwrap();

        let query = Dataset::new(1, 3, vec![1.0, 1.0, 1.0]).unwrap();
        let result = index.search(&query, &cfg, BitsetView::empty()).unwrap();
        assert_eq!(result.ids().unwrap(), &[0, 1, 2]);

        let d = result.distances().unwrap();
        assert!((d[0] - 3.0).abs() < 1e-5);
        assert!(d[0] >= d[1] && d[1] >= d[2]);
    }

    #[test]
    fn test_cosine_scores() {
        let data = vec![2.0, 0.0, 0.0, 3.0, -1.0, 0.0];
        let base = Dataset::new(3, 2, data).unwrap();
        let cfg = Config::new().set("metric_type", "COSINE").set("topk", 3);
        let mut index = FlatIndex::new(Version::current());
        index.build(&base, &cfg).unwrap();

        let query = Dataset::new(1, 2, vec![5.0, 0.0]).unwrap();
        let result = index.search(&query, &cfg, BitsetView::empty()).unwrap();
        assert_eq!(result.ids().unwrap(), &[0, 1, 2]);

        let d = result.distances().unwrap();
        assert!((d[0] - 1.0).abs() < 1e-5);
        assert!(d[1].abs() < 1e-5);
        assert!((d[2] + 1.0).abs() < 1e-5);

        assert!(!index.has_raw_data(MetricType::Cosine));
        assert!(matches!(
            index.get_vector_by_ids(&[0]),
            Err(IndexError::RawDataUnavailable(_))
        ));
    }

    #[test]
    fn test_range_search_with_filter() {
        let index = line_index(10);
        let query = Dataset::new(2, 3, vec![0.0, 0.0, 0.0, 9.0, 0.0, 0.0]).unwrap();

        let cfg = Config::new().set("radius", 4.0).set("range_filter", 1.0);
        let result = index.range_search(&query, &cfg, BitsetView::empty()).unwrap();
        assert_eq!(result.lims(), &[0, 2, 4]);
        assert_eq!(result.query(0).0, &[1, 2]);
        assert_eq!(result.query(1).0, &[8, 7]);

        let missing_radius = Config::new();
        assert!(index
            .range_search(&query, &missing_radius, BitsetView::empty())
            .is_err());
    }

    #[test]
    fn test_iterator_matches_search() {
        let index = line_index(20);
        let query = Dataset::new(1, 3, vec![7.2, 0.0, 0.0]).unwrap();

        let mut iters = index
            .ann_iterator(&query, &Config::new(), BitsetView::empty())
            .unwrap();
        let first: Vec<i64> = iters[0].by_ref().take(3).map(|n| n.id).collect();
        assert_eq!(first, vec![7, 8, 6]);
        assert_eq!(iters[0].by_ref().count(), 17);
        assert!(!iters[0].has_next());
    }

    #[test]
    fn test_iterator_unsupported_before_v2() {
        let data = vec![0.0; 6];
        let base = Dataset::new(2, 3, data).unwrap();
        let mut index = FlatIndex::new(Version::minimal());
        index.build(&base, &l2_cfg()).unwrap();

        let query = Dataset::new(1, 3, vec![0.0; 3]).unwrap();
        let err = index
            .ann_iterator(&query, &Config::new(), BitsetView::empty())
            .err()
            .unwrap();
        assert!(err.is_feature_gap());
    }

    #[test]
    fn test_lifecycle_errors() {
        let mut index = FlatIndex::new(Version::current());
        let query = Dataset::new(1, 3, vec![0.0; 3]).unwrap();
        assert!(matches!(
            index.search(&query, &l2_cfg(), BitsetView::empty()),
            Err(IndexError::NotReady)
        ));
        assert!(matches!(
            index.add(&query, &l2_cfg()),
            Err(IndexError::NotTrained)
        ));

        // Train without metric fails and leaves the index uninitialized
        let no_metric = Config::new().set("topk", 3);
        assert!(index.train(&query, &no_metric).is_err());
        assert_eq!(index.state(), IndexState::Uninitialized);
    }

    #[test]
    fn test_failed_retrain_keeps_ready_index() {
        let mut index = line_index(10);
        let base = Dataset::new(1, 3, vec![0.0; 3]).unwrap();

        let unknown = l2_cfg().set("bogus", 1);
        assert!(matches!(
            index.train(&base, &unknown),
            Err(IndexError::InvalidParameter(_))
        ));
        let wrong_dim = l2_cfg().set("dim", 4);
        assert!(matches!(
            index.train(&base, &wrong_dim),
            Err(IndexError::DimensionMismatch { .. })
        ));

        assert_eq!(index.state(), IndexState::Ready);
        assert_eq!(index.count(), 10);
        let query = Dataset::new(1, 3, vec![0.0; 3]).unwrap();
        let result = index.search(&query, &l2_cfg(), BitsetView::empty()).unwrap();
        assert_eq!(result.ids().unwrap(), &[0, 1, 2]);
    }

    #[test]
    fn test_explicit_ids_and_vectors() {
        let base = Dataset::new(2, 2, vec![1.0, 2.0, 3.0, 4.0])
            .unwrap()
            .with_ids(vec![100, 200])
            .unwrap();
        let cfg = Config::new().set("metric_type", "L2").set("topk", 1);
        let mut index = FlatIndex::new(Version::current());
        index.build(&base, &cfg).unwrap();

        let query = Dataset::new(1, 2, vec![3.0, 4.0]).unwrap();
        let result = index.search(&query, &cfg, BitsetView::empty()).unwrap();
        assert_eq!(result.ids().unwrap(), &[200]);

        let vectors = index.get_vector_by_ids(&[200, 100]).unwrap();
        assert_eq!(vectors.tensor().unwrap(), &[3.0, 4.0, 1.0, 2.0]);
        assert!(index.get_vector_by_ids(&[5]).is_err());

        // Re-adding a known id is rejected
        assert!(index.add(&base, &cfg).is_err());
    }

    #[test]
    fn test_serialize_round_trip() {
        let index = line_index(10);
        let mut binset = BinarySet::new();
        index.serialize(&mut binset).unwrap();

        let mut loaded = FlatIndex::new(Version::current());
        loaded.deserialize(&binset, &Config::new()).unwrap();
        assert_eq!(loaded.count(), 10);
        assert_eq!(loaded.metric(), MetricType::L2);

        let query = Dataset::new(1, 3, vec![4.4, 0.0, 0.0]).unwrap();
        assert_eq!(
            index.search(&query, &l2_cfg(), BitsetView::empty()).unwrap(),
            loaded.search(&query, &l2_cfg(), BitsetView::empty()).unwrap()
        );

        let mismatch = Config::new().set("metric_type", "IP");
        let mut other = FlatIndex::new(Version::current());
        assert!(other.deserialize(&binset, &mismatch).is_err());
    }

    #[test]
    fn test_older_version_loads_under_newer() {
        let data = vec![0.0, 1.0, 2.0, 3.0];
        let base = Dataset::new(2, 2, data).unwrap();
        let mut v1 = FlatIndex::new(Version::minimal());
        v1.build(&base, &Config::new().set("metric_type", "L2")).unwrap();

        let mut binset = BinarySet::new();
        v1.serialize(&mut binset).unwrap();

        let mut v3 = FlatIndex::new(Version::current());
        v3.deserialize(&binset, &Config::new()).unwrap();
        assert_eq!(v3.count(), 2);

        // A newer blob is not readable by an older index
        let mut binset = BinarySet::new();
        v3.serialize(&mut binset).unwrap();
        let mut old = FlatIndex::new(Version::minimal());
        assert!(matches!(
            old.deserialize(&binset, &Config::new()),
            Err(IndexError::Serialization(_))
        ));
    }
}
