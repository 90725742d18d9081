//! The index contract every backend implements.

use crate::binary_set::BinarySet;
use crate::bitset::BitsetView;
use crate::config::{Config, ConfigSchema, ValidatedConfig};
use crate::dataset::Dataset;
use crate::iterator::AnnIterator;
use crate::metric::MetricType;
use crate::range::RangeSearchResult;
use crate::version::Version;
use crate::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Lifecycle position of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexState {
    /// Freshly constructed, or a train attempt failed.
    Uninitialized,
    /// Internal structure built; no vectors yet.
    Trained,
    /// Queryable.
    Ready,
}

impl IndexState {
    /// Fail with `NotReady` unless queryable.
    pub fn require_ready(self) -> Result<()> {
        match self {
            Self::Ready => Ok(()),
            _ => Err(IndexError::NotReady),
        }
    }

    /// Fail with `NotTrained` before train.
    pub fn require_trained(self) -> Result<()> {
        match self {
            Self::Uninitialized => Err(IndexError::NotTrained),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Trained => "trained",
            Self::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// A vector index backend.
///
/// Mutating operations take `&mut self`, so the borrow checker serializes
/// them against every other call. Queries take `&self` and may run from
/// many threads at once.
///
/// Row positions (insertion order, starting at 0) index the exclusion mask;
/// the ids callers see come from the dataset id column, or default to the
/// row position.
pub trait IndexNode: Send + Sync {
    /// Registered type name, e.g. `"HNSW"`.
    fn index_type(&self) -> &str;

    /// Version the index was created or loaded under.
    fn version(&self) -> Version;

    fn state(&self) -> IndexState;

    /// Keys this backend accepts, with defaults and requirements.
    fn create_config(&self) -> ConfigSchema;

    /// Build internal structure from `dataset`.
    ///
    /// A failed train leaves the index uninitialized.
    fn train(&mut self, dataset: &Dataset<'_>, cfg: &Config) -> Result<()>;

    /// Ingest vectors.
    fn add(&mut self, dataset: &Dataset<'_>, cfg: &Config) -> Result<()>;

    /// `train` followed by `add`.
    fn build(&mut self, dataset: &Dataset<'_>, cfg: &Config) -> Result<()> {
        self.train(dataset, cfg)?;
        self.add(dataset, cfg)
    }

    /// Top-k search: `topk` fixed-width slots per query, padded with id
    /// `-1` and the metric's worst score.
    fn search(
        &self,
        queries: &Dataset<'_>,
        cfg: &Config,
        bitset: BitsetView<'_>,
    ) -> Result<Dataset<'static>>;

    /// Everything within `radius` of each query (and outside `range_filter`
    /// when given).
    fn range_search(
        &self,
        queries: &Dataset<'_>,
        cfg: &Config,
        bitset: BitsetView<'_>,
    ) -> Result<RangeSearchResult>;

    /// One lazy neighbour stream per query.
    fn ann_iterator<'a>(
        &'a self,
        _queries: &Dataset<'_>,
        _cfg: &Config,
        _bitset: BitsetView<'a>,
    ) -> Result<Vec<Box<dyn AnnIterator + 'a>>> {
        Err(IndexError::Unsupported(format!(
            "{} does not provide ann iterators",
            self.index_type()
        )))
    }

    /// Stored vectors for `ids`, in the order given.
    fn get_vector_by_ids(&self, ids: &[i64]) -> Result<Dataset<'static>>;

    /// Whether `get_vector_by_ids` returns the vectors as inserted under
    /// `metric`.
    fn has_raw_data(&self, metric: MetricType) -> bool;

    /// Backend-specific description of the built index.
    fn get_index_meta(&self, cfg: &Config) -> Result<serde_json::Value>;

    fn serialize(&self, binset: &mut BinarySet) -> Result<()>;

    /// Load from blobs produced by `serialize`. On success the index is
    /// ready.
    fn deserialize(&mut self, binset: &BinarySet, cfg: &Config) -> Result<()>;

    /// Write the serialized blobs to one file.
    fn serialize_to_file(&self, path: &Path) -> Result<()> {
        let mut binset = BinarySet::new();
        self.serialize(&mut binset)?;
        std::fs::write(path, binset.to_bytes())?;
        Ok(())
    }

    /// Load from a file written by `serialize_to_file`.
    fn deserialize_from_file(&mut self, path: &Path, cfg: &Config) -> Result<()> {
        let bytes = std::fs::read(path)?;
        let binset = BinarySet::from_bytes(&bytes)?;
        self.deserialize(&binset, cfg)
    }

    /// Vector dimension, 0 before train.
    fn dim(&self) -> usize;

    /// Resident size in bytes.
    fn size(&self) -> usize;

    /// Number of indexed vectors.
    fn count(&self) -> usize;
}

/// Query vectors of `queries`, checked against the index dimension.
///
/// # Errors
///
/// `InvalidParameter` if the dataset carries no vectors,
/// `DimensionMismatch` if its dimension differs from `dim`.
pub fn check_queries<'d>(queries: &'d Dataset<'_>, dim: usize) -> Result<&'d [f32]> {
    let tensor = queries
        .tensor()
        .ok_or_else(|| IndexError::InvalidParameter("query dataset has no vectors".to_string()))?;
    if queries.dim() != dim {
        return Err(IndexError::DimensionMismatch {
            expected: dim,
            actual: queries.dim(),
        });
    }
    Ok(tensor)
}

/// Fail unless `bitset` is absent or covers exactly `count` rows.
pub fn check_bitset(bitset: &BitsetView<'_>, count: usize) -> Result<()> {
    if !bitset.is_empty() && bitset.len() != count {
        return Err(IndexError::InvalidParameter(format!(
            "bitset covers {} rows, index has {}",
            bitset.len(),
            count
        )));
    }
    Ok(())
}

/// Reject NaN and infinite components.
pub fn check_vectors(tensor: &[f32]) -> Result<()> {
    if let Some(pos) = tensor.iter().position(|v| !v.is_finite()) {
        return Err(IndexError::InvalidParameter(format!(
            "non-finite value {} at offset {}",
            tensor[pos], pos
        )));
    }
    Ok(())
}

/// Check the optional `dim` key against the data.
pub fn check_dim_key(cfg: &ValidatedConfig, actual: usize) -> Result<()> {
    match cfg.opt_usize("dim") {
        Some(expected) if expected != actual => {
            Err(IndexError::DimensionMismatch { expected, actual })
        }
        _ => Ok(()),
    }
}

/// Check an optional `metric_type` key against the metric the index was
/// built with.
pub fn check_metric(cfg: &ValidatedConfig, stored: MetricType) -> Result<()> {
    match cfg.opt_metric()? {
        Some(requested) if requested != stored => Err(IndexError::InvalidParameter(format!(
            "metric_type {} does not match index metric {}",
            requested, stored
        ))),
        _ => Ok(()),
    }
}

/// Ids for the rows of `dataset`: its id column, or implicit positions
/// continuing from `next_position`.
///
/// # Errors
///
/// `InvalidParameter` if an id repeats within the dataset or `exists`
/// reports it is already indexed.
pub fn resolve_ids(
    dataset: &Dataset<'_>,
    next_position: usize,
    exists: impl Fn(i64) -> bool,
) -> Result<Vec<i64>> {
    let ids: Vec<i64> = match dataset.ids() {
        Some(ids) => ids.to_vec(),
        None => (0..dataset.rows())
            .map(|row| (next_position + row) as i64)
            .collect(),
    };

    let mut seen = HashMap::with_capacity(ids.len());
    for (row, &id) in ids.iter().enumerate() {
        if id < 0 {
            return Err(IndexError::InvalidParameter(format!(
                "negative id {} at row {}",
                id, row
            )));
        }
        if seen.insert(id, row).is_some() || exists(id) {
            return Err(IndexError::InvalidParameter(format!(
                "duplicate id {} at row {}",
                id, row
            )));
        }
    }
    Ok(ids)
}

/// Position <-> id mapping shared by backends that keep ids in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdMap {
    ids: Vec<i64>,
    #[serde(skip)]
    positions: HashMap<i64, u32>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the reverse lookup after deserialization.
    pub fn from_ids(ids: Vec<i64>) -> Self {
        let positions = ids
            .iter()
            .enumerate()
            .map(|(pos, &id)| (id, pos as u32))
            .collect();
        Self { ids, positions }
    }

    pub fn push(&mut self, id: i64) -> u32 {
        let pos = self.ids.len() as u32;
        self.ids.push(id);
        self.positions.insert(id, pos);
        pos
    }

    pub fn extend(&mut self, ids: &[i64]) {
        for &id in ids {
            self.push(id);
        }
    }

    #[inline]
    pub fn id(&self, position: u32) -> i64 {
        self.ids[position as usize]
    }

    pub fn position(&self, id: i64) -> Option<u32> {
        self.positions.get(&id).copied()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.positions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    /// Positions of `ids`, failing on the first unknown one.
    pub fn positions_of(&self, ids: &[i64]) -> Result<Vec<u32>> {
        ids.iter()
            .map(|&id| {
                self.position(id)
                    .ok_or_else(|| IndexError::InvalidParameter(format!("unknown id {}", id)))
            })
            .collect()
    }

    pub fn size_bytes(&self) -> usize {
        self.ids.len() * (8 + 8 + 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitset::Bitset;

    #[test]
    fn test_state_gates() {
        assert!(matches!(
            IndexState::Uninitialized.require_ready(),
            Err(IndexError::NotReady)
        ));
        assert!(matches!(
            IndexState::Trained.require_ready(),
            Err(IndexError::NotReady)
        ));
        assert!(IndexState::Ready.require_ready().is_ok());
        assert!(matches!(
            IndexState::Uninitialized.require_trained(),
            Err(IndexError::NotTrained)
        ));
    }

    #[test]
    fn test_check_queries() {
        let data = vec![0.0; 64];
        let queries = Dataset::new(1, 64, data).unwrap();
        assert!(matches!(
            check_queries(&queries, 128),
            Err(IndexError::DimensionMismatch {
                expected: 128,
                actual: 64
            })
        ));
        assert_eq!(check_queries(&queries, 64).unwrap().len(), 64);
        assert!(check_queries(&Dataset::empty(), 0).is_err());
    }

    #[test]
    fn test_check_bitset() {
        let bits = Bitset::new(10);
        assert!(check_bitset(&bits.view(), 10).is_ok());
        assert!(check_bitset(&bits.view(), 11).is_err());
        assert!(check_bitset(&BitsetView::empty(), 11).is_ok());
    }

    #[test]
    fn test_check_vectors() {
        assert!(check_vectors(&[1.0, 2.0]).is_ok());
        assert!(check_vectors(&[1.0, f32::NAN]).is_err());
        assert!(check_vectors(&[f32::INFINITY]).is_err());
    }

    #[test]
    fn test_resolve_ids() {
        let ds = Dataset::new(3, 1, vec![0.0; 3]).unwrap();
        assert_eq!(resolve_ids(&ds, 5, |_| false).unwrap(), vec![5, 6, 7]);
        assert!(resolve_ids(&ds, 5, |id| id == 6).is_err());

        let dup = ds.clone().with_ids(vec![1, 2, 1]).unwrap();
        assert!(resolve_ids(&dup, 0, |_| false).is_err());

        let explicit = ds.with_ids(vec![30, 10, 20]).unwrap();
        assert_eq!(resolve_ids(&explicit, 0, |_| false).unwrap(), vec![30, 10, 20]);
    }

    #[test]
    fn test_id_map() {
        let mut map = IdMap::new();
        map.extend(&[30, 10, 20]);
        assert_eq!(map.position(10), Some(1));
        assert_eq!(map.id(2), 20);
        assert!(map.positions_of(&[20, 99]).is_err());

        let restored = IdMap::from_ids(map.ids().to_vec());
        assert_eq!(restored.positions_of(&[20, 30]).unwrap(), vec![2, 0]);
    }
}
