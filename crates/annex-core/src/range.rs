//! Variable-length range-search results.
//!
//! Neighbours of all queries are concatenated into `ids`/`distances`;
//! query `q` owns `ids[lims[q]..lims[q + 1]]`.

use crate::dataset::Dataset;
use crate::metric::MetricType;
use crate::neighbor::Neighbor;
use crate::{IndexError, Result};

/// Flat `ids / distances / lims` encoding of a range search.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeSearchResult {
    ids: Vec<i64>,
    distances: Vec<f32>,
    lims: Vec<usize>,
}

impl RangeSearchResult {
    /// Wrap pre-built arrays.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` unless `lims[0] == 0`, `lims` is
    /// non-decreasing and `lims[last] == ids.len() == distances.len()`.
    pub fn new(ids: Vec<i64>, distances: Vec<f32>, lims: Vec<usize>) -> Result<Self> {
        if lims.first() != Some(&0) {
            return Err(IndexError::InvalidParameter(
                "range lims must start at 0".to_string(),
            ));
        }
        if lims.windows(2).any(|w| w[0] > w[1]) {
            return Err(IndexError::InvalidParameter(
                "range lims must be non-decreasing".to_string(),
            ));
        }
        let last = lims[lims.len() - 1];
        if last != ids.len() || last != distances.len() {
            return Err(IndexError::InvalidParameter(format!(
                "range lims end at {}, but {} ids and {} distances",
                last,
                ids.len(),
                distances.len()
            )));
        }
        Ok(Self {
            ids,
            distances,
            lims,
        })
    }

    /// Result for `nq` queries that all matched nothing.
    pub fn empty(nq: usize) -> Self {
        Self {
            ids: Vec::new(),
            distances: Vec::new(),
            lims: vec![0; nq + 1],
        }
    }

    /// Encode per-query lists (internal distances, already ordered),
    /// converting distances to the metric's score.
    pub fn from_neighbors(per_query: Vec<Vec<Neighbor>>, metric: MetricType) -> Self {
        let total = per_query.iter().map(Vec::len).sum();
        let mut ids = Vec::with_capacity(total);
        let mut distances = Vec::with_capacity(total);
        let mut lims = Vec::with_capacity(per_query.len() + 1);
        lims.push(0);

        for neighbors in per_query {
            for n in neighbors {
                ids.push(n.id);
                distances.push(metric.to_score(n.distance));
            }
            lims.push(ids.len());
        }

        Self {
            ids,
            distances,
            lims,
        }
    }

    /// Number of queries.
    pub fn nq(&self) -> usize {
        self.lims.len() - 1
    }

    /// Total neighbours across all queries.
    pub fn total(&self) -> usize {
        self.ids.len()
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn distances(&self) -> &[f32] {
        &self.distances
    }

    pub fn lims(&self) -> &[usize] {
        &self.lims
    }

    /// Ids and distances for query `q`.
    pub fn query(&self, q: usize) -> (&[i64], &[f32]) {
        let (start, end) = (self.lims[q], self.lims[q + 1]);
        (&self.ids[start..end], &self.distances[start..end])
    }

    /// Move into the generic dataset envelope.
    pub fn into_dataset(self) -> Dataset<'static> {
        let nq = self.nq();
        Dataset::from_range(nq, self.ids, self.distances, self.lims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_neighbors_layout() {
        let per_query = vec![
            vec![Neighbor::new(1, 0.1), Neighbor::new(2, 0.2)],
            vec![],
            vec![Neighbor::new(9, 0.5)],
        ];
        let result = RangeSearchResult::from_neighbors(per_query, MetricType::L2);

        assert_eq!(result.nq(), 3);
        assert_eq!(result.lims(), &[0, 2, 2, 3]);
        assert_eq!(result.query(0).0, &[1, 2]);
        assert!(result.query(1).0.is_empty());
        assert_eq!(result.query(2).1, &[0.5]);
    }

    #[test]
    fn test_similarity_scores_restored() {
        let per_query = vec![vec![Neighbor::new(1, -0.9), Neighbor::new(2, -0.4)]];
        let result = RangeSearchResult::from_neighbors(per_query, MetricType::IP);
        assert_eq!(result.distances(), &[0.9, 0.4]);
    }

    #[test]
    fn test_new_rejects_bad_lims() {
        assert!(RangeSearchResult::new(vec![1], vec![0.1], vec![1, 1]).is_err());
        assert!(RangeSearchResult::new(vec![1, 2], vec![0.1, 0.2], vec![0, 2, 1]).is_err());
        assert!(RangeSearchResult::new(vec![1], vec![0.1], vec![0, 2]).is_err());
        assert!(RangeSearchResult::new(vec![1], vec![], vec![0, 1]).is_err());
        assert!(RangeSearchResult::new(vec![], vec![], vec![]).is_err());
        assert!(RangeSearchResult::new(vec![1], vec![0.1], vec![0, 1]).is_ok());
    }

    #[test]
    fn test_empty_and_into_dataset() {
        let result = RangeSearchResult::empty(4);
        assert_eq!(result.nq(), 4);
        assert_eq!(result.total(), 0);

        let ds = result.into_dataset();
        assert_eq!(ds.rows(), 4);
        assert_eq!(ds.lims().unwrap(), &[0, 0, 0, 0, 0]);
        assert!(ds.ids().unwrap().is_empty());
    }
}
