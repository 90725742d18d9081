//! Neighbour candidates and top-k collection.

use crate::dataset::Dataset;
use crate::metric::MetricType;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A candidate returned from search.
///
/// Inside an index `distance` is the internal distance (lower = closer);
/// results handed to callers carry the metric's score instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Retrieval-visible id.
    pub id: i64,
    /// Distance or score, depending on where the value came from.
    pub distance: f32,
}

impl Neighbor {
    pub fn new(id: i64, distance: f32) -> Self {
        Self { id, distance }
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        // Lower distance first, ties broken by ascending id
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Bounded collector keeping the `k` smallest neighbours.
#[derive(Debug)]
pub struct TopK {
    k: usize,
    heap: BinaryHeap<Neighbor>,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::new(),
        }
    }

    /// Collector for `k` out of at most `available` candidates. Storage is
    /// sized by the smaller of the two.
    pub fn bounded(k: usize, available: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.min(available) + 1),
        }
    }

    /// Offer a candidate; returns whether it was kept.
    #[inline]
    pub fn push(&mut self, candidate: Neighbor) -> bool {
        if self.k == 0 {
            return false;
        }
        if self.heap.len() < self.k {
            self.heap.push(candidate);
            return true;
        }
        match self.heap.peek() {
            Some(worst) if candidate < *worst => {
                self.heap.pop();
                self.heap.push(candidate);
                true
            }
            _ => false,
        }
    }

    /// Current admission threshold, if the collector is full.
    pub fn worst(&self) -> Option<f32> {
        if self.heap.len() < self.k {
            None
        } else {
            self.heap.peek().map(|n| n.distance)
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drain into ascending order.
    pub fn into_sorted_vec(self) -> Vec<Neighbor> {
        self.heap.into_sorted_vec()
    }
}

/// Pack per-query neighbour lists (internal distances, ascending) into the
/// fixed-width top-k layout, padding with id `-1` and the metric's worst
/// score.
pub fn pack_top_k(per_query: Vec<Vec<Neighbor>>, topk: usize, metric: MetricType) -> Dataset<'static> {
    let nq = per_query.len();
    let mut ids = Vec::with_capacity(nq * topk);
    let mut distances = Vec::with_capacity(nq * topk);

    for neighbors in per_query {
        let found = neighbors.len().min(topk);
        for n in neighbors.into_iter().take(topk) {
            ids.push(n.id);
            distances.push(metric.to_score(n.distance));
        }
        for _ in found..topk {
            ids.push(-1);
            distances.push(metric.worst_score());
        }
    }

    Dataset::from_top_k(nq, topk, ids, distances)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbor_ordering() {
        let mut v = vec![
            Neighbor::new(3, 1.0),
            Neighbor::new(1, 2.0),
            Neighbor::new(2, 1.0),
            Neighbor::new(0, 0.5),
        ];
        v.sort();

        let ids: Vec<_> = v.iter().map(|n| n.id).collect();
        // 2 and 3 tie on distance, lower id first
        assert_eq!(ids, vec![0, 2, 3, 1]);
    }

    #[test]
    fn test_top_k_keeps_smallest() {
        let mut top = TopK::new(3);
        for i in 0..10 {
            top.push(Neighbor::new(i, (10 - i) as f32));
        }
        assert_eq!(top.worst(), Some(3.0));

        let ids: Vec<_> = top.into_sorted_vec().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![9, 8, 7]);
    }

    #[test]
    fn test_top_k_tie_break_is_stable() {
        let mut a = TopK::new(2);
        let mut b = TopK::new(2);
        for id in [5, 1, 3] {
            a.push(Neighbor::new(id, 1.0));
        }
        for id in [3, 5, 1] {
            b.push(Neighbor::new(id, 1.0));
        }
        assert_eq!(a.into_sorted_vec(), b.into_sorted_vec());
    }

    #[test]
    fn test_top_k_bounded_by_available() {
        let mut top = TopK::bounded(u32::MAX as usize, 4);
        for i in 0..4 {
            assert!(top.push(Neighbor::new(i, i as f32)));
        }
        assert_eq!(top.worst(), None);
        assert_eq!(top.into_sorted_vec().len(), 4);
    }

    #[test]
    fn test_top_k_zero() {
        let mut top = TopK::new(0);
        assert!(!top.push(Neighbor::new(0, 0.0)));
        assert!(top.is_empty());
    }

    #[test]
    fn test_pack_top_k_pads() {
        let per_query = vec![
            vec![Neighbor::new(4, -3.0), Neighbor::new(1, -1.0)],
            vec![],
        ];
        let ds = pack_top_k(per_query, 3, MetricType::IP);

        assert_eq!(ds.rows(), 2);
        assert_eq!(ds.dim(), 3);
        assert_eq!(ds.ids().unwrap(), &[4, 1, -1, -1, -1, -1]);

        let d = ds.distances().unwrap();
        // IP scores come back positive and descending
        assert_eq!(d[0], 3.0);
        assert_eq!(d[1], 1.0);
        assert_eq!(d[2], f32::NEG_INFINITY);
    }
}
