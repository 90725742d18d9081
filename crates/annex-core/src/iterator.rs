//! Pull-based neighbour streams.
//!
//! An [`AnnIterator`] yields the neighbours of one query nearest first,
//! computing them on demand. Items carry the caller-facing score (see
//! [`MetricType::to_score`]): ascending for L2, descending for similarity
//! metrics. Masked rows are never yielded.

use crate::bitset::BitsetView;
use crate::metric::MetricType;
use crate::neighbor::Neighbor;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Lazy, single-consumer stream of neighbours for one query.
pub trait AnnIterator: Iterator<Item = Neighbor> + Send {
    /// Whether another neighbour is available. May compute it.
    fn has_next(&mut self) -> bool;
}

/// Exact iterator over a precomputed candidate list.
///
/// Candidates are heapified once; each `next` pops in O(log n), so a caller
/// that stops early never pays for a full sort.
#[derive(Debug)]
pub struct HeapIterator {
    heap: BinaryHeap<Reverse<Neighbor>>,
    metric: MetricType,
}

impl HeapIterator {
    /// `candidates` carry internal distances (lower = closer).
    pub fn new(candidates: Vec<Neighbor>, metric: MetricType) -> Self {
        let heap = candidates.into_iter().map(Reverse).collect();
        Self { heap, metric }
    }

    pub fn remaining(&self) -> usize {
        self.heap.len()
    }
}

impl Iterator for HeapIterator {
    type Item = Neighbor;

    fn next(&mut self) -> Option<Neighbor> {
        self.heap
            .pop()
            .map(|Reverse(n)| Neighbor::new(n.id, self.metric.to_score(n.distance)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.heap.len(), Some(self.heap.len()))
    }
}

impl AnnIterator for HeapIterator {
    fn has_next(&mut self) -> bool {
        !self.heap.is_empty()
    }
}

/// Proximity graph walked by [`GraphWalkIterator`].
///
/// Nodes are dense `u32` row positions; the exclusion mask is indexed by
/// the same positions.
pub trait GraphSource: Send + Sync {
    /// Number of nodes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Where a walk for `query` starts.
    fn entry_points(&self, query: &[f32]) -> Vec<u32>;

    /// Out-neighbours of `node`, appended to `out`.
    fn neighbors(&self, node: u32, out: &mut Vec<u32>);

    /// Internal distance from `query` to `node`.
    fn distance(&self, query: &[f32], node: u32) -> f32;

    /// Caller-visible id of `node`.
    fn external_id(&self, node: u32) -> i64;
}

/// Best-first walk over a [`GraphSource`] emitting nodes in non-decreasing
/// distance.
///
/// The walk keeps two heaps: the frontier of discovered nodes still to be
/// expanded, and the ready set of unmasked nodes waiting to be emitted. A
/// ready node is emitted once no frontier node is closer, so results come
/// out in order. Masked nodes are expanded (they keep the graph connected)
/// but never emitted. Nodes discovered after something farther was already
/// emitted are dropped; this is where the walk is approximate.
pub struct GraphWalkIterator<'a, G: GraphSource> {
    graph: &'a G,
    query: Vec<f32>,
    bitset: BitsetView<'a>,
    metric: MetricType,
    visited: Vec<bool>,
    frontier: BinaryHeap<Reverse<Neighbor>>,
    ready: BinaryHeap<Reverse<Neighbor>>,
    last_emitted: f32,
    scratch: Vec<u32>,
    peeked: Option<Neighbor>,
}

impl<'a, G: GraphSource> GraphWalkIterator<'a, G> {
    /// `query` must already be prepared for `metric`.
    pub fn new(graph: &'a G, query: Vec<f32>, bitset: BitsetView<'a>, metric: MetricType) -> Self {
        let mut walk = Self {
            graph,
            query,
            bitset,
            metric,
            visited: vec![false; graph.len()],
            frontier: BinaryHeap::new(),
            ready: BinaryHeap::new(),
            last_emitted: f32::NEG_INFINITY,
            scratch: Vec::new(),
            peeked: None,
        };

        for entry in graph.entry_points(&walk.query) {
            walk.discover(entry);
        }
        walk
    }

    fn discover(&mut self, node: u32) {
        let slot = node as usize;
        if slot >= self.visited.len() || self.visited[slot] {
            return;
        }
        self.visited[slot] = true;

        let distance = self.graph.distance(&self.query, node);
        let candidate = Neighbor::new(i64::from(node), distance);
        self.frontier.push(Reverse(candidate));
        if !self.bitset.test(slot) && distance >= self.last_emitted {
            self.ready.push(Reverse(candidate));
        }
    }

    fn expand(&mut self) {
        let Some(Reverse(current)) = self.frontier.pop() else {
            return;
        };
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        self.graph.neighbors(current.id as u32, &mut scratch);
        for &next in &scratch {
            self.discover(next);
        }
        self.scratch = scratch;
    }

    fn advance(&mut self) -> Option<Neighbor> {
        loop {
            let frontier_best = self.frontier.peek().map(|Reverse(n)| *n);
            let ready_best = self.ready.peek().map(|Reverse(n)| *n);

            match (frontier_best, ready_best) {
                (Some(f), Some(r)) if f <= r => self.expand(),
                (Some(_), None) => self.expand(),
                (_, Some(_)) => {
                    let Reverse(best) = self.ready.pop()?;
                    self.last_emitted = best.distance;
                    let id = self.graph.external_id(best.id as u32);
                    return Some(Neighbor::new(id, self.metric.to_score(best.distance)));
                }
                (None, None) => return None,
            }
        }
    }
}

impl<G: GraphSource> Iterator for GraphWalkIterator<'_, G> {
    type Item = Neighbor;

    fn next(&mut self) -> Option<Neighbor> {
        self.peeked.take().or_else(|| self.advance())
    }
}

impl<G: GraphSource> AnnIterator for GraphWalkIterator<'_, G> {
    fn has_next(&mut self) -> bool {
        if self.peeked.is_none() {
            self.peeked = self.advance();
        }
        self.peeked.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitset::Bitset;

    /// Points on a line, each linked to its two neighbours.
    struct LineGraph {
        points: Vec<f32>,
    }

    impl GraphSource for LineGraph {
        fn len(&self) -> usize {
            self.points.len()
        }

        fn entry_points(&self, _query: &[f32]) -> Vec<u32> {
            vec![0]
        }

        fn neighbors(&self, node: u32, out: &mut Vec<u32>) {
            if node > 0 {
                out.push(node - 1);
            }
            if (node as usize) + 1 < self.points.len() {
                out.push(node + 1);
            }
        }

        fn distance(&self, query: &[f32], node: u32) -> f32 {
            let d = query[0] - self.points[node as usize];
            d * d
        }

        fn external_id(&self, node: u32) -> i64 {
            i64::from(node) + 100
        }
    }

    #[test]
    fn test_heap_iterator_order() {
        let candidates = vec![
            Neighbor::new(1, 3.0),
            Neighbor::new(2, 1.0),
            Neighbor::new(3, 2.0),
        ];
        let mut it = HeapIterator::new(candidates, MetricType::L2);
        assert!(it.has_next());
        let ids: Vec<i64> = it.by_ref().map(|n| n.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert!(!it.has_next());
    }

    #[test]
    fn test_heap_iterator_scores() {
        let candidates = vec![Neighbor::new(1, -0.2), Neighbor::new(2, -0.9)];
        let scores: Vec<f32> = HeapIterator::new(candidates, MetricType::IP)
            .map(|n| n.distance)
            .collect();
        assert_eq!(scores, vec![0.9, 0.2]);
    }

    #[test]
    fn test_graph_walk_sorted_and_complete() {
        let graph = LineGraph {
            points: (0..20).map(|i| i as f32).collect(),
        };
        let it = GraphWalkIterator::new(&graph, vec![12.2], BitsetView::empty(), MetricType::L2);
        let out: Vec<Neighbor> = it.collect();

        assert_eq!(out.len(), 20);
        assert_eq!(out[0].id, 112);
        for pair in out.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn test_graph_walk_skips_masked() {
        let graph = LineGraph {
            points: (0..10).map(|i| i as f32).collect(),
        };
        let mut mask = Bitset::new(10);
        mask.set(5);
        mask.set(6);

        let mut it = GraphWalkIterator::new(&graph, vec![5.0], mask.view(), MetricType::L2);
        assert!(it.has_next());
        let ids: Vec<i64> = it.map(|n| n.id).collect();

        assert_eq!(ids.len(), 8);
        assert!(!ids.contains(&105));
        assert!(!ids.contains(&106));
        // Masked nodes still bridge the walk to the far side
        assert!(ids.contains(&109));
    }
}
