//! Exact lazy iterator over an inverted file.

use crate::ivf::IvfIndex;
use annex_core::{inner_product, AnnIterator, BitsetView, Neighbor};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Streams all unmasked vectors of an [`IvfIndex`] nearest first.
///
/// Partitions are opened in order of their lower bound. A buffered
/// candidate is emitted only once no unopened partition could hold
/// something closer, so the order is exact while most partitions are
/// never touched by a caller that stops early.
pub struct IvfIterator<'a> {
    index: &'a IvfIndex,
    query: Vec<f32>,
    bitset: BitsetView<'a>,
    /// (lower bound, list), ascending.
    order: Vec<(f32, usize)>,
    next_list: usize,
    ready: BinaryHeap<Reverse<Neighbor>>,
    scratch: Vec<f32>,
}

impl<'a> IvfIterator<'a> {
    /// `query` must already be prepared for the index metric.
    pub fn new(index: &'a IvfIndex, query: Vec<f32>, bitset: BitsetView<'a>) -> Self {
        let query_norm = inner_product(&query, &query).sqrt();
        let mut order: Vec<(f32, usize)> = (0..index.lists().len())
            .filter(|&list| index.lists()[list].len() > 0)
            .map(|list| (index.lower_bound(list, &query, query_norm), list))
            .collect();
        order.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        Self {
            index,
            scratch: vec![0.0; query.len()],
            query,
            bitset,
            order,
            next_list: 0,
            ready: BinaryHeap::new(),
        }
    }

    fn open_next(&mut self) {
        let (_, list) = self.order[self.next_list];
        self.next_list += 1;

        let ready = &mut self.ready;
        self.index.scan_list(list, &self.query, &self.bitset, &mut self.scratch, |n| {
            ready.push(Reverse(n));
        });
    }

    /// Closest buffered candidate, if nothing unopened can beat it.
    fn emittable(&self) -> Option<bool> {
        let best = self.ready.peek().map(|Reverse(n)| n.distance);
        let bound = self.order.get(self.next_list).map(|(b, _)| *b);
        match (best, bound) {
            (Some(best), Some(bound)) => Some(best <= bound),
            (Some(_), None) => Some(true),
            (None, Some(_)) => Some(false),
            (None, None) => None,
        }
    }
}

impl Iterator for IvfIterator<'_> {
    type Item = Neighbor;

    fn next(&mut self) -> Option<Neighbor> {
        loop {
            match self.emittable()? {
                true => {
                    let Reverse(best) = self.ready.pop()?;
                    let metric = self.index.metric();
                    return Some(Neighbor::new(best.id, metric.to_score(best.distance)));
                }
                false => self.open_next(),
            }
        }
    }
}

impl AnnIterator for IvfIterator<'_> {
    fn has_next(&mut self) -> bool {
        // Open partitions until a candidate is buffered or none remain
        while self.ready.is_empty() && self.next_list < self.order.len() {
            self.open_next();
        }
        !self.ready.is_empty()
    }
}
