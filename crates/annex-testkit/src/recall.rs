//! Recall and accuracy of candidate results against golden (exact) ones.
//!
//! Range results are compared in their flat `ids / lims` encoding: query
//! `q` owns `ids[lims[q]..lims[q + 1]]`.

use std::collections::HashSet;

fn query_slice<'a>(ids: &'a [i64], lims: &[usize], q: usize) -> &'a [i64] {
    &ids[lims[q]..lims[q + 1]]
}

fn overlap(golden: &[i64], candidates: &[i64]) -> usize {
    let golden: HashSet<i64> = golden.iter().copied().collect();
    candidates.iter().filter(|id| golden.contains(id)).count()
}

/// Mean over queries of `|candidates ∩ golden| / |golden|`.
///
/// A query with no golden results scores 1.0 when it also has no
/// candidates and 0.0 otherwise.
pub fn calc_recall(
    golden_ids: &[i64],
    golden_lims: &[usize],
    ids: &[i64],
    lims: &[usize],
    nq: usize,
) -> f32 {
    if nq == 0 {
        return 1.0;
    }
    let total: f32 = (0..nq)
        .map(|q| {
            let golden = query_slice(golden_ids, golden_lims, q);
            let candidates = query_slice(ids, lims, q);
            if golden.is_empty() {
                return if candidates.is_empty() { 1.0 } else { 0.0 };
            }
            overlap(golden, candidates) as f32 / golden.len() as f32
        })
        .sum();
    total / nq as f32
}

/// Mean over queries of `|candidates ∩ golden| / |candidates|`.
///
/// A query with no candidates scores 1.0 when it also has no golden
/// results and 0.0 otherwise.
pub fn calc_accuracy(
    golden_ids: &[i64],
    golden_lims: &[usize],
    ids: &[i64],
    lims: &[usize],
    nq: usize,
) -> f32 {
    if nq == 0 {
        return 1.0;
    }
    let total: f32 = (0..nq)
        .map(|q| {
            let golden = query_slice(golden_ids, golden_lims, q);
            let candidates = query_slice(ids, lims, q);
            if candidates.is_empty() {
                return if golden.is_empty() { 1.0 } else { 0.0 };
            }
            overlap(golden, candidates) as f32 / candidates.len() as f32
        })
        .sum();
    total / nq as f32
}

/// Recall of fixed-width top-k results: `k` slots per query, `-1` slots
/// ignored on both sides.
pub fn calc_top_k_recall(golden_ids: &[i64], ids: &[i64], k: usize) -> f32 {
    if k == 0 {
        return 1.0;
    }
    let mut hits = 0;
    let mut expected = 0;
    for (golden, candidates) in golden_ids.chunks(k).zip(ids.chunks(k)) {
        let golden: Vec<i64> = golden.iter().copied().filter(|id| *id >= 0).collect();
        let candidates: Vec<i64> = candidates.iter().copied().filter(|id| *id >= 0).collect();
        expected += golden.len();
        hits += overlap(&golden, &candidates);
    }
    if expected == 0 {
        return 1.0;
    }
    hits as f32 / expected as f32
}
