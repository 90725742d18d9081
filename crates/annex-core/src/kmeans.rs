//! Lloyd's k-means over row-major buffers.
//!
//! Used for IVF coarse quantizers and PQ codebooks. Centroids are seeded
//! from a deterministic sample of the input so that the same data and seed
//! always produce the same clustering.

use crate::metric::l2_distance_squared;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};

/// K-means training parameters.
#[derive(Debug, Clone)]
pub struct KMeansParams {
    /// Number of centroids.
    pub k: usize,

    /// Lloyd iterations. Default: 25.
    pub max_iterations: usize,

    /// Upper bound on training rows; larger inputs are subsampled.
    /// Default: 65536.
    pub sample_size: usize,

    /// RNG seed for initialization and subsampling.
    pub seed: u64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            k: 256,
            max_iterations: 25,
            sample_size: 65536,
            seed: 42,
        }
    }
}

/// Index and squared distance of the centroid nearest to `vector`.
#[inline]
pub fn nearest(centroids: &[f32], dim: usize, vector: &[f32]) -> (usize, f32) {
    let mut best = (0, f32::INFINITY);
    for (idx, centroid) in centroids.chunks_exact(dim).enumerate() {
        let dist = l2_distance_squared(vector, centroid);
        if dist < best.1 {
            best = (idx, dist);
        }
    }
    best
}

/// Nearest centroid for every row of `data`.
pub fn assign(data: &[f32], dim: usize, centroids: &[f32]) -> Vec<u32> {
    data.chunks_exact(dim)
        .map(|row| nearest(centroids, dim, row).0 as u32)
        .collect()
}

/// Train `params.k` centroids on `data` (`rows x dim`, row-major).
///
/// Returns a flat `k x dim` buffer. If there are fewer rows than `k`, the
/// missing centroids repeat existing rows.
pub fn train(data: &[f32], dim: usize, params: &KMeansParams) -> Vec<f32> {
    let rows = data.len() / dim.max(1);
    let k = params.k;
    if rows == 0 || k == 0 || dim == 0 {
        return vec![0.0; k * dim];
    }

    let mut rng = StdRng::seed_from_u64(params.seed);

    // Subsample training rows
    let training: Vec<f32> = if rows > params.sample_size {
        let mut picked = sample(&mut rng, rows, params.sample_size).into_vec();
        picked.sort_unstable();
        let mut buf = Vec::with_capacity(picked.len() * dim);
        for i in picked {
            buf.extend_from_slice(&data[i * dim..(i + 1) * dim]);
        }
        buf
    } else {
        data.to_vec()
    };
    let n = training.len() / dim;

    // Initialize from distinct random rows
    let mut centroids = Vec::with_capacity(k * dim);
    for i in sample(&mut rng, n, k.min(n)).into_iter() {
        centroids.extend_from_slice(&training[i * dim..(i + 1) * dim]);
    }
    while centroids.len() < k * dim {
        let i = rng.gen_range(0..n);
        centroids.extend_from_slice(&training[i * dim..(i + 1) * dim]);
    }

    let mut assignments = vec![u32::MAX; n];
    let mut sums = vec![0.0f64; k * dim];
    let mut counts = vec![0usize; k];

    for iteration in 0..params.max_iterations {
        // Assign
        let mut changed = 0usize;
        for (row_idx, row) in training.chunks_exact(dim).enumerate() {
            let (c, _) = nearest(&centroids, dim, row);
            if assignments[row_idx] != c as u32 {
                assignments[row_idx] = c as u32;
                changed += 1;
            }
        }

        if changed == 0 && iteration > 0 {
            tracing::debug!(iteration, "k-means converged");
            break;
        }

        // Update
        sums.iter_mut().for_each(|s| *s = 0.0);
        counts.iter_mut().for_each(|c| *c = 0);
        for (row, &c) in training.chunks_exact(dim).zip(&assignments) {
            let c = c as usize;
            counts[c] += 1;
            for (s, &v) in sums[c * dim..(c + 1) * dim].iter_mut().zip(row) {
                *s += f64::from(v);
            }
        }

        let mut empty = 0usize;
        for c in 0..k {
            let centroid = &mut centroids[c * dim..(c + 1) * dim];
            if counts[c] == 0 {
                // Re-seed empty clusters from a random row
                empty += 1;
                let i = rng.gen_range(0..n);
                centroid.copy_from_slice(&training[i * dim..(i + 1) * dim]);
                continue;
            }
            let count = counts[c] as f64;
            for (v, s) in centroid.iter_mut().zip(&sums[c * dim..(c + 1) * dim]) {
                *v = (*s / count) as f32;
            }
        }

        if empty > 0 {
            tracing::debug!(iteration, empty, "re-seeded empty k-means clusters");
        }
    }

    centroids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kmeans_two_clusters() {
        let data = vec![0.0, 0.0, 0.1, 0.1, 10.0, 10.0, 10.1, 10.1];
        let params = KMeansParams {
            k: 2,
            max_iterations: 10,
            ..Default::default()
        };
        let centroids = train(&data, 2, &params);
        assert_eq!(centroids.len(), 4);

        // One centroid near (0, 0), the other near (10, 10)
        let c0_near_zero = centroids[0] < 5.0;
        let c1_near_zero = centroids[2] < 5.0;
        assert_ne!(c0_near_zero, c1_near_zero);

        let labels = assign(&data, 2, &centroids);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);
    }

    #[test]
    fn test_kmeans_deterministic() {
        let data: Vec<f32> = (0..400).map(|i| ((i * 37) % 101) as f32).collect();
        let params = KMeansParams {
            k: 8,
            seed: 7,
            ..Default::default()
        };
        assert_eq!(train(&data, 4, &params), train(&data, 4, &params));
    }

    #[test]
    fn test_fewer_rows_than_k() {
        let data = vec![1.0, 2.0, 3.0, 4.0];
        let params = KMeansParams {
            k: 5,
            ..Default::default()
        };
        let centroids = train(&data, 2, &params);
        assert_eq!(centroids.len(), 10);
        for c in centroids.chunks_exact(2) {
            assert!(c == [1.0, 2.0] || c == [3.0, 4.0]);
        }
    }

    #[test]
    fn test_nearest() {
        let centroids = [0.0, 0.0, 5.0, 5.0];
        let (idx, dist) = nearest(&centroids, 2, &[4.0, 4.0]);
        assert_eq!(idx, 1);
        assert!((dist - 2.0).abs() < 1e-6);
    }
}
