//! Product Quantization for memory-efficient vector compression.
//!
//! Product Quantization (PQ) compresses high-dimensional vectors into compact
//! codes while enabling fast approximate distance computation.
//!
//! # How It Works
//!
//! 1. **Split**: Divide vector into M subspaces (e.g., 128D → 16 x 8D)
//! 2. **Cluster**: K-means on each subspace to find K centroids (typically 256)
//! 3. **Encode**: Each subvector → nearest centroid ID (8 bits if K=256)
//! 4. **Distance**: Precompute query-to-centroid distances, lookup by code
//!
//! # Compression Ratio
//!
//! For 128D float32 vectors with M=16 subspaces, K=256 centroids:
//! - Original: 128 * 4 = 512 bytes
//! - Compressed: 16 * 1 = 16 bytes
//! - Ratio: 32x

use crate::{Result, VamanaError};
use annex_core::kmeans::{self, KMeansParams};
use annex_core::{inner_product, l2_distance_squared, MetricType};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Product Quantization configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PQConfig {
    /// Number of subspaces (M). Default: 16.
    /// Vector dimension must be divisible by this.
    pub num_subspaces: usize,

    /// Bits per code (determines K = 2^bits). Default: 8 (K=256).
    pub bits_per_code: usize,

    /// Number of k-means iterations for training. Default: 25.
    pub kmeans_iterations: usize,

    /// Sample size for training. Default: 10000.
    pub training_sample_size: usize,

    /// Seed for k-means initialization. Default: 42.
    pub seed: u64,
}

impl Default for PQConfig {
    fn default() -> Self {
        Self {
            num_subspaces: 16,
            bits_per_code: 8,
            kmeans_iterations: 25,
            training_sample_size: 10000,
            seed: 42,
        }
    }
}

impl PQConfig {
    /// Largest subspace count dividing `dim` whose codes for `rows` vectors
    /// fit in `budget_gb`. Never less than one.
    pub fn subspaces_for_budget(dim: usize, rows: usize, budget_gb: f64) -> usize {
        let per_row = budget_gb * GIB / rows.max(1) as f64;
        // Tolerate rounding in budgets computed as exact byte counts
        let cap = ((per_row + 1e-6).floor() as usize).clamp(1, dim.max(1));
        (1..=cap).rev().find(|m| dim % m == 0).unwrap_or(1)
    }
}

/// Product Quantizer.
///
/// Codebooks are stored flat: `[subspace][centroid][subspace_dim]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductQuantizer {
    num_subspaces: usize,
    subspace_dim: usize,
    /// K = 2^bits_per_code
    num_centroids: usize,
    codebooks: Vec<f32>,
    dimensions: usize,
}

/// Query-to-centroid distances for one query, in internal distance form.
#[derive(Debug, Clone)]
pub struct DistanceTable {
    num_centroids: usize,
    entries: Vec<f32>,
}

impl DistanceTable {
    /// Approximate distance to an encoded vector: one lookup per subspace.
    #[inline]
    pub fn distance(&self, code: &[u8]) -> f32 {
        code.iter()
            .enumerate()
            .map(|(subspace, &c)| self.entries[subspace * self.num_centroids + c as usize])
            .sum()
    }
}

impl ProductQuantizer {
    /// Train a Product Quantizer on `vectors` (`rows x dimensions`, row-major).
    pub fn train(vectors: &[f32], dimensions: usize, config: &PQConfig) -> Result<Self> {
        let num_subspaces = config.num_subspaces;
        if num_subspaces == 0 || dimensions % num_subspaces != 0 {
            return Err(VamanaError::ProductQuantization(format!(
                "Dimensions {} not divisible by num_subspaces {}",
                dimensions, num_subspaces
            )));
        }
        if !(1..=8).contains(&config.bits_per_code) {
            return Err(VamanaError::ProductQuantization(format!(
                "bits_per_code {} outside 1..=8",
                config.bits_per_code
            )));
        }
        if vectors.is_empty() {
            return Err(VamanaError::ProductQuantization(
                "no training vectors".to_string(),
            ));
        }

        let num_centroids = 1 << config.bits_per_code;
        let subspace_dim = dimensions / num_subspaces;
        let rows = vectors.len() / dimensions;

        let mut codebooks = Vec::with_capacity(num_subspaces * num_centroids * subspace_dim);
        let mut subvectors = Vec::with_capacity(rows * subspace_dim);
        for subspace_idx in 0..num_subspaces {
            let start = subspace_idx * subspace_dim;

            subvectors.clear();
            for row in vectors.chunks_exact(dimensions) {
                subvectors.extend_from_slice(&row[start..start + subspace_dim]);
            }

            let params = KMeansParams {
                k: num_centroids,
                max_iterations: config.kmeans_iterations,
                sample_size: config.training_sample_size,
                seed: config.seed.wrapping_add(subspace_idx as u64),
            };
            codebooks.extend(kmeans::train(&subvectors, subspace_dim, &params));
        }

        tracing::debug!(
            num_subspaces,
            num_centroids,
            rows,
            "trained product quantizer"
        );

        Ok(Self {
            num_subspaces,
            subspace_dim,
            num_centroids,
            codebooks,
            dimensions,
        })
    }

    fn codebook(&self, subspace_idx: usize) -> &[f32] {
        let size = self.num_centroids * self.subspace_dim;
        &self.codebooks[subspace_idx * size..(subspace_idx + 1) * size]
    }

    /// Encode a vector to PQ codes, one centroid index per subspace.
    pub fn encode(&self, vector: &[f32]) -> Vec<u8> {
        debug_assert_eq!(vector.len(), self.dimensions);

        vector
            .chunks_exact(self.subspace_dim)
            .enumerate()
            .map(|(subspace_idx, subvector)| {
                let (centroid_idx, _) =
                    kmeans::nearest(self.codebook(subspace_idx), self.subspace_dim, subvector);
                centroid_idx as u8
            })
            .collect()
    }

    /// Encode every row of `vectors` into one flat code buffer.
    pub fn encode_all(&self, vectors: &[f32]) -> Vec<u8> {
        let mut codes = Vec::with_capacity(vectors.len() / self.dimensions * self.num_subspaces);
        for row in vectors.chunks_exact(self.dimensions) {
            codes.extend(self.encode(row));
        }
        codes
    }

    /// Precompute the distance table for a prepared query.
    ///
    /// L2 entries are squared subvector distances; similarity metrics store
    /// the negated partial inner product, so summing the entries of a code
    /// gives the same internal distance form as [`MetricType::distance`].
    pub fn distance_table(&self, query: &[f32], metric: MetricType) -> DistanceTable {
        debug_assert_eq!(query.len(), self.dimensions);

        let mut entries = Vec::with_capacity(self.num_subspaces * self.num_centroids);
        for (subspace_idx, subquery) in query.chunks_exact(self.subspace_dim).enumerate() {
            for centroid in self.codebook(subspace_idx).chunks_exact(self.subspace_dim) {
                let d = match metric {
                    MetricType::L2 => l2_distance_squared(subquery, centroid),
                    MetricType::IP | MetricType::Cosine => -inner_product(subquery, centroid),
                };
                entries.push(d);
            }
        }
        DistanceTable {
            num_centroids: self.num_centroids,
            entries,
        }
    }

    /// Decode a code back into its centroid concatenation.
    pub fn decode(&self, code: &[u8]) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.dimensions);
        for (subspace_idx, &c) in code.iter().enumerate() {
            let start = c as usize * self.subspace_dim;
            out.extend_from_slice(&self.codebook(subspace_idx)[start..start + self.subspace_dim]);
        }
        out
    }

    pub fn num_subspaces(&self) -> usize {
        self.num_subspaces
    }

    pub fn num_centroids(&self) -> usize {
        self.num_centroids
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Serialize the PQ codebook to bytes.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(16 + self.codebooks.len() * 4);

        // Header
        buf.put_u32_le(self.num_subspaces as u32);
        buf.put_u32_le(self.subspace_dim as u32);
        buf.put_u32_le(self.num_centroids as u32);
        buf.put_u32_le(self.dimensions as u32);

        for &val in &self.codebooks {
            buf.put_f32_le(val);
        }
        buf.freeze()
    }

    /// Deserialize PQ codebook from bytes.
    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 16 {
            return Err(VamanaError::ProductQuantization(
                "Invalid PQ bytes: too short".to_string(),
            ));
        }

        let num_subspaces = bytes.get_u32_le() as usize;
        let subspace_dim = bytes.get_u32_le() as usize;
        let num_centroids = bytes.get_u32_le() as usize;
        let dimensions = bytes.get_u32_le() as usize;

        if num_subspaces * subspace_dim != dimensions || num_centroids > 256 {
            return Err(VamanaError::ProductQuantization(format!(
                "inconsistent header: {} x {} subspaces for {} dimensions, {} centroids",
                num_subspaces, subspace_dim, dimensions, num_centroids
            )));
        }
        let values = num_subspaces * num_centroids * subspace_dim;
        if bytes.remaining() != values * 4 {
            return Err(VamanaError::ProductQuantization(format!(
                "codebook holds {} bytes, expected {}",
                bytes.remaining(),
                values * 4
            )));
        }

        let codebooks = (0..values).map(|_| bytes.get_f32_le()).collect();
        Ok(Self {
            num_subspaces,
            subspace_dim,
            num_centroids,
            codebooks,
            dimensions,
        })
    }
}
