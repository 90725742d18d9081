//! Metric types and distance kernels.
//!
//! Three metrics are supported:
//! - **L2**: squared Euclidean distance, lower is closer
//! - **IP**: inner product similarity, higher is closer
//! - **COSINE**: cosine similarity, higher is closer (vectors are normalized
//!   on ingest and queries are normalized before scoring)
//!
//! Internally every backend orders candidates by a *distance* where lower is
//! closer; similarity metrics use the negated score. [`MetricType::to_score`]
//! converts back to the caller-facing value.
//!
//! Kernels are written to be auto-vectorized by the compiler in release
//! builds.

use crate::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Metric used to compare vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricType {
    /// Squared Euclidean distance: sum((a[i] - b[i])^2)
    L2,
    /// Inner product: a · b
    IP,
    /// Cosine similarity: (a · b) / (||a|| * ||b||)
    Cosine,
}

impl MetricType {
    /// Canonical config spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::L2 => "L2",
            Self::IP => "IP",
            Self::Cosine => "COSINE",
        }
    }

    /// True when larger raw values mean "closer".
    pub fn is_similarity(&self) -> bool {
        !matches!(self, Self::L2)
    }

    /// Compute the internal distance (lower = closer).
    ///
    /// For `Cosine` both inputs must already be normalized.
    #[inline]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::L2 => l2_distance_squared(a, b),
            Self::IP | Self::Cosine => -inner_product(a, b),
        }
    }

    /// Convert an internal distance to the caller-facing value.
    #[inline]
    pub fn to_score(&self, distance: f32) -> f32 {
        if self.is_similarity() {
            -distance
        } else {
            distance
        }
    }

    /// Convert a caller-facing value (e.g. `radius`) to an internal distance.
    #[inline]
    pub fn to_distance(&self, score: f32) -> f32 {
        self.to_score(score)
    }

    /// Value used to pad top-k rows that found fewer than `topk` neighbours.
    pub fn worst_score(&self) -> f32 {
        if self.is_similarity() {
            f32::NEG_INFINITY
        } else {
            f32::INFINITY
        }
    }

    /// Bring a vector into the space the metric scores in.
    pub fn prepare<'a>(&self, vector: &'a [f32]) -> Cow<'a, [f32]> {
        match self {
            Self::Cosine => {
                let mut owned = vector.to_vec();
                normalize(&mut owned);
                Cow::Owned(owned)
            }
            _ => Cow::Borrowed(vector),
        }
    }

    /// Row-major variant of [`MetricType::prepare`].
    pub fn prepare_rows<'a>(&self, tensor: &'a [f32], dim: usize) -> Cow<'a, [f32]> {
        match self {
            Self::Cosine => {
                let mut owned = tensor.to_vec();
                for row in owned.chunks_exact_mut(dim.max(1)) {
                    normalize(row);
                }
                Cow::Owned(owned)
            }
            _ => Cow::Borrowed(tensor),
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "L2" => Ok(Self::L2),
            "IP" => Ok(Self::IP),
            "COSINE" => Ok(Self::Cosine),
            other => Err(IndexError::InvalidParameter(format!(
                "unknown metric_type {}",
                other
            ))),
        }
    }
}

/// Compute squared Euclidean distance.
///
/// # Example
///
/// ```
/// use annex_core::l2_distance_squared;
///
/// let a = [0.0, 0.0];
/// let b = [3.0, 4.0];
/// assert!((l2_distance_squared(&a, &b) - 25.0).abs() < 0.001);
/// ```
#[inline]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    // Process in chunks of 4 for better auto-vectorization
    let mut sum = 0.0f32;
    let chunks = a.len() / 4;

    for i in 0..chunks {
        let base = i * 4;
        let d0 = a[base] - b[base];
        let d1 = a[base + 1] - b[base + 1];
        let d2 = a[base + 2] - b[base + 2];
        let d3 = a[base + 3] - b[base + 3];
        sum += d0 * d0 + d1 * d1 + d2 * d2 + d3 * d3;
    }

    for i in (chunks * 4)..a.len() {
        let d = a[i] - b[i];
        sum += d * d;
    }

    sum
}

/// Compute the inner product of two vectors.
///
/// # Example
///
/// ```
/// use annex_core::inner_product;
///
/// let a = [1.0, 2.0, 3.0];
/// let b = [4.0, 5.0, 6.0];
/// assert!((inner_product(&a, &b) - 32.0).abs() < 0.001);
/// ```
#[inline]
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let mut sum = 0.0f32;
    let chunks = a.len() / 4;

    for i in 0..chunks {
        let base = i * 4;
        sum += a[base] * b[base]
            + a[base + 1] * b[base + 1]
            + a[base + 2] * b[base + 2]
            + a[base + 3] * b[base + 3];
    }

    for i in (chunks * 4)..a.len() {
        sum += a[i] * b[i];
    }

    sum
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm = inner_product(vector, vector).sqrt();
    if norm < f32::EPSILON {
        return;
    }
    for v in vector.iter_mut() {
        *v /= norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_distance_squared() {
        let a = [0.0, 0.0, 0.0];
        let b = [3.0, 4.0, 0.0];
        assert!((l2_distance_squared(&a, &b) - 25.0).abs() < 0.001);

        let c = [1.0, 2.0, 3.0];
        assert!(l2_distance_squared(&c, &c) < 0.001);
    }

    #[test]
    fn test_inner_product_tail() {
        // 5 elements exercises the remainder loop
        let a = [1.0, 1.0, 1.0, 1.0, 2.0];
        let b = [1.0, 1.0, 1.0, 1.0, 3.0];
        assert!((inner_product(&a, &b) - 10.0).abs() < 0.001);
    }

    #[test]
    fn test_metric_distance_and_score() {
        let a = [1.0, 0.0];
        let b = [0.5, 0.5];

        let d = MetricType::L2.distance(&a, &b);
        assert!((d - 0.5).abs() < 0.001);
        assert_eq!(MetricType::L2.to_score(d), d);

        let d = MetricType::IP.distance(&a, &b);
        assert!((d + 0.5).abs() < 0.001);
        assert!((MetricType::IP.to_score(d) - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_cosine_prepare() {
        let q = MetricType::Cosine.prepare(&[3.0, 4.0]);
        assert!((q[0] - 0.6).abs() < 0.001);
        assert!((q[1] - 0.8).abs() < 0.001);

        let rows = MetricType::Cosine.prepare_rows(&[2.0, 0.0, 0.0, 5.0], 2);
        assert_eq!(&rows[..], &[1.0, 0.0, 0.0, 1.0]);

        // L2 never copies
        assert!(matches!(MetricType::L2.prepare(&[1.0]), Cow::Borrowed(_)));
    }

    #[test]
    fn test_parse_metric() {
        assert_eq!("l2".parse::<MetricType>().unwrap(), MetricType::L2);
        assert_eq!("IP".parse::<MetricType>().unwrap(), MetricType::IP);
        assert_eq!("cosine".parse::<MetricType>().unwrap(), MetricType::Cosine);
        assert!("HAMMING".parse::<MetricType>().is_err());
    }

    #[test]
    fn test_worst_score() {
        assert_eq!(MetricType::L2.worst_score(), f32::INFINITY);
        assert_eq!(MetricType::IP.worst_score(), f32::NEG_INFINITY);
    }

    #[test]
    fn test_zero_vector_normalize() {
        let mut v = [0.0, 0.0];
        normalize(&mut v);
        assert_eq!(v, [0.0, 0.0]);
    }
}
