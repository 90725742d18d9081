//! Core contract for annex vector indexes.
//!
//! This crate defines what every index backend shares:
//!
//! - **Data model**: [`Dataset`] envelopes, [`BitsetView`] exclusion masks,
//!   [`RangeSearchResult`] flat encoding
//! - **Configuration**: JSON [`Config`] bags validated against a per-backend
//!   [`ConfigSchema`] and a requested [`Version`]
//! - **IndexNode trait**: the lifecycle and query interface of every backend
//! - **AnnIterator trait**: lazy, pull-based neighbour streams
//! - **Persistence**: [`BinarySet`] named blobs and the [`FileManager`]
//!   capability used by disk-resident backends
//! - **FlatIndex**: exact linear scan, used as the golden reference
//!
//! # Architecture
//!
//! ```text
//! annex-core     contract + FLAT        <-- This crate
//! annex-ivf      IVF_FLAT / IVF_SQ8
//! annex-hnsw     HNSW (in-memory graph)
//! annex-vamana   DISKANN (disk-resident graph with PQ)
//! annex          IndexFactory registry over all of the above
//! ```
//!
//! # Example
//!
//! ```
//! use annex_core::{BitsetView, Config, Dataset, FlatIndex, IndexNode, Version};
//!
//! let data: Vec<f32> = (0..64).map(|i| i as f32).collect();
//! let base = Dataset::new(16, 4, data.as_slice()).unwrap();
//!
//! let mut index = FlatIndex::new(Version::current());
//! let cfg = Config::new().set("metric_type", "L2").set("topk", 3);
//! index.build(&base, &cfg).unwrap();
//!
//! let query = Dataset::new(1, 4, &data[..4]).unwrap();
//! let result = index.search(&query, &cfg, BitsetView::empty()).unwrap();
//! assert_eq!(result.ids().unwrap()[0], 0);
//! ```

mod binary_set;
mod bitset;
pub mod config;
mod dataset;
mod file_manager;
mod flat;
mod iterator;
pub mod kmeans;
mod metric;
mod neighbor;
mod node;
mod range;
mod version;

pub use binary_set::{seal, unseal, BinarySet};
pub use bitset::{Bitset, BitsetView};
pub use config::{Config, ConfigSchema, Operation, ParamKind, ParamSpec, ValidatedConfig};
pub use dataset::Dataset;
pub use file_manager::{DirectoryFileManager, FileManager, LocalFileManager};
pub use flat::FlatIndex;
pub use iterator::{AnnIterator, GraphSource, GraphWalkIterator, HeapIterator};
pub use kmeans::KMeansParams;
pub use metric::{inner_product, l2_distance_squared, normalize, MetricType};
pub use neighbor::{pack_top_k, Neighbor, TopK};
pub use node::{
    check_bitset, check_dim_key, check_metric, check_queries, check_vectors, resolve_ids, IdMap,
    IndexNode, IndexState,
};
pub use range::RangeSearchResult;
pub use version::{Version, VersionRange};

/// Error type for index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Index is not trained")]
    NotTrained,

    #[error("Index is not ready for queries")]
    NotReady,

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Insufficient data: need at least {required} rows, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Index is empty")]
    IndexEmpty,

    #[error("Unknown index type: {0}")]
    UnknownType(String),

    #[error("Index type {index_type} does not support version {version} (supported {min}..={max})")]
    UnsupportedVersion {
        index_type: String,
        version: i32,
        min: i32,
        max: i32,
    },

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Raw data unavailable for metric {0}")]
    RawDataUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexError {
    /// True for "feature not offered" outcomes that callers treat as a
    /// capability answer rather than a failure.
    pub fn is_feature_gap(&self) -> bool {
        matches!(self, Self::Unsupported(_) | Self::RawDataUnavailable(_))
    }
}

impl From<bincode::Error> for IndexError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;
