//! HNSW (Hierarchical Navigable Small World) index for annex.
//!
//! HNSW builds a multi-layer graph where:
//!
//! - Higher layers have fewer nodes (exponential decay)
//! - Each layer is a navigable small-world graph
//! - Search starts at the top layer and descends
//!
//! # Parameters
//!
//! - `m`: Max connections per node per layer (default: 16; layer 0 gets 2*M)
//! - `ef_construction`: Beam width during index building (default: 200)
//! - `ef`: Beam width during search (default: 100, overridable per query)
//! - `seed`: Layer sampling seed (default: 42)
//!
//! Queries with more than 90% of rows masked skip the graph and scan the
//! remaining rows exactly.
//!
//! # Example
//!
//! ```
//! use annex_core::{BitsetView, Config, Dataset, IndexNode, Version};
//! use annex_hnsw::HnswIndex;
//!
//! let data: Vec<f32> = (0..256).map(|i| i as f32).collect();
//! let base = Dataset::new(64, 4, data.as_slice()).unwrap();
//!
//! let mut index = HnswIndex::new(Version::current());
//! let cfg = Config::new().set("metric_type", "L2").set("topk", 1);
//! index.build(&base, &cfg).unwrap();
//!
//! let query = Dataset::new(1, 4, &data[8..12]).unwrap();
//! let result = index.search(&query, &cfg, BitsetView::empty()).unwrap();
//! assert_eq!(result.ids().unwrap(), &[2]);
//! ```

mod graph;
mod index;
mod layer;
mod visited;

pub use index::{HnswIndex, HnswParams};

use annex_core::IndexError;

/// Error type for HNSW graph loading.
#[derive(Debug, thiserror::Error)]
pub enum HnswError {
    #[error("Graph error: {0}")]
    Graph(String),

    #[error("{values} vector values do not fit {rows} rows")]
    VectorCount { rows: usize, values: usize },

    #[error("Expected {expected} node levels, found {actual}")]
    LevelCount { expected: usize, actual: usize },

    #[error("Entry point {0} is out of range")]
    EntryPoint(u32),

    #[error("Layer {layer} references missing node {node}")]
    DanglingEdge { layer: usize, node: u32 },
}

impl From<HnswError> for IndexError {
    fn from(err: HnswError) -> Self {
        IndexError::Serialization(err.to_string())
    }
}
