//! DiskANN/Vamana index for annex.
//!
//! Provides disk-resident approximate nearest neighbor (ANN) search using the
//! Vamana algorithm from Microsoft's DiskANN paper. The graph and the full
//! vectors stay on disk behind memory maps; only PQ codes and ids are held
//! in memory.
//!
//! # Key Features
//!
//! - **Disk-resident graph**: Graph stored on disk, accessed via mmap
//! - **Product Quantization**: codes sized from `pq_code_budget_gb`
//! - **Two-phase search**: PQ beam search + exact re-ranking
//! - **File manager staging**: every file written during build is handed to
//!   the host's [`FileManager`](annex_core::FileManager)
//!
//! # On-disk layout
//!
//! A build with `index_prefix = P` writes:
//!
//! - `P.graph`: fixed-degree adjacency lists
//! - `P.pq`: PQ codebook + codes
//! - `P.vectors`: full vectors (for re-ranking)
//! - `P.ids`: external ids
//! - `P.meta`: JSON build summary
//!
//! # Example
//!
//! ```no_run
//! use annex_core::{BitsetView, Config, Dataset, IndexNode, LocalFileManager, Version};
//! use annex_vamana::VamanaIndex;
//! use std::sync::Arc;
//!
//! let mut index = VamanaIndex::new(Version::current(), Arc::new(LocalFileManager::new()));
//! let cfg = Config::new()
//!     .set("metric_type", "L2")
//!     .set("index_prefix", "/data/index/l2")
//!     .set("data_path", "/data/raw.bin")
//!     .set("pq_code_budget_gb", 0.01)
//!     .set("build_dram_budget_gb", 32.0);
//! index.build(&Dataset::empty(), &cfg).unwrap();
//!
//! let query = Dataset::new(1, 128, vec![0.0; 128]).unwrap();
//! let result = index
//!     .search(&query, &Config::new().set("topk", 10), BitsetView::empty())
//!     .unwrap();
//! ```

mod builder;
mod files;
mod graph;
mod index;
mod pq;

pub use builder::{VamanaBuilder, VamanaParams};
pub use files::{read_raw_data, IndexFiles};
pub use index::VamanaIndex;
pub use pq::{DistanceTable, PQConfig, ProductQuantizer};

use annex_core::IndexError;
use std::path::PathBuf;

/// Error type for Vamana operations.
#[derive(Debug, thiserror::Error)]
pub enum VamanaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PQ error: {0}")]
    ProductQuantization(String),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Build error: {0}")]
    Build(String),

    #[error("Raw data file {path}: {reason}")]
    RawData { path: PathBuf, reason: String },

    #[error("Index files disagree: {0}")]
    Format(String),
}

impl From<VamanaError> for IndexError {
    fn from(err: VamanaError) -> Self {
        match err {
            VamanaError::Io(e) => IndexError::Io(e),
            VamanaError::Build(_) | VamanaError::RawData { .. } => {
                IndexError::InvalidParameter(err.to_string())
            }
            other => IndexError::Serialization(other.to_string()),
        }
    }
}

/// Result type for Vamana operations.
pub type Result<T> = std::result::Result<T, VamanaError>;
