//! Inverted-file indexes for annex.
//!
//! - **IVF_FLAT**: partitions hold raw vectors; exact within probed lists
//! - **IVF_SQ8**: partitions hold 8-bit scalar codes, 4x smaller
//!
//! Both share one coarse quantizer trained with k-means and expose the same
//! [`IndexNode`](annex_core::IndexNode) contract.
//!
//! # Example
//!
//! ```
//! use annex_core::{BitsetView, Config, Dataset, IndexNode, Version};
//! use annex_ivf::IvfIndex;
//!
//! let data: Vec<f32> = (0..400).map(|i| (i % 37) as f32).collect();
//! let base = Dataset::new(100, 4, data.as_slice()).unwrap();
//!
//! let mut index = IvfIndex::flat(Version::current());
//! let cfg = Config::new()
//!     .set("metric_type", "L2")
//!     .set("nlist", 8)
//!     .set("nprobe", 8)
//!     .set("topk", 1);
//! index.build(&base, &cfg).unwrap();
//!
//! let query = Dataset::new(1, 4, &data[..4]).unwrap();
//! let result = index.search(&query, &cfg, BitsetView::empty()).unwrap();
//! assert_eq!(result.distances().unwrap()[0], 0.0);
//! ```

mod iterator;
mod ivf;
mod sq8;

pub use iterator::IvfIterator;
pub use ivf::{IvfIndex, IvfKind, IvfParams};
pub use sq8::ScalarQuantizer;

use annex_core::IndexError;

/// Errors specific to inverted-file indexes.
#[derive(Debug, thiserror::Error)]
pub enum IvfError {
    #[error("Blob holds {actual} but this index is {expected}")]
    KindMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Partition {list} stores {actual} values, expected {expected}")]
    ListSize {
        list: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Row position {0} is missing or duplicated across partitions")]
    BadPosition(u32),

    #[error("{values} centroid values do not fit {nlist} partitions")]
    CentroidCount { nlist: usize, values: usize },
}

impl From<IvfError> for IndexError {
    fn from(err: IvfError) -> Self {
        IndexError::Serialization(err.to_string())
    }
}
