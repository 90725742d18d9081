//! Embeddable approximate nearest neighbor index engine.
//!
//! `annex` puts every index backend behind one [`IndexNode`] contract and
//! creates them by name through the [`IndexFactory`]:
//!
//! | Type | Crate |
//! |------|-------|
//! | `FLAT` | `annex-core` |
//! | `IVF_FLAT`, `IVF_SQ8` | `annex-ivf` |
//! | `HNSW` | `annex-hnsw` |
//! | `DISKANN` | `annex-vamana` |
//!
//! # Example
//!
//! ```
//! use annex::{BitsetView, Config, Dataset, IndexFactory, IndexNode, IndexPack, Version};
//!
//! let data: Vec<f32> = (0..256).map(|i| (i % 17) as f32).collect();
//! let base = Dataset::new(64, 4, data.as_slice()).unwrap();
//!
//! let mut index = IndexFactory::create("HNSW", Version::current(), &IndexPack::default()).unwrap();
//! let cfg = Config::new().set("metric_type", "L2").set("topk", 5);
//! index.build(&base, &cfg).unwrap();
//!
//! let query = Dataset::new(1, 4, &data[..4]).unwrap();
//! let result = index.search(&query, &cfg, BitsetView::empty()).unwrap();
//! assert_eq!(result.ids().unwrap().len(), 5);
//! ```

mod factory;

pub use annex_core::*;
pub use factory::{IndexFactory, IndexPack};

pub use annex_hnsw::{HnswIndex, HnswParams};
pub use annex_ivf::{IvfIndex, IvfKind, IvfParams};
pub use annex_vamana::{VamanaIndex, VamanaParams};
