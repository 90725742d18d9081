//! Test tooling for annex indexes.
//!
//! This crate provides tools for validating index behavior:
//! - Recall and accuracy against a golden (exact) result
//! - Seeded generators for vectors, exclusion masks and raw data files
//! - Fault injection for file managers
//!
//! # Usage
//!
//! ```ignore
//! use annex_testkit::{calc_recall, gen_dataset};
//!
//! let data = gen_dataset(1000, 128, 42);
//! // build a FLAT index and the index under test, run range_search on both
//! let recall = calc_recall(golden.ids(), golden.lims(), got.ids(), got.lims(), nq);
//! assert!(recall > 0.9);
//! ```

pub mod fault_injection;
pub mod generators;
pub mod recall;

// Re-export key types
pub use fault_injection::{FaultPlan, FlakyFileManager};
pub use generators::{gen_dataset, gen_random_bitset, write_raw_data};
pub use recall::{calc_accuracy, calc_recall, calc_top_k_recall};
