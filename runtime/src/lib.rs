//! Image Reaper Runtime - retention engine implementation.
//!
//! Lists a registry repository, classifies each image against a git
//! checkout, selects the images to evict under the configured cap and floor,
//! and deletes them in registry-sized batches.

#![allow(clippy::result_large_err)]

pub mod classify;
pub mod delete;
pub mod engine;
pub mod registry;
pub mod retention;

// Re-export common types
pub use classify::{CommitClassifier, CommitOracle, GitCheckout};
pub use delete::{BatchDeleter, DeletionReport};
pub use engine::{RetentionEngine, RetentionPlan, RunContext, RunReport};
pub use registry::{list_images, EcrRegistry, ImagePage, ImageRegistry, MemoryRegistry};
pub use retention::{excess, partition, select, EvictionSet, Partitions};

/// Image Reaper Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
