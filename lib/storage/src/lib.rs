//! # amquery Storage
//!
//! Metric index storage, persistence and the [`Index`] lifecycle
//! (`init`, `build`, `add`, `find`, `save`, `load`).

pub mod biom;
pub mod config;
pub mod index;
pub mod linear;
pub mod persistence;
pub mod storage;
pub mod vptree_storage;

pub use biom::TableMerger;
pub use config::{create_preprocessor, IndexConfig, PreprocessorKind, StorageConfig, StorageKind};
pub use index::Index;
pub use linear::LinearStorage;
pub use persistence::Manifest;
pub use storage::{create_storage, load_storage, MetricIndexStorage, Neighbor};
pub use vptree_storage::VpTreeStorage;
