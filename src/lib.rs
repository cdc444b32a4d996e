//! # amquery
//!
//! A similarity index over biological samples.
//!
//! Samples are reduced to k-mer profiles (or any other representation a
//! [`Preprocessor`] produces), compared with a base distance such as
//! Jensen-Shannon divergence, and embedded as vectors of distances to a
//! fixed set of reference samples. A vantage-point tree over that embedding
//! answers approximate nearest-neighbour queries.
//!
//! ## Quick Start
//!
//! ### From the command line
//!
//! ```bash
//! amquery --data-dir ./idx build seqs.fna
//! amquery --data-dir ./idx find SampleA -k 5
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use amquery::prelude::*;
//! use std::path::PathBuf;
//!
//! let config = IndexConfig::with_data_dir("./idx");
//! let preprocessor = create_preprocessor(&config).unwrap();
//! let mut index = Index::init(config, preprocessor).unwrap();
//!
//! index.build(&[PathBuf::from("seqs.fna")]).unwrap();
//! index.save().unwrap();
//!
//! let (distances, labels) = index.find("SampleA", 5).unwrap();
//! for (d, label) in distances.iter().zip(&labels) {
//!     println!("{}\t{:.4}", label, d);
//! }
//! ```
//!
//! ## Crate Structure
//!
//! - `amquery-core` - Samples, metrics, distance model, coordinate system, VP-tree
//! - `amquery-storage` - Metric index storage, persistence and the [`Index`] lifecycle

// Re-export core types
pub use amquery_core::{
    CoordSystem, CsDistance, DistanceConfig, FastaSplitter, KmerConfig, KmerCounter, KmerHasher,
    KmerProfile, Metric, PairwiseMatrix, Preprocessor, ProcessedSample, Representation, Sample,
    SampleCache, SampleDistance, SampleSplitter, VpTree,
    Error, Result,
};

// Re-export storage
pub use amquery_storage::{
    create_preprocessor, Index, IndexConfig, LinearStorage, MetricIndexStorage, Neighbor,
    StorageConfig, StorageKind, TableMerger, VpTreeStorage,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        create_preprocessor, DistanceConfig, Error, Index, IndexConfig, Metric, Preprocessor,
        ProcessedSample, Result, Sample, StorageConfig, StorageKind,
    };
}
