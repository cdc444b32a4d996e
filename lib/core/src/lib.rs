//! # amquery Core
//!
//! Core library for amquery, a similarity index over biological samples.
//!
//! This crate provides the metric-space building blocks:
//!
//! - [`SampleDistance`] - Labeled pairwise distance model (dense matrix and/or live metric)
//! - [`CoordSystem`] / [`CsDistance`] - Projection onto distances to fixed reference samples
//! - [`VpTree`] - Vantage-point tree with single-path descent search
//! - [`SampleCache`] - Bounded LRU cache of parsed k-mer count files
//! - [`Preprocessor`] / [`SampleSplitter`] - Collaborators producing processed samples
//!
//! ## Example
//!
//! ```rust
//! use amquery_core::{
//!     CoordSystem, CsDistance, DistanceConfig, Metric, ProcessedSample, SampleCache,
//!     SampleDistance, VpTree,
//! };
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use std::sync::Arc;
//!
//! let config = DistanceConfig { metric: Some(Metric::Euclidean), precompute: true };
//! let mut distance = SampleDistance::new(config, Arc::new(SampleCache::default())).unwrap();
//! distance
//!     .add_samples(&[
//!         ProcessedSample::embedding("a", vec![0.0, 0.0]),
//!         ProcessedSample::embedding("b", vec![1.0, 0.0]),
//!         ProcessedSample::embedding("c", vec![5.0, 5.0]),
//!     ])
//!     .unwrap();
//!
//! let coords = CoordSystem::new(vec!["a".to_string(), "c".to_string()]);
//! let cs = CsDistance::new(&coords, &distance);
//! let mut rng = StdRng::seed_from_u64(42);
//! let tree = VpTree::build(distance.labels().to_vec(), &cs, &mut rng).unwrap();
//!
//! let query = cs.project(&ProcessedSample::embedding("q", vec![0.5, 0.0])).unwrap();
//! let node = tree.search(2, |label| cs.to_projection(label, &query)).unwrap();
//! assert!(node.unwrap().size() >= 2);
//! ```

pub mod cache;
pub mod coords;
pub mod distance;
pub mod error;
pub mod fasta;
pub mod matrix;
pub mod metric;
pub mod preprocess;
pub mod sample;
pub mod vptree;

pub use cache::{SampleCache, DEFAULT_CACHE_CAPACITY};
pub use coords::{CoordSystem, CsDistance};
pub use distance::{DistanceConfig, DistanceIdentity, DistanceSnapshot, SampleDistance};
pub use error::{Error, Result};
pub use fasta::{record_id, record_sequence, FastaReader, FastaRecord, FastaWriter};
pub use matrix::PairwiseMatrix;
pub use metric::Metric;
pub use preprocess::{FastaSplitter, KmerConfig, KmerCounter, KmerHasher, Preprocessor, SampleSplitter};
pub use sample::{KmerProfile, ProcessedSample, Representation, Sample};
pub use vptree::{nearest_neighbors, PointDistance, VpNode, VpTree};
