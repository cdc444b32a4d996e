//! Coordinate embedding: project samples onto distances to fixed references.
//!
//! `v(x) = [d(x, r_1), ..., d(x, r_n)]` and `D(a, b) = |v(a) - v(b)|_2`.
//! The reference set is chosen once, when the tree is built; projecting
//! against a different set invalidates the tree.

use crate::metric::euclidean;
use crate::vptree::PointDistance;
use crate::{Error, ProcessedSample, Result, SampleDistance};
use rand::seq::index::sample as sample_indices;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;

/// Ordered, fixed set of reference sample labels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordSystem {
    references: Vec<String>,
}

impl CoordSystem {
    pub fn new(references: Vec<String>) -> Self {
        Self { references }
    }

    /// Draw `count` references uniformly from `labels`, keeping their order.
    /// Uses every label when there are no more than `count`.
    pub fn choose<R: Rng + ?Sized>(labels: &[String], count: usize, rng: &mut R) -> Self {
        if labels.len() <= count {
            return Self::new(labels.to_vec());
        }
        let mut picked = sample_indices(rng, labels.len(), count).into_vec();
        picked.sort_unstable();
        Self::new(picked.into_iter().map(|i| labels[i].clone()).collect())
    }

    /// Read references from a file with one label per line
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(Self::new(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
        ))
    }

    /// Fail with `UnknownSample` for the first reference the model lacks
    pub fn check(&self, distance: &SampleDistance) -> Result<()> {
        match self.references.iter().find(|r| !distance.contains(r)) {
            Some(missing) => Err(Error::UnknownSample(missing.clone())),
            None => Ok(()),
        }
    }

    #[inline]
    pub fn references(&self) -> &[String] {
        &self.references
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.references.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

impl<'a> IntoIterator for &'a CoordSystem {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.references.iter()
    }
}

/// Euclidean distance in the coordinate system spanned by the references.
///
/// Works on sample labels so it can drive a tree built over labels.
/// Projections are memoized for the lifetime of the value.
pub struct CsDistance<'a> {
    coords: &'a CoordSystem,
    base: &'a SampleDistance,
    projections: RefCell<HashMap<String, Rc<[f64]>, ahash::RandomState>>,
}

impl<'a> CsDistance<'a> {
    pub fn new(coords: &'a CoordSystem, base: &'a SampleDistance) -> Self {
        Self {
            coords,
            base,
            projections: RefCell::new(HashMap::default()),
        }
    }

    /// Distances from `sample` to every reference, in reference order
    pub fn project(&self, sample: &ProcessedSample) -> Result<Vec<f64>> {
        self.coords
            .into_iter()
            .map(|r| self.base.distance_to(sample, r))
            .collect()
    }

    /// Memoized projection of a known label
    pub fn project_label(&self, label: &str) -> Result<Rc<[f64]>> {
        if let Some(v) = self.projections.borrow().get(label) {
            return Ok(v.clone());
        }
        let sample = self
            .base
            .sample(label)
            .ok_or_else(|| Error::UnknownSample(label.to_string()))?;
        let v: Rc<[f64]> = self.project(sample)?.into();
        self.projections.borrow_mut().insert(label.to_string(), v.clone());
        Ok(v)
    }

    /// Distance between a known label and an already projected query
    pub fn to_projection(&self, label: &str, query: &[f64]) -> Result<f64> {
        Ok(euclidean(&self.project_label(label)?, query))
    }

    #[inline]
    pub fn coords(&self) -> &CoordSystem {
        self.coords
    }
}

impl PointDistance<String> for CsDistance<'_> {
    fn distance(&self, a: &String, b: &String) -> Result<f64> {
        if a == b {
            return Ok(0.0);
        }
        Ok(euclidean(&self.project_label(a)?, &self.project_label(b)?))
    }
}
