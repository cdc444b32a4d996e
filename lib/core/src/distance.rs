use crate::{Error, Metric, PairwiseMatrix, ProcessedSample, Representation, Result, SampleCache};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Configuration of the sample distance model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceConfig {
    /// Live distance function; `None` means only precomputed distances are known
    pub metric: Option<Metric>,
    /// Keep a dense matrix for all known samples, filled as samples are added
    pub precompute: bool,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            metric: Some(Metric::Jsd),
            precompute: true,
        }
    }
}

/// What a persisted index needs to know about the distance it was built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistanceIdentity {
    pub metric: Option<Metric>,
    pub matrix: bool,
}

/// Serializable state of a [`SampleDistance`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistanceSnapshot {
    pub config: DistanceConfig,
    /// Samples in label order
    pub samples: Vec<ProcessedSample>,
    pub matrix: Option<PairwiseMatrix>,
}

/// Pairwise distance model over a growing, ordered set of samples.
///
/// Distances come from the dense matrix when both labels are in it, and
/// from the live metric otherwise.
#[derive(Debug, Clone)]
pub struct SampleDistance {
    config: DistanceConfig,
    labels: Vec<String>,
    positions: HashMap<String, usize, ahash::RandomState>,
    sample_map: HashMap<String, ProcessedSample, ahash::RandomState>,
    matrix: Option<PairwiseMatrix>,
    cache: Arc<SampleCache>,
}

impl SampleDistance {
    pub fn new(config: DistanceConfig, cache: Arc<SampleCache>) -> Result<Self> {
        if config.precompute && config.metric.is_none() {
            return Err(Error::InvalidConfig(
                "precomputing distances requires a metric".to_string(),
            ));
        }
        Ok(Self {
            config,
            labels: Vec::new(),
            positions: HashMap::default(),
            sample_map: HashMap::default(),
            matrix: config.precompute.then(PairwiseMatrix::default),
            cache,
        })
    }

    /// Model over an externally computed matrix. Its samples are known only
    /// by label; `metric` (if any) is used for pairs outside the matrix.
    pub fn from_matrix(matrix: PairwiseMatrix, metric: Option<Metric>, cache: Arc<SampleCache>) -> Self {
        let labels = matrix.labels().to_vec();
        let positions = labels.iter().enumerate().map(|(i, l)| (l.clone(), i)).collect();
        let sample_map = labels
            .iter()
            .map(|l| (l.clone(), ProcessedSample::new(l.clone(), Representation::Precomputed)))
            .collect();
        Self {
            config: DistanceConfig {
                metric,
                precompute: true,
            },
            labels,
            positions,
            sample_map,
            matrix: Some(matrix),
            cache,
        }
    }

    pub fn from_snapshot(snapshot: DistanceSnapshot, cache: Arc<SampleCache>) -> Result<Self> {
        let mut model = Self {
            config: snapshot.config,
            labels: Vec::with_capacity(snapshot.samples.len()),
            positions: HashMap::default(),
            sample_map: HashMap::default(),
            matrix: None,
            cache,
        };
        for sample in snapshot.samples {
            model.push(sample);
        }
        if let Some(matrix) = &snapshot.matrix {
            if matrix.labels() != model.labels.as_slice() {
                return Err(Error::Persistence(
                    "distance matrix labels do not match the sample list".to_string(),
                ));
            }
        }
        model.matrix = snapshot.matrix;
        Ok(model)
    }

    pub fn snapshot(&self) -> DistanceSnapshot {
        DistanceSnapshot {
            config: self.config,
            samples: self
                .labels
                .iter()
                .filter_map(|l| self.sample_map.get(l).cloned())
                .collect(),
            matrix: self.matrix.clone(),
        }
    }

    fn push(&mut self, sample: ProcessedSample) {
        let name = sample.name().to_string();
        self.positions.insert(name.clone(), self.labels.len());
        self.labels.push(name.clone());
        self.sample_map.insert(name, sample);
    }

    /// Append new samples in the given order.
    ///
    /// A name that is already known with an identical representation is
    /// skipped; with a different representation the whole call fails and
    /// nothing is changed.
    pub fn add_samples(&mut self, samples: &[ProcessedSample]) -> Result<()> {
        let mut fresh: Vec<&ProcessedSample> = Vec::new();
        for sample in samples {
            let known = self
                .sample_map
                .get(sample.name())
                .or_else(|| fresh.iter().copied().find(|s| s.name() == sample.name()));
            match known {
                Some(existing) if existing.repr() == sample.repr() => continue,
                Some(_) => return Err(Error::InconsistentState(sample.name().to_string())),
                None => fresh.push(sample),
            }
        }
        if fresh.is_empty() {
            return Ok(());
        }

        if let Some(mut matrix) = self.matrix.take() {
            let new_labels: Vec<String> = fresh.iter().map(|s| s.name().to_string()).collect();
            let old = self.labels.len();
            let res = matrix.extend(&new_labels, |i, j| {
                let a = if i < old {
                    &self.sample_map[&self.labels[i]]
                } else {
                    fresh[i - old]
                };
                self.live_distance(a, fresh[j - old])
            });
            self.matrix = Some(matrix);
            res?;
        }

        debug!("Adding {} samples to distance model", fresh.len());
        for sample in fresh {
            self.push(sample.clone());
        }
        Ok(())
    }

    fn live_distance(&self, a: &ProcessedSample, b: &ProcessedSample) -> Result<f64> {
        match self.config.metric {
            Some(metric) => metric.eval(a.repr(), b.repr(), &self.cache, (a.name(), b.name())),
            None => Err(Error::not_computable(a.name(), b.name())),
        }
    }

    fn stored(&self, sample: &ProcessedSample) -> Option<usize> {
        let pos = *self.positions.get(sample.name())?;
        (self.sample_map.get(sample.name())?.repr() == sample.repr()).then_some(pos)
    }

    /// Distance between two known labels
    pub fn distance(&self, a: &str, b: &str) -> Result<f64> {
        let sa = self.sample(a).ok_or_else(|| Error::UnknownSample(a.to_string()))?;
        let sb = self.sample(b).ok_or_else(|| Error::UnknownSample(b.to_string()))?;
        self.distance_between(sa, sb)
    }

    /// Distance between a possibly unknown sample and a known label
    pub fn distance_to(&self, sample: &ProcessedSample, label: &str) -> Result<f64> {
        let known = self
            .sample(label)
            .ok_or_else(|| Error::UnknownSample(label.to_string()))?;
        self.distance_between(sample, known)
    }

    pub fn distance_between(&self, a: &ProcessedSample, b: &ProcessedSample) -> Result<f64> {
        if a.name() == b.name() && a.repr() == b.repr() {
            return Ok(0.0);
        }
        if let (Some(matrix), Some(i), Some(j)) = (&self.matrix, self.stored(a), self.stored(b)) {
            return Ok(matrix.get(i, j));
        }
        self.live_distance(a, b)
    }

    #[inline]
    pub fn contains(&self, label: &str) -> bool {
        self.sample_map.contains_key(label)
    }

    #[inline]
    pub fn sample(&self, label: &str) -> Option<&ProcessedSample> {
        self.sample_map.get(label)
    }

    /// Samples in label order
    pub fn samples(&self) -> impl Iterator<Item = &ProcessedSample> {
        self.labels.iter().filter_map(|l| self.sample_map.get(l))
    }

    #[inline]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn config(&self) -> DistanceConfig {
        self.config
    }

    pub fn identity(&self) -> DistanceIdentity {
        DistanceIdentity {
            metric: self.config.metric,
            matrix: self.matrix.is_some(),
        }
    }

    #[inline]
    pub fn matrix(&self) -> Option<&PairwiseMatrix> {
        self.matrix.as_ref()
    }

    #[inline]
    pub fn cache(&self) -> &Arc<SampleCache> {
        &self.cache
    }
}
