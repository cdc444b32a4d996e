use crate::storage::{sort_neighbors, unique_names, MetricIndexStorage, Neighbor};
use crate::StorageKind;
use amquery_core::{ProcessedSample, Result, SampleDistance};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Exact scan over every stored label with the base distance.
///
/// Supports insertion directly; useful as a reference for the vp-tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinearStorage {
    labels: Vec<String>,
}

impl LinearStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

impl MetricIndexStorage for LinearStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Linear
    }

    fn build(&mut self, _distance: &SampleDistance, samples: &[ProcessedSample]) -> Result<()> {
        self.labels = unique_names(samples);
        Ok(())
    }

    fn add_samples(&mut self, samples: &[ProcessedSample], _distance: &SampleDistance) -> Result<()> {
        let known: HashSet<String> = self.labels.iter().cloned().collect();
        self.labels
            .extend(unique_names(samples).into_iter().filter(|name| !known.contains(name)));
        Ok(())
    }

    /// The `k` closest labels
    fn find(&self, distance: &SampleDistance, query: &ProcessedSample, k: usize) -> Result<Vec<Neighbor>> {
        let mut neighbors = self
            .labels
            .iter()
            .map(|label| Ok(Neighbor::new(distance.distance_to(query, label)?, label.as_str())))
            .collect::<Result<Vec<_>>>()?;
        sort_neighbors(&mut neighbors);
        neighbors.truncate(k);
        Ok(neighbors)
    }

    fn labels(&self) -> Vec<&str> {
        self.labels.iter().map(String::as_str).collect()
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amquery_core::{DistanceConfig, Metric, SampleCache};
    use std::sync::Arc;

    #[test]
    fn test_exact_neighbors() {
        let samples: Vec<ProcessedSample> = [0.0, 10.0, 3.0, 4.0]
            .iter()
            .enumerate()
            .map(|(i, x)| ProcessedSample::embedding(format!("s{}", i), vec![*x]))
            .collect();
        let config = DistanceConfig {
            metric: Some(Metric::Euclidean),
            precompute: false,
        };
        let mut model = SampleDistance::new(config, Arc::new(SampleCache::default())).unwrap();
        model.add_samples(&samples).unwrap();

        let mut storage = LinearStorage::new();
        storage.build(&model, &samples[..2]).unwrap();
        storage.add_samples(&samples[1..], &model).unwrap();
        assert_eq!(storage.labels(), ["s0", "s1", "s2", "s3"]);

        let query = ProcessedSample::embedding("q", vec![3.4]);
        let found = storage.find(&model, &query, 2).unwrap();
        let labels: Vec<&str> = found.iter().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, ["s2", "s3"]);

        let restored = LinearStorage::from_bytes(&storage.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.find(&model, &query, 2).unwrap(), found);
    }
}
