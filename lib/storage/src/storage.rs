use crate::linear::LinearStorage;
use crate::persistence::{checksum, storage_file, write_atomic};
use crate::vptree_storage::VpTreeStorage;
use crate::{StorageConfig, StorageKind};
use amquery_core::{CoordSystem, ProcessedSample, Result, SampleDistance};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One query result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub distance: f64,
    pub label: String,
}

impl Neighbor {
    pub fn new(distance: f64, label: impl Into<String>) -> Self {
        Self {
            distance,
            label: label.into(),
        }
    }
}

/// Sort ascending by distance, ties by label
pub(crate) fn sort_neighbors(neighbors: &mut [Neighbor]) {
    neighbors.sort_by(|a, b| {
        OrderedFloat(a.distance)
            .cmp(&OrderedFloat(b.distance))
            .then_with(|| a.label.cmp(&b.label))
    });
}

/// Names in first-seen order without repeats
pub(crate) fn unique_names<'a>(samples: impl IntoIterator<Item = &'a ProcessedSample>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    samples
        .into_iter()
        .map(|s| s.name())
        .filter(|name| seen.insert(*name))
        .map(str::to_string)
        .collect()
}

/// A searchable index over the labels of a [`SampleDistance`].
///
/// Storages never own the distance model; callers pass the model the
/// storage was built with to every operation that measures distances.
pub trait MetricIndexStorage {
    fn kind(&self) -> StorageKind;

    /// Replace the index with one over `samples`
    fn build(&mut self, distance: &SampleDistance, samples: &[ProcessedSample]) -> Result<()>;

    /// Extend the index. `distance` already contains `samples`. Samples the
    /// index holds are ignored and an empty batch is a no-op.
    fn add_samples(&mut self, samples: &[ProcessedSample], distance: &SampleDistance) -> Result<()>;

    /// Candidates near `query`, sorted by ascending distance
    fn find(&self, distance: &SampleDistance, query: &ProcessedSample, k: usize) -> Result<Vec<Neighbor>>;

    /// Indexed labels
    fn labels(&self) -> Vec<&str>;

    fn to_bytes(&self) -> Result<Vec<u8>>;

    /// Write the storage blob into `dir`; returns its checksum
    fn save(&self, dir: &Path) -> Result<String> {
        let bytes = self.to_bytes()?;
        let sum = checksum(&bytes);
        write_atomic(&dir.join(storage_file(&sum)), &bytes)?;
        Ok(sum)
    }

    fn len(&self) -> usize {
        self.labels().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Empty storage of `config.kind`. `coords` pins the reference samples of a
/// vp-tree; otherwise they come from `config.coords_file` or are drawn at
/// build time.
pub fn create_storage(config: &StorageConfig, coords: Option<CoordSystem>) -> Result<Box<dyn MetricIndexStorage>> {
    match config.kind {
        StorageKind::VpTree => {
            let coords = match (coords, &config.coords_file) {
                (Some(coords), _) => Some(coords),
                (None, Some(path)) => Some(CoordSystem::read(path)?),
                (None, None) => None,
            };
            Ok(Box::new(VpTreeStorage::new(config.clone(), coords)))
        }
        StorageKind::Linear => Ok(Box::new(LinearStorage::new())),
    }
}

/// Storage of `kind` restored from a blob written by [`MetricIndexStorage::save`]
pub fn load_storage(kind: StorageKind, config: &StorageConfig, bytes: &[u8]) -> Result<Box<dyn MetricIndexStorage>> {
    match kind {
        StorageKind::VpTree => Ok(Box::new(VpTreeStorage::from_bytes(config.clone(), bytes)?)),
        StorageKind::Linear => Ok(Box::new(LinearStorage::from_bytes(bytes)?)),
    }
}
