use crate::storage::{sort_neighbors, unique_names, MetricIndexStorage, Neighbor};
use crate::{StorageConfig, StorageKind};
use amquery_core::{
    CoordSystem, CsDistance, DistanceIdentity, Error, ProcessedSample, Result, SampleDistance, VpTree,
};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

#[derive(Serialize, Deserialize)]
struct VpTreeBlob {
    coords: CoordSystem,
    pinned: Option<CoordSystem>,
    identity: Option<DistanceIdentity>,
    tree: Vec<u8>,
}

/// Vp-tree over sample labels in the reference coordinate system.
///
/// Queries are projected once onto the references and answered with a
/// single-path descent, so results are approximate.
pub struct VpTreeStorage {
    config: StorageConfig,
    tree: VpTree<String>,
    coords: CoordSystem,
    /// References fixed at construction; drawn per build when absent
    pinned: Option<CoordSystem>,
    identity: Option<DistanceIdentity>,
}

impl VpTreeStorage {
    pub fn new(config: StorageConfig, pinned: Option<CoordSystem>) -> Self {
        Self {
            config,
            tree: VpTree::default(),
            coords: CoordSystem::default(),
            pinned,
            identity: None,
        }
    }

    pub fn from_bytes(config: StorageConfig, bytes: &[u8]) -> Result<Self> {
        let blob: VpTreeBlob = bincode::deserialize(bytes)?;
        Ok(Self {
            config,
            tree: VpTree::from_bytes(&blob.tree)?,
            coords: blob.coords,
            pinned: blob.pinned,
            identity: blob.identity,
        })
    }

    fn rng(&self) -> Box<dyn RngCore> {
        match self.config.seed {
            Some(seed) => Box::new(StdRng::seed_from_u64(seed)),
            None => Box::new(rand::rng()),
        }
    }

    fn check_identity(&self, distance: &SampleDistance) -> Result<()> {
        match self.identity {
            Some(built) if built != distance.identity() => Err(Error::InvalidConfig(format!(
                "tree was built with {:?}, distance model is {:?}",
                built,
                distance.identity()
            ))),
            _ => Ok(()),
        }
    }

    fn rebuild(&mut self, labels: Vec<String>, coords: Option<CoordSystem>, distance: &SampleDistance) -> Result<()> {
        let mut rng = self.rng();
        let coords = match coords {
            Some(coords) if !coords.is_empty() => coords,
            _ => CoordSystem::choose(&labels, self.config.coord_count, &mut *rng),
        };
        coords.check(distance)?;

        let count = labels.len();
        let tree = {
            let cs = CsDistance::new(&coords, distance);
            VpTree::build(labels, &cs, &mut *rng)?
        };

        info!("Built vp-tree over {} samples with {} references", count, coords.len());
        self.tree = tree;
        self.coords = coords;
        self.identity = Some(distance.identity());
        Ok(())
    }

    #[inline]
    pub fn tree(&self) -> &VpTree<String> {
        &self.tree
    }

    #[inline]
    pub fn coords(&self) -> &CoordSystem {
        &self.coords
    }
}

impl MetricIndexStorage for VpTreeStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::VpTree
    }

    fn build(&mut self, distance: &SampleDistance, samples: &[ProcessedSample]) -> Result<()> {
        let pinned = self.pinned.clone();
        self.rebuild(unique_names(samples), pinned, distance)
    }

    fn add_samples(&mut self, samples: &[ProcessedSample], distance: &SampleDistance) -> Result<()> {
        let mut labels: Vec<String> = self.tree.dfs().into_iter().cloned().collect();
        let known: HashSet<&str> = labels.iter().map(String::as_str).collect();
        let fresh: Vec<String> = unique_names(samples)
            .into_iter()
            .filter(|name| !known.contains(name.as_str()))
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }
        if !self.config.rebuild_on_add {
            return Err(Error::UnsupportedOperation(
                "vp-tree insertion (enable rebuild_on_add to rebuild instead)",
            ));
        }
        self.check_identity(distance)?;

        debug!("Rebuilding vp-tree to add {} samples", fresh.len());
        labels.extend(fresh);
        let coords = Some(self.coords.clone()).filter(|c| !c.is_empty()).or_else(|| self.pinned.clone());
        self.rebuild(labels, coords, distance)
    }

    fn find(&self, distance: &SampleDistance, query: &ProcessedSample, k: usize) -> Result<Vec<Neighbor>> {
        if self.tree.is_empty() {
            return Ok(Vec::new());
        }
        self.check_identity(distance)?;

        let cs = CsDistance::new(&self.coords, distance);
        let projected = cs.project(query)?;
        let node = match self.tree.search(k, |label| cs.to_projection(label, &projected))? {
            Some(node) => node,
            None => return Ok(Vec::new()),
        };

        let mut neighbors = node
            .dfs()
            .into_iter()
            .map(|label| Ok(Neighbor::new(cs.to_projection(label, &projected)?, label.as_str())))
            .collect::<Result<Vec<_>>>()?;
        sort_neighbors(&mut neighbors);
        debug!("Query {} stopped at a node of {} samples", query.name(), neighbors.len());
        Ok(neighbors)
    }

    fn labels(&self) -> Vec<&str> {
        self.tree.dfs().into_iter().map(String::as_str).collect()
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let blob = VpTreeBlob {
            coords: self.coords.clone(),
            pinned: self.pinned.clone(),
            identity: self.identity,
            tree: self.tree.to_bytes()?,
        };
        Ok(bincode::serialize(&blob)?)
    }

    fn len(&self) -> usize {
        self.tree.len()
    }
}
