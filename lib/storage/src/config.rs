use amquery_core::{
    DistanceConfig, Error, KmerConfig, KmerCounter, KmerHasher, Preprocessor, Result,
    DEFAULT_CACHE_CAPACITY,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which metric index backs the sample collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    VpTree,
    Linear,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::VpTree => write!(f, "vptree"),
            StorageKind::Linear => write!(f, "linear"),
        }
    }
}

impl FromStr for StorageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "vptree" | "vp-tree" | "vp_tree" => Ok(StorageKind::VpTree),
            "linear" => Ok(StorageKind::Linear),
            other => Err(Error::InvalidConfig(format!("unknown storage kind '{}'", other))),
        }
    }
}

/// How k-mer profiles are produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreprocessorKind {
    /// Count in-process
    #[default]
    Hasher,
    /// Run the external counter and read its dump files
    Counter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub kind: StorageKind,
    /// Number of reference samples drawn for the coordinate system
    pub coord_count: usize,
    /// Fixed references, one label per line; overrides `coord_count`
    pub coords_file: Option<PathBuf>,
    /// Seed for vantage point and reference selection
    pub seed: Option<u64>,
    /// Rebuild the whole tree when samples are added instead of failing
    pub rebuild_on_add: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::VpTree,
            coord_count: 16,
            coords_file: None,
            seed: None,
            rebuild_on_add: false,
        }
    }
}

/// Everything an [`Index`](crate::Index) needs, passed in at construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub data_dir: PathBuf,
    pub cache_capacity: usize,
    pub distance: DistanceConfig,
    pub storage: StorageConfig,
    pub preprocessor: PreprocessorKind,
    pub kmer: KmerConfig,
    /// Master BIOM table that new tables are merged into on `add`
    pub biom_table: Option<PathBuf>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".amquery"),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            distance: DistanceConfig::default(),
            storage: StorageConfig::default(),
            preprocessor: PreprocessorKind::default(),
            kmer: KmerConfig::default(),
            biom_table: None,
        }
    }
}

impl IndexConfig {
    pub fn with_data_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Directory per-sample files are split into
    pub fn sample_dir(&self) -> PathBuf {
        self.data_dir.join("samples")
    }

    /// Directory query files are split into, kept apart from indexed samples
    pub fn query_dir(&self) -> PathBuf {
        self.data_dir.join("queries")
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(Error::InvalidConfig("cache capacity must be positive".to_string()));
        }
        if self.storage.kind == StorageKind::VpTree
            && self.storage.coord_count == 0
            && self.storage.coords_file.is_none()
        {
            return Err(Error::InvalidConfig(
                "a vp-tree needs at least one reference coordinate".to_string(),
            ));
        }
        if self.distance.precompute && self.distance.metric.is_none() {
            return Err(Error::InvalidConfig(
                "precomputing distances requires a metric".to_string(),
            ));
        }
        Ok(())
    }
}

/// Preprocessor selected by `config.preprocessor`
pub fn create_preprocessor(config: &IndexConfig) -> Result<Box<dyn Preprocessor>> {
    match config.preprocessor {
        PreprocessorKind::Hasher => Ok(Box::new(KmerHasher::new(config.kmer.kmer_size)?)),
        PreprocessorKind::Counter => {
            let out = KmerCounter::default_output_dir(&config.data_dir, config.kmer.kmer_size);
            Ok(Box::new(KmerCounter::new(config.kmer.clone(), out)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amquery_core::Metric;

    #[test]
    fn test_defaults() {
        let config = IndexConfig::default();
        assert_eq!(config.cache_capacity, 32);
        assert_eq!(config.distance.metric, Some(Metric::Jsd));
        assert_eq!(config.storage.kind, StorageKind::VpTree);
        assert!(!config.storage.rebuild_on_add);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config: IndexConfig = serde_json::from_str(
            r#"{"data_dir": "/tmp/idx", "storage": {"kind": "linear", "seed": 3}}"#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/idx"));
        assert_eq!(config.storage.kind, StorageKind::Linear);
        assert_eq!(config.storage.seed, Some(3));
        assert_eq!(config.storage.coord_count, 16);
        assert_eq!(config.kmer.kmer_size, 21);
    }

    #[test]
    fn test_storage_kind_parse() {
        assert_eq!("VPTree".parse::<StorageKind>().unwrap(), StorageKind::VpTree);
        assert_eq!("linear".parse::<StorageKind>().unwrap(), StorageKind::Linear);
        assert!("btree".parse::<StorageKind>().is_err());
        assert_eq!(StorageKind::Linear.to_string(), "linear");
    }

    #[test]
    fn test_validate_rejects_zero_cache() {
        let config = IndexConfig {
            cache_capacity: 0,
            ..IndexConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
