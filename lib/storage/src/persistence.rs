// Durable state of an index: distance model blob, storage blob, manifest.
//
// Blob file names carry the checksum of their content and the manifest is
// written last, so a save that fails part way leaves the previous manifest
// and every blob it names untouched.
use crate::StorageKind;
use amquery_core::{DistanceIdentity, DistanceSnapshot, Error, Result, SampleCache, SampleDistance};
use anyhow::{anyhow, Context};
use atomicwrites::{AllowOverwrite, AtomicFile};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const FORMAT_VERSION: u32 = 1;

pub fn distance_file(checksum: &str) -> String {
    format!("distance.{}.bin.gz", checksum)
}

pub fn storage_file(checksum: &str) -> String {
    format!("storage.{}.bin", checksum)
}

fn persistence_error(e: anyhow::Error) -> Error {
    Error::Persistence(format!("{:#}", e))
}

/// Hex-encoded SHA-256 of `bytes`
pub fn checksum(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Replace `path` with `bytes` so readers never observe a partial file
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    AtomicFile::new(path, AllowOverwrite)
        .write(|f| f.write_all(bytes))
        .with_context(|| format!("writing {:?}", path))
        .map_err(persistence_error)
}

/// Read a blob, failing when its checksum differs from `expected`
pub fn read_verified(path: &Path, expected: Option<&str>) -> Result<Vec<u8>> {
    let bytes = fs::read(path)
        .with_context(|| format!("reading {:?}", path))
        .map_err(persistence_error)?;
    if let Some(expected) = expected {
        let actual = checksum(&bytes);
        if actual != expected {
            return Err(Error::Persistence(format!(
                "checksum mismatch for {:?}: expected {}, found {}",
                path, expected, actual
            )));
        }
    }
    Ok(bytes)
}

fn encode_distance(distance: &SampleDistance) -> anyhow::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    bincode::serialize_into(&mut encoder, &distance.snapshot())
        .map_err(|e| anyhow!("Serialization error: {}", e))?;
    Ok(encoder.finish()?)
}

/// Write the distance model into `dir`; returns the checksum of the blob
pub fn save_distance(dir: &Path, distance: &SampleDistance) -> Result<String> {
    let bytes = encode_distance(distance).map_err(persistence_error)?;
    let sum = checksum(&bytes);
    write_atomic(&dir.join(distance_file(&sum)), &bytes)?;
    Ok(sum)
}

pub fn load_distance(path: &Path, cache: Arc<SampleCache>, expected: Option<&str>) -> Result<SampleDistance> {
    let bytes = read_verified(path, expected)?;
    let snapshot: DistanceSnapshot = bincode::deserialize_from(GzDecoder::new(bytes.as_slice()))
        .map_err(|e| Error::Persistence(format!("Deserialization error: {}", e)))?;
    SampleDistance::from_snapshot(snapshot, cache)
}

/// Describes a saved index; written last so a complete manifest implies
/// complete blobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub storage_kind: StorageKind,
    pub distance: DistanceIdentity,
    pub samples: usize,
    pub distance_checksum: String,
    pub storage_checksum: String,
}

impl Manifest {
    pub fn new(
        storage_kind: StorageKind,
        distance: DistanceIdentity,
        samples: usize,
        distance_checksum: String,
        storage_checksum: String,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            created_at: Utc::now(),
            storage_kind,
            distance,
            samples,
            distance_checksum,
            storage_checksum,
        }
    }

    pub fn distance_path(&self, dir: &Path) -> PathBuf {
        dir.join(distance_file(&self.distance_checksum))
    }

    pub fn storage_path(&self, dir: &Path) -> PathBuf {
        dir.join(storage_file(&self.storage_checksum))
    }

    /// Delete the blobs of this manifest that `current` does not name
    pub fn remove_stale(&self, dir: &Path, current: &Manifest) {
        let pairs = [
            (self.distance_path(dir), current.distance_path(dir)),
            (self.storage_path(dir), current.storage_path(dir)),
        ];
        for (old, new) in pairs {
            if old == new {
                continue;
            }
            match fs::remove_file(&old) {
                Ok(()) => debug!("Removed stale blob {:?}", old),
                Err(e) => warn!("Failed to remove stale blob {:?}: {}", old, e),
            }
        }
    }

    pub fn write(&self, dir: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        write_atomic(&dir.join(MANIFEST_FILE), &json)
    }

    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Err(Error::Persistence(format!("no saved index in {:?}", dir)));
        }
        let bytes = read_verified(&path, None)?;
        let manifest: Manifest = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Persistence(format!("invalid manifest {:?}: {}", path, e)))?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(Error::Persistence(format!(
                "unsupported format version {} (expected {})",
                manifest.format_version, FORMAT_VERSION
            )));
        }
        Ok(manifest)
    }
}
