use crate::fasta::{record_id, record_sequence, FastaReader};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

type Counts = HashMap<String, u64, ahash::RandomState>;

/// A raw per-sample sequence file, as produced by a splitter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    name: String,
    path: PathBuf,
}

impl Sample {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Sample named after the file stem of `path`
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::MalformedInput(format!("no sample name in {:?}", path)))?;
        Ok(Self::new(name, path))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Sparse k-mer count profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KmerProfile {
    counts: Counts,
    total: u64,
}

impl KmerProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count every `k`-length window of every sequence
    pub fn from_sequences<I, S>(sequences: I, k: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut profile = Self::new();
        if k == 0 {
            return profile;
        }
        for seq in sequences {
            let seq = seq.as_ref().to_ascii_uppercase();
            if seq.len() < k {
                continue;
            }
            for start in 0..=seq.len() - k {
                if let Some(kmer) = seq.get(start..start + k) {
                    profile.add(kmer, 1);
                }
            }
        }
        profile
    }

    /// Parse a counter dump: FASTA records whose header is the count
    /// and whose sequence is the k-mer.
    pub fn read_dump<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut profile = Self::new();
        for record in FastaReader::open(path.as_ref())? {
            let record = record?;
            let id = record_id(&record);
            let count: u64 = id.parse().map_err(|_| {
                Error::MalformedInput(format!("{:?}: bad k-mer count {:?}", path.as_ref(), id))
            })?;
            profile.add(&record_sequence(&record), count);
        }
        Ok(profile)
    }

    pub fn add(&mut self, kmer: &str, count: u64) {
        *self.counts.entry(kmer.to_string()).or_insert(0) += count;
        self.total += count;
    }

    #[inline]
    pub fn get(&self, kmer: &str) -> u64 {
        self.counts.get(kmer).copied().unwrap_or(0)
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// How a processed sample is represented for distance computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Representation {
    /// Path to a k-mer count dump, parsed lazily through the sample cache
    KmerFile(PathBuf),
    /// In-memory k-mer counts
    Kmers(KmerProfile),
    /// Opaque embedding vector
    Embedding(Vec<f64>),
    /// Known only through a precomputed distance matrix
    Precomputed,
}

/// A sample after preprocessing. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedSample {
    name: String,
    repr: Representation,
}

impl ProcessedSample {
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, repr: Representation) -> Self {
        Self {
            name: name.into(),
            repr,
        }
    }

    #[inline]
    #[must_use]
    pub fn embedding(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::new(name, Representation::Embedding(values))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn repr(&self) -> &Representation {
        &self.repr
    }
}
