//! Distance functions over sample representations
//!
//! All functions return a non-negative, symmetric dissimilarity where 0.0
//! means identical.

use crate::{KmerProfile, Representation, SampleCache};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::Arc;

/// Live distance function applied to processed samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Jensen-Shannon divergence of k-mer frequencies (base 2, in [0, 1])
    Jsd,
    /// Jaccard distance of k-mer sets
    Jaccard,
    /// Euclidean distance of embedding vectors
    Euclidean,
}

impl Default for Metric {
    fn default() -> Self {
        Metric::Jsd
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Jsd => "jsd",
            Metric::Jaccard => "jaccard",
            Metric::Euclidean => "euclidean",
        };
        f.write_str(name)
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jsd" => Ok(Metric::Jsd),
            "jaccard" => Ok(Metric::Jaccard),
            "euclidean" => Ok(Metric::Euclidean),
            other => Err(Error::InvalidConfig(format!("unknown metric: {}", other))),
        }
    }
}

impl Metric {
    /// Evaluate the metric on two representations.
    ///
    /// `names` are only used for error reporting.
    pub fn eval(
        &self,
        a: &Representation,
        b: &Representation,
        cache: &SampleCache,
        names: (&str, &str),
    ) -> Result<f64> {
        match self {
            Metric::Jsd | Metric::Jaccard => {
                let pa = profile_of(a, cache).ok_or_else(|| Error::not_computable(names.0, names.1))?;
                let pb = profile_of(b, cache).ok_or_else(|| Error::not_computable(names.0, names.1))?;
                let (pa, pb) = (pa?, pb?);
                Ok(if *self == Metric::Jsd {
                    jsd(&pa, &pb)
                } else {
                    jaccard(&pa, &pb)
                })
            }
            Metric::Euclidean => match (a, b) {
                (Representation::Embedding(x), Representation::Embedding(y)) if x.len() == y.len() => {
                    Ok(euclidean(x, y))
                }
                _ => Err(Error::not_computable(names.0, names.1)),
            },
        }
    }
}

enum ProfileRef<'a> {
    Borrowed(&'a KmerProfile),
    Cached(Arc<KmerProfile>),
}

impl Deref for ProfileRef<'_> {
    type Target = KmerProfile;

    fn deref(&self) -> &KmerProfile {
        match self {
            ProfileRef::Borrowed(p) => p,
            ProfileRef::Cached(p) => p,
        }
    }
}

fn profile_of<'a>(repr: &'a Representation, cache: &SampleCache) -> Option<Result<ProfileRef<'a>>> {
    match repr {
        Representation::Kmers(p) => Some(Ok(ProfileRef::Borrowed(p))),
        Representation::KmerFile(path) => Some(cache.get_or_load(path).map(ProfileRef::Cached)),
        _ => None,
    }
}

/// Jensen-Shannon divergence between the k-mer frequency distributions
pub fn jsd(a: &KmerProfile, b: &KmerProfile) -> f64 {
    let (ta, tb) = (a.total() as f64, b.total() as f64);
    if ta == 0.0 || tb == 0.0 {
        return if ta == tb { 0.0 } else { 1.0 };
    }

    let mut acc = 0.0;
    let mut term = |p: f64, q: f64| {
        let m = 0.5 * (p + q);
        if p > 0.0 {
            acc += 0.5 * p * (p / m).log2();
        }
        if q > 0.0 {
            acc += 0.5 * q * (q / m).log2();
        }
    };

    for (kmer, count) in a.iter() {
        term(count as f64 / ta, b.get(kmer) as f64 / tb);
    }
    for (kmer, count) in b.iter() {
        if a.get(kmer) == 0 {
            term(0.0, count as f64 / tb);
        }
    }

    acc.clamp(0.0, 1.0)
}

/// Jaccard distance between the sets of observed k-mers
pub fn jaccard(a: &KmerProfile, b: &KmerProfile) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.iter().filter(|(kmer, _)| b.get(kmer) > 0).count();
    let union = a.len() + b.len() - intersection;
    1.0 - intersection as f64 / union as f64
}

#[inline]
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}
