use crate::{KmerProfile, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_CACHE_CAPACITY: usize = 32;

struct CacheState {
    entries: HashMap<PathBuf, Arc<KmerProfile>, ahash::RandomState>,
    /// Least recently used at the front
    recency: VecDeque<PathBuf>,
}

impl CacheState {
    fn touch(&mut self, path: &Path) {
        if let Some(pos) = self.recency.iter().position(|p| p == path) {
            if let Some(p) = self.recency.remove(pos) {
                self.recency.push_back(p);
            }
        }
    }
}

/// Bounded LRU cache of parsed k-mer count files.
///
/// Keyed by the backing file path. There is no invalidation: count files
/// are assumed immutable once written.
pub struct SampleCache {
    capacity: usize,
    state: Mutex<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SampleCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(CacheState {
                entries: HashMap::with_capacity_and_hasher(capacity, Default::default()),
                recency: VecDeque::with_capacity(capacity),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached profile for `path`, parsing it on a miss
    pub fn get_or_load(&self, path: &Path) -> Result<Arc<KmerProfile>> {
        self.get_or_insert_with(path, || KmerProfile::read_dump(path))
    }

    pub fn get_or_insert_with<F>(&self, path: &Path, load: F) -> Result<Arc<KmerProfile>>
    where
        F: FnOnce() -> Result<KmerProfile>,
    {
        {
            let mut state = self.state.lock();
            if let Some(profile) = state.entries.get(path).cloned() {
                state.touch(path);
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(profile);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        // Parse outside the lock
        let profile = Arc::new(load()?);

        let mut state = self.state.lock();
        if !state.entries.contains_key(path) {
            if state.entries.len() >= self.capacity {
                if let Some(evicted) = state.recency.pop_front() {
                    state.entries.remove(&evicted);
                    debug!("Evicted {:?} from sample cache", evicted);
                }
            }
            state.recency.push_back(path.to_path_buf());
        } else {
            state.touch(path);
        }
        state.entries.insert(path.to_path_buf(), profile.clone());
        Ok(profile)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.state.lock().entries.contains_key(path)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.recency.clear();
    }
}

impl Default for SampleCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl std::fmt::Debug for SampleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn profile(kmer: &str) -> KmerProfile {
        let mut p = KmerProfile::new();
        p.add(kmer, 1);
        p
    }

    #[test]
    fn test_hit_skips_loader() {
        let cache = SampleCache::new(2);
        let loads = Cell::new(0);
        let path = Path::new("a.counter");

        for _ in 0..3 {
            let p = cache
                .get_or_insert_with(path, || {
                    loads.set(loads.get() + 1);
                    Ok(profile("AAA"))
                })
                .unwrap();
            assert_eq!(p.get("AAA"), 1);
        }

        assert_eq!(loads.get(), 1);
        assert_eq!(cache.hits(), 2);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = SampleCache::new(2);
        let (a, b, c) = (Path::new("a"), Path::new("b"), Path::new("c"));

        cache.get_or_insert_with(a, || Ok(profile("A"))).unwrap();
        cache.get_or_insert_with(b, || Ok(profile("B"))).unwrap();
        // Touch a so that b becomes least recently used
        cache.get_or_insert_with(a, || Ok(profile("A"))).unwrap();
        cache.get_or_insert_with(c, || Ok(profile("C"))).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(a));
        assert!(!cache.contains(b));
        assert!(cache.contains(c));
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let cache = SampleCache::new(4);
        let path = Path::new("missing.counter");
        assert!(cache.get_or_load(path).is_err());
        assert!(cache.is_empty());
    }
}
