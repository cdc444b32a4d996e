use crate::biom::{merge_pair, TableMerger};
use crate::persistence::{distance_file, load_distance, read_verified, save_distance, Manifest};
use crate::storage::{create_storage, load_storage, MetricIndexStorage};
use crate::IndexConfig;
use amquery_core::{
    CoordSystem, Error, FastaSplitter, PairwiseMatrix, Preprocessor, ProcessedSample, Result,
    SampleCache, SampleDistance, SampleSplitter,
};
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

fn single_input(input_files: &[PathBuf]) -> Result<&Path> {
    match input_files {
        [input] => Ok(input.as_path()),
        _ => Err(Error::UnsupportedInput(input_files.len())),
    }
}

/// Sample index: turns input files into processed samples, keeps the
/// distance model and the metric storage in step, and answers queries.
pub struct Index {
    config: IndexConfig,
    cache: Arc<SampleCache>,
    distance: SampleDistance,
    storage: Box<dyn MetricIndexStorage>,
    preprocessor: Box<dyn Preprocessor>,
    splitter: Box<dyn SampleSplitter>,
    merger: Option<Box<dyn TableMerger>>,
}

impl Index {
    /// Empty index; nothing is read from or written to `config.data_dir`
    pub fn init(config: IndexConfig, preprocessor: Box<dyn Preprocessor>) -> Result<Self> {
        config.validate()?;
        let cache = Arc::new(SampleCache::new(config.cache_capacity));
        let distance = SampleDistance::new(config.distance, cache.clone())?;
        let storage = create_storage(&config.storage, None)?;
        info!("Initialized {} index in {:?}", config.storage.kind, config.data_dir);

        Ok(Self {
            config,
            cache,
            distance,
            storage,
            preprocessor,
            splitter: Box::new(FastaSplitter),
            merger: None,
        })
    }

    /// Index saved in `config.data_dir`. The manifest decides the storage
    /// kind; blobs whose checksum differs from the manifest are rejected.
    pub fn load(config: IndexConfig, preprocessor: Box<dyn Preprocessor>) -> Result<Self> {
        config.validate()?;
        let dir = config.data_dir.clone();
        let manifest = Manifest::read(&dir)?;
        let cache = Arc::new(SampleCache::new(config.cache_capacity));

        let distance = load_distance(
            &manifest.distance_path(&dir),
            cache.clone(),
            Some(&manifest.distance_checksum),
        )?;
        if distance.identity() != manifest.distance || distance.len() != manifest.samples {
            return Err(Error::Persistence(format!(
                "distance model does not match manifest ({:?}, {} samples)",
                manifest.distance, manifest.samples
            )));
        }

        if manifest.storage_kind != config.storage.kind {
            warn!(
                "Configured storage {} differs from saved {}; using saved",
                config.storage.kind, manifest.storage_kind
            );
        }
        let bytes = read_verified(&manifest.storage_path(&dir), Some(&manifest.storage_checksum))?;
        let storage = load_storage(manifest.storage_kind, &config.storage, &bytes)?;

        info!(
            "Loaded index of {} samples saved at {}",
            distance.len(),
            manifest.created_at
        );
        Ok(Self {
            config,
            cache,
            distance,
            storage,
            preprocessor,
            splitter: Box::new(FastaSplitter),
            merger: None,
        })
    }

    pub fn with_splitter(mut self, splitter: impl SampleSplitter + 'static) -> Self {
        self.splitter = Box::new(splitter);
        self
    }

    pub fn with_table_merger(mut self, merger: impl TableMerger + 'static) -> Self {
        self.merger = Some(Box::new(merger));
        self
    }

    fn process_input(&self, input: &Path, out_dir: &Path) -> Result<Vec<ProcessedSample>> {
        let samples = self.splitter.split(input, out_dir)?;
        samples.iter().map(|s| self.preprocessor.process(s)).collect()
    }

    /// Replace the index with one over the samples in a single input file.
    /// On failure the previous index is kept.
    pub fn build(&mut self, input_files: &[PathBuf]) -> Result<()> {
        let input = single_input(input_files)?;
        let processed = self.process_input(input, &self.config.sample_dir())?;

        let mut distance = SampleDistance::new(self.config.distance, self.cache.clone())?;
        distance.add_samples(&processed)?;
        let mut storage = create_storage(&self.config.storage, None)?;
        storage.build(&distance, &processed)?;

        self.distance = distance;
        self.storage = storage;
        info!("Built index over {} samples from {:?}", self.distance.len(), input);
        Ok(())
    }

    /// Replace the index with one over a labeled distance matrix, optionally
    /// pinning the reference samples to those listed in `coords`
    pub fn build_from_matrix(&mut self, matrix: &Path, coords: Option<&Path>) -> Result<()> {
        let matrix = PairwiseMatrix::read_tsv(matrix)?;
        let distance = SampleDistance::from_matrix(matrix, self.config.distance.metric, self.cache.clone());
        let samples: Vec<ProcessedSample> = distance.samples().cloned().collect();
        let coords = coords.map(CoordSystem::read).transpose()?;

        let mut storage = create_storage(&self.config.storage, coords)?;
        storage.build(&distance, &samples)?;

        self.distance = distance;
        self.storage = storage;
        info!("Built index over a precomputed matrix of {} samples", self.distance.len());
        Ok(())
    }

    /// Add the samples of a single input file. An empty file list adds
    /// nothing. The master BIOM table, when one is configured, is merged
    /// with `biom_table` first; the in-memory index changes only if every
    /// later step succeeds.
    pub fn add(&mut self, input_files: &[PathBuf], biom_table: Option<&Path>) -> Result<()> {
        if input_files.is_empty() {
            debug!("No input files; nothing to add");
            return Ok(());
        }
        let input = single_input(input_files)?;

        if let Some((master, additional)) = merge_pair(self.config.biom_table.as_deref(), biom_table)? {
            let merger = self
                .merger
                .as_ref()
                .ok_or(Error::UnsupportedOperation("merging BIOM tables without a table merger"))?;
            merger.merge(master, additional)?;
            debug!("Merged {:?} into {:?}", additional, master);
        }

        let processed = self.process_input(input, &self.config.sample_dir())?;
        let mut distance = self.distance.clone();
        distance.add_samples(&processed)?;
        self.storage.add_samples(&processed, &distance)?;

        let added = distance.len() - self.distance.len();
        self.distance = distance;
        info!("Added {} samples ({} total)", added, self.distance.len());
        Ok(())
    }

    fn resolve(&self, name_or_path: &str) -> Result<Cow<'_, ProcessedSample>> {
        if let Some(sample) = self.distance.sample(name_or_path) {
            return Ok(Cow::Borrowed(sample));
        }
        let path = Path::new(name_or_path);
        if !path.exists() {
            return Err(Error::UnknownSample(name_or_path.to_string()));
        }
        self.process_input(path, &self.config.query_dir())?
            .into_iter()
            .next()
            .map(Cow::Owned)
            .ok_or_else(|| Error::UnknownSample(name_or_path.to_string()))
    }

    /// Distances and labels of the candidates near a known sample name or a
    /// sample file, closest first. Known samples are reused as stored; the
    /// index is never modified. At least `min(k, len)` candidates are
    /// returned from a vp-tree, which may return more.
    pub fn find(&self, name_or_path: &str, k: usize) -> Result<(Vec<f64>, Vec<String>)> {
        let query = self.resolve(name_or_path)?;
        let neighbors = self.storage.find(&self.distance, &query, k)?;
        debug!("Found {} candidates for {}", neighbors.len(), query.name());
        Ok(neighbors.into_iter().map(|n| (n.distance, n.label)).unzip())
    }

    /// Write the distance model, the storage and the manifest to
    /// `config.data_dir`. Until the new manifest is in place the previously
    /// saved index stays loadable; its blobs are removed afterwards.
    pub fn save(&self) -> Result<()> {
        let dir = &self.config.data_dir;
        fs::create_dir_all(dir)?;
        let previous = Manifest::read(dir).ok();

        let distance_checksum = save_distance(dir, &self.distance)?;
        let storage_checksum = match self.storage.save(dir) {
            Ok(sum) => sum,
            Err(e) => {
                if previous.as_ref().map_or(true, |m| m.distance_checksum != distance_checksum) {
                    let _ = fs::remove_file(dir.join(distance_file(&distance_checksum)));
                }
                return Err(e);
            }
        };
        let manifest = Manifest::new(
            self.storage.kind(),
            self.distance.identity(),
            self.distance.len(),
            distance_checksum,
            storage_checksum,
        );
        manifest.write(dir)?;

        if let Some(previous) = previous {
            previous.remove_stale(dir, &manifest);
        }
        info!("Saved index of {} samples to {:?}", self.distance.len(), dir);
        Ok(())
    }

    pub fn refine(&mut self) -> Result<()> {
        Err(Error::UnsupportedOperation("index refinement"))
    }

    #[inline]
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    #[inline]
    pub fn distance(&self) -> &SampleDistance {
        &self.distance
    }

    #[inline]
    pub fn storage(&self) -> &dyn MetricIndexStorage {
        self.storage.as_ref()
    }

    #[inline]
    pub fn cache(&self) -> &Arc<SampleCache> {
        &self.cache
    }

    /// Sample labels in insertion order
    #[inline]
    pub fn labels(&self) -> &[String] {
        self.distance.labels()
    }

    pub fn samples(&self) -> impl Iterator<Item = &ProcessedSample> {
        self.distance.samples()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.distance.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.distance.is_empty()
    }
}
