//! Collaborators that turn raw sequence files into processed samples.
//!
//! The index only depends on the [`SampleSplitter`] and [`Preprocessor`]
//! traits; the implementations here cover the common cases.

use crate::fasta::{record_id, record_sequence, FastaReader, FastaWriter};
use crate::{Error, KmerProfile, ProcessedSample, Representation, Result, Sample};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Splits one input into per-sample sequence files
pub trait SampleSplitter {
    fn split(&self, input: &Path, out_dir: &Path) -> Result<Vec<Sample>>;
}

/// Turns a raw sample into its distance representation
pub trait Preprocessor {
    fn process(&self, sample: &Sample) -> Result<ProcessedSample>;
}

impl<F> Preprocessor for F
where
    F: Fn(&Sample) -> Result<ProcessedSample>,
{
    fn process(&self, sample: &Sample) -> Result<ProcessedSample> {
        self(sample)
    }
}

/// Splits a QIIME-style FASTA file whose read ids look like
/// `SampleName_readid` into one file per sample. A directory input is taken
/// as already split: one sample per file, named after the file stem.
#[derive(Debug, Clone, Default)]
pub struct FastaSplitter;

impl FastaSplitter {
    /// Sample name encoded in a read id
    pub fn sample_name(read_id: &str) -> &str {
        match read_id.rfind('_') {
            Some(pos) if pos > 0 => &read_id[..pos],
            _ => read_id,
        }
    }

    fn list_dir(dir: &Path) -> Result<Vec<Sample>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        paths.into_iter().map(Sample::from_path).collect()
    }
}

impl SampleSplitter for FastaSplitter {
    fn split(&self, input: &Path, out_dir: &Path) -> Result<Vec<Sample>> {
        if input.is_dir() {
            return Self::list_dir(input);
        }

        fs::create_dir_all(out_dir)?;
        let mut order: Vec<String> = Vec::new();
        let mut writers: HashMap<String, FastaWriter<BufWriter<File>>, ahash::RandomState> = HashMap::default();

        for record in FastaReader::open(input)? {
            let record = record?;
            let name = Self::sample_name(&record_id(&record)).to_string();
            if !writers.contains_key(&name) {
                let file = File::create(out_dir.join(format!("{}.fasta", name)))?;
                writers.insert(name.clone(), FastaWriter::new(BufWriter::new(file)));
                order.push(name.clone());
            }
            if let Some(writer) = writers.get_mut(&name) {
                writer.write(&record)?;
            }
        }

        for writer in writers.values_mut() {
            writer.flush()?;
        }

        debug!("Split {:?} into {} samples", input, order.len());
        Ok(order
            .into_iter()
            .map(|name| {
                let path = out_dir.join(format!("{}.fasta", name));
                Sample::new(name, path)
            })
            .collect())
    }
}

/// Counts k-mers in-process, keeping the profile in memory
#[derive(Debug, Clone, Copy)]
pub struct KmerHasher {
    k: usize,
}

impl KmerHasher {
    pub fn new(k: usize) -> Result<Self> {
        if k == 0 {
            return Err(Error::InvalidConfig("k-mer size must be positive".to_string()));
        }
        Ok(Self { k })
    }
}

impl Preprocessor for KmerHasher {
    fn process(&self, sample: &Sample) -> Result<ProcessedSample> {
        let mut seqs = Vec::new();
        for record in FastaReader::open(sample.path())? {
            seqs.push(record_sequence(&record?).into_owned());
        }
        let profile = KmerProfile::from_sequences(seqs, self.k);
        Ok(ProcessedSample::new(sample.name(), Representation::Kmers(profile)))
    }
}

/// Settings passed straight through to the external k-mer counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KmerConfig {
    pub kmer_size: usize,
    pub threads: usize,
    pub tables_count: usize,
    pub hash_size: String,
    /// Counter executable
    pub program: PathBuf,
}

impl Default for KmerConfig {
    fn default() -> Self {
        Self {
            kmer_size: 21,
            threads: 1,
            tables_count: 10,
            hash_size: "100M".to_string(),
            program: PathBuf::from("jellyfish"),
        }
    }
}

/// Runs the external counter (`count`, then `dump`) and refers to the dump
/// file. Steps whose output already exists are skipped.
#[derive(Debug, Clone)]
pub struct KmerCounter {
    config: KmerConfig,
    output_dir: PathBuf,
}

impl KmerCounter {
    pub fn new(config: KmerConfig, output_dir: impl Into<PathBuf>) -> Result<Self> {
        if config.kmer_size == 0 {
            return Err(Error::InvalidConfig("k-mer size must be positive".to_string()));
        }
        Ok(Self {
            config,
            output_dir: output_dir.into(),
        })
    }

    /// Per-k output directory below `data_dir`
    pub fn default_output_dir(data_dir: &Path, kmer_size: usize) -> PathBuf {
        data_dir.join(format!("kmers.{}", kmer_size))
    }

    fn command(&self) -> Command {
        Command::new(&self.config.program)
    }

    fn run(&self, cmd: &mut Command) -> Result<()> {
        debug!("Running {:?}", cmd);
        let status = cmd.status()?;
        if !status.success() {
            return Err(Error::Io(std::io::Error::other(format!(
                "{:?} exited with {}",
                self.config.program, status
            ))));
        }
        Ok(())
    }

    fn count(&self, input: &Path, output: &Path) -> Result<()> {
        self.run(
            self.command()
                .arg("count")
                .arg("-C")
                .arg("-m")
                .arg(self.config.kmer_size.to_string())
                .arg("-c")
                .arg(self.config.tables_count.to_string())
                .arg("-s")
                .arg(&self.config.hash_size)
                .arg("-t")
                .arg(self.config.threads.max(1).to_string())
                .arg("-o")
                .arg(output)
                .arg(input),
        )
    }

    fn dump(&self, index: &Path, output: &Path) -> Result<()> {
        self.run(self.command().arg("dump").arg(index).arg("-o").arg(output))
    }
}

impl Preprocessor for KmerCounter {
    fn process(&self, sample: &Sample) -> Result<ProcessedSample> {
        fs::create_dir_all(&self.output_dir)?;
        let jf = self.output_dir.join(format!("{}.jf", sample.name()));
        let counter = self.output_dir.join(format!("{}.counter", sample.name()));

        if !jf.exists() {
            info!("Counting {}-mers in {}", self.config.kmer_size, sample.name());
            self.count(sample.path(), &jf)?;
        }
        if !counter.exists() {
            self.dump(&jf, &counter)?;
        }

        Ok(ProcessedSample::new(sample.name(), Representation::KmerFile(counter)))
    }
}
