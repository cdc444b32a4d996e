use amquery::{create_preprocessor, Index, IndexConfig, Neighbor, StorageKind};
use amquery_storage::Manifest;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Similarity search over biological samples
#[derive(Parser, Debug)]
#[command(name = "amquery")]
#[command(about = "Similarity search over biological samples", long_about = None)]
struct Args {
    /// Path to the index directory (overrides the config file)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// JSON index configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a new index from one FASTA file or sample directory
    Build {
        input: Vec<PathBuf>,

        /// Build from a tab-separated distance matrix instead
        #[arg(long, conflicts_with = "input")]
        matrix: Option<PathBuf>,

        /// Reference samples, one label per line
        #[arg(long)]
        coords: Option<PathBuf>,

        #[arg(long)]
        storage: Option<StorageKind>,

        #[arg(short, long)]
        kmer_size: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Add the samples of one input to an existing index
    Add {
        input: Vec<PathBuf>,

        /// BIOM table to merge into the master table
        #[arg(long)]
        biom: Option<PathBuf>,
    },

    /// Nearest samples to a sample name or a sample file
    Find {
        query: String,

        #[arg(short, default_value_t = 5)]
        k: usize,

        /// Print JSON instead of tab-separated lines
        #[arg(long)]
        json: bool,
    },

    /// Describe the saved index
    Info,
}

fn read_config(path: Option<&Path>) -> anyhow::Result<IndexConfig> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {:?}", path))
        }
        None => Ok(IndexConfig::default()),
    }
}

fn load_index(config: IndexConfig) -> anyhow::Result<Index> {
    let preprocessor = create_preprocessor(&config)?;
    Ok(Index::load(config, preprocessor)?)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = read_config(args.config.as_deref())?;
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    info!("Index directory: {:?}", config.data_dir);

    match args.command {
        Command::Build {
            input,
            matrix,
            coords,
            storage,
            kmer_size,
            seed,
        } => {
            if let Some(kind) = storage {
                config.storage.kind = kind;
            }
            if let Some(k) = kmer_size {
                config.kmer.kmer_size = k;
            }
            if seed.is_some() {
                config.storage.seed = seed;
            }

            let index = match matrix {
                Some(matrix) => {
                    let mut index = Index::init(config.clone(), create_preprocessor(&config)?)?;
                    index.build_from_matrix(&matrix, coords.as_deref())?;
                    index
                }
                None => {
                    if coords.is_some() {
                        config.storage.coords_file = coords;
                    }
                    let mut index = Index::init(config.clone(), create_preprocessor(&config)?)?;
                    index.build(&input)?;
                    index
                }
            };
            index.save()?;
            info!("Indexed {} samples", index.len());
        }

        Command::Add { input, biom } => {
            let mut index = load_index(config)?;
            index.add(&input, biom.as_deref())?;
            index.save()?;
        }

        Command::Find { query, k, json } => {
            let index = load_index(config)?;
            let (mut distances, mut labels) = index.find(&query, k)?;
            distances.truncate(k);
            labels.truncate(k);

            if json {
                let neighbors: Vec<Neighbor> = distances
                    .into_iter()
                    .zip(labels)
                    .map(|(d, label)| Neighbor::new(d, label))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&neighbors)?);
            } else {
                for (d, label) in distances.iter().zip(&labels) {
                    println!("{}\t{:.6}", label, d);
                }
            }
        }

        Command::Info => {
            let manifest = Manifest::read(&config.data_dir)?;
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }
    }

    Ok(())
}
