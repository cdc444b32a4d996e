// Integration tests for amquery
use amquery::{
    DistanceConfig, Error, Index, IndexConfig, KmerHasher, Metric, StorageConfig, StorageKind,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

const BASES: [char; 4] = ['A', 'C', 'G', 'T'];

fn random_seq(rng: &mut StdRng, len: usize) -> String {
    (0..len).map(|_| BASES[rng.random_range(0..4)]).collect()
}

/// Copy of `seq` with roughly `rate` of its positions replaced
fn mutate(rng: &mut StdRng, seq: &str, rate: f64) -> String {
    seq.chars()
        .map(|c| {
            if rng.random_bool(rate) {
                BASES[rng.random_range(0..4)]
            } else {
                c
            }
        })
        .collect()
}

/// QIIME-style FASTA. Each sample's genome is the previous one with about
/// 8% of positions redrawn, so samples further apart in `names` differ more.
fn write_fasta(path: &Path, names: &[&str], seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut genome = random_seq(&mut rng, 400);
    let mut out = String::new();
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            genome = mutate(&mut rng, &genome, 0.08);
        }
        for read in 0..5 {
            let start = read * 80;
            writeln!(out, ">{}_{} length=80", name, read).unwrap();
            writeln!(out, "{}", &genome[start..start + 80]).unwrap();
        }
    }
    fs::write(path, out).unwrap();
}

fn config(dir: &Path, kind: StorageKind, rebuild_on_add: bool) -> IndexConfig {
    IndexConfig {
        data_dir: dir.join("index"),
        storage: StorageConfig {
            kind,
            seed: Some(42),
            rebuild_on_add,
            coord_count: 4,
            ..StorageConfig::default()
        },
        ..IndexConfig::default()
    }
}

fn hasher() -> Box<KmerHasher> {
    Box::new(KmerHasher::new(5).unwrap())
}

fn built(dir: &Path, kind: StorageKind, rebuild_on_add: bool) -> Index {
    let input = dir.join("seqs.fna");
    write_fasta(&input, &["S0", "S1", "S2", "S3", "S4", "S5"], 1);
    let mut index = Index::init(config(dir, kind, rebuild_on_add), hasher()).unwrap();
    index.build(&[input]).unwrap();
    index
}

#[test]
fn test_build_and_find_known_sample() {
    let dir = tempfile::tempdir().unwrap();
    let index = built(dir.path(), StorageKind::VpTree, false);

    assert_eq!(index.labels(), ["S0", "S1", "S2", "S3", "S4", "S5"]);
    assert_eq!(index.storage().len(), 6);
    assert!(dir.path().join("index/samples/S3.fasta").exists());

    let (distances, labels) = index.find("S2", 3).unwrap();
    assert!(labels.len() >= 3);
    assert_eq!(distances.len(), labels.len());
    assert!(distances.windows(2).all(|w| w[0] <= w[1]));

    // Querying a known sample never changes the index
    assert_eq!(index.len(), 6);
    assert_eq!(index.find("S2", 3).unwrap(), (distances, labels));
}

#[test]
fn test_jsd_distances_are_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let index = built(dir.path(), StorageKind::Linear, false);

    for a in index.labels() {
        for b in index.labels() {
            let d = index.distance().distance(a, b).unwrap();
            assert!((0.0..=1.0).contains(&d));
            assert_eq!(d, index.distance().distance(b, a).unwrap());
        }
    }
    assert_eq!(index.distance().distance("S1", "S1").unwrap(), 0.0);
}

#[test]
fn test_exact_storage_ranks_similar_samples_first() {
    let dir = tempfile::tempdir().unwrap();
    let index = built(dir.path(), StorageKind::Linear, false);

    let (distances, labels) = index.find("S0", 2).unwrap();
    assert_eq!(labels, ["S0", "S1"]);
    assert_eq!(distances[0], 0.0);
}

#[test]
fn test_multiple_inputs_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.fna");
    let b = dir.path().join("b.fna");
    write_fasta(&a, &["A"], 2);
    write_fasta(&b, &["B"], 3);

    let mut index = Index::init(config(dir.path(), StorageKind::VpTree, false), hasher()).unwrap();
    assert!(matches!(index.build(&[a.clone(), b.clone()]), Err(Error::UnsupportedInput(2))));
    assert!(matches!(index.add(&[a, b], None), Err(Error::UnsupportedInput(2))));
    assert!(index.is_empty());
}

#[test]
fn test_unknown_sample() {
    let dir = tempfile::tempdir().unwrap();
    let index = built(dir.path(), StorageKind::VpTree, false);
    assert!(matches!(index.find("S99", 1), Err(Error::UnknownSample(_))));
}

#[test]
fn test_find_by_file() {
    let dir = tempfile::tempdir().unwrap();
    let index = built(dir.path(), StorageKind::VpTree, false);

    let query = dir.path().join("query.fna");
    write_fasta(&query, &["Q"], 1);
    let (_, labels) = index.find(query.to_str().unwrap(), index.len()).unwrap();

    assert_eq!(labels.len(), index.len());
    assert!(!labels.iter().any(|l| l == "Q"));
    assert!(!index.distance().contains("Q"));
}

#[test]
fn test_add_samples() {
    let dir = tempfile::tempdir().unwrap();
    let mut index = built(dir.path(), StorageKind::VpTree, true);

    index.add(&[], None).unwrap();
    assert_eq!(index.len(), 6);

    let more = dir.path().join("more.fna");
    write_fasta(&more, &["T0", "T1"], 9);
    index.add(&[more], None).unwrap();

    assert_eq!(index.len(), 8);
    assert_eq!(index.storage().len(), 8);
    assert_eq!(&index.labels()[6..], ["T0", "T1"]);
}

#[test]
fn test_add_without_rebuild_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut index = built(dir.path(), StorageKind::VpTree, false);

    let more = dir.path().join("more.fna");
    write_fasta(&more, &["T0"], 9);
    assert!(matches!(
        index.add(&[more], None),
        Err(Error::UnsupportedOperation(_))
    ));
    assert_eq!(index.len(), 6);
}

#[test]
fn test_biom_table_required() {
    let dir = tempfile::tempdir().unwrap();
    let mut index = built(dir.path(), StorageKind::VpTree, true);

    let more = dir.path().join("more.fna");
    write_fasta(&more, &["T0"], 9);
    let table = dir.path().join("more.biom");
    assert!(matches!(
        index.add(&[more], Some(&table)),
        Err(Error::InconsistentBiomState { .. })
    ));
    assert_eq!(index.len(), 6);
}

#[test]
fn test_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let index = built(dir.path(), StorageKind::VpTree, false);
    index.save().unwrap();

    let loaded = Index::load(config(dir.path(), StorageKind::VpTree, false), hasher()).unwrap();
    assert_eq!(loaded.labels(), index.labels());
    for label in index.labels() {
        for k in [1, 2, 4] {
            assert_eq!(loaded.find(label, k).unwrap(), index.find(label, k).unwrap());
        }
    }
}

#[test]
fn test_load_uses_saved_storage_kind() {
    let dir = tempfile::tempdir().unwrap();
    let index = built(dir.path(), StorageKind::Linear, false);
    index.save().unwrap();

    let loaded = Index::load(config(dir.path(), StorageKind::VpTree, false), hasher()).unwrap();
    assert_eq!(loaded.storage().kind(), StorageKind::Linear);
}

#[test]
fn test_load_missing_index() {
    let dir = tempfile::tempdir().unwrap();
    let res = Index::load(config(dir.path(), StorageKind::VpTree, false), hasher());
    assert!(matches!(res, Err(Error::Persistence(_))));
}

#[test]
fn test_precomputed_matrix_index() {
    let dir = tempfile::tempdir().unwrap();
    let matrix = dir.path().join("dist.tsv");
    fs::write(
        &matrix,
        "\tm1\tm2\tm3\tm4\n\
         m1\t0\t0.1\t0.5\t0.9\n\
         m2\t0.1\t0\t0.4\t0.8\n\
         m3\t0.5\t0.4\t0\t0.3\n\
         m4\t0.9\t0.8\t0.3\t0\n",
    )
    .unwrap();

    let mut cfg = config(dir.path(), StorageKind::VpTree, false);
    cfg.distance = DistanceConfig {
        metric: None,
        precompute: false,
    };
    let mut index = Index::init(cfg, hasher()).unwrap();
    index.build_from_matrix(&matrix, None).unwrap();
    assert_eq!(index.labels(), ["m1", "m2", "m3", "m4"]);

    let (distances, labels) = index.find("m4", 4).unwrap();
    assert_eq!(labels[0], "m4");
    assert_eq!(distances[0], 0.0);

    // Without a metric a new sample cannot be compared with the indexed ones
    let query = dir.path().join("query.fna");
    write_fasta(&query, &["Q"], 4);
    assert!(matches!(
        index.find(query.to_str().unwrap(), 2),
        Err(Error::NotComputable { .. })
    ));
}

#[test]
fn test_jaccard_metric() {
    let dir = tempfile::tempdir().unwrap();
    let input: PathBuf = dir.path().join("seqs.fna");
    write_fasta(&input, &["J0", "J1", "J2"], 5);

    let mut cfg = config(dir.path(), StorageKind::Linear, false);
    cfg.distance.metric = Some(Metric::Jaccard);
    let mut index = Index::init(cfg, hasher()).unwrap();
    index.build(&[input]).unwrap();

    let (distances, labels) = index.find("J0", 3).unwrap();
    assert_eq!(labels[0], "J0");
    assert!(distances.iter().all(|d| (0.0..=1.0).contains(d)));
}

#[test]
fn test_refine_is_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let mut index = built(dir.path(), StorageKind::VpTree, false);
    assert!(matches!(index.refine(), Err(Error::UnsupportedOperation(_))));
}
