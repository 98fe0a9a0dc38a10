/// End-to-end tests of the tiledAligner binary
use assert_cmd::Command;
use predicates::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn random_sequence(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect()
}

/// Two random 20 kb contigs, wrapped at 60 columns
fn create_test_genome(dir: &TempDir) -> (PathBuf, Vec<Vec<u8>>) {
    let fasta_path = dir.path().join("genome.fa");
    let mut file = fs::File::create(&fasta_path).unwrap();
    let contigs = vec![random_sequence(20_000, 1), random_sequence(20_000, 2)];
    for (i, seq) in contigs.iter().enumerate() {
        writeln!(file, ">chr{}", i + 1).unwrap();
        for line in seq.chunks(60) {
            file.write_all(line).unwrap();
            writeln!(file).unwrap();
        }
    }
    (fasta_path, contigs)
}

/// `n` 150bp queries taken from alternating contigs every 173 bases
fn create_test_queries(dir: &TempDir, contigs: &[Vec<u8>], n: usize) -> PathBuf {
    let path = dir.path().join("queries.fa");
    let mut file = fs::File::create(&path).unwrap();
    for i in 0..n {
        let contig = &contigs[i % 2];
        let start = 100 + i * 173;
        writeln!(file, ">query{}", i + 1).unwrap();
        file.write_all(&contig[start..start + 150]).unwrap();
        writeln!(file).unwrap();
    }
    path
}

fn generate_index(dir: &TempDir, fasta_path: &Path) -> PathBuf {
    let tile_table = dir.path().join("tiles.tsv.gz");
    let tile_index = dir.path().join("tiles.tidx");

    Command::cargo_bin("tiledAligner")
        .unwrap()
        .arg("--runMode")
        .arg("tileGenerate")
        .arg("--genomeFastaFiles")
        .arg(fasta_path)
        .arg("--tileTable")
        .arg(&tile_table)
        .assert()
        .success()
        .stderr(predicate::str::contains("Tile generation complete!"));

    Command::cargo_bin("tiledAligner")
        .unwrap()
        .arg("--runMode")
        .arg("indexGenerate")
        .arg("--tileTable")
        .arg(&tile_table)
        .arg("--tileIndex")
        .arg(&tile_index)
        .arg("--runThreadN")
        .arg("2")
        .assert()
        .success()
        .stderr(predicate::str::contains("Index generation complete!"));

    assert!(tile_index.exists());
    tile_index
}

fn align(
    fasta_path: &Path,
    tile_index: &Path,
    queries: &Path,
    output_dir: &Path,
    threads: usize,
) -> assert_cmd::assert::Assert {
    Command::cargo_bin("tiledAligner")
        .unwrap()
        .arg("--runMode")
        .arg("alignReads")
        .arg("--genomeFastaFiles")
        .arg(fasta_path)
        .arg("--tileIndex")
        .arg(tile_index)
        .arg("--readFilesIn")
        .arg(queries)
        .arg("--runThreadN")
        .arg(threads.to_string())
        .arg("--outFileNamePrefix")
        .arg(format!("{}/", output_dir.display()))
        .assert()
}

#[test]
fn test_generate_and_align() {
    let tmpdir = TempDir::new().unwrap();
    let (fasta_path, contigs) = create_test_genome(&tmpdir);
    let tile_index = generate_index(&tmpdir, &fasta_path);
    let queries = create_test_queries(&tmpdir, &contigs, 40);

    let output_dir = tmpdir.path().join("output_1t");
    fs::create_dir_all(&output_dir).unwrap();
    align(&fasta_path, &tile_index, &queries, &output_dir, 1)
        .success()
        .stderr(predicate::str::contains("Number of input queries: 40"));

    let psl = fs::read_to_string(output_dir.join("Aligned.out.psl")).unwrap();
    let lines: Vec<&str> = psl.lines().collect();
    assert_eq!(lines.len(), 40);

    for (i, line) in lines.iter().enumerate() {
        let fields: Vec<&str> = line.split('\t').collect();
        assert_eq!(fields.len(), 21);
        assert_eq!(fields[0], "150");
        assert_eq!(fields[8], "+");
        assert_eq!(fields[9], format!("query{}", i + 1));
        assert_eq!(fields[13], format!("chr{}", i % 2 + 1));
        assert_eq!(fields[15], (100 + i * 173).to_string());
    }
}

#[test]
fn test_thread_count_consistency() {
    let tmpdir = TempDir::new().unwrap();
    let (fasta_path, contigs) = create_test_genome(&tmpdir);
    let tile_index = generate_index(&tmpdir, &fasta_path);
    let queries = create_test_queries(&tmpdir, &contigs, 60);

    let out_1t = tmpdir.path().join("output_1t");
    let out_4t = tmpdir.path().join("output_4t");
    fs::create_dir_all(&out_1t).unwrap();
    fs::create_dir_all(&out_4t).unwrap();

    align(&fasta_path, &tile_index, &queries, &out_1t, 1).success();
    align(&fasta_path, &tile_index, &queries, &out_4t, 4).success();

    let psl_1t = fs::read_to_string(out_1t.join("Aligned.out.psl")).unwrap();
    let psl_4t = fs::read_to_string(out_4t.join("Aligned.out.psl")).unwrap();
    assert_eq!(psl_1t, psl_4t);
}

#[test]
fn test_align_from_tile_table() {
    let tmpdir = TempDir::new().unwrap();
    let (fasta_path, contigs) = create_test_genome(&tmpdir);
    generate_index(&tmpdir, &fasta_path);
    let queries = create_test_queries(&tmpdir, &contigs, 4);

    Command::cargo_bin("tiledAligner")
        .unwrap()
        .arg("--genomeFastaFiles")
        .arg(&fasta_path)
        .arg("--tileTable")
        .arg(tmpdir.path().join("tiles.tsv.gz"))
        .arg("--readFilesIn")
        .arg(&queries)
        .arg("--readMapNumber")
        .arg("3")
        .arg("--outFileNamePrefix")
        .arg(format!("{}/run_", tmpdir.path().display()))
        .assert()
        .success()
        .stderr(predicate::str::contains("Number of input queries: 3"));

    let psl = fs::read_to_string(tmpdir.path().join("run_Aligned.out.psl")).unwrap();
    assert_eq!(psl.lines().count(), 3);
}

#[test]
fn test_missing_required_parameter() {
    Command::cargo_bin("tiledAligner")
        .unwrap()
        .arg("--runMode")
        .arg("tileGenerate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--genomeFastaFiles is required"));
}

#[test]
fn test_unknown_run_mode() {
    Command::cargo_bin("tiledAligner")
        .unwrap()
        .arg("--runMode")
        .arg("genomeGenerate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown runMode"));
}
