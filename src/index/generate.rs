//! Tile-table generation from a reference genome.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;

use crate::error::Error;
use crate::genome::ReferenceGenome;
use crate::index::tile::{self, TILE_LENGTH};

/// Genome positions collected per key-range pass. Each one costs 12 bytes, so
/// a pass holds about 3 GB at most.
const POSITIONS_PER_PASS: u64 = 1 << 28;

/// Write the tile table for `genome` to `writer`.
///
/// Every 13-base window over {A,C,G,T} contributes its linear forward-strand
/// position. Tiles seen more than `common_cutoff` times are written as
/// `C<count>`. Lines come out in ascending tile order. Returns the number of
/// lines written.
///
/// The key space is split into prefix buckets so that only one bucket's
/// positions are held at a time. Small genomes take a single pass.
pub fn generate_tile_table<W: Write>(
    genome: &ReferenceGenome,
    common_cutoff: usize,
    writer: &mut W,
) -> Result<usize, Error> {
    let passes = genome.total_length().div_ceil(POSITIONS_PER_PASS).max(1);
    generate_tile_table_in_passes(genome, common_cutoff, passes as u32, writer)
}

/// [`generate_tile_table`] with an explicit number of key-range passes.
pub fn generate_tile_table_in_passes<W: Write>(
    genome: &ReferenceGenome,
    common_cutoff: usize,
    passes: u32,
    writer: &mut W,
) -> Result<usize, Error> {
    let passes = passes.clamp(1, tile::TILE_KEY_SPACE);
    let bucket = tile::TILE_KEY_SPACE.div_ceil(passes);
    if passes > 1 {
        info!("Generating tile table in {passes} passes");
    }

    let mut n_lines = 0usize;
    let mut n_common = 0usize;
    let mut lo = 0u32;
    while lo < tile::TILE_KEY_SPACE {
        let hi = lo.saturating_add(bucket).min(tile::TILE_KEY_SPACE);
        let mut hits = collect_tiles(genome, lo..hi);
        // Positions are pushed in genome order, so a stable sort keeps them
        // ascending within a key.
        hits.sort_by_key(|&(key, _)| key);

        for group in hits.chunk_by(|a, b| a.0 == b.0) {
            write_line(writer, group, common_cutoff, &mut n_common)?;
            n_lines += 1;
        }
        lo = hi;
    }
    writer.flush()?;

    info!(
        "Generated tile table: {} tiles ({} too common at cutoff {})",
        n_lines, n_common, common_cutoff
    );
    Ok(n_lines)
}

/// `(key, linear position)` for every valid window whose key is in `keys`.
fn collect_tiles(genome: &ReferenceGenome, keys: std::ops::Range<u32>) -> Vec<(u32, u64)> {
    let mask = tile::TILE_KEY_SPACE - 1;
    let mut hits = Vec::new();

    for (idx, contig) in genome.contigs().iter().enumerate() {
        let start = genome.contig_start(idx);
        let mut key: u32 = 0;
        // Bases since the last non-ACGT symbol.
        let mut valid: usize = 0;

        for (offset, &base) in contig.sequence.iter().enumerate() {
            match tile::encode_base(base) {
                Some(code) => {
                    key = ((key << 2) | code) & mask;
                    valid += 1;
                }
                None => {
                    valid = 0;
                    continue;
                }
            }
            if valid >= TILE_LENGTH && keys.contains(&key) {
                hits.push((key, start + (offset + 1 - TILE_LENGTH) as u64));
            }
        }
    }
    hits
}

fn write_line<W: Write>(
    writer: &mut W,
    group: &[(u32, u64)],
    common_cutoff: usize,
    n_common: &mut usize,
) -> Result<(), Error> {
    writer.write_all(&tile::decode(group[0].0))?;
    writer.write_all(b"\t")?;
    if group.len() > common_cutoff {
        write!(writer, "C{}", group.len())?;
        *n_common += 1;
    } else {
        for (i, (_, p)) in group.iter().enumerate() {
            if i > 0 {
                writer.write_all(b",")?;
            }
            write!(writer, "{p}")?;
        }
    }
    writer.write_all(b"\n")?;
    Ok(())
}

/// Write the tile table to `path`, gzip-compressed when the name ends `.gz`.
pub fn generate_tile_table_file(
    genome: &ReferenceGenome,
    common_cutoff: usize,
    path: &Path,
) -> Result<usize, Error> {
    info!("Writing tile table to {}...", path.display());
    let file = File::create(path).map_err(|e| Error::io(e, path))?;
    if path.to_string_lossy().ends_with(".gz") {
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        let n = generate_tile_table(genome, common_cutoff, &mut encoder)
            .map_err(|e| with_path(e, path))?;
        encoder.finish().map_err(|e| Error::io(e, path))?;
        Ok(n)
    } else {
        let mut writer = BufWriter::new(file);
        generate_tile_table(genome, common_cutoff, &mut writer).map_err(|e| with_path(e, path))
    }
}

fn with_path(err: Error, path: &Path) -> Error {
    match err {
        Error::Io { source, .. } => Error::io(source, path),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::Contig;
    use crate::index::TileIndexBuilder;
    use std::io::Cursor;

    fn genome(seqs: &[(&str, &[u8])]) -> ReferenceGenome {
        ReferenceGenome::from_contigs(
            seqs.iter()
                .map(|(name, seq)| Contig {
                    name: name.to_string(),
                    sequence: seq.to_vec(),
                })
                .collect(),
        )
        .unwrap()
    }

    fn table_of(g: &ReferenceGenome, cutoff: usize) -> String {
        let mut out = Vec::new();
        generate_tile_table(g, cutoff, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_windows_and_positions() {
        let g = genome(&[("chr1", b"ACGTACGTACGTACG")]);
        let table = table_of(&g, 100);
        assert_eq!(
            table,
            "ACGTACGTACGTA\t0\nCGTACGTACGTAC\t1\nGTACGTACGTACG\t2\n"
        );
    }

    #[test]
    fn test_n_breaks_windows() {
        let g = genome(&[("chr1", b"AAAAAAAAAAAANCCCCCCCCCCCCC")]);
        let table = table_of(&g, 100);
        assert_eq!(table, "CCCCCCCCCCCCC\t13\n");
    }

    #[test]
    fn test_positions_are_linear_across_contigs() {
        let g = genome(&[("chr1", b"GATTACAGATTAC"), ("chr2", b"GATTACAGATTAC")]);
        let table = table_of(&g, 100);
        assert_eq!(table, "GATTACAGATTAC\t0,13\n");
    }

    #[test]
    fn test_common_cutoff() {
        let g = genome(&[("chr1", &[b'T'; 20])]);
        let table = table_of(&g, 5);
        assert_eq!(table, "TTTTTTTTTTTTT\tC8\n");
    }

    #[test]
    fn test_generated_table_builds() {
        let g = genome(&[("chr1", b"ACGTTGCAAGGCTTACCGATGCATCGGAT")]);
        let table = table_of(&g, 100);
        let index = TileIndexBuilder::new()
            .workers(2)
            .build(Cursor::new(table.into_bytes()))
            .unwrap();
        assert_eq!(index.len(), 29 - 12);
        let hits = index.lookup(tile::encode(b"GCAAGGCTTACCG").unwrap());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].coordinate(), 5);
    }

    #[test]
    fn test_passes_match_single_pass() {
        let seq = crate::testutil::random_sequence(5_000, 7);
        let g = genome(&[("chr1", seq.as_slice()), ("chr2", b"ACGTNACGTACGTACGTACGTT")]);
        let mut single = Vec::new();
        let n = generate_tile_table_in_passes(&g, 3, 1, &mut single).unwrap();
        for passes in [2, 5, 64, 1_000] {
            let mut split = Vec::new();
            let m = generate_tile_table_in_passes(&g, 3, passes, &mut split).unwrap();
            assert_eq!(m, n);
            assert_eq!(split, single, "{passes} passes");
        }
    }

    #[test]
    fn test_gzip_file_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiles.txt.gz");
        let g = genome(&[("chr1", b"ACGTACGTACGTACG")]);
        let n = generate_tile_table_file(&g, 10, &path).unwrap();
        assert_eq!(n, 3);
        let index = TileIndexBuilder::new().build_from_path(&path).unwrap();
        assert_eq!(index.len(), 3);
    }
}
