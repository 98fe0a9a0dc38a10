//! Fixtures shared by unit tests.
use std::io::Cursor;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::genome::{Contig, ReferenceGenome};
use crate::index::generate::generate_tile_table;
use crate::index::{TileIndex, TileIndexBuilder};

pub fn random_sequence(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect()
}

pub fn genome(contigs: &[(&str, Vec<u8>)]) -> ReferenceGenome {
    ReferenceGenome::from_contigs(
        contigs
            .iter()
            .map(|(name, seq)| Contig {
                name: name.to_string(),
                sequence: seq.clone(),
            })
            .collect(),
    )
    .unwrap()
}

/// Tile index of `genome` built through the tile-table text format.
pub fn index_of(genome: &ReferenceGenome) -> TileIndex {
    let mut table = Vec::new();
    generate_tile_table(genome, 1_000, &mut table).unwrap();
    TileIndexBuilder::new()
        .workers(2)
        .build(Cursor::new(table))
        .unwrap()
}
