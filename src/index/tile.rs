/// Tile codec: 13-base windows packed 2 bits per base.
///
/// Base order is A=0, C=1, G=2, T=3 with the first base in the most
/// significant position, so numeric key order matches lexicographic tile order.

/// Number of bases in a tile.
pub const TILE_LENGTH: usize = 13;

/// Number of distinct tile keys (4^13).
pub const TILE_KEY_SPACE: u32 = 1 << (2 * TILE_LENGTH);

const DECODE: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// 2-bit code for a nucleotide, or `None` for anything outside {A,C,G,T}.
#[inline]
pub fn encode_base(base: u8) -> Option<u32> {
    match base {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}

/// Pack a tile into its integer key.
///
/// Returns `None` if the window is not exactly `TILE_LENGTH` long or contains
/// a character outside {A,C,G,T}.
pub fn encode(tile: &[u8]) -> Option<u32> {
    if tile.len() != TILE_LENGTH {
        return None;
    }
    tile.iter()
        .try_fold(0u32, |key, &b| encode_base(b).map(|code| (key << 2) | code))
}

/// Unpack a key into its tile.
pub fn decode(key: u32) -> [u8; TILE_LENGTH] {
    let mut tile = [b'A'; TILE_LENGTH];
    for (i, slot) in tile.iter_mut().enumerate() {
        let shift = 2 * (TILE_LENGTH - 1 - i);
        *slot = DECODE[((key >> shift) & 0b11) as usize];
    }
    tile
}

/// Concrete substitutions for a tile holding exactly one `N`.
///
/// Tiles without an `N`, or with more than one, yield nothing.
pub fn expand_ambiguous(tile: &[u8]) -> Vec<Vec<u8>> {
    let is_n = |b: &u8| *b == b'N' || *b == b'n';
    let Some(n_pos) = tile.iter().position(is_n) else {
        return Vec::new();
    };
    if tile[n_pos + 1..].iter().any(is_n) {
        return Vec::new();
    }

    DECODE
        .iter()
        .map(|&base| {
            let mut concrete = tile.to_vec();
            concrete[n_pos] = base;
            concrete
        })
        .collect()
}

/// Complement of a single base; anything that is not A/C/G/T becomes `N`.
#[inline]
pub fn complement_base(base: u8) -> u8 {
    match base {
        b'A' | b'a' => b'T',
        b'C' | b'c' => b'G',
        b'G' | b'g' => b'C',
        b'T' | b't' => b'A',
        _ => b'N',
    }
}

/// Reverse complement of a sequence.
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement_base(b)).collect()
}

/// Number of ambiguous (`N`) bases in a sequence.
pub fn count_ambiguous(seq: &[u8]) -> usize {
    seq.iter().filter(|&&b| b == b'N' || b == b'n').count()
}
