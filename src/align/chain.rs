/// Tile chaining: find runs of positionally consistent tile hits for a query.
///
/// The query and its reverse complement are cut into overlapping 13-base
/// tiles. Each tile offset resolves to nothing, a too-common marker, or the
/// ascending genome positions of that tile. A chain anchored at genome
/// position `p` for offset `i` keeps growing while offset `i + k` holds
/// `p + k`, and may hop over a single mismatching base by landing exactly one
/// tile length further on.
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use log::debug;

use crate::index::tile::{self, TILE_LENGTH};
use crate::index::{PackedPosition, TileIndex};

/// Chains must cover more than this many exact tiles to be recorded.
pub const MIN_CHAIN_TILES: u32 = 5;
/// Length of a single-base run that counts towards the homopolymer check.
pub const HOMOPOLYMER_RUN: usize = 23;
/// Fraction of the query a homopolymer may cover before the query is rejected.
pub const HOMOPOLYMER_MAX_FRACTION: f64 = 0.25;
/// Maximum distance between first and last tile for a split-read shortcut.
pub const SPLIT_SHORTCUT_MAX_SPAN: u64 = 500_000;

/// Quality of a chain: exact tiles matched and mismatches crossed.
///
/// Packed as `exact << 16 | mismatches`. The `Ord` impl ranks chains so that
/// the better chain compares greater: higher `exact - mismatches` first, then
/// more exact tiles, then fewer mismatches.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchQuality(u32);

impl MatchQuality {
    pub fn new(exact: u32, mismatches: u32) -> Self {
        Self((exact << 16) | (mismatches & 0xFFFF))
    }

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    /// Tiles credited to the chain (mismatch hops included).
    pub fn exact(self) -> u32 {
        self.0 >> 16
    }

    pub fn mismatches(self) -> u32 {
        self.0 & 0xFFFF
    }

    /// Bases spanned by the chain.
    pub fn bases(self) -> usize {
        self.exact() as usize + TILE_LENGTH - 1
    }

    /// Ranking score, `exact - mismatches`.
    pub fn net(self) -> i64 {
        self.exact() as i64 - self.mismatches() as i64
    }
}

impl Ord for MatchQuality {
    fn cmp(&self, other: &Self) -> Ordering {
        self.net()
            .cmp(&other.net())
            .then_with(|| self.exact().cmp(&other.exact()))
            .then_with(|| other.mismatches().cmp(&self.mismatches()))
    }
}

impl PartialOrd for MatchQuality {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for MatchQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q({}/{})", self.exact(), self.mismatches())
    }
}

/// One chain: its quality plus the anchoring position (with the query offset
/// of the first tile and the strand packed in).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chain {
    pub quality: MatchQuality,
    pub position: PackedPosition,
}

impl Chain {
    pub fn new(quality: MatchQuality, position: PackedPosition) -> Self {
        Self { quality, position }
    }

    pub fn is_reverse(&self) -> bool {
        self.position.is_reverse()
    }

    /// Genome coordinate of the first base of the chain.
    pub fn genome_start(&self) -> u64 {
        self.position.coordinate()
    }

    /// Offset of the chain within the strand-specific query.
    pub fn strand_offset(&self) -> usize {
        self.position.query_offset()
    }

    pub fn bases(&self) -> usize {
        self.quality.bases()
    }

    /// Query range on the strand the chain was found on, clipped to the query.
    pub fn strand_range(&self, query_len: usize) -> (usize, usize) {
        let start = self.strand_offset().min(query_len);
        (start, (start + self.bases()).min(query_len))
    }

    /// Query range in forward-query coordinates.
    pub fn forward_range(&self, query_len: usize) -> (usize, usize) {
        let (start, end) = self.strand_range(query_len);
        if self.is_reverse() {
            (query_len - end, query_len - start)
        } else {
            (start, end)
        }
    }
}

/// What the index knows about the tile at one query offset.
#[derive(Debug, Clone)]
enum TileHits<'a> {
    Absent,
    Common,
    Found(Cow<'a, [PackedPosition]>),
}

impl TileHits<'_> {
    fn contains(&self, coordinate: u64) -> bool {
        match self {
            TileHits::Found(positions) => positions
                .binary_search_by_key(&coordinate, |p| p.coordinate())
                .is_ok(),
            _ => false,
        }
    }

    fn positions(&self) -> &[PackedPosition] {
        match self {
            TileHits::Found(positions) => positions,
            _ => &[],
        }
    }
}

/// Tile lookups for one strand of the query.
struct StrandTiles<'a> {
    hits: Vec<TileHits<'a>>,
    reverse: bool,
}

impl<'a> StrandTiles<'a> {
    fn new(index: &'a TileIndex, seq: &[u8], reverse: bool) -> Self {
        let hits = if seq.len() < TILE_LENGTH {
            Vec::new()
        } else {
            seq.windows(TILE_LENGTH)
                .map(|window| {
                    let found: Cow<'a, [PackedPosition]> = match tile::encode(window) {
                        Some(key) => Cow::Borrowed(index.lookup(key)),
                        None => Cow::Owned(index.lookup_window(window)),
                    };
                    if found.is_empty() {
                        TileHits::Absent
                    } else if found[0].is_common() {
                        TileHits::Common
                    } else {
                        TileHits::Found(found)
                    }
                })
                .collect()
        };
        Self { hits, reverse }
    }

    fn common_offsets(&self) -> Vec<usize> {
        self.hits
            .iter()
            .enumerate()
            .filter(|(_, h)| matches!(h, TileHits::Common))
            .map(|(i, _)| i)
            .collect()
    }

    /// Too-common tiles at the very start of the strand.
    fn leading_common(&self) -> usize {
        self.hits
            .iter()
            .take_while(|h| matches!(h, TileHits::Common))
            .count()
    }

    /// Grow a chain for genome position `p` anchored at offset `start - 1`.
    fn extend(&self, p: u64, start: usize) -> MatchQuality {
        let n = self.hits.len();
        let mut tally: u32 = 1;
        let mut pending_common: u32 = 0;
        let mut mismatches: u32 = 0;
        let mut k = 0usize;

        while start + k < n {
            match &self.hits[start + k] {
                TileHits::Absent => {}
                TileHits::Common => pending_common += 1,
                found @ TileHits::Found(_) => {
                    if found.contains(p + k as u64 + 1) {
                        tally += 1 + pending_common;
                        pending_common = 0;
                    } else {
                        let jump = start + k + TILE_LENGTH;
                        if jump < n {
                            match &self.hits[jump] {
                                next @ TileHits::Found(_)
                                    if next.contains(p + k as u64 + TILE_LENGTH as u64 + 1) =>
                                {
                                    k += TILE_LENGTH + 1;
                                    tally += TILE_LENGTH as u32 + 1;
                                    mismatches += 1;
                                    continue;
                                }
                                TileHits::Common
                                    if jump + 1 < n
                                        && self.hits[jump + 1]
                                            .contains(p + k as u64 + TILE_LENGTH as u64 + 2) =>
                                {
                                    // The common tile after the mismatch is credited at the end.
                                    pending_common += 1;
                                    k += TILE_LENGTH + 2;
                                    tally += TILE_LENGTH as u32 + 1;
                                    mismatches += 1;
                                    continue;
                                }
                                _ => {}
                            }
                        }
                        break;
                    }
                }
            }
            k += 1;
        }

        if pending_common > 0 && tally > pending_common {
            tally += pending_common;
        }
        MatchQuality::new(tally, mismatches)
    }

    /// Record every chain longer than `MIN_CHAIN_TILES` that is not already
    /// explained by a longer chain starting earlier on the same diagonal.
    fn collect_chains(&self, chains: &mut BTreeMap<MatchQuality, Vec<PackedPosition>>) {
        let n = self.hits.len();
        let mut seen: HashMap<u64, u32> = HashMap::new();

        for i in 0..n.saturating_sub(1) {
            for &pos in self.hits[i].positions() {
                let p = pos.coordinate();
                let quality = self.extend(p, i + 1);
                let exact = quality.exact();
                if exact <= MIN_CHAIN_TILES {
                    continue;
                }

                let represented = (0..=i as u64).any(|z| {
                    p.checked_sub(z)
                        .and_then(|q| seen.get(&q))
                        .is_some_and(|&prev| u64::from(prev) >= u64::from(exact) + z)
                });
                if represented {
                    continue;
                }

                chains
                    .entry(quality)
                    .or_default()
                    .push(pos.with_query_offset(i).with_reverse(self.reverse));
                seen.insert(p, exact);
            }
        }
    }

    /// Positions where the first tile and the last tile sit exactly one query
    /// length apart.
    fn shortcuts(&self) -> Vec<PackedPosition> {
        let (Some(first), Some(last)) = (self.hits.first(), self.hits.last()) else {
            return Vec::new();
        };
        let span = (self.hits.len() - 1) as u64;
        first
            .positions()
            .iter()
            .filter(|p| last.contains(p.coordinate() + span))
            .map(|p| p.with_query_offset(0).with_reverse(self.reverse))
            .collect()
    }

    /// First-tile positions whose last tile appears further along within
    /// `max_span` bases, returned with the last-tile coordinate.
    fn split_shortcuts(&self, max_span: u64) -> Vec<(PackedPosition, u64)> {
        let (Some(first), Some(last)) = (self.hits.first(), self.hits.last()) else {
            return Vec::new();
        };
        let last_positions = last.positions();
        let mut out = Vec::new();
        for p in first.positions() {
            let start = p.coordinate();
            let idx = last_positions.partition_point(|q| q.coordinate() <= start);
            if let Some(q) = last_positions.get(idx) {
                if q.coordinate() - start <= max_span {
                    out.push((
                        p.with_query_offset(0).with_reverse(self.reverse),
                        q.coordinate(),
                    ));
                }
            }
        }
        out
    }
}

/// Per-strand facts the aligner needs beyond the chains themselves.
#[derive(Debug, Clone, Default)]
pub struct StrandSummary {
    /// Offsets whose tile is too common to index.
    pub common_offsets: Vec<usize>,
    /// Leading run of too-common tiles.
    pub leading_common: usize,
    /// Exact first-to-last tile shortcuts.
    pub shortcuts: Vec<PackedPosition>,
    /// Buffered shortcuts (first tile position, last tile coordinate), only
    /// computed when there is no exact shortcut.
    pub split_shortcuts: Vec<(PackedPosition, u64)>,
}

/// Everything the chain matcher learned about one query.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    query_len: usize,
    chains: BTreeMap<MatchQuality, Vec<PackedPosition>>,
    pub forward: StrandSummary,
    pub reverse: StrandSummary,
    perfect: Vec<PackedPosition>,
}

impl CandidateSet {
    pub fn query_len(&self) -> usize {
        self.query_len
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Number of distinct qualities.
    pub fn n_tiers(&self) -> usize {
        self.chains.len()
    }

    pub fn n_positions(&self) -> usize {
        self.chains.values().map(|v| v.len()).sum()
    }

    pub fn get(&self, quality: MatchQuality) -> &[PackedPosition] {
        self.chains.get(&quality).map(|v| &v[..]).unwrap_or(&[])
    }

    /// Qualities best first, each with its positions.
    pub fn ranked(&self) -> impl Iterator<Item = (MatchQuality, &[PackedPosition])> {
        self.chains.iter().rev().map(|(q, v)| (*q, &v[..]))
    }

    /// Chains best first.
    pub fn ranked_chains(&self) -> impl Iterator<Item = Chain> + '_ {
        self.ranked()
            .flat_map(|(q, positions)| positions.iter().map(move |&p| Chain::new(q, p)))
    }

    pub fn best(&self) -> Option<Chain> {
        self.ranked_chains().next()
    }

    /// At most `cap` chains drawn from the best `tiers` qualities.
    pub fn top(&self, cap: usize, tiers: usize) -> Vec<Chain> {
        self.ranked()
            .take(tiers)
            .flat_map(|(q, positions)| positions.iter().map(move |&p| Chain::new(q, p)))
            .take(cap)
            .collect()
    }

    /// Largest exact tile count over all chains, with the number of positions
    /// that reach it.
    pub fn max_exact(&self) -> Option<(u32, usize)> {
        let max = self.chains.keys().map(|q| q.exact()).max()?;
        let occurrences = self
            .chains
            .iter()
            .filter(|(q, _)| q.exact() == max)
            .map(|(_, v)| v.len())
            .sum();
        Some((max, occurrences))
    }

    /// Chains spanning the whole query on the tiles (modulo leading
    /// too-common tiles) with no mismatch.
    pub fn perfect_matches(&self) -> &[PackedPosition] {
        &self.perfect
    }

    pub fn strand(&self, reverse: bool) -> &StrandSummary {
        if reverse {
            &self.reverse
        } else {
            &self.forward
        }
    }

    /// Too-common offsets on both strands.
    pub fn n_common(&self) -> usize {
        self.forward
            .common_offsets
            .len()
            .max(self.reverse.common_offsets.len())
    }
}

/// Finds candidate chains for queries against a shared, read-only index.
#[derive(Debug, Clone, Copy)]
pub struct ChainMatcher<'a> {
    index: &'a TileIndex,
}

impl<'a> ChainMatcher<'a> {
    pub fn new(index: &'a TileIndex) -> Self {
        Self { index }
    }

    /// Tile both strands of `query` and collect ranked chains.
    ///
    /// Queries shorter than a tile yield an empty set.
    pub fn find_candidates(&self, query: &[u8]) -> CandidateSet {
        let query_len = query.len();
        if query_len < TILE_LENGTH {
            return CandidateSet {
                query_len,
                ..Default::default()
            };
        }
        let rc = tile::reverse_complement(query);
        let fwd_tiles = StrandTiles::new(self.index, query, false);
        let rev_tiles = StrandTiles::new(self.index, &rc, true);

        let mut chains = BTreeMap::new();
        fwd_tiles.collect_chains(&mut chains);
        rev_tiles.collect_chains(&mut chains);

        let forward = summarize(&fwd_tiles);
        let reverse = summarize(&rev_tiles);

        let n_tiles = fwd_tiles.hits.len();
        let half = n_tiles / 2;
        let mut perfect = Vec::new();
        for (summary, is_rc) in [(&forward, false), (&reverse, true)] {
            if summary.leading_common >= half {
                continue;
            }
            let key = MatchQuality::new((n_tiles - summary.leading_common) as u32, 0);
            if let Some(positions) = chains.get(&key) {
                perfect.extend(positions.iter().filter(|p| p.is_reverse() == is_rc));
            }
        }

        debug!(
            "chains: {} qualities, {} positions, {} perfect, common {}+/{}-",
            chains.len(),
            chains.values().map(Vec::len).sum::<usize>(),
            perfect.len(),
            forward.common_offsets.len(),
            reverse.common_offsets.len()
        );

        CandidateSet {
            query_len,
            chains,
            forward,
            reverse,
            perfect,
        }
    }
}

fn summarize(tiles: &StrandTiles<'_>) -> StrandSummary {
    let shortcuts = tiles.shortcuts();
    let split_shortcuts = if shortcuts.is_empty() {
        tiles.split_shortcuts(SPLIT_SHORTCUT_MAX_SPAN)
    } else {
        Vec::new()
    };
    StrandSummary {
        common_offsets: tiles.common_offsets(),
        leading_common: tiles.leading_common(),
        shortcuts,
        split_shortcuts,
    }
}

/// True when a 23-base single-nucleotide run (counting overlapping
/// occurrences) covers more than a quarter of the sequence.
pub fn is_homopolymer_dominated(seq: &[u8]) -> bool {
    if seq.is_empty() {
        return false;
    }
    [b'A', b'C', b'G', b'T'].iter().any(|&base| {
        let mut in_run = 0usize;
        let mut occurrences = 0usize;
        for &b in seq {
            if b.to_ascii_uppercase() == base {
                in_run += 1;
                if in_run >= HOMOPOLYMER_RUN {
                    occurrences += 1;
                }
            } else {
                in_run = 0;
            }
        }
        if occurrences == 0 {
            return false;
        }
        let tally = HOMOPOLYMER_RUN + occurrences - 1;
        tally as f64 / seq.len() as f64 > HOMOPOLYMER_MAX_FRACTION
    })
}

/// Number of distinct bases from {A,C,G,T} present in `seq`.
pub fn sequence_complexity(seq: &[u8]) -> usize {
    let mut seen = [false; 4];
    for &b in seq {
        if let Some(code) = tile::encode_base(b) {
            seen[code as usize] = true;
        }
    }
    seen.iter().filter(|&&s| s).count()
}
