// Split/compound assembly for queries spanning two loci

use log::debug;

use crate::align::chain::{CandidateSet, Chain};
use crate::align::record::{
    is_single_locus, merge_records, AlignmentRecord, Block, Strand,
};
use crate::chimeric::segment::SplitSegment;
use crate::error::Error;
use crate::genome::{CoordinateTranslator, ReferenceSource};
use crate::index::tile::{count_ambiguous, reverse_complement, TILE_LENGTH};
use crate::index::PackedPosition;

/// Best-chain coverage range that triggers split assembly.
const TRIGGER_MIN_COVERAGE: f64 = 0.5;
const TRIGGER_MAX_COVERAGE: f64 = 0.7;
/// Too-common tiles allowed, as a fraction of the query length.
const MAX_COMMON_FRACTION: f64 = 0.1;
const MAX_AMBIGUOUS_BASES: usize = 5;
/// Combined segment coverage required to accept a pair.
const MIN_PAIR_COVERAGE: f64 = 0.9;
/// Query overlap tolerated between two segments (trimmed off the longer one).
const MAX_SEGMENT_OVERLAP: usize = TILE_LENGTH - 1;

/// Result of a split-assembly attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SplitOutcome {
    /// A verified pair, as one two-block record or two single-block records.
    Records(Vec<AlignmentRecord>),
    /// Triggered but no pair passed; these chains should be aligned one by one.
    FallThrough(Vec<Chain>),
    /// The query does not look like a split.
    NotApplicable,
}

/// Pairs up independent chains of a query that spans a breakpoint.
pub struct SplitAssembler<'a> {
    reference: &'a dyn ReferenceSource,
    translator: &'a dyn CoordinateTranslator,
    candidate_max: usize,
    tier_max: usize,
}

impl<'a> SplitAssembler<'a> {
    pub fn new(
        reference: &'a dyn ReferenceSource,
        translator: &'a dyn CoordinateTranslator,
    ) -> Self {
        Self {
            reference,
            translator,
            candidate_max: 20,
            tier_max: 3,
        }
    }

    /// Limit the partner search to `candidate_max` chains from the best
    /// `tier_max` qualities.
    pub fn with_limits(mut self, candidate_max: usize, tier_max: usize) -> Self {
        self.candidate_max = candidate_max;
        self.tier_max = tier_max;
        self
    }

    /// Try to explain `query` as two verified chains.
    ///
    /// # Arguments
    /// * `name` - Query name for the emitted records
    /// * `query` - Forward query sequence
    /// * `candidates` - Chains found for the query
    pub fn assemble(
        &self,
        name: &str,
        query: &[u8],
        candidates: &CandidateSet,
    ) -> Result<SplitOutcome, Error> {
        let len = query.len();
        let Some(best) = candidates.best() else {
            return Ok(SplitOutcome::NotApplicable);
        };
        let coverage = best.bases().min(len) as f64 / len as f64;
        if !(TRIGGER_MIN_COVERAGE..=TRIGGER_MAX_COVERAGE).contains(&coverage)
            || candidates.n_common() as f64 > MAX_COMMON_FRACTION * len as f64
            || count_ambiguous(query) > MAX_AMBIGUOUS_BASES
        {
            return Ok(SplitOutcome::NotApplicable);
        }

        let rc = reverse_complement(query);
        let top = candidates.top(self.candidate_max, self.tier_max);
        let Some(first) = self.verify(&best, query, &rc)? else {
            debug!("{name}: best chain {:?} failed verification", best.quality);
            return Ok(SplitOutcome::FallThrough(top));
        };

        for partner in top.iter().filter(|c| **c != best) {
            let Some(second) = self.verify(partner, query, &rc)? else {
                continue;
            };
            if let Some((left, right)) = pair_segments(first.clone(), second, len) {
                let records = emit(name, len, &left, &right);
                if !records.is_empty() {
                    debug!(
                        "{name}: split {}:{} + {}:{} -> {} record(s)",
                        left.contig,
                        left.target_start,
                        right.contig,
                        right.target_start,
                        records.len()
                    );
                    return Ok(SplitOutcome::Records(records));
                }
            }
        }
        Ok(SplitOutcome::FallThrough(top))
    }

    /// Check a chain against the reference, allowing no more mismatching
    /// bases than the chain crossed.
    fn verify(
        &self,
        chain: &Chain,
        query: &[u8],
        rc: &[u8],
    ) -> Result<Option<SplitSegment>, Error> {
        let strand_seq = if chain.is_reverse() { rc } else { query };
        let (start, end) = chain.strand_range(query.len());
        let segment = &strand_seq[start..end];

        let Some(pos) = self.translator.to_chr_position(chain.position) else {
            return Ok(None);
        };
        if pos.offset + segment.len() as u64 > pos.contig_length {
            return Ok(None);
        }
        let reference =
            self.reference
                .subsequence(&pos.contig, pos.offset, pos.offset + segment.len() as u64)?;
        if reference.len() != segment.len() {
            return Ok(None);
        }
        let mismatches = reference
            .iter()
            .zip(segment)
            .filter(|(r, q)| !r.eq_ignore_ascii_case(q))
            .count();
        if mismatches > chain.quality.mismatches() as usize {
            return Ok(None);
        }

        Ok(Some(SplitSegment {
            chain: *chain,
            contig: pos.contig,
            contig_length: pos.contig_length,
            target_start: pos.offset,
            strand_start: start,
            len: segment.len(),
            mismatches,
        }))
    }

    /// Look for a deletion between the first and last tile of a query.
    ///
    /// The reference from the first tile to the end of the last tile is
    /// matched greedily from both ends; the record is kept when the two
    /// exact blocks cover at least 90% of the query without overlapping on
    /// the reference.
    pub fn investigate_split_shortcut(
        &self,
        name: &str,
        query: &[u8],
        first: PackedPosition,
        last_coordinate: u64,
    ) -> Result<Option<AlignmentRecord>, Error> {
        let reverse = first.is_reverse();
        let Some(start) = self.translator.to_chr_position(first) else {
            return Ok(None);
        };
        let Some(end) = self
            .translator
            .to_chr_position(PackedPosition::new(last_coordinate))
        else {
            return Ok(None);
        };
        if start.contig != end.contig || end.offset < start.offset {
            return Ok(None);
        }

        let strand_seq = if reverse {
            reverse_complement(query)
        } else {
            query.to_vec()
        };
        let len = strand_seq.len();
        let reference = self.reference.subsequence(
            &start.contig,
            start.offset,
            end.offset + TILE_LENGTH as u64,
        )?;

        let prefix = strand_seq
            .iter()
            .zip(&reference)
            .take_while(|(q, r)| q.eq_ignore_ascii_case(r))
            .count();
        let strand = Strand::from_reverse(reverse);
        if prefix == len {
            return Ok(AlignmentRecord::exact_match(
                name,
                query,
                strand,
                &start.contig,
                start.contig_length,
                start.offset,
            ));
        }
        let suffix = strand_seq
            .iter()
            .rev()
            .zip(reference.iter().rev())
            .take_while(|(q, r)| q.eq_ignore_ascii_case(r))
            .count()
            .min(len - prefix);

        if prefix == 0
            || suffix == 0
            || ((prefix + suffix) as f64) < MIN_PAIR_COVERAGE * len as f64
            || prefix + suffix > reference.len()
        {
            return Ok(None);
        }

        let blocks = [
            Block::new(0, start.offset, prefix as u64),
            Block::new(
                (len - suffix) as u64,
                start.offset + (reference.len() - suffix) as u64,
                suffix as u64,
            ),
        ];
        Ok(AlignmentRecord::from_blocks(
            name,
            len as u64,
            strand,
            &start.contig,
            start.contig_length,
            &blocks,
            0,
            count_ambiguous(query) as u64,
        ))
    }
}

/// Order two segments along the query and trim any small overlap off the
/// longer one. `None` when they overlap too much or cover too little.
fn pair_segments(
    a: SplitSegment,
    b: SplitSegment,
    query_len: usize,
) -> Option<(SplitSegment, SplitSegment)> {
    let (mut left, mut right) = if a.forward_range(query_len).0 <= b.forward_range(query_len).0 {
        (a, b)
    } else {
        (b, a)
    };
    let left_end = left.forward_range(query_len).1;
    let right_start = right.forward_range(query_len).0;
    let overlap = left_end.saturating_sub(right_start);
    if overlap > MAX_SEGMENT_OVERLAP {
        return None;
    }
    if overlap > 0 {
        // The overlap sits at the forward end of `left` and the forward start
        // of `right`; on the reverse strand those are the opposite ends.
        if left.len >= right.len {
            if left.chain.is_reverse() {
                left.trim_front(overlap);
            } else {
                left.trim_back(overlap);
            }
        } else if right.chain.is_reverse() {
            right.trim_back(overlap);
        } else {
            right.trim_front(overlap);
        }
    }
    if ((left.len + right.len) as f64) < MIN_PAIR_COVERAGE * query_len as f64 {
        return None;
    }
    Some((left, right))
}

fn emit(
    name: &str,
    query_len: usize,
    left: &SplitSegment,
    right: &SplitSegment,
) -> Vec<AlignmentRecord> {
    let (Some(a), Some(b)) = (
        left.to_record(name, query_len),
        right.to_record(name, query_len),
    ) else {
        return Vec::new();
    };
    if is_single_locus(&a, &b) {
        if let Some(merged) = merge_records(&[a.clone(), b.clone()]) {
            return vec![merged];
        }
    }
    vec![a, b]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::chain::ChainMatcher;
    use crate::genome::ReferenceGenome;
    use crate::index::TileIndex;
    use crate::testutil::{genome, index_of, random_sequence};

    fn fixture() -> (ReferenceGenome, TileIndex) {
        let g = genome(&[
            ("chr1", random_sequence(20_000, 1)),
            ("chr2", random_sequence(20_000, 2)),
        ]);
        let index = index_of(&g);
        (g, index)
    }

    fn contig(g: &ReferenceGenome, i: usize) -> &[u8] {
        &g.contigs()[i].sequence
    }

    #[test]
    fn test_two_contigs_give_two_records() {
        let (g, index) = fixture();
        let mut query = contig(&g, 0)[1_000..1_075].to_vec();
        query.extend_from_slice(&contig(&g, 1)[5_000..5_075]);
        let set = ChainMatcher::new(&index).find_candidates(&query);

        let outcome = SplitAssembler::new(&g, &g)
            .assemble("q", &query, &set)
            .unwrap();
        let SplitOutcome::Records(records) = outcome else {
            panic!("expected records, got {outcome:?}");
        };
        assert_eq!(records.len(), 2);
        let total: u64 = records.iter().map(|r| r.matches).sum();
        assert_eq!(total, 150);
        assert!(records.iter().any(|r| r.t_name == "chr1" && r.t_start == 1_000));
        assert!(records.iter().any(|r| r.t_name == "chr2" && r.t_start == 5_000));
    }

    #[test]
    fn test_same_contig_gives_one_two_block_record() {
        let (g, index) = fixture();
        let mut query = contig(&g, 0)[1_000..1_075].to_vec();
        query.extend_from_slice(&contig(&g, 0)[11_000..11_075]);
        let set = ChainMatcher::new(&index).find_candidates(&query);

        let outcome = SplitAssembler::new(&g, &g)
            .assemble("q", &query, &set)
            .unwrap();
        let SplitOutcome::Records(records) = outcome else {
            panic!("expected records, got {outcome:?}");
        };
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.block_count(), 2);
        assert_eq!(r.matches, 150);
        assert_eq!((r.q_start, r.q_end), (0, 150));
        assert_eq!(r.t_start, 1_000);
        assert_eq!(r.t_end, 11_075);
        assert_eq!(r.t_gap_count, 1);
    }

    #[test]
    fn test_full_length_match_is_not_split() {
        let (g, index) = fixture();
        let query = contig(&g, 0)[3_000..3_150].to_vec();
        let set = ChainMatcher::new(&index).find_candidates(&query);
        let outcome = SplitAssembler::new(&g, &g)
            .assemble("q", &query, &set)
            .unwrap();
        assert_eq!(outcome, SplitOutcome::NotApplicable);
    }

    #[test]
    fn test_unmatched_half_falls_through() {
        let (g, index) = fixture();
        let mut query = contig(&g, 0)[2_000..2_090].to_vec();
        query.extend_from_slice(&random_sequence(60, 99));
        let set = ChainMatcher::new(&index).find_candidates(&query);
        let outcome = SplitAssembler::new(&g, &g)
            .assemble("q", &query, &set)
            .unwrap();
        let SplitOutcome::FallThrough(chains) = outcome else {
            panic!("expected fall-through, got {outcome:?}");
        };
        assert!(chains.iter().any(|c| c.genome_start() == 2_000));
    }

    #[test]
    fn test_split_shortcut_finds_deletion() {
        let (g, _) = fixture();
        let chr1 = contig(&g, 0);
        let mut query = chr1[1_000..1_075].to_vec();
        query.extend_from_slice(&chr1[1_200..1_275]);
        let record = SplitAssembler::new(&g, &g)
            .investigate_split_shortcut("q", &query, PackedPosition::new(1_000), 1_262)
            .unwrap()
            .unwrap();
        assert_eq!(record.block_count(), 2);
        assert_eq!(record.matches, 150);
        assert_eq!(record.t_start, 1_000);
        assert_eq!(record.t_end, 1_275);
        assert_eq!(record.strand, Strand::Forward);
    }

    #[test]
    fn test_split_shortcut_rejects_poor_cover() {
        let (g, _) = fixture();
        let chr1 = contig(&g, 0);
        let mut query = chr1[1_000..1_040].to_vec();
        query.extend_from_slice(&random_sequence(70, 7));
        query.extend_from_slice(&chr1[1_200..1_240]);
        let record = SplitAssembler::new(&g, &g)
            .investigate_split_shortcut("q", &query, PackedPosition::new(1_000), 1_227)
            .unwrap();
        assert!(record.is_none());
    }
}
