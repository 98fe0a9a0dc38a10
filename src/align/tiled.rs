/// Per-query alignment driver
use log::{debug, warn};
use rayon::prelude::*;

use crate::align::chain::{
    is_homopolymer_dominated, sequence_complexity, CandidateSet, Chain, ChainMatcher,
    MatchQuality,
};
use crate::align::record::{
    combined_non_overlapping_score, find_record_in_range, find_subsequence, merge_records,
    remove_overlapping, AlignmentRecord, Block, Strand, TargetWindow,
};
use crate::align::sw::{align_best, SwMode};
use crate::chimeric::{SplitAssembler, SplitOutcome};
use crate::classify::classify;
use crate::error::Error;
use crate::genome::{ChrPosition, CoordinateTranslator, ReferenceSource};
use crate::index::tile::{count_ambiguous, reverse_complement, TILE_LENGTH};
use crate::index::position::MAX_QUERY_OFFSET;
use crate::index::TileIndex;
use crate::stats::MatchMetrics;

/// Window padding for queries shorter than `SHORT_QUERY`.
const SHORT_QUERY_BUFFER: u64 = 1_000;
const LONG_QUERY_BUFFER: u64 = 3_000;
const SHORT_QUERY: usize = 100;
/// Padding around a perfect chain when checking it against the reference.
const PERFECT_MATCH_BUFFER: u64 = 10;
/// Uncovered query stretches shorter than this are not worth filling.
const MIN_MISSING_RANGE: u64 = 10;
const PASSING_FRACTION: f64 = 0.95;
const PASSING_99_FRACTION: f64 = 0.99;
/// Tile offsets and chain quality counts are 16-bit fields.
pub const MAX_QUERY_LENGTH: usize = MAX_QUERY_OFFSET;

/// Library-level alignment options.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignOptions {
    /// Chains handed to the split assembler
    pub candidate_max: usize,
    /// Quality tiers searched for split partners
    pub tier_max: usize,
    /// Candidate windows aligned per query
    pub sw_count_max: usize,
    /// Parameter set tried first by Smith-Waterman
    pub sw_mode: SwMode,
    /// Records scoring below this are dropped
    pub record_score_min: i64,
    /// Split shortcuts investigated per strand
    pub split_shortcut_max: usize,
}

impl Default for AlignOptions {
    fn default() -> Self {
        Self {
            candidate_max: 20,
            tier_max: 3,
            sw_count_max: 80,
            sw_mode: SwMode::Strict,
            record_score_min: 20,
            split_shortcut_max: 20,
        }
    }
}

/// One query, normalised to upper case, with its reverse complement.
struct Query<'q> {
    name: &'q str,
    seq: Vec<u8>,
    rc: Vec<u8>,
}

impl Query<'_> {
    fn len(&self) -> usize {
        self.seq.len()
    }

    fn strand_seq(&self, reverse: bool) -> &[u8] {
        if reverse {
            &self.rc
        } else {
            &self.seq
        }
    }
}

/// Aligns queries against a tile index and reference.
///
/// Holds only shared references, so one aligner can serve any number of
/// threads.
pub struct TiledAligner<'a> {
    index: &'a TileIndex,
    reference: &'a dyn ReferenceSource,
    translator: &'a dyn CoordinateTranslator,
    options: AlignOptions,
    metrics: Option<&'a MatchMetrics>,
}

impl<'a> TiledAligner<'a> {
    pub fn new(
        index: &'a TileIndex,
        reference: &'a dyn ReferenceSource,
        translator: &'a dyn CoordinateTranslator,
    ) -> Self {
        Self {
            index,
            reference,
            translator,
            options: AlignOptions::default(),
            metrics: None,
        }
    }

    pub fn with_options(mut self, options: AlignOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_metrics(mut self, metrics: &'a MatchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn options(&self) -> &AlignOptions {
        &self.options
    }

    /// Align one query.
    ///
    /// # Algorithm
    /// 1. Reject queries shorter than a tile, longer than [`MAX_QUERY_LENGTH`]
    ///    or dominated by a homopolymer
    /// 2. Chain tiles on both strands
    /// 3. Verified perfect chains are returned without Smith-Waterman
    /// 4. Shortcut chains, then split shortcuts, are aligned
    /// 5. Split assembly, unless a shortcut already scores 99% of the length
    /// 6. Smith-Waterman over ranked candidates, tier by tier, with early exit
    /// 7. Pair the best record with one covering the rest of the query
    ///
    /// # Returns
    /// Records sorted ascending by score, so the best is last. Empty when
    /// nothing aligns.
    pub fn align(&self, name: &str, query: &[u8]) -> Result<Vec<AlignmentRecord>, Error> {
        let records = self.align_query(name, query)?;
        if let Some(m) = self.metrics {
            m.record_query(records.len());
        }
        Ok(records)
    }

    fn align_query(&self, name: &str, query: &[u8]) -> Result<Vec<AlignmentRecord>, Error> {
        if query.len() < TILE_LENGTH {
            debug!("{name}: {} bases is shorter than a tile", query.len());
            self.rejected();
            return Ok(Vec::new());
        }
        if query.len() > MAX_QUERY_LENGTH {
            warn!(
                "{name}: {} bases is longer than the {MAX_QUERY_LENGTH} a query may have",
                query.len()
            );
            if let Some(m) = self.metrics {
                m.record_oversized();
            }
            self.rejected();
            return Ok(Vec::new());
        }
        if is_homopolymer_dominated(query) {
            warn!("{name}: too much single-base repetition to align");
            self.rejected();
            return Ok(Vec::new());
        }

        let seq = query.to_ascii_uppercase();
        let rc = reverse_complement(&seq);
        let q = Query { name, seq, rc };
        let len = q.len();

        let candidates = ChainMatcher::new(self.index).find_candidates(&q.seq);
        if let Some(m) = self.metrics {
            m.record_class(classify(len, &candidates));
        }

        let perfect = self.perfect_matches(&q, &candidates)?;
        if !perfect.is_empty() {
            if let Some(m) = self.metrics {
                m.record_perfect();
            }
            return Ok(self.finalise(perfect));
        }

        let passing = (len as f64 * PASSING_FRACTION) as i64;
        let passing99 = (len as f64 * PASSING_99_FRACTION) as i64;
        let assembler = SplitAssembler::new(self.reference, self.translator)
            .with_limits(self.options.candidate_max, self.options.tier_max);

        let (mut results, mut sw_runs) = self.shortcut_records(&q, &candidates, &assembler)?;

        let mut split_records = Vec::new();
        let mut fall_through = Vec::new();
        if top_score(&results) < passing99 {
            match assembler.assemble(name, &q.seq, &candidates)? {
                SplitOutcome::Records(records) => split_records = self.passing(records),
                SplitOutcome::FallThrough(chains) => fall_through = chains,
                SplitOutcome::NotApplicable => {}
            }
            if !split_records.is_empty() && top_score(&split_records) >= passing99 {
                debug!("{name}: split assembly scores {}", top_score(&split_records));
                self.split();
                results.extend(split_records);
                self.sw_runs(sw_runs);
                return Ok(self.finalise(results));
            }
        }

        let (ranked, runs) = self.align_ranked(&q, &candidates, fall_through, passing, passing99)?;
        results.extend(ranked);
        sw_runs += runs;
        self.sw_runs(sw_runs);

        if top_score(&results) < passing {
            if let Some(pair) = self.pair_with_missing_range(&mut results, len, passing) {
                self.split();
                return Ok(self.finalise(pair));
            }
        }

        if !split_records.is_empty() && top_score(&split_records) > top_score(&results) {
            self.split();
            results.extend(split_records);
        }
        Ok(self.finalise(results))
    }

    /// Records for perfect chains confirmed against the reference.
    ///
    /// Only queries without `N`, longer than the minimum record score and
    /// with enough base diversity qualify.
    fn perfect_matches(
        &self,
        q: &Query<'_>,
        candidates: &CandidateSet,
    ) -> Result<Vec<AlignmentRecord>, Error> {
        let len = q.len();
        let complexity = sequence_complexity(&q.seq);
        if candidates.perfect_matches().is_empty()
            || count_ambiguous(&q.seq) > 0
            || !(complexity == 4 || (complexity >= 2 && len >= 50))
            || (len as i64) <= self.options.record_score_min
        {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for &pos in candidates.perfect_matches() {
            let reverse = pos.is_reverse();
            let Some(start) = pos.coordinate().checked_sub(pos.query_offset() as u64) else {
                continue;
            };
            let Some(chr) = self.translator.to_chr_position(pos.with_coordinate(start)) else {
                continue;
            };
            let window_start = chr.offset.saturating_sub(PERFECT_MATCH_BUFFER);
            let window = self
                .reference
                .subsequence(
                    &chr.contig,
                    window_start,
                    chr.offset + len as u64 + PERFECT_MATCH_BUFFER,
                )?
                .to_ascii_uppercase();
            match find_subsequence(&window, q.strand_seq(reverse)) {
                Some(i) => records.extend(AlignmentRecord::exact_match(
                    q.name,
                    &q.seq,
                    Strand::from_reverse(reverse),
                    &chr.contig,
                    chr.contig_length,
                    window_start + i as u64,
                )),
                None => debug!(
                    "{}: perfect chain at {}:{} does not match the reference",
                    q.name, chr.contig, chr.offset
                ),
            }
        }
        Ok(records)
    }

    /// Align exact first-to-last tile shortcuts; where a strand has none,
    /// investigate its split shortcuts instead.
    fn shortcut_records(
        &self,
        q: &Query<'_>,
        candidates: &CandidateSet,
        assembler: &SplitAssembler<'_>,
    ) -> Result<(Vec<AlignmentRecord>, usize), Error> {
        let mut records = Vec::new();
        let mut runs = 0;
        let full = MatchQuality::new((q.len() - (TILE_LENGTH - 1)) as u32, 0);

        for reverse in [false, true] {
            let strand = candidates.strand(reverse);
            if !strand.shortcuts.is_empty() {
                for &pos in &strand.shortcuts {
                    let (record, n) = self.align_chain(q, &Chain::new(full, pos))?;
                    runs += n;
                    records.extend(record);
                }
            } else {
                for &(first, last) in strand
                    .split_shortcuts
                    .iter()
                    .take(self.options.split_shortcut_max)
                {
                    records.extend(assembler.investigate_split_shortcut(
                        q.name,
                        &q.seq,
                        first,
                        last,
                    )?);
                }
            }
        }
        Ok((self.passing(records), runs))
    }

    /// Smith-Waterman over the candidate chains, best quality tier first.
    ///
    /// Chains in a tier are aligned in parallel. The loop stops at
    /// `sw_count_max` windows, as soon as a record reaches `passing99`, or
    /// one tier after a record reaches `passing`.
    fn align_ranked(
        &self,
        q: &Query<'_>,
        candidates: &CandidateSet,
        first: Vec<Chain>,
        passing: i64,
        passing99: i64,
    ) -> Result<(Vec<AlignmentRecord>, usize), Error> {
        let mut tiers = group_by_quality(&first);
        let rest: Vec<Chain> = candidates
            .ranked_chains()
            .filter(|c| !first.contains(c))
            .collect();
        tiers.extend(group_by_quality(&rest));

        let mut records: Vec<AlignmentRecord> = Vec::new();
        let mut runs = 0;
        let mut windows = 0;
        let mut final_iteration = false;

        for tier in tiers {
            let budget = self.options.sw_count_max.saturating_sub(windows);
            if budget == 0 {
                debug!("{}: window limit {} reached", q.name, self.options.sw_count_max);
                break;
            }
            let batch = &tier[..tier.len().min(budget)];
            windows += batch.len();

            let aligned: Vec<(Option<AlignmentRecord>, usize)> = batch
                .par_iter()
                .map(|chain| self.align_chain(q, chain))
                .collect::<Result<_, Error>>()?;
            for (record, n) in aligned {
                runs += n;
                records.extend(record.filter(|r| r.score() >= self.options.record_score_min));
            }

            let best = top_score(&records);
            if final_iteration || best >= passing99 {
                break;
            }
            if best >= passing {
                final_iteration = true;
            }
        }
        Ok((records, runs))
    }

    /// Align the query around one chain.
    ///
    /// The reference window spans the chain plus, on each side the chain does
    /// not reach the query end, a buffer and the uncovered query. An exact
    /// occurrence in the window skips Smith-Waterman; when Smith-Waterman
    /// finds nothing, a record is made from the chain itself. Returns the
    /// record and the number of Smith-Waterman runs.
    fn align_chain(
        &self,
        q: &Query<'_>,
        chain: &Chain,
    ) -> Result<(Option<AlignmentRecord>, usize), Error> {
        let reverse = chain.is_reverse();
        let strand = Strand::from_reverse(reverse);
        let strand_seq = q.strand_seq(reverse);
        let Some(chr) = self.translator.to_chr_position(chain.position) else {
            return Ok((None, 0));
        };

        let (start, end) = window_bounds(chain, q.len(), chr.offset);
        let window = TargetWindow {
            sequence: self
                .reference
                .subsequence(&chr.contig, start, end)?
                .to_ascii_uppercase(),
            contig: chr.contig.clone(),
            contig_length: chr.contig_length,
            start,
        };

        if let Some(i) = find_subsequence(&window.sequence, strand_seq) {
            let record = AlignmentRecord::exact_match(
                q.name,
                &q.seq,
                strand,
                &window.contig,
                window.contig_length,
                window.start + i as u64,
            );
            return Ok((record, 0));
        }

        let (alignment, runs) = align_best(&window.sequence, strand_seq, self.options.sw_mode);
        let record = alignment
            .and_then(|a| AlignmentRecord::from_alignment(q.name, &q.seq, strand, &window, &a))
            .or_else(|| self.tile_record(q, chain, &chr));
        Ok((record, runs))
    }

    /// Single-block record built from the chain alone.
    fn tile_record(
        &self,
        q: &Query<'_>,
        chain: &Chain,
        chr: &ChrPosition,
    ) -> Option<AlignmentRecord> {
        let (start, end) = chain.strand_range(q.len());
        let mismatches = chain.quality.mismatches() as usize;
        let size = end - start;
        if size.saturating_sub(mismatches) as i64 <= self.options.record_score_min {
            return None;
        }
        debug!(
            "{}: building record from tiles {:?} at {}:{}",
            q.name, chain.quality, chr.contig, chr.offset
        );
        AlignmentRecord::from_blocks(
            q.name,
            q.len() as u64,
            Strand::from_reverse(chain.is_reverse()),
            &chr.contig,
            chr.contig_length,
            &[Block::new(start as u64, chr.offset, size as u64)],
            mismatches as u64,
            0,
        )
    }

    /// Pair the best record with the record best covering the query it
    /// leaves uncovered. Returns the pair when it should stand on its own;
    /// a merged record, or the pair itself, is otherwise added to `results`.
    fn pair_with_missing_range(
        &self,
        results: &mut Vec<AlignmentRecord>,
        len: usize,
        passing: i64,
    ) -> Option<Vec<AlignmentRecord>> {
        results.sort();
        let largest = results.last()?.clone();
        let len = len as u64;

        let mut pair: Vec<AlignmentRecord> = Vec::new();
        for (start, end) in [(0, largest.q_start), (largest.q_end, len)] {
            if end.saturating_sub(start) < MIN_MISSING_RANGE {
                continue;
            }
            if let Some(other) = find_record_in_range(results, start, end) {
                if other.score() + largest.score() > passing {
                    pair = vec![other.clone(), largest.clone()];
                    break;
                }
            }
        }
        if pair.is_empty() {
            return None;
        }

        if let Some(merged) = merge_records(&pair) {
            debug!("merged split records into {merged}");
            results.push(merged);
            return None;
        }
        let refs: Vec<&AlignmentRecord> = pair.iter().collect();
        let (coverage, overlap) = combined_non_overlapping_score(&refs);
        if coverage as i64 > passing && coverage > 2 * overlap {
            return Some(pair);
        }
        results.extend(pair);
        None
    }

    fn passing(&self, mut records: Vec<AlignmentRecord>) -> Vec<AlignmentRecord> {
        records.retain(|r| r.score() >= self.options.record_score_min);
        records
    }

    /// Remove duplicates and reference overlaps; best record last.
    fn finalise(&self, mut records: Vec<AlignmentRecord>) -> Vec<AlignmentRecord> {
        records.retain(|r| r.score() >= self.options.record_score_min);
        records.sort();
        records.dedup();
        let mut kept = remove_overlapping(records);
        kept.sort();
        kept
    }

    fn rejected(&self) {
        if let Some(m) = self.metrics {
            m.record_rejected();
        }
    }

    fn split(&self) {
        if let Some(m) = self.metrics {
            m.record_split();
        }
    }

    fn sw_runs(&self, n: usize) {
        if let Some(m) = self.metrics {
            m.record_sw_runs(n);
        }
    }
}

fn top_score(records: &[AlignmentRecord]) -> i64 {
    records.iter().map(|r| r.score()).max().unwrap_or(i64::MIN)
}

/// Consecutive runs of chains sharing a quality.
fn group_by_quality(chains: &[Chain]) -> Vec<Vec<Chain>> {
    let mut tiers: Vec<Vec<Chain>> = Vec::new();
    for &chain in chains {
        match tiers.last_mut() {
            Some(tier) if tier[0].quality == chain.quality => tier.push(chain),
            _ => tiers.push(vec![chain]),
        }
    }
    tiers
}

/// Contig window `[start, end)` to align `chain` in, given the contig offset
/// of its anchoring tile. `end` may run past the contig; the reference clamps.
pub(crate) fn window_bounds(chain: &Chain, query_len: usize, contig_offset: u64) -> (u64, u64) {
    let buffer = if query_len < SHORT_QUERY {
        SHORT_QUERY_BUFFER
    } else {
        LONG_QUERY_BUFFER
    };
    let (start, end) = chain.strand_range(query_len);
    let lhs = if start == 0 { 0 } else { buffer + start as u64 };
    let rhs = if end == query_len {
        0
    } else {
        buffer + (query_len - end) as u64
    };
    (
        contig_offset.saturating_sub(lhs),
        contig_offset + (end - start) as u64 + rhs,
    )
}
