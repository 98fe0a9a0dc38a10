//! PSL-style alignment records and the helpers that combine and filter them.
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::align::sw::{gap_runs, Alignment};
use crate::error::Error;
use crate::index::tile::{count_ambiguous, reverse_complement};

/// Two records further apart than this on the reference are never merged.
pub const MAX_MERGE_DISTANCE: u64 = 500_000;

/// Query strand of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn from_reverse(reverse: bool) -> Self {
        if reverse {
            Strand::Reverse
        } else {
            Strand::Forward
        }
    }

    pub fn is_reverse(self) -> bool {
        self == Strand::Reverse
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strand::Forward => "+",
            Strand::Reverse => "-",
        })
    }
}

/// An ungapped block. `query_start` is on the aligned strand, as in PSL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub query_start: u64,
    pub target_start: u64,
    pub size: u64,
}

impl Block {
    pub fn new(query_start: u64, target_start: u64, size: u64) -> Self {
        Self {
            query_start,
            target_start,
            size,
        }
    }

    fn query_end(&self) -> u64 {
        self.query_start + self.size
    }

    fn target_end(&self) -> u64 {
        self.target_start + self.size
    }
}

/// A slice of reference handed to the record builders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetWindow {
    pub contig: String,
    pub contig_length: u64,
    /// 0-based contig offset of `sequence[0]`.
    pub start: u64,
    pub sequence: Vec<u8>,
}

/// The 21 PSL columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlignmentRecord {
    pub matches: u64,
    pub mismatches: u64,
    pub rep_matches: u64,
    pub n_count: u64,
    pub q_gap_count: u64,
    pub q_gap_bases: u64,
    pub t_gap_count: u64,
    pub t_gap_bases: u64,
    pub strand: Strand,
    pub q_name: String,
    pub q_size: u64,
    pub q_start: u64,
    pub q_end: u64,
    pub t_name: String,
    pub t_size: u64,
    pub t_start: u64,
    pub t_end: u64,
    pub block_sizes: Vec<u64>,
    pub q_starts: Vec<u64>,
    pub t_starts: Vec<u64>,
}

impl AlignmentRecord {
    /// `matches - mismatches - qGapCount - tGapCount`.
    pub fn score(&self) -> i64 {
        self.matches as i64
            - self.mismatches as i64
            - self.q_gap_count as i64
            - self.t_gap_count as i64
    }

    pub fn block_count(&self) -> usize {
        self.block_sizes.len()
    }

    /// Query bases spanned, `qEnd - qStart`.
    pub fn query_span(&self) -> u64 {
        self.q_end.saturating_sub(self.q_start)
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.block_sizes
            .iter()
            .zip(&self.q_starts)
            .zip(&self.t_starts)
            .map(|((&size, &q), &t)| Block::new(q, t, size))
            .collect()
    }

    /// Build a record from an ordered list of blocks on one contig.
    ///
    /// Block query starts are on the aligned strand; `qStart`/`qEnd` are
    /// reported in forward query coordinates.
    #[allow(clippy::too_many_arguments)]
    pub fn from_blocks(
        q_name: &str,
        q_size: u64,
        strand: Strand,
        t_name: &str,
        t_size: u64,
        blocks: &[Block],
        mismatches: u64,
        n_count: u64,
    ) -> Option<Self> {
        let first = blocks.first()?;
        let last = blocks.last()?;

        let mut q_gap_count = 0;
        let mut q_gap_bases = 0;
        let mut t_gap_count = 0;
        let mut t_gap_bases = 0;
        for pair in blocks.windows(2) {
            let q_gap = pair[1].query_start.saturating_sub(pair[0].query_end());
            if q_gap > 0 {
                q_gap_count += 1;
                q_gap_bases += q_gap;
            }
            let t_gap = pair[1].target_start.saturating_sub(pair[0].target_end());
            if t_gap > 0 {
                t_gap_count += 1;
                t_gap_bases += t_gap;
            }
        }

        let aligned: u64 = blocks.iter().map(|b| b.size).sum();
        let (q_start, q_end) = forward_span(strand, q_size, first.query_start, last.query_end());

        Some(Self {
            matches: aligned.saturating_sub(mismatches),
            mismatches,
            rep_matches: 0,
            n_count,
            q_gap_count,
            q_gap_bases,
            t_gap_count,
            t_gap_bases,
            strand,
            q_name: q_name.to_string(),
            q_size,
            q_start,
            q_end,
            t_name: t_name.to_string(),
            t_size,
            t_start: first.target_start,
            t_end: last.target_end(),
            block_sizes: blocks.iter().map(|b| b.size).collect(),
            q_starts: blocks.iter().map(|b| b.query_start).collect(),
            t_starts: blocks.iter().map(|b| b.target_start).collect(),
        })
    }

    /// Record for a query found verbatim at `t_start` of `t_name`.
    pub fn exact_match(
        q_name: &str,
        query: &[u8],
        strand: Strand,
        t_name: &str,
        t_size: u64,
        t_start: u64,
    ) -> Option<Self> {
        let len = query.len() as u64;
        Self::from_blocks(
            q_name,
            len,
            strand,
            t_name,
            t_size,
            &[Block::new(0, t_start, len)],
            0,
            count_ambiguous(query) as u64,
        )
    }

    /// Record from a local alignment of `query` (on `strand`) against `window`.
    ///
    /// Returns `None` for an empty alignment, or when the aligned query or
    /// reference cannot be located in its source sequence.
    pub fn from_alignment(
        q_name: &str,
        query: &[u8],
        strand: Strand,
        window: &TargetWindow,
        alignment: &Alignment,
    ) -> Option<Self> {
        if alignment.is_empty() {
            return None;
        }
        let strand_seq = match strand {
            Strand::Forward => query.to_vec(),
            Strand::Reverse => reverse_complement(query),
        };
        let aligned_query: Vec<u8> = alignment.query.iter().copied().filter(|&b| b != b'-').collect();
        let aligned_ref: Vec<u8> = alignment
            .reference
            .iter()
            .copied()
            .filter(|&b| b != b'-')
            .collect();
        let seq_offset = find_subsequence(&strand_seq, &aligned_query)? as u64;
        let t_start = window.start + find_subsequence(&window.sequence, &aligned_ref)? as u64;

        // Walk the columns, opening a block at each run of non-gap markup.
        let mut blocks = Vec::new();
        let mut q_pos = 0u64;
        let mut r_pos = 0u64;
        let mut open: Option<Block> = None;
        for ((&m, &qb), &rb) in alignment
            .markup
            .iter()
            .zip(&alignment.query)
            .zip(&alignment.reference)
        {
            if m == b' ' {
                if let Some(b) = open.take() {
                    blocks.push(b);
                }
            } else {
                match open.as_mut() {
                    Some(b) => b.size += 1,
                    None => open = Some(Block::new(q_pos + seq_offset, r_pos + t_start, 1)),
                }
            }
            if qb != b'-' {
                q_pos += 1;
            }
            if rb != b'-' {
                r_pos += 1;
            }
        }
        if let Some(b) = open {
            blocks.push(b);
        }
        let first = *blocks.first()?;
        let last = *blocks.last()?;

        let n_count = count_ambiguous(&alignment.query) as u64;
        let mut mismatches = alignment.mismatches() as u64;
        if n_count > 0 && mismatches > 0 {
            mismatches = mismatches.saturating_sub(n_count);
        }
        let q_size = query.len() as u64;
        let (q_start, q_end) = forward_span(strand, q_size, first.query_start, last.query_end());

        Some(Self {
            matches: alignment.matches() as u64,
            mismatches,
            rep_matches: 0,
            n_count,
            // Query bases facing a reference gap are query inserts, and the
            // reverse for the target.
            q_gap_count: gap_runs(&alignment.reference, b'-') as u64,
            q_gap_bases: alignment.reference.iter().filter(|&&b| b == b'-').count() as u64,
            t_gap_count: gap_runs(&alignment.query, b'-') as u64,
            t_gap_bases: alignment.query.iter().filter(|&&b| b == b'-').count() as u64,
            strand,
            q_name: q_name.to_string(),
            q_size,
            q_start,
            q_end,
            t_name: window.contig.clone(),
            t_size: window.contig_length,
            t_start,
            t_end: t_start + aligned_ref.len() as u64,
            block_sizes: blocks.iter().map(|b| b.size).collect(),
            q_starts: blocks.iter().map(|b| b.query_start).collect(),
            t_starts: blocks.iter().map(|b| b.target_start).collect(),
        })
    }

    /// True when the two records touch the same reference bases.
    pub fn overlaps_reference(&self, other: &Self) -> bool {
        self.t_name == other.t_name && other.t_start < self.t_end && self.t_start < other.t_end
    }

    /// Query bases shared with `[start, end)` (forward coordinates).
    pub fn query_overlap(&self, start: u64, end: u64) -> u64 {
        self.q_end.min(end).saturating_sub(self.q_start.max(start))
    }
}

fn forward_span(strand: Strand, q_size: u64, start: u64, end: u64) -> (u64, u64) {
    match strand {
        Strand::Forward => (start, end),
        Strand::Reverse => (q_size.saturating_sub(end), q_size.saturating_sub(start)),
    }
}

/// First index of `needle` in `haystack`.
pub(crate) fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
}

impl Ord for AlignmentRecord {
    /// Weakest first: score, then forward before reverse strand loses, then
    /// contig name descending, then fewer matches.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score()
            .cmp(&other.score())
            .then_with(|| other.strand.is_reverse().cmp(&self.strand.is_reverse()))
            .then_with(|| other.t_name.cmp(&self.t_name))
            .then_with(|| self.matches.cmp(&other.matches))
            .then_with(|| other.t_start.cmp(&self.t_start))
            .then_with(|| self.q_name.cmp(&other.q_name))
            .then_with(|| self.q_start.cmp(&other.q_start))
            .then_with(|| self.block_sizes.cmp(&other.block_sizes))
            .then_with(|| self.q_starts.cmp(&other.q_starts))
            .then_with(|| self.t_starts.cmp(&other.t_starts))
            .then_with(|| self.mismatches.cmp(&other.mismatches))
            .then_with(|| {
                (
                    self.rep_matches,
                    self.n_count,
                    self.q_gap_count,
                    self.q_gap_bases,
                    self.t_gap_count,
                    self.t_gap_bases,
                    self.q_size,
                    self.q_end,
                    self.t_size,
                    self.t_end,
                )
                    .cmp(&(
                        other.rep_matches,
                        other.n_count,
                        other.q_gap_count,
                        other.q_gap_bases,
                        other.t_gap_count,
                        other.t_gap_bases,
                        other.q_size,
                        other.q_end,
                        other.t_size,
                        other.t_end,
                    ))
            })
    }
}

impl PartialOrd for AlignmentRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, values: &[u64]) -> fmt::Result {
    for v in values {
        write!(f, "{v},")?;
    }
    Ok(())
}

impl fmt::Display for AlignmentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t",
            self.matches,
            self.mismatches,
            self.rep_matches,
            self.n_count,
            self.q_gap_count,
            self.q_gap_bases,
            self.t_gap_count,
            self.t_gap_bases,
            self.strand,
            self.q_name,
            self.q_size,
            self.q_start,
            self.q_end,
            self.t_name,
            self.t_size,
            self.t_start,
            self.t_end,
            self.block_count()
        )?;
        write_list(f, &self.block_sizes)?;
        f.write_str("\t")?;
        write_list(f, &self.q_starts)?;
        f.write_str("\t")?;
        write_list(f, &self.t_starts)
    }
}

impl FromStr for AlignmentRecord {
    type Err = Error;

    /// Parse a PSL line. A leading score column (22 fields) is accepted and
    /// ignored.
    fn from_str(line: &str) -> Result<Self, Error> {
        let mut fields: Vec<&str> = line.trim_end_matches(['\n', '\r']).split('\t').collect();
        if fields.len() == 22 {
            fields.remove(0);
        }
        if fields.len() != 21 {
            return Err(Error::Alignment(format!(
                "PSL line has {} fields, expected 21",
                fields.len()
            )));
        }
        let num = |i: usize| -> Result<u64, Error> {
            fields[i].parse::<u64>().map_err(|e| {
                Error::Alignment(format!("PSL field {} ('{}'): {e}", i + 1, fields[i]))
            })
        };
        let list = |i: usize| -> Result<Vec<u64>, Error> {
            fields[i]
                .split(',')
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<u64>().map_err(|e| {
                        Error::Alignment(format!("PSL field {} ('{s}'): {e}", i + 1))
                    })
                })
                .collect()
        };
        let strand = match fields[8] {
            "+" => Strand::Forward,
            "-" => Strand::Reverse,
            other => return Err(Error::Alignment(format!("bad PSL strand '{other}'"))),
        };

        let record = Self {
            matches: num(0)?,
            mismatches: num(1)?,
            rep_matches: num(2)?,
            n_count: num(3)?,
            q_gap_count: num(4)?,
            q_gap_bases: num(5)?,
            t_gap_count: num(6)?,
            t_gap_bases: num(7)?,
            strand,
            q_name: fields[9].to_string(),
            q_size: num(10)?,
            q_start: num(11)?,
            q_end: num(12)?,
            t_name: fields[13].to_string(),
            t_size: num(14)?,
            t_start: num(15)?,
            t_end: num(16)?,
            block_sizes: list(18)?,
            q_starts: list(19)?,
            t_starts: list(20)?,
        };
        let block_count = num(17)? as usize;
        if record.block_sizes.len() != block_count
            || record.q_starts.len() != block_count
            || record.t_starts.len() != block_count
        {
            return Err(Error::Alignment(format!(
                "PSL block lists disagree with block count {block_count}"
            )));
        }
        Ok(record)
    }
}

/// True when `a` and `b` could be one record: same contig and strand, close
/// on the reference, and with query order matching reference order.
pub fn is_single_locus(a: &AlignmentRecord, b: &AlignmentRecord) -> bool {
    if a.t_name != b.t_name || a.strand != b.strand {
        return false;
    }
    if a.t_start.abs_diff(b.t_start) > MAX_MERGE_DISTANCE {
        return false;
    }
    let (first, second) = if a.t_start <= b.t_start { (a, b) } else { (b, a) };
    let strand_start = |r: &AlignmentRecord| r.q_starts.first().copied().unwrap_or(0);
    strand_start(first) <= strand_start(second)
}

/// Combine records from one locus into a single multi-block record.
///
/// Blocks are laid out in reference order; where consecutive blocks overlap
/// on the query or the reference, the overlap is trimmed from the larger one.
pub fn merge_records(records: &[AlignmentRecord]) -> Option<AlignmentRecord> {
    let first = records.first()?;
    for (i, a) in records.iter().enumerate() {
        for b in &records[i + 1..] {
            if !is_single_locus(a, b) {
                return None;
            }
        }
    }

    let mut sorted: Vec<&AlignmentRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.t_start);

    let mut blocks: Vec<Block> = Vec::new();
    for record in &sorted {
        for mut block in record.blocks() {
            if let Some(prev) = blocks.last_mut() {
                let overlap = prev
                    .query_end()
                    .saturating_sub(block.query_start)
                    .max(prev.target_end().saturating_sub(block.target_start));
                if overlap > 0 {
                    if prev.size > block.size {
                        prev.size = prev.size.saturating_sub(overlap);
                    } else {
                        let trim = overlap.min(block.size);
                        block.query_start += trim;
                        block.target_start += trim;
                        block.size -= trim;
                    }
                }
                if prev.size == 0 {
                    blocks.pop();
                }
            }
            if block.size > 0 {
                blocks.push(block);
            }
        }
    }
    if blocks.windows(2).any(|w| w[1].query_start < w[0].query_end()) {
        return None;
    }

    let mismatches = sorted.iter().map(|r| r.mismatches).sum();
    let n_count = sorted.iter().map(|r| r.n_count).max().unwrap_or(0);
    AlignmentRecord::from_blocks(
        &first.q_name,
        first.q_size,
        first.strand,
        &first.t_name,
        first.t_size,
        &blocks,
        mismatches,
        n_count,
    )
}

/// Query coverage and overlap of a set of records, `(coverage, overlap)`.
pub fn combined_non_overlapping_score(records: &[&AlignmentRecord]) -> (u64, u64) {
    let mut spans: Vec<(u64, u64)> = records.iter().map(|r| (r.q_start, r.q_end)).collect();
    spans.sort_unstable();

    let mut coverage = 0;
    let mut overlap = 0;
    let mut last_end = 0;
    for (start, end) in spans {
        let shared = last_end.min(end).saturating_sub(start);
        coverage += (end - start.min(end)) - shared;
        overlap += shared;
        last_end = last_end.max(end);
    }
    (coverage, overlap)
}

/// Keep the best record, then every weaker one that does not overlap a kept
/// record on the reference. Returned best first.
pub fn remove_overlapping(mut records: Vec<AlignmentRecord>) -> Vec<AlignmentRecord> {
    records.sort_unstable_by(|a, b| b.cmp(a));
    let mut kept: Vec<AlignmentRecord> = Vec::with_capacity(records.len());
    for record in records {
        if !kept.iter().any(|k| k.overlaps_reference(&record)) {
            kept.push(record);
        }
    }
    kept
}

/// Record best covering query range `[start, end)`, scored as overlap minus
/// mismatches minus query gaps. Only positive scores qualify.
pub fn find_record_in_range(
    records: &[AlignmentRecord],
    start: u64,
    end: u64,
) -> Option<&AlignmentRecord> {
    let mut best: Option<(&AlignmentRecord, i64)> = None;
    for record in records {
        let score = record.query_overlap(start, end) as i64
            - record.mismatches as i64
            - record.q_gap_count as i64;
        if score > 0 && best.map_or(true, |(_, s)| score > s) {
            best = Some((record, score));
        }
    }
    best.map(|(r, _)| r)
}
