/// Smith-Waterman local alignment with Gotoh affine gap scoring.
///
/// Produces the classic traceback triple: aligned reference, a markup line
/// (`|` match, `.` mismatch, ` ` gap) and aligned query, with `-` for gaps.
use log::trace;

use crate::index::tile::count_ambiguous;

const STOP: u8 = 0;
const LEFT: u8 = 1;
const DIAGONAL: u8 = 2;
const UP: u8 = 3;

/// Maximum gap blocks an accepted alignment may contain.
pub const MAX_GAP_BLOCKS: usize = 6;
/// Gap blocks at which the alternative parameter set is also tried.
pub const RETRY_GAP_BLOCKS: usize = 4;
/// Mismatch allowance as a fraction of the query length.
pub const MAX_MISMATCH_FRACTION: f32 = 0.1;

/// Scoring parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwParams {
    pub match_score: i32,
    pub mismatch_score: i32,
    pub gap_open: f32,
    pub gap_extend: f32,
}

impl SwParams {
    /// Tolerates gaps; for noisy or ambiguous queries.
    pub const LENIENT: SwParams = SwParams {
        match_score: 5,
        mismatch_score: -4,
        gap_open: 16.0,
        gap_extend: 4.0,
    };

    /// Punishes mismatches hard and keeps gaps cheap to extend.
    pub const STRICT: SwParams = SwParams {
        match_score: 4,
        mismatch_score: -14,
        gap_open: 14.0,
        gap_extend: 1.0,
    };
}

/// Which parameter set to try first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwMode {
    #[default]
    Strict,
    Lenient,
}

impl SwMode {
    pub fn params(self) -> SwParams {
        match self {
            SwMode::Strict => SwParams::STRICT,
            SwMode::Lenient => SwParams::LENIENT,
        }
    }

    fn other(self) -> SwMode {
        match self {
            SwMode::Strict => SwMode::Lenient,
            SwMode::Lenient => SwMode::Strict,
        }
    }
}

/// A finished local alignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment {
    pub reference: Vec<u8>,
    pub markup: Vec<u8>,
    pub query: Vec<u8>,
}

impl Alignment {
    /// Alignment of `seq` against itself, used when the query occurs verbatim.
    pub fn exact(seq: &[u8]) -> Self {
        Self {
            reference: seq.to_vec(),
            markup: vec![b'|'; seq.len()],
            query: seq.to_vec(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.markup.is_empty()
    }

    pub fn matches(&self) -> usize {
        self.markup.iter().filter(|&&c| c == b'|').count()
    }

    pub fn mismatches(&self) -> usize {
        self.markup.iter().filter(|&&c| c == b'.').count()
    }

    /// Bases covered by gaps on either sequence.
    pub fn gap_bases(&self) -> usize {
        self.markup.iter().filter(|&&c| c == b' ').count()
    }

    /// Number of separate runs of gap columns.
    pub fn gap_blocks(&self) -> usize {
        gap_runs(&self.markup, b' ')
    }

    /// `matches - mismatches - gap blocks`.
    pub fn score(&self) -> i64 {
        self.matches() as i64 - self.mismatches() as i64 - self.gap_blocks() as i64
    }

    /// Ungapped blocks as `(markup start, length)`.
    pub fn blocks(&self) -> Vec<(usize, usize)> {
        let mut blocks = Vec::new();
        let mut start: Option<usize> = None;
        for (i, &c) in self.markup.iter().enumerate() {
            match (c == b' ', start) {
                (false, None) => start = Some(i),
                (true, Some(s)) => {
                    blocks.push((s, i - s));
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            blocks.push((s, self.markup.len() - s));
        }
        blocks
    }
}

/// Count maximal runs of `symbol` in `line`.
pub(crate) fn gap_runs(line: &[u8], symbol: u8) -> usize {
    let mut runs = 0;
    let mut previous = false;
    for &c in line {
        let is_gap = c == symbol;
        if is_gap && !previous {
            runs += 1;
        }
        previous = is_gap;
    }
    runs
}

/// Filled dynamic-programming matrices, ready for traceback.
pub struct SmithWatermanGotoh<'a> {
    reference: &'a [u8],
    query: &'a [u8],
    columns: usize,
    pointers: Vec<u8>,
    vertical_gaps: Vec<u16>,
    horizontal_gaps: Vec<u16>,
    best_row: usize,
    best_column: usize,
}

impl<'a> SmithWatermanGotoh<'a> {
    /// Align `query` locally against `reference`.
    pub fn new(reference: &'a [u8], query: &'a [u8], params: SwParams) -> Self {
        let rows = reference.len() + 1;
        let columns = query.len() + 1;
        let mut sw = Self {
            reference,
            query,
            columns,
            pointers: vec![STOP; rows * columns],
            vertical_gaps: vec![1; rows * columns],
            horizontal_gaps: vec![1; rows * columns],
            best_row: 0,
            best_column: 0,
        };
        sw.fill(rows, params);
        sw
    }

    fn fill(&mut self, rows: usize, params: SwParams) {
        let columns = self.columns;
        let mut best_scores = vec![0f32; columns];
        let mut query_gap_scores = vec![f32::NEG_INFINITY; columns];
        let mut best_score = f32::NEG_INFINITY;

        for row in 1..rows {
            let mut anchor_gap_score = f32::NEG_INFINITY;
            let mut diagonal = best_scores[0];
            let ref_base = self.reference[row - 1];

            for column in 1..columns {
                let cell = row * columns + column;
                let similarity = if ref_base == self.query[column - 1] {
                    params.match_score
                } else {
                    params.mismatch_score
                };
                let total_similarity = diagonal + similarity as f32;

                // Gap in the query (vertical move).
                let extend = query_gap_scores[column] - params.gap_extend;
                let open = best_scores[column] - params.gap_open;
                if extend > open {
                    query_gap_scores[column] = extend;
                    self.vertical_gaps[cell] =
                        self.vertical_gaps[cell - columns].saturating_add(1);
                } else {
                    query_gap_scores[column] = open;
                }

                // Gap in the reference (horizontal move).
                let extend = anchor_gap_score - params.gap_extend;
                let open = best_scores[column - 1] - params.gap_open;
                if extend > open {
                    anchor_gap_score = extend;
                    self.horizontal_gaps[cell] = self.horizontal_gaps[cell - 1].saturating_add(1);
                } else {
                    anchor_gap_score = open;
                }

                diagonal = best_scores[column];
                let score = maximum(total_similarity, query_gap_scores[column], anchor_gap_score);
                best_scores[column] = score;

                self.pointers[cell] = if score == 0.0 {
                    STOP
                } else if score == total_similarity {
                    DIAGONAL
                } else if score == query_gap_scores[column] {
                    UP
                } else {
                    LEFT
                };

                if score > best_score {
                    self.best_row = row;
                    self.best_column = column;
                    best_score = score;
                }
            }
        }
        trace!(
            "SW filled {}x{} best {} at ({}, {})",
            rows,
            columns,
            best_score,
            self.best_row,
            self.best_column
        );
    }

    /// Walk back from the best cell to the first zero cell.
    pub fn traceback(&self) -> Alignment {
        let mut reference = Vec::new();
        let mut markup = Vec::new();
        let mut query = Vec::new();

        let mut row = self.best_row;
        let mut column = self.best_column;

        loop {
            let cell = row * self.columns + column;
            match self.pointers[cell] {
                LEFT => {
                    let run = self.horizontal_gaps[cell] as usize;
                    for _ in 0..run.min(column) {
                        column -= 1;
                        reference.push(b'-');
                        markup.push(b' ');
                        query.push(self.query[column]);
                    }
                }
                DIAGONAL => {
                    row -= 1;
                    column -= 1;
                    let a = self.reference[row];
                    let b = self.query[column];
                    reference.push(a);
                    query.push(b);
                    markup.push(if a == b { b'|' } else { b'.' });
                }
                UP => {
                    let run = self.vertical_gaps[cell] as usize;
                    for _ in 0..run.min(row) {
                        row -= 1;
                        query.push(b'-');
                        markup.push(b' ');
                        reference.push(self.reference[row]);
                    }
                }
                _ => break,
            }
        }

        reference.reverse();
        markup.reverse();
        query.reverse();
        Alignment {
            reference,
            markup,
            query,
        }
    }
}

fn maximum(a: f32, b: f32, c: f32) -> f32 {
    if a <= 0.0 && b <= 0.0 && c <= 0.0 {
        return 0.0;
    }
    a.max(b.max(c))
}

/// Run one parameter set and report whether the result passes the filter.
fn run(reference: &[u8], query: &[u8], mode: SwMode, max_mismatches: f32) -> (Alignment, bool) {
    let alignment = SmithWatermanGotoh::new(reference, query, mode.params()).traceback();
    let passes = !alignment.is_empty()
        && (alignment.mismatches() as f32) < max_mismatches
        && alignment.gap_blocks() < MAX_GAP_BLOCKS;
    (alignment, passes)
}

/// Align with the preferred parameter set, falling back to the other one.
///
/// A query with more than two `N`s always prefers the lenient set. The other
/// set is also run when the first result fails the filter or has
/// `RETRY_GAP_BLOCKS` or more gap blocks; when both pass, the alignment with
/// fewer gap blocks wins, ties going to the higher score. Returns `None` when
/// nothing passes. The second value is the number of alignments computed.
pub fn align_best(reference: &[u8], query: &[u8], prefer: SwMode) -> (Option<Alignment>, usize) {
    if reference.is_empty() || query.is_empty() {
        return (None, 0);
    }
    let n_count = count_ambiguous(query);
    let max_mismatches = MAX_MISMATCH_FRACTION * query.len() as f32 + n_count as f32;
    let first_mode = if n_count > 2 { SwMode::Lenient } else { prefer };

    let (first, first_passes) = run(reference, query, first_mode, max_mismatches);
    if first_passes && first.gap_blocks() < RETRY_GAP_BLOCKS {
        return (Some(first), 1);
    }

    let (second, second_passes) = run(reference, query, first_mode.other(), max_mismatches);
    let chosen = match (first_passes, second_passes) {
        (true, true) => {
            let keep_first = first.gap_blocks() < second.gap_blocks()
                || (first.gap_blocks() == second.gap_blocks() && first.score() >= second.score());
            Some(if keep_first { first } else { second })
        }
        (true, false) => Some(first),
        (false, true) => Some(second),
        (false, false) => None,
    };
    (chosen, 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markup(a: &Alignment) -> String {
        String::from_utf8(a.markup.clone()).unwrap()
    }

    #[test]
    fn test_identical_sequences() {
        let seq = b"ACGTTGCAAGGCTTACCGATG";
        let a = SmithWatermanGotoh::new(seq, seq, SwParams::LENIENT).traceback();
        assert_eq!(a.reference, seq.to_vec());
        assert_eq!(a.query, seq.to_vec());
        assert_eq!(a.matches(), seq.len());
        assert_eq!(a.score(), seq.len() as i64);
    }

    #[test]
    fn test_query_inside_longer_reference() {
        let reference = b"TTTTTTTTTTACGTTGCAAGGCTTACCGATGTTTTTTTTTT";
        let query = b"ACGTTGCAAGGCTTACCGATG";
        let a = SmithWatermanGotoh::new(reference, query, SwParams::STRICT).traceback();
        assert_eq!(a.query, query.to_vec());
        assert_eq!(a.mismatches(), 0);
        assert_eq!(a.gap_blocks(), 0);
    }

    #[test]
    fn test_single_mismatch() {
        let reference = b"GGATCCACGTTGCAAGGCTTACCGATGCATCGGATCCAAT";
        let query = b"ACGTTGCAAGGATTACCGATGCATCG";
        let a = SmithWatermanGotoh::new(reference, query, SwParams::LENIENT).traceback();
        assert_eq!(a.mismatches(), 1);
        assert_eq!(a.matches(), query.len() - 1);
        assert_eq!(markup(&a), "|||||||||||.||||||||||||||");
    }

    #[test]
    fn test_deletion_in_query() {
        let reference = b"ACGTTGCAAGGCTTACCGATGCATCGGATCCAATGGCATTCAG";
        // drop "GATG" from the middle
        let query = b"ACGTTGCAAGGCTTACCCATCGGATCCAATGGCATTCAG";
        let a = SmithWatermanGotoh::new(reference, query, SwParams::LENIENT).traceback();
        assert_eq!(a.gap_blocks(), 1);
        assert_eq!(a.gap_bases(), 4);
        assert!(a.query.contains(&b'-'));
        assert_eq!(a.blocks().len(), 2);
    }

    #[test]
    fn test_no_similarity_gives_empty() {
        let a = SmithWatermanGotoh::new(b"AAAAAAAA", b"CCCCCCCC", SwParams::STRICT).traceback();
        assert!(a.is_empty());
    }

    #[test]
    fn test_gap_runs() {
        assert_eq!(gap_runs(b"||  ||.| |", b' '), 2);
        assert_eq!(gap_runs(b"  ||", b' '), 1);
        assert_eq!(gap_runs(b"||||", b' '), 0);
    }

    #[test]
    fn test_blocks() {
        let a = Alignment {
            reference: b"ACG--TAC".to_vec(),
            markup: b"|||  |.|".to_vec(),
            query: b"ACGTTTGC".to_vec(),
        };
        assert_eq!(a.blocks(), vec![(0, 3), (5, 3)]);
        assert_eq!(a.score(), 4 - 1 - 1);
    }

    #[test]
    fn test_align_best_prefers_strict() {
        let reference = b"GGATCCACGTTGCAAGGCTTACCGATGCATCGGATCCAATGGCATTCAGAT";
        let query = b"ACGTTGCAAGGCTTACCGATGCATCGGATCCAATGG";
        let (a, runs) = align_best(reference, query, SwMode::Strict);
        let a = a.unwrap();
        assert_eq!(runs, 1);
        assert_eq!(a.matches(), query.len());
    }

    #[test]
    fn test_align_best_rejects_noise() {
        let reference = b"ACGTACGTACGTACGTACGTACGTACGTACGTACGTACGT";
        let query = b"TTGGCCAATTGGCCAATTGGCCAATTGGCCAATTGG";
        let (a, _) = align_best(reference, query, SwMode::Strict);
        assert!(a.is_none());
    }

    #[test]
    fn test_align_best_empty_input() {
        assert_eq!(align_best(b"", b"ACGT", SwMode::Strict), (None, 0));
    }
}
