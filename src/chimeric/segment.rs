// Split-read segment types

use crate::align::chain::Chain;
use crate::align::record::{AlignmentRecord, Block, Strand};

/// One verified piece of a split query: a chain resolved to its contig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitSegment {
    /// Chain the segment came from
    pub chain: Chain,
    /// Contig name
    pub contig: String,
    /// Contig length
    pub contig_length: u64,
    /// 0-based contig offset of the first aligned base
    pub target_start: u64,
    /// Start within the strand-specific query
    pub strand_start: usize,
    /// Aligned length
    pub len: usize,
    /// Mismatching bases within the segment
    pub mismatches: usize,
}

impl SplitSegment {
    pub fn strand(&self) -> Strand {
        Strand::from_reverse(self.chain.is_reverse())
    }

    pub fn strand_end(&self) -> usize {
        self.strand_start + self.len
    }

    /// Range covered in forward query coordinates.
    pub fn forward_range(&self, query_len: usize) -> (usize, usize) {
        if self.chain.is_reverse() {
            (query_len - self.strand_end(), query_len - self.strand_start)
        } else {
            (self.strand_start, self.strand_end())
        }
    }

    pub fn block(&self) -> Block {
        Block::new(
            self.strand_start as u64,
            self.target_start,
            self.len as u64,
        )
    }

    /// Drop `n` bases from the start of the segment.
    pub fn trim_front(&mut self, n: usize) {
        let n = n.min(self.len);
        self.strand_start += n;
        self.target_start += n as u64;
        self.len -= n;
    }

    /// Drop `n` bases from the end of the segment.
    pub fn trim_back(&mut self, n: usize) {
        self.len -= n.min(self.len);
    }

    /// Single-block record for this segment alone.
    pub fn to_record(&self, q_name: &str, query_len: usize) -> Option<AlignmentRecord> {
        AlignmentRecord::from_blocks(
            q_name,
            query_len as u64,
            self.strand(),
            &self.contig,
            self.contig_length,
            &[self.block()],
            self.mismatches as u64,
            0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::chain::MatchQuality;
    use crate::index::PackedPosition;

    fn segment(reverse: bool) -> SplitSegment {
        SplitSegment {
            chain: Chain::new(
                MatchQuality::new(63, 0),
                PackedPosition::new(5_000)
                    .with_query_offset(10)
                    .with_reverse(reverse),
            ),
            contig: "chr7".into(),
            contig_length: 100_000,
            target_start: 4_000,
            strand_start: 10,
            len: 75,
            mismatches: 0,
        }
    }

    #[test]
    fn test_forward_range_by_strand() {
        assert_eq!(segment(false).forward_range(150), (10, 85));
        assert_eq!(segment(true).forward_range(150), (65, 140));
    }

    #[test]
    fn test_trim() {
        let mut s = segment(false);
        s.trim_front(5);
        assert_eq!((s.strand_start, s.target_start, s.len), (15, 4_005, 70));
        s.trim_back(100);
        assert_eq!(s.len, 0);
    }

    #[test]
    fn test_to_record() {
        let r = segment(true).to_record("q", 150).unwrap();
        assert_eq!(r.strand, Strand::Reverse);
        assert_eq!((r.q_start, r.q_end), (65, 140));
        assert_eq!(r.q_starts, vec![10]);
        assert_eq!(r.t_start, 4_000);
        assert_eq!(r.matches, 75);
    }
}
