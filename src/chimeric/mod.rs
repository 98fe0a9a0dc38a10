// Split/compound alignment module
//
// Handles queries that span a rearrangement breakpoint and so match two
// independent loci:
// - Inter-contig or opposite-strand pairs (two records)
// - Same contig and strand within 500 kb (one two-block record)
// - Deletions bridged by the first and last tile (split shortcut)

mod assemble;
mod segment;

pub use assemble::{SplitAssembler, SplitOutcome};
pub use segment::SplitSegment;
