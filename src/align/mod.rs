pub mod chain;
pub mod record;
pub mod sw;
pub mod tiled;

// Re-export commonly used types
pub use chain::{CandidateSet, Chain, ChainMatcher, MatchQuality};
pub use record::{AlignmentRecord, Block, Strand};
pub use sw::{align_best, Alignment, SmithWatermanGotoh, SwMode, SwParams};
pub use tiled::{AlignOptions, TiledAligner};
