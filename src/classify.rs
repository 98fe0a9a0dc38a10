/// Diagnostic buckets for how well a query's best chain covers it.
use std::fmt;

use crate::align::chain::CandidateSet;
use crate::index::tile::TILE_LENGTH;

/// Occurrence counts below this are "low".
pub const LOW_OCCURRENCE_MAX: usize = 100;

/// Coverage of the query by its best chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchCoverage {
    PerfectMatch,
    FirstQuartile,
    SecondQuartile,
    ThirdQuartile,
    FourthQuartile,
    Unknown,
}

impl MatchCoverage {
    pub const ALL: [MatchCoverage; 6] = [
        MatchCoverage::PerfectMatch,
        MatchCoverage::FirstQuartile,
        MatchCoverage::SecondQuartile,
        MatchCoverage::ThirdQuartile,
        MatchCoverage::FourthQuartile,
        MatchCoverage::Unknown,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    fn quartile(i: usize) -> Self {
        match i {
            1 => MatchCoverage::FirstQuartile,
            2 => MatchCoverage::SecondQuartile,
            3 => MatchCoverage::ThirdQuartile,
            _ => MatchCoverage::FourthQuartile,
        }
    }
}

/// How many positions share the best chain quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occurrence {
    Single,
    Low,
    High,
}

impl Occurrence {
    pub const ALL: [Occurrence; 3] = [Occurrence::Single, Occurrence::Low, Occurrence::High];

    pub fn from_count(count: usize) -> Self {
        match count {
            0 | 1 => Occurrence::Single,
            n if n < LOW_OCCURRENCE_MAX => Occurrence::Low,
            _ => Occurrence::High,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchClass {
    pub coverage: MatchCoverage,
    pub occurrence: Occurrence,
}

impl fmt::Display for MatchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.coverage, self.occurrence)
    }
}

/// Bucket a query by the exact-tile count of its best chain.
///
/// A perfect chain has `query_len - 12` tiles. Below that, the quartile is
/// the first `i` in `1..=4` with `max > perfect - i * (perfect / 4)`.
pub fn classify(query_len: usize, candidates: &CandidateSet) -> MatchClass {
    let Some((max_exact, count)) = candidates.max_exact() else {
        return MatchClass {
            coverage: MatchCoverage::Unknown,
            occurrence: Occurrence::Single,
        };
    };
    let occurrence = Occurrence::from_count(count);
    if query_len < TILE_LENGTH {
        return MatchClass {
            coverage: MatchCoverage::Unknown,
            occurrence,
        };
    }

    let perfect = query_len - (TILE_LENGTH - 1);
    let max = max_exact as usize;
    let coverage = if max == perfect {
        MatchCoverage::PerfectMatch
    } else {
        let quartile = perfect / 4;
        (1..=4)
            .find(|&i| max > perfect - i * quartile)
            .map(MatchCoverage::quartile)
            .unwrap_or(MatchCoverage::Unknown)
    };
    MatchClass {
        coverage,
        occurrence,
    }
}
