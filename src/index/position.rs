use std::fmt;

/// Bit that marks a tile as too common to index.
const COMMON_BIT: u64 = 1 << 63;
/// Bit that marks a position found on the reverse-complemented query.
const REVERSE_BIT: u64 = 1 << 62;
/// Shift of the 16-bit offset-within-query field.
const QUERY_OFFSET_SHIFT: u32 = 40;
const QUERY_OFFSET_MASK: u64 = 0xFFFF << QUERY_OFFSET_SHIFT;

/// Largest query offset the packed field holds.
pub const MAX_QUERY_OFFSET: usize = 0xFFFF;
/// Low bits hold the linear genome coordinate (or the occurrence count of a
/// too-common tile).
const COORDINATE_MASK: u64 = (1 << QUERY_OFFSET_SHIFT) - 1;

/// A genome position packed into one 64-bit word.
///
/// Layout:
/// - bits 0..40: linear genome coordinate
/// - bits 40..56: offset of the anchoring tile within the query
/// - bit 62: reverse strand
/// - bit 63: too-common sentinel
///
/// Positions stored in the tile index never carry a query offset or strand;
/// those are stamped on by the chain matcher.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PackedPosition(u64);

impl PackedPosition {
    /// Largest linear coordinate that fits the layout.
    pub const MAX_COORDINATE: u64 = COORDINATE_MASK;

    /// A plain forward-strand genome coordinate.
    pub fn new(coordinate: u64) -> Self {
        debug_assert!(coordinate <= COORDINATE_MASK);
        Self(coordinate & COORDINATE_MASK)
    }

    /// Sentinel for a tile too common to index, remembering its count.
    pub fn common(count: u64) -> Self {
        Self(COMMON_BIT | (count & COORDINATE_MASK))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn is_common(self) -> bool {
        self.0 & COMMON_BIT != 0
    }

    /// Linear genome coordinate. Meaningless for a sentinel.
    pub fn coordinate(self) -> u64 {
        self.0 & COORDINATE_MASK
    }

    /// Occurrence count carried by a sentinel.
    pub fn common_count(self) -> Option<u64> {
        self.is_common().then_some(self.0 & COORDINATE_MASK)
    }

    pub fn is_reverse(self) -> bool {
        self.0 & REVERSE_BIT != 0
    }

    pub fn query_offset(self) -> usize {
        ((self.0 & QUERY_OFFSET_MASK) >> QUERY_OFFSET_SHIFT) as usize
    }

    /// Copy with the query-offset field replaced.
    pub fn with_query_offset(self, offset: usize) -> Self {
        debug_assert!(offset <= MAX_QUERY_OFFSET);
        let field = ((offset as u64) << QUERY_OFFSET_SHIFT) & QUERY_OFFSET_MASK;
        Self((self.0 & !QUERY_OFFSET_MASK) | field)
    }

    /// Copy with the reverse-strand flag set or cleared.
    pub fn with_reverse(self, reverse: bool) -> Self {
        if reverse {
            Self(self.0 | REVERSE_BIT)
        } else {
            Self(self.0 & !REVERSE_BIT)
        }
    }

    /// Copy with only the coordinate changed.
    pub fn with_coordinate(self, coordinate: u64) -> Self {
        Self((self.0 & !COORDINATE_MASK) | (coordinate & COORDINATE_MASK))
    }
}

impl fmt::Debug for PackedPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(count) = self.common_count() {
            return write!(f, "Common({count})");
        }
        write!(
            f,
            "{}{}@q{}",
            self.coordinate(),
            if self.is_reverse() { "-" } else { "+" },
            self.query_offset()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_coordinate() {
        let p = PackedPosition::new(123_456_789);
        assert_eq!(p.coordinate(), 123_456_789);
        assert!(!p.is_common());
        assert!(!p.is_reverse());
        assert_eq!(p.query_offset(), 0);
    }

    #[test]
    fn test_fields_are_independent() {
        let p = PackedPosition::new(3_000_000_000)
            .with_query_offset(517)
            .with_reverse(true);
        assert_eq!(p.coordinate(), 3_000_000_000);
        assert_eq!(p.query_offset(), 517);
        assert!(p.is_reverse());
        assert!(!p.is_common());

        let q = p.with_reverse(false).with_query_offset(2);
        assert_eq!(q.coordinate(), 3_000_000_000);
        assert_eq!(q.query_offset(), 2);
        assert!(!q.is_reverse());
    }

    #[test]
    fn test_common_sentinel() {
        let c = PackedPosition::common(42_000);
        assert!(c.is_common());
        assert_eq!(c.common_count(), Some(42_000));
        assert_eq!(PackedPosition::new(5).common_count(), None);
    }

    #[test]
    fn test_with_coordinate_keeps_flags() {
        let p = PackedPosition::new(10)
            .with_query_offset(7)
            .with_reverse(true)
            .with_coordinate(99);
        assert_eq!(p.coordinate(), 99);
        assert_eq!(p.query_offset(), 7);
        assert!(p.is_reverse());
    }

    #[test]
    fn test_ordering_follows_coordinate_for_index_entries() {
        let mut v = vec![
            PackedPosition::new(30),
            PackedPosition::new(10),
            PackedPosition::new(20),
        ];
        v.sort();
        let coords: Vec<u64> = v.iter().map(|p| p.coordinate()).collect();
        assert_eq!(coords, vec![10, 20, 30]);
    }

    #[test]
    fn test_raw_roundtrip() {
        let p = PackedPosition::new(77).with_query_offset(3);
        assert_eq!(PackedPosition::from_raw(p.raw()), p);
    }
}
