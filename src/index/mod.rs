pub mod builder;
pub mod generate;
pub mod io;
pub mod position;
pub mod tile;

use std::collections::HashMap;

pub use builder::TileIndexBuilder;
pub use position::PackedPosition;

/// Immutable map from tile key to the genome positions of that tile.
///
/// Each entry is either an ascending list of forward-strand positions or a
/// single too-common sentinel. Nothing is mutated after the builder hands the
/// index over, so it can be shared across alignment threads without locking.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TileIndex {
    entries: HashMap<u32, Box<[PackedPosition]>>,
}

impl TileIndex {
    pub(crate) fn from_entries(entries: HashMap<u32, Box<[PackedPosition]>>) -> Self {
        Self { entries }
    }

    /// Positions for a tile key. Empty when the tile is absent; a single
    /// sentinel when the tile is too common.
    pub fn lookup(&self, key: u32) -> &[PackedPosition] {
        self.entries.get(&key).map(|v| &v[..]).unwrap_or(&[])
    }

    /// Positions for a 13-base window taken from a query.
    ///
    /// A window with one `N` gathers the positions of all four substitutions;
    /// if any substitution is too common, the window is too common. Windows
    /// with more than one `N` (or other symbols) match nothing.
    pub fn lookup_window(&self, window: &[u8]) -> Vec<PackedPosition> {
        if let Some(key) = tile::encode(window) {
            return self.lookup(key).to_vec();
        }

        let mut gathered: Vec<PackedPosition> = Vec::new();
        for concrete in tile::expand_ambiguous(window) {
            let Some(key) = tile::encode(&concrete) else {
                continue;
            };
            let hits = self.lookup(key);
            if let Some(&common) = hits.iter().find(|p| p.is_common()) {
                return vec![common];
            }
            gathered.extend_from_slice(hits);
        }
        gathered.sort_unstable();
        gathered.dedup();
        gathered
    }

    /// Number of distinct tiles present.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of tiles flagged as too common.
    pub fn n_common(&self) -> usize {
        self.entries
            .values()
            .filter(|v| v.first().is_some_and(|p| p.is_common()))
            .count()
    }

    /// Total number of stored positions (sentinels excluded).
    pub fn n_positions(&self) -> usize {
        self.entries
            .values()
            .filter(|v| !v.first().is_some_and(|p| p.is_common()))
            .map(|v| v.len())
            .sum()
    }

    /// Entries in ascending key order.
    pub fn iter_sorted(&self) -> impl Iterator<Item = (u32, &[PackedPosition])> {
        let mut keys: Vec<u32> = self.entries.keys().copied().collect();
        keys.sort_unstable();
        keys.into_iter().map(move |k| (k, self.lookup(k)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(entries: &[(&[u8], Vec<PackedPosition>)]) -> TileIndex {
        let map = entries
            .iter()
            .map(|(tile, positions)| {
                (
                    tile::encode(tile).unwrap(),
                    positions.clone().into_boxed_slice(),
                )
            })
            .collect();
        TileIndex::from_entries(map)
    }

    #[test]
    fn test_lookup_absent_is_empty() {
        let index = TileIndex::default();
        assert!(index.lookup(12345).is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn test_lookup_window_exact() {
        let index = index_with(&[(
            b"ACGTACGTACGTA",
            vec![PackedPosition::new(5), PackedPosition::new(900)],
        )]);
        let hits = index.lookup_window(b"ACGTACGTACGTA");
        assert_eq!(hits, vec![PackedPosition::new(5), PackedPosition::new(900)]);
        assert_eq!(index.n_positions(), 2);
        assert_eq!(index.n_common(), 0);
    }

    #[test]
    fn test_lookup_window_single_n_gathers_substitutions() {
        let index = index_with(&[
            (b"ACGTACGTACGTA", vec![PackedPosition::new(50)]),
            (b"ACGTACGTACGTT", vec![PackedPosition::new(7)]),
        ]);
        let hits = index.lookup_window(b"ACGTACGTACGTN");
        assert_eq!(hits, vec![PackedPosition::new(7), PackedPosition::new(50)]);
    }

    #[test]
    fn test_lookup_window_common_substitution_wins() {
        let index = index_with(&[
            (b"ACGTACGTACGTA", vec![PackedPosition::new(50)]),
            (b"ACGTACGTACGTC", vec![PackedPosition::common(9000)]),
        ]);
        let hits = index.lookup_window(b"ACGTACGTACGTN");
        assert_eq!(hits.len(), 1);
        assert!(hits[0].is_common());
        assert_eq!(index.n_common(), 1);
    }

    #[test]
    fn test_lookup_window_two_n_matches_nothing() {
        let index = index_with(&[(b"ACGTACGTACGTA", vec![PackedPosition::new(50)])]);
        assert!(index.lookup_window(b"ACGTNCGTACGTN").is_empty());
    }

    #[test]
    fn test_iter_sorted_orders_keys() {
        let index = index_with(&[
            (b"TTTTTTTTTTTTT", vec![PackedPosition::new(1)]),
            (b"AAAAAAAAAAAAA", vec![PackedPosition::new(2)]),
        ]);
        let keys: Vec<u32> = index.iter_sorted().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![0, tile::TILE_KEY_SPACE - 1]);
    }
}
