use crate::engine::Board;

use super::{hint_bucket, zeroed_table, Indices, Tuple, Weight, HINT_BUCKETS};

/// Lowest rank counted by [`CountKind::LargeTiles`].
const LARGE_RANK: u8 = 10;

/// Whole-board statistics that ignore where tiles sit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountKind {
    /// Number of empty cells (0..=16).
    Empty,
    /// Bitmask of the ranks present on the board.
    DistinctRanks,
    /// Adjacent pairs that would merge if pushed together (0..=24).
    Mergeable,
    /// For each rank from 10 to 15, how many such tiles exist, capped at 3.
    LargeTiles,
    /// Adjacent tiles one rank apart that cannot merge (0..=24); 1 next to 2 merges instead.
    NeighborRanks,
}

impl CountKind {
    fn domain(self) -> usize {
        match self {
            CountKind::Empty => 17,
            CountKind::DistinctRanks => 1 << 15,
            CountKind::Mergeable | CountKind::NeighborRanks => 25,
            CountKind::LargeTiles => 1 << (2 * (16 - LARGE_RANK as usize)),
        }
    }

    fn name(self) -> &'static str {
        match self {
            CountKind::Empty => "empty",
            CountKind::DistinctRanks => "distinct",
            CountKind::Mergeable => "mergeable",
            CountKind::LargeTiles => "large",
            CountKind::NeighborRanks => "neighbor",
        }
    }

    fn measure(self, board: &Board) -> u32 {
        match self {
            CountKind::Empty => board.count_empty(),
            CountKind::DistinctRanks => distinct_ranks(board),
            CountKind::Mergeable => count_pairs(board, can_merge),
            CountKind::LargeTiles => large_tiles(board),
            CountKind::NeighborRanks => {
                count_pairs(board, |a, b| a != 0 && b != 0 && a.abs_diff(b) == 1 && !can_merge(a, b))
            }
        }
    }
}

/// A count-based feature. The statistic is invariant under symmetry, so one placement is read.
pub struct CountTuple {
    kind: CountKind,
    hinted: bool,
    weights: Box<[Weight]>,
}

impl CountTuple {
    pub fn new(kind: CountKind, hinted: bool) -> Self {
        CountTuple { kind, hinted, weights: zeroed_table(Self::table_len(kind, hinted)) }
    }

    pub fn table_len(kind: CountKind, hinted: bool) -> usize {
        if hinted { kind.domain() * HINT_BUCKETS as usize } else { kind.domain() }
    }

    pub fn index_of(&self, board: &Board) -> u32 {
        let measure = self.kind.measure(board);
        debug_assert!((measure as usize) < self.kind.domain());
        if self.hinted { measure << 2 | hint_bucket(board.hint()) } else { measure }
    }
}

impl Tuple for CountTuple {
    fn describe(&self) -> String {
        format!("{}{}", self.kind.name(), if self.hinted { "+hint" } else { "" })
    }

    fn indices(&self, board: &Board) -> Indices { Indices::one(self.index_of(board)) }

    fn weights(&self) -> &[Weight] { &self.weights }

    fn weights_mut(&mut self) -> &mut [Weight] { &mut self.weights }
}

fn can_merge(a: u8, b: u8) -> bool {
    (a == 1 && b == 2) || (a == 2 && b == 1) || (a == b && a >= 3)
}

fn distinct_ranks(board: &Board) -> u32 {
    (0..16).fold(0, |mask, i| match board.get(i) {
        0 => mask,
        rank => mask | 1 << (rank - 1),
    })
}

fn large_tiles(board: &Board) -> u32 {
    let mut counts = [0u32; (16 - LARGE_RANK) as usize];
    for i in 0..16 {
        let rank = board.get(i);
        if rank >= LARGE_RANK {
            counts[(rank - LARGE_RANK) as usize] += 1;
        }
    }
    counts.iter().enumerate().fold(0, |index, (k, &n)| index | n.min(3) << (2 * k))
}

// Horizontal and vertical neighbours, 24 pairs in total.
fn count_pairs(board: &Board, pred: impl Fn(u8, u8) -> bool) -> u32 {
    let mut count = 0;
    for r in 0..4 {
        for c in 0..4 {
            let here = board.get(r * 4 + c);
            if c < 3 && pred(here, board.get(r * 4 + c + 1)) {
                count += 1;
            }
            if r < 3 && pred(here, board.get(r * 4 + c + 4)) {
                count += 1;
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_from_cells(cells: [u8; 16], hint: u8) -> Board {
        let mut b = Board::with_hint(0, hint);
        for (i, &rank) in cells.iter().enumerate() {
            b.set(i, rank);
        }
        b
    }

    #[test]
    fn it_measures() {
        let b = board_from_cells([1, 2, 0, 0, 3, 3, 0, 0, 4, 0, 10, 10, 0, 0, 0, 15], 1);
        assert_eq!(CountKind::Empty.measure(&b), 8);
        assert_eq!(CountKind::DistinctRanks.measure(&b), 0b100_0010_0000_1111);
        // 1-2 across, 3-3 across, 10-10 across
        assert_eq!(CountKind::Mergeable.measure(&b), 3);
        // 2 above 3, 3 above 4
        assert_eq!(CountKind::NeighborRanks.measure(&b), 2);
        assert_eq!(CountKind::LargeTiles.measure(&b), 1 << 10 | 0b10);
    }

    #[test]
    fn neighbor_ranks_skip_only_merging_pairs() {
        // 2-3 counts, 3-1 is two ranks apart, 1-2 merges
        let row = board_from_cells([2, 3, 1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], 1);
        assert_eq!(CountKind::NeighborRanks.measure(&row), 1);
        assert_eq!(CountKind::Mergeable.measure(&row), 1);
        let column = board_from_cells([2, 0, 0, 0, 3, 0, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0], 1);
        assert_eq!(CountKind::NeighborRanks.measure(&column), 2);
    }

    #[test]
    fn measures_fit_their_domain() {
        let full = board_from_cells([3; 16], 2);
        assert_eq!(CountKind::Mergeable.measure(&full), 24);
        assert!(CountKind::Mergeable.measure(&full) < CountKind::Mergeable.domain() as u32);
        let large = board_from_cells([15, 15, 15, 15, 14, 14, 14, 14, 13, 13, 13, 13, 12, 12, 12, 12], 4);
        assert!((CountKind::LargeTiles.measure(&large) as usize) < CountKind::LargeTiles.domain());
        assert_eq!(CountKind::DistinctRanks.domain(), 1 << 15);
        assert_eq!(CountKind::Empty.measure(&Board::EMPTY), 16);
    }

    #[test]
    fn hinted_count_updates_one_entry() {
        let b = board_from_cells([1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], 3);
        let mut tuple = CountTuple::new(CountKind::Empty, true);
        assert_eq!(tuple.weights().len(), 17 * 4);
        tuple.update(&b, 2.0);
        assert_eq!(tuple.value(&b), 2.0);
        assert_eq!(tuple.weights()[(14 << 2) | 2], 2.0);
        for image in b.symmetries() {
            assert_eq!(tuple.value(&image), 2.0);
        }
    }
}
