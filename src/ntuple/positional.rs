use crate::engine::Board;

use super::{hint_bucket, zeroed_table, Indices, Tuple, Weight, HINT_BUCKETS};

/// Cell layout of a positional tuple, anchored on column `c` of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// All four cells of column `c` and the top two of column `c + 1` (6 cells).
    Axe,
    /// The bottom three cells of columns `c` and `c + 1` (2x3, 6 cells).
    Rectangle,
    /// The four cells of column `c`.
    Line,
}

impl Shape {
    fn pattern_bits(self) -> u32 {
        match self {
            Shape::Axe | Shape::Rectangle => 24,
            Shape::Line => 16,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Shape::Axe => "axe",
            Shape::Rectangle => "rect",
            Shape::Line => "line",
        }
    }
}

/// A fixed set of cells read at all eight symmetric placements, sharing one table.
pub struct PatternTuple {
    shape: Shape,
    column: usize,
    hinted: bool,
    weights: Box<[Weight]>,
}

impl PatternTuple {
    /// `column` anchors the shape: 0 for the outer edge, 1 for the inner lines.
    pub fn new(shape: Shape, column: usize, hinted: bool) -> Self {
        let max_column = match shape {
            Shape::Line => 3,
            Shape::Axe | Shape::Rectangle => 2,
        };
        assert!(column <= max_column, "{} tuple cannot start at column {column}", shape.name());
        PatternTuple { shape, column, hinted, weights: zeroed_table(Self::table_len(shape, hinted)) }
    }

    /// Number of weights a tuple of this shape allocates.
    pub fn table_len(shape: Shape, hinted: bool) -> usize {
        let patterns = 1usize << shape.pattern_bits();
        if hinted { patterns * HINT_BUCKETS as usize } else { patterns }
    }

    pub fn axe(column: usize, hinted: bool) -> Self { Self::new(Shape::Axe, column, hinted) }

    pub fn rectangle(column: usize, hinted: bool) -> Self { Self::new(Shape::Rectangle, column, hinted) }

    pub fn line(column: usize, hinted: bool) -> Self { Self::new(Shape::Line, column, hinted) }

    /// Index for the canonical placement of the shape on `board`.
    pub fn index_of(&self, board: &Board) -> u32 {
        let c = self.column;
        let pattern = match self.shape {
            Shape::Axe => (board.column(c) as u32) << 8 | (board.column(c + 1) as u32 & 0xff),
            Shape::Rectangle => (board.column(c) as u32 & 0xfff0) << 8 | (board.column(c + 1) as u32) >> 4,
            Shape::Line => board.column(c) as u32,
        };
        if self.hinted {
            pattern << 2 | hint_bucket(board.hint())
        } else {
            pattern
        }
    }
}

impl Tuple for PatternTuple {
    fn describe(&self) -> String {
        format!("{}@{}{}", self.shape.name(), self.column, if self.hinted { "+hint" } else { "" })
    }

    fn indices(&self, board: &Board) -> Indices {
        Indices::symmetric(board, |image| self.index_of(image))
    }

    fn weights(&self) -> &[Weight] { &self.weights }

    fn weights_mut(&mut self) -> &mut [Weight] { &mut self.weights }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{self, Move};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_board(rng: &mut StdRng) -> Board {
        let mut b = Board::with_hint(0, rng.gen_range(1..4));
        for i in 0..16 {
            b.set(i, rng.gen_range(0..10));
        }
        b
    }

    fn close(a: f32, b: f32) -> bool { (a - b).abs() <= 1e-4 * (1.0 + a.abs().max(b.abs())) }

    #[test]
    fn index_layout() {
        let mut b = Board::EMPTY;
        // column 0 = [1, 2, 3, 4] top to bottom, column 1 = [5, 6, 7, 8]
        for r in 0..4 {
            b.set(r * 4, r as u8 + 1);
            b.set(r * 4 + 1, r as u8 + 5);
        }
        assert_eq!(PatternTuple::line(0, false).index_of(&b), 0x4321);
        assert_eq!(PatternTuple::axe(0, false).index_of(&b), 0x4321_65);
        assert_eq!(PatternTuple::rectangle(0, false).index_of(&b), 0x432_876);
        b.set_hint(3);
        assert_eq!(PatternTuple::line(0, true).index_of(&b), 0x4321 << 2 | 2);
    }

    #[test]
    fn table_sizes() {
        assert_eq!(PatternTuple::line(0, false).weights().len(), 1 << 16);
        assert_eq!(PatternTuple::line(1, true).weights().len(), 1 << 18);
        assert_eq!(PatternTuple::table_len(Shape::Axe, true), 1 << 26);
        assert_eq!(PatternTuple::table_len(Shape::Rectangle, false), 1 << 24);
    }

    #[test]
    fn update_is_shared_across_symmetries() {
        engine::new();
        let mut rng = StdRng::seed_from_u64(3);
        for (shape, hinted) in [(Shape::Line, false), (Shape::Rectangle, false), (Shape::Axe, true)] {
            let b = random_board(&mut rng);
            let mut tuple = PatternTuple::new(shape, 1, hinted);
            tuple.update(&b, 0.25);
            let base = tuple.value(&b);
            assert!(base > 0.0);
            for image in b.symmetries() {
                assert!(close(tuple.value(&image), base), "{}", tuple.describe());
            }
        }
    }

    #[test]
    fn update_on_any_image_has_the_same_effect() {
        let mut rng = StdRng::seed_from_u64(5);
        let b = random_board(&mut rng);
        let mut canonical = PatternTuple::line(0, true);
        canonical.update(&b, 1.0);
        for image in b.symmetries() {
            let mut other = PatternTuple::line(0, true);
            other.update(&image, 1.0);
            assert_eq!(other.weights(), canonical.weights());
        }
    }

    #[test]
    fn aliased_placements_are_updated_once() {
        // Every placement of the empty board reads the same all-zero pattern.
        let mut tuple = PatternTuple::line(0, false);
        tuple.update(&Board::EMPTY, 1.0);
        assert_eq!(tuple.weights()[0], 1.0);
        assert_eq!(tuple.weights().iter().filter(|&&w| w != 0.0).count(), 1);
        assert_eq!(tuple.value(&Board::EMPTY), 8.0);
    }

    #[test]
    fn hint_selects_separate_entries() {
        engine::new();
        let b = Board::with_hint(0x0000_0000_0000_0321, 1).shift(Move::Left);
        let mut tuple = PatternTuple::line(0, true);
        tuple.update(&b, 1.0);
        let mut other_hint = b;
        other_hint.set_hint(2);
        assert_eq!(tuple.value(&other_hint), 0.0);
    }
}
