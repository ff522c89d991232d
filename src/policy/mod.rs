//! Move selection over after-states.
//!
//! A policy looks at every slide that changes the board, scores the resulting
//! after-state with an [`Evaluator`] and returns the best direction. The greedy
//! rule is [`select`]: `score(after) - score(before) + V(after)`. [`Expectimax`]
//! looks further ahead by averaging over the environment's next placement.
//!
//! ```
//! use ai_threes::engine::{self, Board, Move};
//! use ai_threes::policy::{self, Heuristic};
//!
//! engine::new();
//! let board = Board::with_hint(0x0000_0000_0000_0021, 1);
//! let choice = policy::select(&board, &Heuristic).unwrap();
//! assert_ne!(choice.after, board);
//! ```

mod expectimax;

use crate::engine::{Board, Move, Reward};
use crate::ntuple::NTupleNetwork;

pub use expectimax::{BranchEval, Expectimax, ExpectimaxConfig, SearchStats};

/// Scores an after-state.
pub trait Evaluator {
    fn evaluate(&self, after: &Board) -> f32;
}

impl Evaluator for NTupleNetwork {
    #[inline]
    fn evaluate(&self, after: &Board) -> f32 { self.value(after) }
}

impl<E: Evaluator + ?Sized> Evaluator for &E {
    #[inline]
    fn evaluate(&self, after: &Board) -> f32 { (**self).evaluate(after) }
}

/// The hand-tuned line heuristic from the engine tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct Heuristic;

impl Evaluator for Heuristic {
    #[inline]
    fn evaluate(&self, after: &Board) -> f32 { after.heuristic_score() }
}

/// A scored candidate move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Choice {
    pub dir: Move,
    pub after: Board,
    /// Board-score delta of the slide.
    pub reward: Reward,
    /// `reward` plus the evaluation of `after`.
    pub value: f32,
}

/// Best slide by `reward + V(after)`, or `None` if no slide changes the board.
///
/// Ties go to the first direction in [`Move::ALL`] order.
pub fn select<E: Evaluator + ?Sized>(board: &Board, eval: &E) -> Option<Choice> {
    let before = board.score();
    let mut best: Option<Choice> = None;
    for (dir, after, _) in board.legal_moves() {
        let reward = after.score() - before;
        let value = reward + eval.evaluate(&after);
        if best.map_or(true, |b| value > b.value) {
            best = Some(Choice { dir, after, reward, value });
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine;

    struct Fixed(f32);

    impl Evaluator for Fixed {
        fn evaluate(&self, _: &Board) -> f32 { self.0 }
    }

    fn board_from_cells(cells: [u8; 16], hint: u8) -> Board {
        let mut b = Board::with_hint(0, hint);
        for (i, &rank) in cells.iter().enumerate() {
            b.set(i, rank);
        }
        b
    }

    #[test]
    fn prefers_the_merge() {
        engine::new();
        // Only a horizontal slide merges the 1 and the 2.
        let b = board_from_cells([1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], 1);
        let choice = select(&b, &Fixed(0.0)).unwrap();
        assert_eq!(choice.dir, Move::Left);
        assert_eq!(choice.reward, 3.0);
        assert_eq!(choice.value, 3.0);
        assert_eq!(choice.after.get(0), 3);
        assert_eq!(choice.after.hint(), 1);
    }

    #[test]
    fn skips_no_op_slides() {
        engine::new();
        // Tile in the top-left corner: Up and Left change nothing.
        let b = board_from_cells([5, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], 2);
        let choice = select(&b, &Fixed(1.0)).unwrap();
        assert_eq!(choice.dir, Move::Right);
        assert_eq!(choice.reward, 0.0);
    }

    #[test]
    fn terminal_board_has_no_choice() {
        engine::new();
        let b = board_from_cells([3, 4, 3, 4, 4, 3, 4, 3, 3, 4, 3, 4, 4, 3, 4, 3], 1);
        assert!(b.is_terminal());
        assert_eq!(select(&b, &Heuristic), None);
    }

    #[test]
    fn network_evaluator_breaks_ties() {
        engine::new();
        let b = board_from_cells([0, 0, 0, 0, 0, 5, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], 1);
        assert_eq!(select(&b, &Fixed(0.0)).unwrap().dir, Move::Up);
        let mut net = NTupleNetwork::from_preset(crate::ntuple::NetworkPreset::Compact);
        net.update(&b.shift(Move::Down), 1.0);
        assert!(net.evaluate(&b.shift(Move::Down)) > net.evaluate(&b.shift(Move::Up)));
        // Right and Down leave mirror images of each other.
        assert_eq!(net.evaluate(&b.shift(Move::Right)), net.evaluate(&b.shift(Move::Down)));
        assert_eq!(select(&b, &net).unwrap().dir, Move::Right);
    }
}
