use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::engine::{Board, Move};
use crate::env::Bag;

use super::Evaluator;

/// Configurable knobs for [`Expectimax`].
///
/// - `depth`: player moves searched; 1 is the greedy policy.
/// - `terminal_penalty`: value of a board with no legal slide.
/// - `cache_enabled`: reuse chance-node values within one search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectimaxConfig {
    pub depth: u32,
    pub terminal_penalty: f32,
    pub cache_enabled: bool,
}

impl Default for ExpectimaxConfig {
    fn default() -> Self { Self { depth: 2, terminal_penalty: -1.0e6, cache_enabled: true } }
}

/// Expected value of one root direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchEval {
    pub dir: Move,
    pub ev: f32,
    pub legal: bool,
}

/// Node counts for the last search.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchStats {
    pub nodes: u64,
    pub peak_nodes: u64,
    pub cache_hits: u64,
}

enum Node { Max, Chance(Move) }

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct ChanceKey { raw: u64, hint: u8, dir: Move, bag: Bag }

#[derive(Clone, Copy)]
struct TranspositionEntry { score: f32, depth: u32 }

struct Search<'a, E: ?Sized> {
    cfg: &'a ExpectimaxConfig,
    eval: &'a E,
    map: HashMap<ChanceKey, TranspositionEntry>,
    nodes: u64,
    hits: u64,
}

/// Expectimax over the player's slides and the environment's placements.
///
/// A chance node places the hinted tile on each empty cell of the entry edge
/// and draws each rank the bag can still produce as the next hint, all with
/// equal weight. Bonus tiles are not modelled. At the last ply the after-state
/// is scored by the evaluator.
pub struct Expectimax {
    cfg: ExpectimaxConfig,
    stats: SearchStats,
}

impl Expectimax {
    pub fn new() -> Self { Self::with_config(ExpectimaxConfig::default()) }

    pub fn with_config(cfg: ExpectimaxConfig) -> Self {
        crate::engine::new();
        Self { cfg, stats: SearchStats::default() }
    }

    pub fn config(&self) -> &ExpectimaxConfig { &self.cfg }

    /// Best direction from `board`, whose hint is the tile placed after the slide.
    ///
    /// `bag` holds what the environment can still draw for the hint after that.
    ///
    /// ```
    /// use ai_threes::engine::{self, Board};
    /// use ai_threes::env::Bag;
    /// use ai_threes::policy::{Expectimax, Heuristic};
    /// engine::new();
    /// let board = Board::with_hint(0x0000_0000_0300_0021, 2);
    /// let mut ex = Expectimax::new();
    /// assert!(ex.best_move(&board, &Bag::new(), &Heuristic).is_some());
    /// ```
    pub fn best_move<E: Evaluator + ?Sized>(&mut self, board: &Board, bag: &Bag, eval: &E) -> Option<Move> {
        self.branch_evals(board, bag, eval)
            .into_iter()
            .filter(|b| b.legal)
            .fold(None, |best: Option<BranchEval>, b| match best {
                Some(prev) if prev.ev >= b.ev => Some(prev),
                _ => Some(b),
            })
            .map(|b| b.dir)
    }

    /// Expected value of every direction in [`Move::ALL`] order; no-op slides are marked illegal.
    pub fn branch_evals<E: Evaluator + ?Sized>(&mut self, board: &Board, bag: &Bag, eval: &E) -> [BranchEval; 4] {
        let mut search = Search { cfg: &self.cfg, eval, map: HashMap::new(), nodes: 0, hits: 0 };
        let depth = self.cfg.depth.max(1);
        let before = board.score();
        let mut out = Move::ALL.map(|dir| BranchEval { dir, ev: 0.0, legal: false });
        for (dir, after, _) in board.legal_moves() {
            let ev = after.score() - before + search.expectimax(&after, Node::Chance(dir), depth, bag);
            out[dir.index()] = BranchEval { dir, ev, legal: true };
        }
        self.stats.nodes = search.nodes;
        self.stats.cache_hits = search.hits;
        self.stats.peak_nodes = self.stats.peak_nodes.max(search.nodes);
        out
    }

    /// Value of `board` as a max node.
    pub fn state_value<E: Evaluator + ?Sized>(&mut self, board: &Board, bag: &Bag, eval: &E) -> f32 {
        let best = self.branch_evals(board, bag, eval).into_iter().filter(|b| b.legal).map(|b| b.ev).reduce(f32::max);
        best.unwrap_or(self.cfg.terminal_penalty)
    }

    /// Statistics collected from the last search.
    #[inline]
    pub fn last_stats(&self) -> SearchStats { self.stats }

    #[inline]
    pub fn reset_stats(&mut self) { self.stats = SearchStats::default(); }
}

impl Default for Expectimax { fn default() -> Self { Self::new() } }

impl<E: Evaluator + ?Sized> Search<'_, E> {
    fn expectimax(&mut self, board: &Board, node: Node, depth: u32, bag: &Bag) -> f32 {
        self.nodes += 1;
        match node {
            Node::Max => self.evaluate_max(board, depth, bag),
            Node::Chance(dir) => self.evaluate_chance(board, dir, depth, bag),
        }
    }

    fn evaluate_max(&mut self, board: &Board, depth: u32, bag: &Bag) -> f32 {
        let before = board.score();
        let mut best: Option<f32> = None;
        for (dir, after, _) in board.legal_moves() {
            let score = after.score() - before + self.expectimax(&after, Node::Chance(dir), depth, bag);
            best = Some(best.map_or(score, |b| b.max(score)));
        }
        best.unwrap_or(self.cfg.terminal_penalty)
    }

    fn evaluate_chance(&mut self, after: &Board, dir: Move, depth: u32, bag: &Bag) -> f32 {
        if depth <= 1 {
            return self.eval.evaluate(after);
        }
        let key = ChanceKey { raw: after.raw(), hint: after.hint(), dir, bag: *bag };
        if self.cfg.cache_enabled {
            if let Some(entry) = self.map.get(&key) {
                if entry.depth >= depth {
                    self.hits += 1;
                    return entry.score;
                }
            }
        }
        let tile = after.hint();
        let mut score = 0.0;
        let mut outcomes = 0u32;
        for position in dir.entry_edge() {
            let mut placed = *after;
            if placed.place(position, tile).is_none() {
                continue;
            }
            for next in bag.upcoming() {
                let mut next_bag = *bag;
                next_bag.reveal(next);
                placed.set_hint(next);
                score += self.expectimax(&placed, Node::Max, depth - 1, &next_bag);
                outcomes += 1;
            }
        }
        if outcomes == 0 {
            return self.eval.evaluate(after);
        }
        score /= outcomes as f32;
        if self.cfg.cache_enabled {
            self.map.insert(key, TranspositionEntry { score, depth });
        }
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine;
    use crate::policy::{select, Heuristic};

    struct Zero;

    impl Evaluator for Zero {
        fn evaluate(&self, _: &Board) -> f32 { 0.0 }
    }

    fn board_from_cells(cells: [u8; 16], hint: u8) -> Board {
        let mut b = Board::with_hint(0, hint);
        for (i, &rank) in cells.iter().enumerate() {
            b.set(i, rank);
        }
        b
    }

    #[test]
    fn depth_one_matches_greedy() {
        engine::new();
        let b = board_from_cells([1, 2, 3, 0, 0, 3, 4, 0, 0, 0, 2, 0, 1, 0, 0, 0], 3);
        let mut ex = Expectimax::with_config(ExpectimaxConfig { depth: 1, ..Default::default() });
        let greedy = select(&b, &Heuristic).unwrap();
        assert_eq!(ex.best_move(&b, &Bag::new(), &Heuristic), Some(greedy.dir));
        let evals = ex.branch_evals(&b, &Bag::new(), &Heuristic);
        assert_eq!(evals[greedy.dir.index()].ev, greedy.value);
    }

    #[test]
    fn terminal_board_scores_penalty() {
        engine::new();
        let b = board_from_cells([3, 4, 3, 4, 4, 3, 4, 3, 3, 4, 3, 4, 4, 3, 4, 3], 1);
        let mut ex = Expectimax::new();
        assert_eq!(ex.best_move(&b, &Bag::new(), &Zero), None);
        assert_eq!(ex.state_value(&b, &Bag::new(), &Zero), ExpectimaxConfig::default().terminal_penalty);
        assert!(ex.branch_evals(&b, &Bag::new(), &Zero).iter().all(|e| !e.legal));
    }

    #[test]
    fn depth_two_looks_past_the_placement() {
        engine::new();
        // Left and Up are mirror images. Either way the 3 fills the single empty
        // edge cell and the follow-up vertical slide merges two pairs of 6s and
        // two pairs of 3s: 2 * (27 - 18) + 2 * (9 - 6) = 24.
        let b = board_from_cells([0, 4, 3, 4, 4, 3, 4, 3, 3, 4, 3, 4, 4, 3, 4, 3], 3);
        let mut ex = Expectimax::with_config(ExpectimaxConfig { depth: 2, ..Default::default() });
        let evals = ex.branch_evals(&b, &Bag::new(), &Zero);
        assert!(!evals[Move::Right.index()].legal);
        assert!(!evals[Move::Down.index()].legal);
        assert_eq!(evals[Move::Left.index()].ev, 24.0);
        assert_eq!(evals[Move::Up.index()].ev, 24.0);
        assert!(ex.last_stats().nodes > 2);
        assert_eq!(ex.best_move(&b, &Bag::new(), &Zero), Some(Move::Up));
    }

    #[test]
    fn cache_does_not_change_the_decision() {
        engine::new();
        let b = board_from_cells([1, 0, 2, 0, 0, 3, 0, 0, 3, 0, 0, 1, 0, 0, 2, 0], 2);
        let mut bag = Bag::new();
        bag.reveal(2);
        let mut cached = Expectimax::with_config(ExpectimaxConfig { depth: 2, ..Default::default() });
        let mut plain = Expectimax::with_config(ExpectimaxConfig { depth: 2, cache_enabled: false, ..Default::default() });
        assert_eq!(cached.branch_evals(&b, &bag, &Heuristic), plain.branch_evals(&b, &bag, &Heuristic));
        assert_eq!(plain.last_stats().cache_hits, 0);
    }
}
