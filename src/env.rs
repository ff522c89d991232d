//! The stochastic tile environment.
//!
//! Basic tiles come from a bag holding one each of ranks 1, 2 and 3, refilled
//! when empty, so every three consecutive basic draws form a permutation of
//! the bag. The tile shown as the hint is the one placed next. After the first
//! slide new tiles only enter on the edge opposite the slide direction.

use log::trace;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::engine::{Board, Move};

const BASIC_RANKS: [u8; 3] = [1, 2, 3];
const FULL: u8 = 0b111;

/// The remaining basic ranks before the next refill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bag {
    mask: u8,
}

impl Default for Bag {
    fn default() -> Self { Bag::new() }
}

impl Bag {
    pub fn new() -> Self { Bag { mask: FULL } }

    pub fn reset(&mut self) { self.mask = FULL; }

    pub fn is_empty(&self) -> bool { self.mask == 0 }

    pub fn len(&self) -> usize { self.mask.count_ones() as usize }

    pub fn contains(&self, rank: u8) -> bool {
        (1..=3).contains(&rank) && self.mask & (1 << (rank - 1)) != 0
    }

    /// Ranks the next draw can produce, each equally likely.
    pub fn upcoming(&self) -> impl Iterator<Item = u8> {
        let mask = if self.mask == 0 { FULL } else { self.mask };
        BASIC_RANKS.into_iter().filter(move |&rank| mask & (1 << (rank - 1)) != 0)
    }

    /// Remove a uniformly chosen rank, refilling first if the bag is empty.
    pub fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) -> u8 {
        let choices: Vec<u8> = self.upcoming().collect();
        let rank = choices[rng.gen_range(0..choices.len())];
        self.reveal(rank);
        rank
    }

    /// Account for a draw seen from outside. Ranks outside 1..=3 never come from the bag.
    pub fn reveal(&mut self, rank: u8) {
        if !(1..=3).contains(&rank) {
            return;
        }
        if self.mask == 0 || !self.contains(rank) {
            self.mask = FULL;
        }
        self.mask &= !(1 << (rank - 1));
    }
}

/// Bonus tile policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Bonus tiles appear once the board holds this rank (7 is the 48 tile).
    pub bonus_threshold: u8,
    /// One hint in `bonus_odds` is a bonus tile while eligible.
    pub bonus_odds: u32,
    /// A bonus is allowed only while `bonus * bonus_budget < total` tiles generated.
    pub bonus_budget: u64,
}

impl Default for EnvConfig {
    fn default() -> Self { Self { bonus_threshold: 7, bonus_odds: 21, bonus_budget: 21 } }
}

/// One tile placement chosen by the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub position: usize,
    pub tile: u8,
    /// Hint shown to the player for the following placement.
    pub next_hint: u8,
}

/// Random tile generator with a bag and occasional bonus tiles.
pub struct Environment {
    config: EnvConfig,
    rng: StdRng,
    bag: Bag,
    pending: Option<u8>,
    total: u64,
    bonus: u64,
}

impl Environment {
    pub fn new(config: EnvConfig) -> Self { Self::with_rng(config, StdRng::from_entropy()) }

    pub fn with_seed(config: EnvConfig, seed: u64) -> Self { Self::with_rng(config, StdRng::seed_from_u64(seed)) }

    fn with_rng(config: EnvConfig, rng: StdRng) -> Self {
        Environment { config, rng, bag: Bag::new(), pending: None, total: 0, bonus: 0 }
    }

    pub fn config(&self) -> &EnvConfig { &self.config }

    /// Tiles generated this episode, and how many of them were bonus tiles.
    pub fn generated(&self) -> (u64, u64) { (self.total, self.bonus) }

    /// Forget the bag and counters.
    pub fn reset(&mut self) {
        self.bag.reset();
        self.pending = None;
        self.total = 0;
        self.bonus = 0;
    }

    /// Place the pending tile on an empty cell and draw the next hint.
    ///
    /// Before the first slide any cell may be chosen; afterwards only the edge
    /// opposite `last_slide`. Returns `None` when every candidate is occupied.
    pub fn take_action(&mut self, board: &Board, last_slide: Option<Move>) -> Option<Placement> {
        let mut positions: Vec<usize> = match last_slide {
            Some(dir) => dir.entry_edge().to_vec(),
            None => (0..16).collect(),
        };
        positions.shuffle(&mut self.rng);
        let position = positions.into_iter().find(|&p| board.get(p) == 0)?;

        let tile = match self.pending.take() {
            Some(tile) => tile,
            None => self.draw_basic(),
        };
        let mut after = *board;
        after.set(position, tile);
        let next_hint = self.next_hint(&after);
        self.pending = Some(next_hint);
        Some(Placement { position, tile, next_hint })
    }

    fn draw_basic(&mut self) -> u8 {
        self.total += 1;
        self.bag.draw(&mut self.rng)
    }

    fn next_hint(&mut self, board: &Board) -> u8 {
        let max = board.max_rank();
        let eligible = max >= self.config.bonus_threshold.max(7) && self.bonus * self.config.bonus_budget < self.total;
        if eligible && self.rng.gen_ratio(1, self.config.bonus_odds.max(1)) {
            let rank = self.rng.gen_range(4..=max - 3);
            self.bonus += 1;
            self.total += 1;
            trace!("bonus tile rank {rank} ({} of {} tiles)", self.bonus, self.total);
            return rank;
        }
        self.draw_basic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine;

    #[test]
    fn bag_draws_each_rank_once_per_fill() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut bag = Bag::new();
        for _ in 0..10 {
            let mut seen: Vec<u8> = (0..3).map(|_| bag.draw(&mut rng)).collect();
            seen.sort_unstable();
            assert_eq!(seen, vec![1, 2, 3]);
            assert!(bag.is_empty());
        }
    }

    #[test]
    fn reveal_tracks_draws() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut drawn = Bag::new();
        let mut tracked = Bag::new();
        for _ in 0..20 {
            let rank = drawn.draw(&mut rng);
            tracked.reveal(rank);
            assert_eq!(tracked, drawn);
        }
        tracked.reveal(6);
        assert_eq!(tracked, drawn);
    }

    #[test]
    fn upcoming_refills_when_empty() {
        let mut bag = Bag::new();
        bag.reveal(2);
        assert_eq!(bag.upcoming().collect::<Vec<_>>(), vec![1, 3]);
        bag.reveal(1);
        bag.reveal(3);
        assert!(bag.is_empty());
        assert_eq!(bag.upcoming().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(bag.len(), 0);
    }

    #[test]
    fn places_on_the_entry_edge() {
        engine::new();
        let mut env = Environment::with_seed(EnvConfig::default(), 7);
        let mut board = Board::EMPTY;
        for _ in 0..9 {
            let p = env.take_action(&board, None).unwrap();
            assert_eq!(board.get(p.position), 0);
            board.set(p.position, p.tile);
            board.set_hint(p.next_hint);
        }
        assert_eq!(board.count_empty(), 7);
        // Basic tiles only this early, nine draws are three full bags.
        let mut counts = [0; 4];
        for i in 0..16 {
            counts[board.get(i) as usize] += 1;
        }
        assert_eq!(&counts[1..], &[3, 3, 3]);

        for dir in Move::ALL {
            let after = board.shift(dir);
            if after == board {
                continue;
            }
            let hint = after.hint();
            let p = env.clone_for_test().take_action(&after, Some(dir)).unwrap();
            assert!(dir.entry_edge().contains(&p.position));
            assert_eq!(p.tile, hint);
        }
    }

    #[test]
    fn full_edge_gives_no_placement() {
        let mut env = Environment::with_seed(EnvConfig::default(), 3);
        let mut board = Board::EMPTY;
        for p in Move::Left.entry_edge() {
            board.set(p, 3);
        }
        assert_eq!(env.take_action(&board, Some(Move::Left)), None);
        assert!(env.take_action(&board, Some(Move::Right)).is_some());
    }

    #[test]
    fn bonus_tiles_respect_threshold_and_budget() {
        let config = EnvConfig { bonus_threshold: 7, bonus_odds: 1, bonus_budget: 21 };
        let mut env = Environment::with_seed(config, 11);
        let mut small = Board::EMPTY;
        small.set(0, 6);
        for _ in 0..50 {
            assert!(env.next_hint(&small) <= 3);
        }
        let mut large = Board::EMPTY;
        large.set(0, 9);
        let mut bonus_seen = 0;
        for _ in 0..500 {
            let hint = env.next_hint(&large);
            if hint > 3 {
                assert!((4..=6).contains(&hint));
                bonus_seen += 1;
            }
        }
        let (total, bonus) = env.generated();
        assert_eq!(bonus, bonus_seen);
        assert!(bonus > 0);
        assert!((bonus - 1) * 21 < total);
    }

    impl Environment {
        fn clone_for_test(&self) -> Environment {
            Environment {
                config: self.config,
                rng: self.rng.clone(),
                bag: self.bag,
                pending: self.pending,
                total: self.total,
                bonus: self.bonus,
            }
        }
    }
}
