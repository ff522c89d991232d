//! Agents: the [`Agent`] surface plus the learning player and the environment adapter.

use std::path::Path;

use crate::checkpoint::{self, CheckpointError};
use crate::engine::{Board, Move};
use crate::env::{Bag, Environment};
use crate::episode::{Action, Episode, Role};
use crate::learner::{ConfigError, LearnSummary, Learner, LearnerConfig};
use crate::policy::{self, Evaluator, Expectimax, ExpectimaxConfig};

/// Something that acts in a game.
pub trait Agent {
    fn name(&self) -> &str;

    fn role(&self) -> Role;

    fn open_episode(&mut self, _tag: &str) {}

    fn close_episode(&mut self, _tag: &str) {}

    /// Choose an action for `board`; `prev` is the action that produced it.
    fn take_action(&mut self, board: &Board, prev: Option<Action>) -> Option<Action>;
}

/// How a player turns an evaluator into a move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Search {
    /// One-ply `reward + V(after)`.
    Greedy,
    Expectimax(ExpectimaxConfig),
}

/// Move selection plus the bag tracking an expectimax search needs.
struct Chooser {
    search: Search,
    expectimax: Option<Expectimax>,
    bag: Bag,
}

impl Chooser {
    fn new(search: Search) -> Self {
        let expectimax = match search {
            Search::Greedy => None,
            Search::Expectimax(cfg) => Some(Expectimax::with_config(cfg)),
        };
        Chooser { search, expectimax, bag: Bag::new() }
    }

    fn reset(&mut self) { self.bag.reset(); }

    // Every player turn follows exactly one fresh draw: the hint on the board.
    fn choose<E: Evaluator + ?Sized>(&mut self, board: &Board, eval: &E) -> Option<Move> {
        self.bag.reveal(board.hint());
        match &mut self.expectimax {
            Some(ex) => ex.best_move(board, &self.bag, eval),
            None => policy::select(board, eval).map(|c| c.dir),
        }
    }
}

/// A player driven by any evaluator, such as the hand-tuned heuristic.
pub struct EvaluatorPlayer<E> {
    name: String,
    eval: E,
    chooser: Chooser,
}

impl<E: Evaluator> EvaluatorPlayer<E> {
    pub fn new(name: impl Into<String>, eval: E, search: Search) -> Self {
        EvaluatorPlayer { name: name.into(), eval, chooser: Chooser::new(search) }
    }
}

impl<E: Evaluator> Agent for EvaluatorPlayer<E> {
    fn name(&self) -> &str { &self.name }

    fn role(&self) -> Role { Role::Player }

    fn open_episode(&mut self, _tag: &str) { self.chooser.reset(); }

    fn take_action(&mut self, board: &Board, _prev: Option<Action>) -> Option<Action> {
        self.chooser.choose(board, &self.eval).map(Action::Slide)
    }
}

/// The learning player: staged N-tuple networks trained by TD(λ).
pub struct TdPlayer {
    name: String,
    learner: Learner,
    chooser: Chooser,
}

impl TdPlayer {
    pub fn new(config: LearnerConfig, search: Search) -> Result<Self, ConfigError> {
        Ok(Self::with_learner(Learner::new(config)?, search))
    }

    pub fn with_learner(learner: Learner, search: Search) -> Self {
        let name = match search {
            Search::Greedy => "td".to_string(),
            Search::Expectimax(cfg) => format!("td-expectimax{}", cfg.depth),
        };
        TdPlayer { name, learner, chooser: Chooser::new(search) }
    }

    pub fn search(&self) -> Search { self.chooser.search }

    pub fn learner(&self) -> &Learner { &self.learner }

    pub fn learner_mut(&mut self) -> &mut Learner { &mut self.learner }

    /// Update the networks from a finished game.
    pub fn learn(&mut self, episode: &Episode) -> LearnSummary { self.learner.learn_episode(episode) }

    pub fn decrease_learning_rate(&mut self) { self.learner.decrease_learning_rate(); }

    /// Write a checkpoint into `dir`.
    pub fn save(&self, dir: &Path) -> Result<(), CheckpointError> { checkpoint::save(&self.learner, dir) }

    /// Replace the learner with the checkpoint in `dir`.
    pub fn load(&mut self, dir: &Path) -> Result<(), CheckpointError> {
        self.learner = checkpoint::restore(dir)?;
        Ok(())
    }
}

impl Agent for TdPlayer {
    fn name(&self) -> &str { &self.name }

    fn role(&self) -> Role { Role::Player }

    fn open_episode(&mut self, _tag: &str) { self.chooser.reset(); }

    fn take_action(&mut self, board: &Board, _prev: Option<Action>) -> Option<Action> {
        self.chooser.choose(board, &self.learner).map(Action::Slide)
    }
}

impl Agent for Environment {
    fn name(&self) -> &str { "random" }

    fn role(&self) -> Role { Role::Environment }

    fn open_episode(&mut self, _tag: &str) { self.reset(); }

    fn close_episode(&mut self, _tag: &str) { self.reset(); }

    fn take_action(&mut self, board: &Board, prev: Option<Action>) -> Option<Action> {
        let last_slide = match prev {
            Some(Action::Slide(dir)) => Some(dir),
            _ => None,
        };
        let placement = Environment::take_action(self, board, last_slide)?;
        Some(Action::Place { position: placement.position, tile: placement.tile, hint: placement.next_hint })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine;
    use crate::env::EnvConfig;
    use crate::episode::{play_episode, OPENING_PLACEMENTS};
    use crate::ntuple::NetworkPreset;
    use crate::policy::Heuristic;
    use tempfile::tempdir;

    fn compact() -> LearnerConfig {
        LearnerConfig { preset: NetworkPreset::Compact, learning_rate: 0.001, ..Default::default() }
    }

    #[test]
    fn heuristic_player_finishes_a_game() {
        engine::new();
        let mut player = EvaluatorPlayer::new("heuristic", Heuristic, Search::Greedy);
        let mut env = Environment::with_seed(EnvConfig::default(), 5);
        let episode = play_episode(&mut player, &mut env);
        assert!(episode.is_terminal());
        assert_eq!(episode.placements(), OPENING_PLACEMENTS + episode.slides());
        assert!(episode.slides() > 10);
        assert!(episode.score() > 0.0);
    }

    #[test]
    fn environment_follows_the_slide() {
        engine::new();
        let mut env = Environment::with_seed(EnvConfig::default(), 9);
        let mut episode = Episode::new();
        let mut prev = None;
        for _ in 0..OPENING_PLACEMENTS {
            let action = Agent::take_action(&mut env, &episode.board(), prev).unwrap();
            episode.apply(action).unwrap();
            prev = Some(action);
        }
        let dir = Move::ALL.into_iter().find(|&d| episode.board().shift(d) != episode.board()).unwrap();
        let hint = episode.board().hint();
        episode.apply(Action::Slide(dir)).unwrap();
        match Agent::take_action(&mut env, &episode.board(), Some(Action::Slide(dir))) {
            Some(Action::Place { position, tile, .. }) => {
                assert!(dir.entry_edge().contains(&position));
                assert_eq!(tile, hint);
            }
            other => panic!("expected a placement, got {other:?}"),
        }
    }

    #[test]
    fn learning_changes_the_value_of_played_states() {
        engine::new();
        let mut player = TdPlayer::new(compact(), Search::Greedy).unwrap();
        let mut env = Environment::with_seed(EnvConfig::default(), 21);
        let episode = play_episode(&mut player, &mut env);
        let first = episode.after_states()[0].board;
        assert_eq!(player.learner().value(&first), 0.0);
        let summary = player.learn(&episode);
        assert!(summary.updates > 0);
        assert_ne!(player.learner().value(&first), 0.0);
        assert_eq!(player.learner().games_trained(), 1);
    }

    #[test]
    fn expectimax_player_plays() {
        engine::new();
        let search = Search::Expectimax(ExpectimaxConfig { depth: 2, ..Default::default() });
        let mut player = TdPlayer::new(compact(), search).unwrap();
        assert_eq!(player.name(), "td-expectimax2");
        let mut env = Environment::with_seed(EnvConfig::default(), 4);
        let episode = play_episode(&mut player, &mut env);
        assert!(episode.is_terminal());
        assert!(episode.slides() > 0);
    }

    #[test]
    fn save_and_load_through_the_player() {
        engine::new();
        let mut player = TdPlayer::new(compact(), Search::Greedy).unwrap();
        let mut env = Environment::with_seed(EnvConfig::default(), 8);
        let episode = play_episode(&mut player, &mut env);
        player.learn(&episode);
        let dir = tempdir().unwrap();
        player.save(dir.path()).unwrap();

        let mut other = TdPlayer::new(compact(), Search::Greedy).unwrap();
        other.load(dir.path()).unwrap();
        let probe = episode.after_states()[0].board;
        assert_eq!(other.learner().value(&probe), player.learner().value(&probe));
        assert_eq!(other.learner().games_trained(), 1);
    }
}
