//! One game: the action log, the live board and the after-state trace.

use std::fmt;
use std::time::{Duration, Instant};

use crate::agent::Agent;
use crate::engine::{Board, Move, Reward};

/// Turns the environment takes before the player's first slide.
pub const OPENING_PLACEMENTS: usize = 9;

const PLACE_FLAG: u32 = 1 << 15;

/// Who acts on a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Player,
    Environment,
}

/// A move by either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Slide(Move),
    /// Put `tile` on the empty cell `position` and show `hint` as the next tile.
    Place { position: usize, tile: u8, hint: u8 },
}

impl Action {
    /// Compact code: slides are their direction code, placements set bit 15
    /// and pack `hint << 8 | tile << 4 | position`.
    pub fn code(&self) -> u32 {
        match *self {
            Action::Slide(dir) => dir.index() as u32,
            Action::Place { position, tile, hint } => {
                PLACE_FLAG | (hint as u32 & 0xf) << 8 | (tile as u32 & 0xf) << 4 | (position as u32 & 0xf)
            }
        }
    }

    pub fn from_code(code: u32) -> Option<Action> {
        if code & PLACE_FLAG != 0 {
            if code & !(PLACE_FLAG | 0xfff) != 0 {
                return None;
            }
            return Some(Action::Place {
                position: (code & 0xf) as usize,
                tile: (code >> 4 & 0xf) as u8,
                hint: (code >> 8 & 0xf) as u8,
            });
        }
        (code < 4).then(|| Action::Slide(Move::from_code(code as u8)))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Slide(dir) => write!(f, "#{}", dir.as_char()),
            Action::Place { position, tile, hint } => write!(f, "{position:X}{tile:X}+{hint:X}"),
        }
    }
}

/// A recorded action and its effect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub action: Action,
    /// Board-score delta caused by the action.
    pub reward: Reward,
    /// Board right after the action.
    pub after: Board,
}

/// The board right after a slide and the score delta of that slide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AfterState {
    pub board: Board,
    pub reward: Reward,
}

/// A game in progress or finished.
#[derive(Debug, Clone)]
pub struct Episode {
    initial: Board,
    board: Board,
    steps: Vec<Step>,
    started: Instant,
    elapsed: Option<Duration>,
}

impl Default for Episode {
    fn default() -> Self { Episode::new() }
}

impl Episode {
    pub fn new() -> Self { Self::from_board(Board::EMPTY) }

    pub fn from_board(initial: Board) -> Self {
        Episode { initial, board: initial, steps: Vec::new(), started: Instant::now(), elapsed: None }
    }

    pub fn initial(&self) -> Board { self.initial }

    pub fn board(&self) -> Board { self.board }

    pub fn steps(&self) -> &[Step] { &self.steps }

    /// Who acts next: the environment for the opening, then player and environment alternate.
    pub fn turn(&self) -> Role {
        let n = self.steps.len();
        if n < OPENING_PLACEMENTS || (n - OPENING_PLACEMENTS) % 2 == 1 {
            Role::Environment
        } else {
            Role::Player
        }
    }

    /// Apply `action` to the live board and record it.
    ///
    /// Returns the score delta, or `None` when the slide changes nothing or the
    /// placement is invalid; the episode is left untouched in that case.
    pub fn apply(&mut self, action: Action) -> Option<Reward> {
        let before = self.board;
        let after = match action {
            Action::Slide(dir) => {
                let after = before.shift(dir);
                if after == before {
                    return None;
                }
                after
            }
            Action::Place { position, tile, hint } => {
                let mut after = before;
                after.place(position, tile)?;
                after.set_hint(hint);
                after
            }
        };
        let reward = after.score() - before.score();
        self.board = after;
        self.steps.push(Step { action, reward, after });
        Some(reward)
    }

    /// True if the next turn is the player's and no slide changes the board.
    pub fn is_terminal(&self) -> bool { self.turn() == Role::Player && self.board.is_terminal() }

    /// Stop the clock.
    pub fn close(&mut self) {
        if self.elapsed.is_none() {
            self.elapsed = Some(self.started.elapsed());
        }
    }

    pub fn elapsed(&self) -> Duration { self.elapsed.unwrap_or_else(|| self.started.elapsed()) }

    pub fn score(&self) -> Reward { self.board.score() }

    pub fn max_rank(&self) -> u8 { self.board.max_rank() }

    /// Number of player slides.
    pub fn slides(&self) -> usize { self.steps.iter().filter(|s| matches!(s.action, Action::Slide(_))).count() }

    /// Number of environment placements.
    pub fn placements(&self) -> usize { self.steps.len() - self.slides() }

    /// Last slide direction, if any.
    pub fn last_slide(&self) -> Option<Move> {
        self.steps.iter().rev().find_map(|s| match s.action {
            Action::Slide(dir) => Some(dir),
            Action::Place { .. } => None,
        })
    }

    /// One entry per slide, in play order.
    pub fn after_states(&self) -> Vec<AfterState> {
        self.steps
            .iter()
            .filter(|s| matches!(s.action, Action::Slide(_)))
            .map(|s| AfterState { board: s.after, reward: s.reward })
            .collect()
    }
}

/// Run one game to the end.
///
/// The game ends when the player faces a terminal board, either side returns
/// no action, or an action fails to apply.
pub fn play_episode<P, E>(player: &mut P, env: &mut E) -> Episode
where
    P: Agent + ?Sized,
    E: Agent + ?Sized,
{
    let tag = format!("{}:{}", player.name(), env.name());
    player.open_episode(&tag);
    env.open_episode(&tag);

    let mut episode = Episode::new();
    let mut prev = None;
    while !episode.is_terminal() {
        let board = episode.board();
        let action = match episode.turn() {
            Role::Player => player.take_action(&board, prev),
            Role::Environment => env.take_action(&board, prev),
        };
        let Some(action) = action else { break };
        if episode.apply(action).is_none() {
            break;
        }
        prev = Some(action);
    }
    episode.close();

    player.close_episode(&tag);
    env.close_episode(&tag);
    episode
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine;

    #[test]
    fn action_codes() {
        let place = Action::Place { position: 13, tile: 2, hint: 5 };
        assert_eq!(place.code(), 0x8000 | 0x52d);
        assert_eq!(Action::from_code(place.code()), Some(place));
        for dir in Move::ALL {
            assert_eq!(Action::Slide(dir).code(), dir.index() as u32);
            assert_eq!(Action::from_code(dir.index() as u32), Some(Action::Slide(dir)));
        }
        assert_eq!(Action::from_code(4), None);
        assert_eq!(Action::from_code(0x1_8000), None);
        assert_eq!(place.to_string(), "D2+5");
        assert_eq!(Action::Slide(Move::Left).to_string(), "#L");
    }

    #[test]
    fn turns_alternate_after_the_opening() {
        engine::new();
        let mut ep = Episode::new();
        for i in 0..OPENING_PLACEMENTS {
            assert_eq!(ep.turn(), Role::Environment);
            ep.apply(Action::Place { position: i, tile: 1 + (i % 3) as u8, hint: 1 }).unwrap();
        }
        assert_eq!(ep.turn(), Role::Player);
        let dir = Move::ALL.into_iter().find(|&d| ep.board().shift(d) != ep.board()).unwrap();
        ep.apply(Action::Slide(dir)).unwrap();
        assert_eq!(ep.turn(), Role::Environment);
        assert_eq!(ep.slides(), 1);
        assert_eq!(ep.placements(), OPENING_PLACEMENTS);
        assert_eq!(ep.last_slide(), Some(dir));
    }

    #[test]
    fn rejected_actions_leave_the_episode_alone() {
        engine::new();
        let mut ep = Episode::new();
        ep.apply(Action::Place { position: 0, tile: 3, hint: 2 }).unwrap();
        let snapshot = ep.board();
        assert_eq!(ep.apply(Action::Place { position: 0, tile: 1, hint: 1 }), None);
        assert_eq!(ep.apply(Action::Slide(Move::Up)), None);
        assert_eq!(ep.apply(Action::Slide(Move::Left)), None);
        assert_eq!(ep.board(), snapshot);
        assert_eq!(ep.board().hint(), 2);
        assert_eq!(ep.steps().len(), 1);
    }

    #[test]
    fn after_states_carry_slide_deltas() {
        engine::new();
        let mut ep = Episode::new();
        ep.apply(Action::Place { position: 0, tile: 1, hint: 2 }).unwrap();
        assert_eq!(ep.apply(Action::Place { position: 1, tile: 2, hint: 3 }), Some(0.0));
        assert_eq!(ep.apply(Action::Slide(Move::Left)), Some(3.0));
        assert_eq!(ep.apply(Action::Place { position: 1, tile: 3, hint: 1 }), Some(3.0));
        assert_eq!(ep.apply(Action::Slide(Move::Left)), Some(3.0));
        let trace = ep.after_states();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[0].reward, 3.0);
        assert_eq!(trace[0].board.hint(), 3);
        // 3 and 3 merge into a 6 (rank 4): 9 - 3 - 3
        assert_eq!(trace[1].reward, 3.0);
        assert_eq!(trace[1].board.get(0), 4);
        assert_eq!(ep.score(), 9.0);
    }
}
