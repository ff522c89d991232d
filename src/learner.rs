//! TD(λ) training of staged N-tuple networks.
//!
//! The learner walks the after-states of a finished game backward. With
//! `G_T = 0` past the last after-state, each step builds the λ-return
//!
//! ```text
//! G_t = r_{t+1} + (1 - λ) V(s_{t+1}) + λ G_{t+1}
//! ```
//!
//! and moves `V(s_t)` by `α (G_t - V(s_t))`. With λ = 0 this is plain TD(0)
//! toward `r_{t+1} + V(s_{t+1})`; the last after-state always moves toward 0.
//!
//! A game is split into stages by the highest rank on the board. Each stage
//! has its own network, and the stage of a state is decided by remembering
//! the first after-state that reached each threshold.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::engine::Board;
use crate::episode::{AfterState, Episode};
use crate::ntuple::{NTupleNetwork, NetworkPreset, WeightsError};
use crate::policy::Evaluator;

/// Training hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerConfig {
    /// Tuple set for the first stage; later stages use its late-game variant.
    pub preset: NetworkPreset,
    /// Step size applied to every TD error before it reaches the tables.
    pub learning_rate: f32,
    pub lambda: f32,
    /// Ranks that open the next stage, ascending. Rank 12 is the 1536 tile.
    pub stage_thresholds: Vec<u8>,
    /// Halve the learning rate every this many games.
    pub halve_after: Option<u64>,
    /// Halving never goes below this.
    pub min_learning_rate: f32,
}

impl LearnerConfig {
    /// Check the settings a learner cannot be built from.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.stage_thresholds.windows(2).all(|w| w[0] < w[1]) {
            return Err(ConfigError::Thresholds(self.stage_thresholds.clone()));
        }
        Ok(())
    }
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            preset: NetworkPreset::Standard,
            learning_rate: 0.0025,
            lambda: 0.5,
            stage_thresholds: vec![12, 13],
            halve_after: None,
            min_learning_rate: 1.0e-5,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("stage thresholds must strictly ascend, got {0:?}")]
    Thresholds(Vec<u8>),
    #[error("{found} networks given for {expected} stages")]
    NetworkCount { expected: usize, found: usize },
}

/// Outcome of one [`Learner::learn`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LearnSummary {
    pub updates: usize,
    /// Mean of `|G_t - V(s_t)|` over the updates.
    pub mean_abs_error: f32,
    /// Stage of the last after-state.
    pub final_stage: usize,
}

/// The first after-state of a trace at or past a stage threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
struct StageMark {
    step: usize,
    board: Board,
}

/// Remembers where each stage began in one trace.
#[derive(Debug, Clone, Default)]
struct StageTracker {
    marks: Vec<StageMark>,
}

impl StageTracker {
    fn scan(thresholds: &[u8], trace: &[AfterState]) -> Self {
        let mut marks = Vec::new();
        for (step, s) in trace.iter().enumerate() {
            while marks.len() < thresholds.len() && s.board.max_rank() >= thresholds[marks.len()] {
                marks.push(StageMark { step, board: s.board });
            }
        }
        StageTracker { marks }
    }

    fn final_stage(&self) -> usize { self.marks.len() }

    /// Stage of every step, found by walking back and leaving a stage at the board that entered it.
    fn stages(&self, len: usize) -> Vec<usize> {
        let mut out = vec![0; len];
        let mut stage = self.final_stage();
        for t in (0..len).rev() {
            out[t] = stage;
            while stage > 0 && self.marks[stage - 1].step == t {
                stage -= 1;
            }
        }
        out
    }
}

/// Staged networks plus the TD(λ) update.
pub struct Learner {
    config: LearnerConfig,
    learning_rate: f32,
    networks: Vec<NTupleNetwork>,
    games: u64,
}

impl Learner {
    pub fn new(config: LearnerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let networks = (0..=config.stage_thresholds.len())
            .map(|stage| {
                let preset = if stage == 0 { config.preset } else { config.preset.late_game() };
                NTupleNetwork::from_preset(preset)
            })
            .collect();
        Self::with_networks(config, networks)
    }

    /// Use `networks` as the stage tables; one more network than thresholds is required.
    pub fn with_networks(config: LearnerConfig, networks: Vec<NTupleNetwork>) -> Result<Self, ConfigError> {
        config.validate()?;
        let expected = config.stage_thresholds.len() + 1;
        if networks.len() != expected {
            return Err(ConfigError::NetworkCount { expected, found: networks.len() });
        }
        let learning_rate = config.learning_rate;
        Ok(Learner { config, learning_rate, networks, games: 0 })
    }

    pub fn config(&self) -> &LearnerConfig { &self.config }

    pub fn learning_rate(&self) -> f32 { self.learning_rate }

    pub fn set_learning_rate(&mut self, rate: f32) { self.learning_rate = rate; }

    pub fn games_trained(&self) -> u64 { self.games }

    pub fn set_games_trained(&mut self, games: u64) { self.games = games; }

    pub fn stages(&self) -> usize { self.networks.len() }

    pub fn network(&self, stage: usize) -> &NTupleNetwork { &self.networks[stage] }

    pub fn network_mut(&mut self, stage: usize) -> &mut NTupleNetwork { &mut self.networks[stage] }

    /// Stage of a board judged by its highest rank alone.
    pub fn stage_of(&self, board: &Board) -> usize {
        let max = board.max_rank();
        self.config.stage_thresholds.iter().take_while(|&&t| max >= t).count()
    }

    /// Value of an after-state from the network of its stage.
    pub fn value(&self, after: &Board) -> f32 { self.networks[self.stage_of(after)].value(after) }

    /// Learn from one finished game and count it toward the learning-rate schedule.
    pub fn learn_episode(&mut self, episode: &Episode) -> LearnSummary {
        let summary = self.learn(&episode.after_states());
        self.games += 1;
        if let Some(every) = self.config.halve_after {
            if every > 0 && self.games % every == 0 {
                self.decrease_learning_rate();
            }
        }
        summary
    }

    /// One backward TD(λ) pass over `trace`, the after-states of a game in play order.
    pub fn learn(&mut self, trace: &[AfterState]) -> LearnSummary {
        if trace.is_empty() {
            return LearnSummary::default();
        }
        let tracker = StageTracker::scan(&self.config.stage_thresholds, trace);
        let stages = tracker.stages(trace.len());
        let lambda = self.config.lambda;
        let alpha = self.learning_rate;

        // Return and value of the state after t, both zero past the end.
        let mut next_return = 0.0f32;
        let mut next_value = 0.0f32;
        let mut next_reward = 0.0f32;
        let mut total_error = 0.0f32;
        for t in (0..trace.len()).rev() {
            let s = &trace[t];
            let net = &mut self.networks[stages[t]];
            let value = net.value(&s.board);
            let target = next_reward + (1.0 - lambda) * next_value + lambda * next_return;
            let error = target - value;
            net.update(&s.board, alpha * error);
            total_error += error.abs();

            next_return = target;
            next_value = value;
            next_reward = s.reward;
        }

        let summary = LearnSummary {
            updates: trace.len(),
            mean_abs_error: total_error / trace.len() as f32,
            final_stage: tracker.final_stage(),
        };
        debug!(
            "learned {} after-states, final stage {}, mean |error| {:.3}",
            summary.updates, summary.final_stage, summary.mean_abs_error
        );
        summary
    }

    /// Halve the learning rate, not going below the configured floor.
    pub fn decrease_learning_rate(&mut self) {
        let rate = (self.learning_rate / 2.0).max(self.config.min_learning_rate);
        info!("learning rate {} -> {} after {} games", self.learning_rate, rate, self.games);
        self.learning_rate = rate;
    }

    /// Path of the weight file for `stage` under `dir`.
    pub fn weights_path(dir: &Path, stage: usize) -> PathBuf { dir.join(format!("weights.{stage}.bin")) }

    /// Write every stage network to `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<(), WeightsError> {
        fs::create_dir_all(dir)?;
        for (stage, net) in self.networks.iter().enumerate() {
            net.save(Self::weights_path(dir, stage))?;
        }
        Ok(())
    }

    /// Load every stage network from `dir`.
    pub fn load(&mut self, dir: &Path) -> Result<(), WeightsError> {
        for (stage, net) in self.networks.iter_mut().enumerate() {
            net.load(Self::weights_path(dir, stage))?;
        }
        Ok(())
    }
}

impl Evaluator for Learner {
    #[inline]
    fn evaluate(&self, after: &Board) -> f32 { self.value(after) }
}
