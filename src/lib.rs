//! ai-threes: a Threes bitboard engine, N-tuple value function and TD(λ) learner
//!
//! This crate provides:
//! - A packed `Board` with table-driven slides, placements and symmetries (`engine`)
//! - Symmetric N-tuple networks with checksummed weight files (`ntuple`)
//! - Greedy and expectimax move selection over after-states (`policy`)
//! - The bag-based tile environment and episode recording (`env`, `episode`)
//! - Staged TD(λ) training, agents and checkpoints (`learner`, `agent`, `checkpoint`)
//! - A binary trace format for games (`trace`)
//!
//! Quick start:
//! ```
//! use ai_threes::agent::{Search, TdPlayer};
//! use ai_threes::engine as GameEngine;
//! use ai_threes::env::{EnvConfig, Environment};
//! use ai_threes::episode::play_episode;
//! use ai_threes::learner::LearnerConfig;
//! use ai_threes::ntuple::NetworkPreset;
//!
//! // One-time table init
//! GameEngine::new();
//!
//! let config = LearnerConfig { preset: NetworkPreset::Compact, ..Default::default() };
//! let mut player = TdPlayer::new(config, Search::Greedy).expect("thresholds ascend");
//! let mut env = Environment::with_seed(EnvConfig::default(), 42);
//! let game = play_episode(&mut player, &mut env);
//! assert!(game.is_terminal());
//! player.learn(&game);
//! ```
pub mod agent;
pub mod checkpoint;
pub mod engine;
pub mod env;
pub mod episode;
pub mod learner;
pub mod ntuple;
pub mod policy;
pub mod trace;
