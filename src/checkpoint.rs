//! Training checkpoints: stage weight files plus postcard-encoded metadata.
//!
//! A checkpoint directory holds `weights.<stage>.bin` for every stage and a
//! `checkpoint.bin` recording how far training got and with which settings.

use std::fs;
use std::io;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::learner::{ConfigError, Learner, LearnerConfig};
use crate::ntuple::WeightsError;

pub const FILE_NAME: &str = "checkpoint.bin";

#[derive(thiserror::Error, Debug)]
pub enum CheckpointError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("postcard error: {0}")]
    Postcard(#[from] postcard::Error),
    #[error("weights: {0}")]
    Weights(#[from] WeightsError),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
}

/// Learner state that is not in the weight tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub games_trained: u64,
    pub learning_rate: f32,
    pub config: LearnerConfig,
}

impl Checkpoint {
    pub fn of(learner: &Learner) -> Self {
        Checkpoint {
            games_trained: learner.games_trained(),
            learning_rate: learner.learning_rate(),
            config: learner.config().clone(),
        }
    }

    pub fn to_postcard_bytes(&self) -> Result<Vec<u8>, CheckpointError> { Ok(postcard::to_allocvec(self)?) }

    pub fn from_postcard_bytes(bytes: &[u8]) -> Result<Self, CheckpointError> { Ok(postcard::from_bytes(bytes)?) }

    pub fn write(&self, dir: &Path) -> Result<(), CheckpointError> {
        fs::create_dir_all(dir)?;
        fs::write(dir.join(FILE_NAME), self.to_postcard_bytes()?)?;
        Ok(())
    }

    pub fn read(dir: &Path) -> Result<Self, CheckpointError> {
        let bytes = fs::read(dir.join(FILE_NAME))?;
        Self::from_postcard_bytes(&bytes)
    }
}

/// Write weights and metadata for `learner` into `dir`.
pub fn save(learner: &Learner, dir: &Path) -> Result<(), CheckpointError> {
    learner.save(dir)?;
    Checkpoint::of(learner).write(dir)?;
    info!("checkpoint after {} games written to {}", learner.games_trained(), dir.display());
    Ok(())
}

/// Rebuild a learner from a directory written by [`save`].
pub fn restore(dir: &Path) -> Result<Learner, CheckpointError> {
    let checkpoint = Checkpoint::read(dir)?;
    let mut learner = Learner::new(checkpoint.config)?;
    learner.load(dir)?;
    learner.set_learning_rate(checkpoint.learning_rate);
    learner.set_games_trained(checkpoint.games_trained);
    info!(
        "restored {} stages after {} games (learning rate {})",
        learner.stages(),
        checkpoint.games_trained,
        checkpoint.learning_rate
    );
    Ok(learner)
}
