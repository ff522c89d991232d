use std::path::PathBuf;

use ai_threes::agent::{Agent, EvaluatorPlayer, Search, TdPlayer};
use ai_threes::checkpoint;
use ai_threes::engine as GameEngine;
use ai_threes::env::{EnvConfig, Environment};
use ai_threes::episode::{play_episode, Action};
use ai_threes::policy::{ExpectimaxConfig, Heuristic};
use anyhow::Context;
use clap::Parser;
use flexi_logger::Logger;

/// Play one game and print every board.
#[derive(Parser, Debug)]
#[command(name = "ai-threes", version, about = "Play one game of Threes")]
struct Args {
    /// Checkpoint directory to play with; the hand-tuned heuristic is used otherwise
    #[arg(long, value_name = "DIR")]
    load: Option<PathBuf>,
    /// Expectimax depth; 0 plays greedily
    #[arg(long, default_value_t = 0)]
    depth: u32,
    /// Seed for the tile environment
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _logger = Logger::try_with_env_or_str("warn")?.log_to_stderr().start()?;
    GameEngine::new();

    let search = match args.depth {
        0 => Search::Greedy,
        depth => Search::Expectimax(ExpectimaxConfig { depth, ..Default::default() }),
    };
    let mut player: Box<dyn Agent> = match &args.load {
        Some(dir) => {
            let learner = checkpoint::restore(dir)
                .with_context(|| format!("loading checkpoint from {}", dir.display()))?;
            Box::new(TdPlayer::with_learner(learner, search))
        }
        None => Box::new(EvaluatorPlayer::new("heuristic", Heuristic, search)),
    };
    let mut env = match args.seed {
        Some(seed) => Environment::with_seed(EnvConfig::default(), seed),
        None => Environment::new(EnvConfig::default()),
    };

    let game = play_episode(player.as_mut(), &mut env);
    for step in game.steps() {
        if let Action::Slide(_) = step.action {
            println!("{}", step.action);
            println!("{}", step.after);
        }
    }
    println!("{}", game.board());
    println!(
        "Slides: {}, score: {}, highest tile: {}",
        game.slides(),
        game.score(),
        GameEngine::tile_value(game.max_rank())
    );
    Ok(())
}
