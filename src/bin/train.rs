use std::path::PathBuf;

use ai_threes::agent::{Search, TdPlayer};
use ai_threes::checkpoint;
use ai_threes::engine::{self as GameEngine, MAX_RANK};
use ai_threes::env::{EnvConfig, Environment};
use ai_threes::episode::{play_episode, Episode};
use ai_threes::learner::LearnerConfig;
use ai_threes::ntuple::NetworkPreset;
use ai_threes::policy::ExpectimaxConfig;
use anyhow::Context;
use clap::Parser;
use flexi_logger::{Logger, WriteMode};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

#[derive(Parser, Debug)]
#[command(name = "train", version, about = "Train a TD(lambda) N-tuple player by self-play")]
struct Args {
    /// Total number of training games, including those of a resumed checkpoint
    #[arg(short = 'n', long, default_value_t = 100_000)]
    games: u64,
    /// Tuple set of the first stage: standard (about 1 GiB), coarse (about 130 MiB)
    /// or compact (about 2 MiB). Each later stage adds a coarse or compact network
    #[arg(long, default_value_t = NetworkPreset::Standard)]
    preset: NetworkPreset,
    #[arg(long, default_value_t = 0.0025)]
    learning_rate: f32,
    #[arg(long, default_value_t = 0.5)]
    lambda: f32,
    /// Ranks that open the later stages, comma separated and strictly ascending
    #[arg(long, value_delimiter = ',', default_values_t = [12u8, 13])]
    stage_thresholds: Vec<u8>,
    /// Halve the learning rate every this many games
    #[arg(long)]
    halve_after: Option<u64>,
    #[arg(long, default_value_t = 1e-5)]
    min_learning_rate: f32,
    /// Expectimax depth while training; 0 plays greedily
    #[arg(long, default_value_t = 0)]
    depth: u32,
    /// Checkpoint directory to write
    #[arg(short = 's', long, value_name = "DIR")]
    save: Option<PathBuf>,
    /// Checkpoint directory to resume from; its settings replace the ones above
    #[arg(long, value_name = "DIR")]
    resume: Option<PathBuf>,
    /// Write a checkpoint every this many games
    #[arg(long, default_value_t = 10_000)]
    save_every: u64,
    /// Games per statistics block
    #[arg(long, default_value_t = 1_000)]
    block: u64,
    /// Seed for the tile environment
    #[arg(long)]
    seed: Option<u64>,
    /// Log filter, e.g. "info" or "ai_threes=debug"
    #[arg(long)]
    log_level: Option<String>,
    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,
}

/// Scores and highest ranks over one block of games.
#[derive(Default)]
struct Block {
    games: u64,
    score_sum: f64,
    score_max: f32,
    slides: u64,
    reached: [u64; MAX_RANK as usize + 1],
}

impl Block {
    fn record(&mut self, game: &Episode) {
        self.games += 1;
        self.score_sum += game.score() as f64;
        self.score_max = self.score_max.max(game.score());
        self.slides += game.slides() as u64;
        self.reached[game.max_rank() as usize] += 1;
    }

    fn mean(&self) -> f64 { self.score_sum / self.games.max(1) as f64 }

    fn report(&self, end: u64, learning_rate: f32) {
        info!(
            "games {}: avg = {:.0}, max = {:.0}, slides/game = {:.1}, learning rate = {}",
            end,
            self.mean(),
            self.score_max,
            self.slides as f64 / self.games.max(1) as f64,
            learning_rate
        );
        // Share of games whose highest tile was at least each rank.
        let mut at_least = 0;
        for rank in (1..=MAX_RANK).rev() {
            let n = self.reached[rank as usize];
            if n == 0 && at_least == 0 {
                continue;
            }
            at_least += n;
            info!(
                "\t{:>5}\t{:>6.2}%\t({:.2}%)",
                GameEngine::tile_value(rank),
                100.0 * at_least as f64 / self.games as f64,
                100.0 * n as f64 / self.games as f64
            );
            if at_least == self.games {
                break;
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _logger = Logger::try_with_env_or_str(args.log_level.as_deref().unwrap_or("info"))?
        .write_mode(WriteMode::BufferAndFlush)
        .log_to_stderr()
        .start()?;
    GameEngine::new();

    let search = match args.depth {
        0 => Search::Greedy,
        depth => Search::Expectimax(ExpectimaxConfig { depth, ..Default::default() }),
    };
    let mut player = match &args.resume {
        Some(dir) => {
            let learner = checkpoint::restore(dir).with_context(|| format!("resuming from {}", dir.display()))?;
            TdPlayer::with_learner(learner, search)
        }
        None => {
            let config = LearnerConfig {
                preset: args.preset,
                learning_rate: args.learning_rate,
                lambda: args.lambda,
                stage_thresholds: args.stage_thresholds.clone(),
                halve_after: args.halve_after,
                min_learning_rate: args.min_learning_rate,
            };
            config.validate().context("invalid --stage-thresholds")?;
            info!(
                "first stage holds {} weights ({} MiB)",
                config.preset.total_weights(),
                config.preset.total_weights() * 4 >> 20
            );
            TdPlayer::new(config, search)?
        }
    };
    let mut env = match args.seed {
        Some(seed) => Environment::with_seed(EnvConfig::default(), seed),
        None => Environment::new(EnvConfig::default()),
    };

    let first = player.learner().games_trained();
    info!("training {} -> {} games with {:?}", first, args.games, player.learner().config());

    let pb = if args.quiet { ProgressBar::hidden() } else { ProgressBar::new(args.games) };
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} games ({eta}) {msg}")?
            .progress_chars("=>-"),
    );
    pb.set_position(first);

    let mut block = Block::default();
    for game_no in first + 1..=args.games {
        let game = play_episode(&mut player, &mut env);
        player.learn(&game);
        block.record(&game);
        pb.inc(1);

        if args.block > 0 && game_no % args.block == 0 {
            pb.set_message(format!("avg {:.0}", block.mean()));
            pb.suspend(|| block.report(game_no, player.learner().learning_rate()));
            block = Block::default();
        }
        if let Some(dir) = &args.save {
            if args.save_every > 0 && game_no % args.save_every == 0 {
                pb.suspend(|| player.save(dir)).with_context(|| format!("saving to {}", dir.display()))?;
            }
        }
    }
    pb.finish_with_message("done");

    if let Some(dir) = &args.save {
        player.save(dir).with_context(|| format!("saving to {}", dir.display()))?;
    }
    Ok(())
}
