use std::path::PathBuf;

use ai_threes::agent::{EvaluatorPlayer, Search};
use ai_threes::checkpoint;
use ai_threes::engine::{self as GameEngine, MAX_RANK};
use ai_threes::env::{EnvConfig, Environment};
use ai_threes::episode::{play_episode, Episode};
use ai_threes::learner::Learner;
use ai_threes::policy::{Evaluator, ExpectimaxConfig, Heuristic};
use ai_threes::trace::{self, Run};
use anyhow::Context;
use clap::Parser;
use flexi_logger::{AdaptiveFormat, Logger};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use rayon::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "play", version, about = "Evaluate a player over many seeded games in parallel")]
struct Args {
    /// Checkpoint directory to play with; the hand-tuned heuristic is used otherwise
    #[arg(long, value_name = "DIR")]
    load: Option<PathBuf>,
    #[arg(short = 'n', long, default_value_t = 1_000)]
    games: u64,
    /// Expectimax depth; 0 plays greedily
    #[arg(long, default_value_t = 0)]
    depth: u32,
    /// Game i uses environment seed `seed + i`
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Worker threads (defaults to rayon's choice)
    #[arg(short = 'j', long)]
    threads: Option<usize>,
    /// Write the best game as a binary trace
    #[arg(short, long, value_name = "FILE")]
    out: Option<PathBuf>,
    #[arg(long)]
    log_level: Option<String>,
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy)]
struct GameResult {
    seed: u64,
    score: f32,
    max_rank: u8,
    slides: usize,
}

fn play_one<E: Evaluator>(name: &str, eval: E, search: Search, seed: u64) -> Episode {
    let mut player = EvaluatorPlayer::new(name, eval, search);
    let mut env = Environment::with_seed(EnvConfig::default(), seed);
    play_episode(&mut player, &mut env)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _logger = Logger::try_with_env_or_str(args.log_level.as_deref().unwrap_or("info"))?
        .log_to_stderr()
        .adaptive_format_for_stderr(AdaptiveFormat::Default)
        .start()?;
    GameEngine::new();

    if let Some(n) = args.threads {
        rayon::ThreadPoolBuilder::new().num_threads(n).build_global()?;
    }
    let search = match args.depth {
        0 => Search::Greedy,
        depth => Search::Expectimax(ExpectimaxConfig { depth, ..Default::default() }),
    };
    let learner: Option<Learner> = match &args.load {
        Some(dir) => Some(
            checkpoint::restore(dir).with_context(|| format!("loading checkpoint from {}", dir.display()))?,
        ),
        None => None,
    };
    let name = match (&learner, search) {
        (None, _) => "heuristic".to_string(),
        (Some(_), Search::Greedy) => "td".to_string(),
        (Some(_), Search::Expectimax(cfg)) => format!("td-expectimax{}", cfg.depth),
    };
    // Each game owns its player; the networks are shared read-only.
    let run = |seed: u64| match &learner {
        Some(l) => play_one(&name, l, search, seed),
        None => play_one(&name, Heuristic, search, seed),
    };

    let pb = if args.quiet { ProgressBar::hidden() } else { ProgressBar::new(args.games) };
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} games ({eta})")?
            .progress_chars("=>-"),
    );
    info!("playing {} games as {}", args.games, name);

    let mut results: Vec<GameResult> = (0..args.games)
        .into_par_iter()
        .map(|i| {
            let seed = args.seed.wrapping_add(i);
            let game = run(seed);
            pb.inc(1);
            GameResult { seed, score: game.score(), max_rank: game.max_rank(), slides: game.slides() }
        })
        .collect();
    pb.finish_and_clear();
    if results.is_empty() {
        return Ok(());
    }

    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    let games = results.len() as f64;
    let mean = results.iter().map(|r| r.score as f64).sum::<f64>() / games;
    let median = results[results.len() / 2].score;
    let slides = results.iter().map(|r| r.slides as f64).sum::<f64>() / games;
    println!("{} games as {}", results.len(), name);
    println!("avg score: {:.1} | median: {:.0} | max: {:.0} | slides/game: {:.1}", mean, median, results[0].score, slides);

    let mut reached = [0u64; MAX_RANK as usize + 1];
    for r in &results {
        reached[r.max_rank as usize] += 1;
    }
    let mut at_least = 0;
    for rank in (1..=MAX_RANK).rev() {
        at_least += reached[rank as usize];
        if at_least > 0 {
            println!("  {:>5}: {:>6.2}%", GameEngine::tile_value(rank), 100.0 * at_least as f64 / games);
        }
        if at_least == results.len() as u64 {
            break;
        }
    }

    if let Some(path) = &args.out {
        // Games are deterministic per seed, so the best one is replayed rather than kept.
        let best = results[0];
        let start = trace::now_unix_seconds();
        let game = run(best.seed);
        let record = Run::from_episode(&game, Some(&name), start);
        trace::write_run_to_path(path, &record).with_context(|| format!("writing trace to {}", path.display()))?;
        info!("best game (seed {}, score {}) written to {}", best.seed, best.score, path.display());
    }
    Ok(())
}
