use ai_threes::agent::{EvaluatorPlayer, Search};
use ai_threes::engine::{self as GameEngine, Board};
use ai_threes::env::{EnvConfig, Environment};
use ai_threes::episode::play_episode;
use ai_threes::learner::{Learner, LearnerConfig};
use ai_threes::ntuple::{NTupleNetwork, NetworkPreset};
use ai_threes::policy::Heuristic;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::hint::black_box;

fn boards() -> Vec<Board> {
    let mut player = EvaluatorPlayer::new("heuristic", Heuristic, Search::Greedy);
    let mut env = Environment::with_seed(EnvConfig::default(), 3);
    play_episode(&mut player, &mut env).after_states().into_iter().map(|a| a.board).collect()
}

fn bench_network(c: &mut Criterion) {
    GameEngine::new();
    let boards = boards();
    for preset in [NetworkPreset::Compact, NetworkPreset::Coarse] {
        let mut net = NTupleNetwork::from_preset(preset);
        c.bench_function(&format!("ntuple/{preset}/value"), |bch| {
            bch.iter(|| boards.iter().map(|b| net.value(b)).sum::<f32>())
        });
        c.bench_function(&format!("ntuple/{preset}/update"), |bch| {
            bch.iter(|| {
                for b in &boards { net.update(b, 0.001); }
                black_box(net.value(&boards[0]))
            })
        });
    }
}

fn bench_learn(c: &mut Criterion) {
    GameEngine::new();
    let mut player = EvaluatorPlayer::new("heuristic", Heuristic, Search::Greedy);
    let mut env = Environment::with_seed(EnvConfig::default(), 11);
    let game = play_episode(&mut player, &mut env);
    let config = LearnerConfig { preset: NetworkPreset::Compact, ..Default::default() };
    c.bench_function("learner/td_lambda_episode", |bch| {
        bch.iter_batched(
            || Learner::new(config.clone()).expect("thresholds ascend"),
            |mut learner| black_box(learner.learn_episode(&game)),
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_network, bench_learn);
criterion_main!(benches);
