//! Hand-tuned line heuristic, tabulated alongside the slide tables.
//!
//! Only the heuristic evaluator reads these values; the learned network never
//! does.

const LOST_PENALTY: f32 = 200_000.0;
const MONOTONICITY_POWER: f32 = 4.0;
const MONOTONICITY_WEIGHT: f32 = 47.0;
const SUM_POWER: f32 = 3.5;
const SUM_WEIGHT: f32 = 11.0;
const MERGES_WEIGHT: f32 = 700.0;
const EMPTY_WEIGHT: f32 = 270.0;

pub(crate) fn line_score(line: &[u8; 4]) -> f32 {
    LOST_PENALTY + calc_empty(line) + calc_merges(line) - calc_monotonicity(line) - calc_sum(line)
}

fn calc_sum(line: &[u8; 4]) -> f32 {
    line.iter().fold(0., |acc, &rank| acc + (rank as f32).powf(SUM_POWER)) * SUM_WEIGHT
}

fn calc_empty(line: &[u8; 4]) -> f32 {
    line.iter().filter(|&&rank| rank == 0).count() as f32 * EMPTY_WEIGHT
}

// Runs of equal non-empty ranks; empty cells do not break a run.
fn calc_merges(line: &[u8; 4]) -> f32 {
    let mut prev = 0;
    let mut counter = 0.;
    let mut merges = 0.;
    for &rank in line.iter().filter(|&&rank| rank != 0) {
        if prev == rank {
            counter += 1.;
        } else if counter > 0. {
            merges += 1. + counter;
            counter = 0.;
        }
        prev = rank;
    }
    if counter > 0. {
        merges += 1. + counter;
    }
    merges * MERGES_WEIGHT
}

fn calc_monotonicity(line: &[u8; 4]) -> f32 {
    let mut monotonicity_left = 0.;
    let mut monotonicity_right = 0.;
    for i in 1..4 {
        let a = (line[i - 1] as f32).powf(MONOTONICITY_POWER);
        let b = (line[i] as f32).powf(MONOTONICITY_POWER);
        if line[i - 1] > line[i] {
            monotonicity_left += a - b;
        } else {
            monotonicity_right += b - a;
        }
    }
    f32::min(monotonicity_left, monotonicity_right) * MONOTONICITY_WEIGHT
}
