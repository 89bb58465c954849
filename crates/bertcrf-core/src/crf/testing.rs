//! Small fixtures and brute-force references for CRF tests.

use candle_core::{Device, Tensor};

use crate::crf::ops::IMPOSSIBLE;
use crate::crf::transitions::TransitionModel;
use crate::labels::LabelAlphabet;

pub const START: usize = 0;
pub const STOP: usize = 1;
pub const O: usize = 2;
pub const ENT: usize = 3;
pub const NUM_LABELS: usize = 4;

/// `{START, STOP, O, ENT}` with `O` doubling as the filler label.
pub fn toy_alphabet() -> LabelAlphabet {
    LabelAlphabet::new(&["START", "STOP", "O", "ENT"], "START", "STOP", "O").unwrap()
}

/// Emissions `(2, 3, 4)` and a constrained transition matrix.
pub fn toy_inputs() -> (Tensor, Tensor) {
    let emissions = Tensor::new(
        &[
            [
                [0.5f32, 0.1, 0.2, 0.3],
                [0.1, 0.4, 1.2, 0.8],
                [0.0, 0.9, 0.3, 0.6],
            ],
            [
                [0.2, 0.2, 0.2, 0.2],
                [1.0, -0.5, 0.3, 2.0],
                [0.4, 0.1, 1.5, -1.0],
            ],
        ],
        &Device::Cpu,
    )
    .unwrap();
    let raw = Tensor::new(
        &[
            [0.0f32, 0.0, 0.0, 0.0],
            [0.2, -0.1, 0.5, 0.3],
            [0.6, -0.2, 0.4, -0.3],
            [0.1, 0.3, -0.5, 0.7],
        ],
        &Device::Cpu,
    )
    .unwrap();
    let transitions = TransitionModel::from_tensor(&raw, START, STOP)
        .unwrap()
        .matrix()
        .clone();
    (emissions, transitions)
}

/// Every label path of length `seq_len`.
pub fn all_paths(seq_len: usize, num_labels: usize) -> Vec<Vec<usize>> {
    let mut paths = vec![Vec::new()];
    for _ in 0..seq_len {
        paths = paths
            .into_iter()
            .flat_map(|p| {
                (0..num_labels).map(move |k| {
                    let mut next = p.clone();
                    next.push(k);
                    next
                })
            })
            .collect();
    }
    paths
}

/// Unnormalized score of a path including the START prior at t = 0.
pub fn path_score(emissions: &[Vec<f32>], transitions: &[Vec<f32>], path: &[usize]) -> f64 {
    let mut score = if path[0] == START { 0.0 } else { IMPOSSIBLE as f64 };
    for t in 1..path.len() {
        score += transitions[path[t]][path[t - 1]] as f64 + emissions[t][path[t]] as f64;
    }
    score
}

pub fn brute_force_log_z(emissions: &[Vec<f32>], transitions: &[Vec<f32>]) -> f64 {
    let scores: Vec<f64> = all_paths(emissions.len(), transitions.len())
        .iter()
        .map(|p| path_score(emissions, transitions, p))
        .collect();
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    max + scores.iter().map(|s| (s - max).exp()).sum::<f64>().ln()
}

pub fn brute_force_best(emissions: &[Vec<f32>], transitions: &[Vec<f32>]) -> f64 {
    all_paths(emissions.len(), transitions.len())
        .iter()
        .map(|p| path_score(emissions, transitions, p))
        .fold(f64::NEG_INFINITY, f64::max)
}
