//! # Viterbi Decoding for CRF
//!
//! Finds the highest-scoring label path for every sequence of a batch and
//! attaches a confidence figure used to rank examples by certainty.

use candle_core::{D, DType, Tensor};
use serde::{Deserialize, Serialize};

use crate::crf::forward::log_partition;
use crate::crf::ops::{check_shapes, initial_scores, step, transition_scores};
use crate::error::{CrfError, Result};

/// How [`DecodedPath::confidence`] is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceKind {
    /// Best path score minus the second-best path score, divided by the
    /// sequence length. A relative ranking signal only.
    #[default]
    Margin,
    /// `exp(path_score - log Z)`: the CRF probability of the decoded path.
    PathPosterior,
}

/// Best path of one sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedPath {
    /// Label ids, one per time step.
    pub labels: Vec<usize>,
    /// Unnormalized score of `labels`.
    pub score: f32,
    /// Larger means more certain; see [`ConfidenceKind`].
    pub confidence: f32,
}

/// Batched max-product decoder with backpointer trace-back.
#[derive(Debug, Clone)]
pub struct ViterbiDecoder {
    start_id: usize,
    confidence: ConfidenceKind,
}

impl ViterbiDecoder {
    /// Create a new Viterbi decoder.
    ///
    /// # Arguments
    /// * `start_id` - Label id of the START sentinel, certain at t = 0
    /// * `confidence` - Which confidence figure to attach to each path
    pub fn new(start_id: usize, confidence: ConfidenceKind) -> Self {
        Self {
            start_id,
            confidence,
        }
    }

    pub fn confidence_kind(&self) -> ConfidenceKind {
        self.confidence
    }

    /// Decode the optimal label sequence of every batch row.
    ///
    /// # Arguments
    /// * `emissions` - Tensor of shape `(B, T, L)`
    /// * `transitions` - Tensor of shape `(L, L)`, `[to][from]`
    ///
    /// # Returns
    /// One [`DecodedPath`] per batch row, each of length `T`.
    pub fn decode(&self, emissions: &Tensor, transitions: &Tensor) -> Result<Vec<DecodedPath>> {
        let (batch, seq_len, num_labels) = check_shapes(emissions, transitions)?;
        let emissions = emissions.detach();
        let transitions = transitions.detach();

        let mut delta = initial_scores(
            batch,
            num_labels,
            self.start_id,
            emissions.dtype(),
            emissions.device(),
        )?;
        // second-best score of a path ending in each label; one path per label at t = 0
        let mut second = match self.confidence {
            ConfidenceKind::Margin => Some(delta.zeros_like()?.affine(1.0, f64::NEG_INFINITY)?),
            ConfidenceKind::PathPosterior => None,
        };
        // psi[t - 1][b][k]: best previous label for label k at step t
        let mut psi: Vec<Vec<Vec<u32>>> = Vec::with_capacity(seq_len.saturating_sub(1));

        for t in 1..seq_len {
            let scores = transition_scores(&transitions, &delta)?;
            let emit = step(&emissions, t)?;
            if let Some(second) = second.as_mut() {
                let runners = transition_scores(&transitions, second)?;
                let candidates = Tensor::cat(&[&scores, &runners], D::Minus1)?;
                *second = (second_largest(&candidates)? + &emit)?;
            }
            psi.push(scores.argmax(D::Minus1)?.to_vec2()?);
            delta = (scores.max(D::Minus1)? + emit)?;
        }

        let runner_up: Option<Vec<f32>> = match &second {
            Some(second) => Some(
                second_largest(&Tensor::cat(&[&delta, second], D::Minus1)?)?
                    .to_dtype(DType::F32)?
                    .to_vec1()?,
            ),
            None => None,
        };
        let last: Vec<Vec<f32>> = delta.to_dtype(DType::F32)?.to_vec2()?;
        let log_z: Option<Vec<f32>> = match self.confidence {
            ConfidenceKind::PathPosterior => Some(
                log_partition(&emissions, &transitions, self.start_id)?
                    .to_dtype(DType::F32)?
                    .to_vec1()?,
            ),
            ConfidenceKind::Margin => None,
        };

        let mut paths = Vec::with_capacity(batch);
        for (b, final_scores) in last.iter().enumerate() {
            let (best_last, best_score) = best_of(final_scores)?;

            // Backtrack
            let mut labels = vec![0usize; seq_len];
            labels[seq_len - 1] = best_last;
            for t in (0..seq_len - 1).rev() {
                labels[t] = psi[t][b][labels[t + 1]] as usize;
            }

            let confidence = match (&log_z, &runner_up) {
                (Some(log_z), _) => (best_score - log_z[b]).exp(),
                // a lone path has no competitor
                (None, Some(runner_up)) if runner_up[b].is_finite() => {
                    (best_score - runner_up[b]) / seq_len as f32
                }
                (None, _) => 0.0,
            };
            paths.push(DecodedPath {
                labels,
                score: best_score,
                confidence,
            });
        }

        Ok(paths)
    }
}

/// Index and value of the maximum; the first one wins ties.
fn best_of(scores: &[f32]) -> Result<(usize, f32)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (k, score)| match best {
            Some((_, best_score)) if score <= best_score => best,
            _ => Some((k, score)),
        })
        .ok_or_else(|| CrfError::ShapeMismatch("no labels to decode".into()))
}

/// Second-largest value along the last dimension. Ties count as distinct
/// entries, so a repeated maximum is also the second-largest value.
fn second_largest(scores: &Tensor) -> Result<Tensor> {
    let width = scores.dim(D::Minus1)?;
    let positions = Tensor::arange(0u32, width as u32, scores.device())?;
    let is_best = scores
        .argmax_keepdim(D::Minus1)?
        .broadcast_eq(&positions)?;
    let removed = scores.zeros_like()?.affine(1.0, f64::NEG_INFINITY)?;
    Ok(is_best.where_cond(&removed, scores)?.max(D::Minus1)?)
}
