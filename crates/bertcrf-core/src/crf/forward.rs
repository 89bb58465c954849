//! # Forward Algorithm
//!
//! Computes `log Z(x)`, the log of the summed exponentiated scores of every
//! label path, for a whole batch at once.
//!
//! ```text
//! alpha[0][k] = 0 if k == START else IMPOSSIBLE
//! alpha[t][k] = logsumexp_j(Trans[k][j] + alpha[t-1][j]) + E[t][k]
//! log Z       = logsumexp_k(alpha[T-1][k])
//! ```

use candle_core::Tensor;

use crate::crf::ops::{check_shapes, initial_scores, log_sum_exp, step, transition_scores};
use crate::error::Result;

/// Log-partition value per sequence.
///
/// `emissions` is `(B, T, L)`, `transitions` is `(L, L)`; the result is `(B,)`.
/// Runs in `O(B * T * L^2)` and stays differentiable with respect to both
/// inputs.
pub fn log_partition(emissions: &Tensor, transitions: &Tensor, start_id: usize) -> Result<Tensor> {
    let (batch, seq_len, num_labels) = check_shapes(emissions, transitions)?;
    let mut alpha = initial_scores(
        batch,
        num_labels,
        start_id,
        emissions.dtype(),
        emissions.device(),
    )?;

    for t in 1..seq_len {
        let scores = transition_scores(transitions, &alpha)?;
        alpha = (log_sum_exp(&scores)? + step(emissions, t)?)?;
    }

    log_sum_exp(&alpha)
}
