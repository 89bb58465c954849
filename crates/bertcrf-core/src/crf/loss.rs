//! Negative log-likelihood of gold paths.

use candle_core::Tensor;

use crate::crf::forward::log_partition;
use crate::crf::score::gold_score;
use crate::error::Result;

/// Mean negative log-likelihood of the gold paths: `mean(log Z - gold)`.
///
/// Returns a scalar tensor; call `backward()` on it to reach the transition
/// matrix and, through `emissions`, the encoder.
pub fn neg_log_likelihood(
    emissions: &Tensor,
    transitions: &Tensor,
    labels: &Tensor,
    start_id: usize,
) -> Result<Tensor> {
    let forward = log_partition(emissions, transitions, start_id)?;
    let gold = gold_score(emissions, transitions, labels)?;
    Ok((forward - gold)?.mean_all()?)
}
