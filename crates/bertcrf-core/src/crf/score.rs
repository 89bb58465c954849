//! Gold path scoring.
//!
//! Uses the same `Trans[to][from] + E[t][to]` convention as the forward
//! algorithm, so `log Z - gold >= 0` holds for every gold path.

use candle_core::{DType, Tensor};

use crate::crf::ops::check_shapes;
use crate::error::{CrfError, Result};

/// Unnormalized score of the labelled path of each sequence.
///
/// `labels` is a `(B, T)` integer tensor of label ids. Position 0 is the START
/// symbol and contributes nothing. Returns `(B,)`.
pub fn gold_score(emissions: &Tensor, transitions: &Tensor, labels: &Tensor) -> Result<Tensor> {
    let (batch, seq_len, num_labels) = check_shapes(emissions, transitions)?;
    let gold: Vec<Vec<u32>> = labels.to_dtype(DType::U32)?.to_vec2()?;
    if gold.len() != batch || gold.iter().any(|row| row.len() != seq_len) {
        return Err(CrfError::ShapeMismatch(format!(
            "labels {:?} do not match emissions ({batch}, {seq_len}, {num_labels})",
            labels.dims()
        )));
    }
    if let Some(&id) = gold.iter().flatten().find(|&&id| id as usize >= num_labels) {
        return Err(CrfError::LabelOutOfRange { id, num_labels });
    }

    if seq_len < 2 {
        return Ok(Tensor::zeros(batch, emissions.dtype(), emissions.device())?);
    }
    let steps = seq_len - 1;

    // E[b][t][G[b][t]] for t >= 1
    let emitted = emissions
        .narrow(1, 1, steps)?
        .contiguous()?
        .gather(&labels.narrow(1, 1, steps)?.to_dtype(DType::U32)?.contiguous()?.unsqueeze(2)?, 2)?
        .squeeze(2)?
        .sum(1)?;

    // Trans[G[t]][G[t-1]] looked up in the flattened matrix.
    let flat_ids: Vec<u32> = gold
        .iter()
        .flat_map(|row| {
            row.windows(2)
                .map(|pair| pair[1] * num_labels as u32 + pair[0])
                .collect::<Vec<_>>()
        })
        .collect();
    let flat_ids = Tensor::from_vec(flat_ids, batch * steps, emissions.device())?;
    let transitioned = transitions
        .flatten_all()?
        .index_select(&flat_ids, 0)?
        .reshape((batch, steps))?
        .sum(1)?;

    Ok((emitted + transitioned)?)
}
