//! Tensor helpers shared by the forward algorithm and the Viterbi decoder.

use candle_core::{D, DType, Device, Tensor};

use crate::error::{CrfError, Result};

/// Score used for "impossible" states and forbidden transitions.
pub const IMPOSSIBLE: f32 = -10000.0;

/// Numerically stable `log(sum(exp(xs)))` over the last dimension.
///
/// The slice maximum is subtracted before exponentiating and added back after.
pub fn log_sum_exp(xs: &Tensor) -> Result<Tensor> {
    let max = xs.max_keepdim(D::Minus1)?;
    let summed = xs
        .broadcast_sub(&max)?
        .exp()?
        .sum_keepdim(D::Minus1)?
        .log()?;
    Ok((summed + max)?.squeeze(D::Minus1)?)
}

/// Log-probability mass at t = 0: zero at START, [`IMPOSSIBLE`] elsewhere.
///
/// Shape `(batch, num_labels)`.
pub fn initial_scores(
    batch: usize,
    num_labels: usize,
    start_id: usize,
    dtype: DType,
    device: &Device,
) -> Result<Tensor> {
    if start_id >= num_labels {
        return Err(CrfError::LabelOutOfRange {
            id: start_id as u32,
            num_labels,
        });
    }
    let mut row = vec![IMPOSSIBLE; num_labels];
    row[start_id] = 0.0;
    let row = Tensor::from_vec(row, (1, num_labels), device)?.to_dtype(dtype)?;
    Ok(row.broadcast_as((batch, num_labels))?.contiguous()?)
}

/// Emission scores at time step `t`, shape `(batch, num_labels)`.
pub(crate) fn step(emissions: &Tensor, t: usize) -> Result<Tensor> {
    Ok(emissions.narrow(1, t, 1)?.squeeze(1)?)
}

/// `Trans[k][j] + prev[b][j]` for every batch row, shape `(batch, L, L)`.
pub(crate) fn transition_scores(transitions: &Tensor, prev: &Tensor) -> Result<Tensor> {
    Ok(transitions.unsqueeze(0)?.broadcast_add(&prev.unsqueeze(1)?)?)
}

/// Check that emissions are `(B, T, L)` with `T >= 1` and match an `L x L`
/// transition matrix.
pub(crate) fn check_shapes(
    emissions: &Tensor,
    transitions: &Tensor,
) -> Result<(usize, usize, usize)> {
    let (batch, seq_len, num_labels) = emissions.dims3()?;
    let (rows, cols) = transitions.dims2()?;
    if rows != num_labels || cols != num_labels {
        return Err(CrfError::ShapeMismatch(format!(
            "emissions have {num_labels} labels but transitions are {rows}x{cols}"
        )));
    }
    if seq_len == 0 {
        return Err(CrfError::ShapeMismatch("empty sequence".into()));
    }
    Ok((batch, seq_len, num_labels))
}
