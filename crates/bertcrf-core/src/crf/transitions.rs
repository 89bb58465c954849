//! Learned transition scores between labels.

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::VarMap;

use crate::crf::ops::IMPOSSIBLE;
use crate::error::{CrfError, Result};
use crate::labels::LabelAlphabet;

/// How the transition matrix is filled before the START/STOP constraint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransitionInit {
    /// All zeros. Deterministic; handy for tests and fixtures.
    Zeros,
    /// Independent normal samples.
    Normal { mean: f32, std: f32 },
}

impl Default for TransitionInit {
    fn default() -> Self {
        TransitionInit::Normal {
            mean: 0.0,
            std: 1.0,
        }
    }
}

/// The `L x L` transition parameter.
///
/// `matrix[i][j]` scores a move *to* label `i` *from* label `j`. Moves into
/// START and out of STOP start at [`IMPOSSIBLE`]. That is a soft constraint:
/// gradient updates may move those entries later unless
/// [`TransitionModel::enforce_constraints`] is called after each step.
#[derive(Debug, Clone)]
pub struct TransitionModel {
    var: Var,
    start: usize,
    stop: usize,
}

impl TransitionModel {
    pub fn new(alphabet: &LabelAlphabet, init: TransitionInit, device: &Device) -> Result<Self> {
        let n = alphabet.len();
        let raw = match init {
            TransitionInit::Zeros => Tensor::zeros((n, n), DType::F32, device)?,
            TransitionInit::Normal { mean, std } => Tensor::randn(mean, std, (n, n), device)?,
        };
        Self::from_tensor(&raw, alphabet.start_id(), alphabet.stop_id())
    }

    /// Wrap an existing matrix, applying the START/STOP constraint once.
    pub fn from_tensor(matrix: &Tensor, start: usize, stop: usize) -> Result<Self> {
        let (rows, cols) = matrix.dims2()?;
        if rows != cols {
            return Err(CrfError::ShapeMismatch(format!(
                "transition matrix must be square, got {rows}x{cols}"
            )));
        }
        for id in [start, stop] {
            if id >= rows {
                return Err(CrfError::LabelOutOfRange {
                    id: id as u32,
                    num_labels: rows,
                });
            }
        }
        let constrained = constrain(matrix, start, stop)?;
        Ok(Self {
            var: Var::from_tensor(&constrained)?,
            start,
            stop,
        })
    }

    /// The current matrix.
    pub fn matrix(&self) -> &Tensor {
        self.var.as_tensor()
    }

    /// The underlying parameter, for optimizers.
    pub fn var(&self) -> &Var {
        &self.var
    }

    pub fn num_labels(&self) -> usize {
        self.var.dims().first().copied().unwrap_or(0)
    }

    /// Re-apply the START/STOP constraint in place.
    pub fn enforce_constraints(&self) -> Result<()> {
        let constrained = constrain(self.var.as_tensor(), self.start, self.stop)?;
        self.var.set(&constrained)?;
        Ok(())
    }

    /// Register the parameter in `varmap` under `name` so it is saved, loaded
    /// and optimized together with the rest of the model.
    pub fn register(&self, varmap: &VarMap, name: &str) -> Result<()> {
        let mut vars = varmap
            .data()
            .lock()
            .map_err(|_| CrfError::VarMapPoisoned)?;
        vars.insert(name.to_string(), self.var.clone());
        Ok(())
    }

    /// Copy the matrix out as nested rows.
    pub fn to_rows(&self) -> Result<Vec<Vec<f32>>> {
        Ok(self.matrix().to_dtype(DType::F32)?.to_vec2()?)
    }
}

/// Set row `start` and column `stop` to [`IMPOSSIBLE`].
fn constrain(matrix: &Tensor, start: usize, stop: usize) -> Result<Tensor> {
    let mut rows: Vec<Vec<f32>> = matrix.to_dtype(DType::F32)?.to_vec2()?;
    let n = rows.len();
    for (i, row) in rows.iter_mut().enumerate() {
        for (j, value) in row.iter_mut().enumerate() {
            if i == start || j == stop {
                *value = IMPOSSIBLE;
            }
        }
    }
    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    Ok(Tensor::from_vec(flat, (n, n), matrix.device())?.to_dtype(matrix.dtype())?)
}
