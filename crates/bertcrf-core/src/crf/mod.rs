//! # Linear-chain CRF
//!
//! Score convention shared by every part of this module:
//!
//! ```text
//! score(path) = sum_{t=1..T-1} Trans[path[t]][path[t-1]] + E[t][path[t]]
//! ```
//!
//! with the START label certain at t = 0. The forward algorithm, the gold
//! scorer and the Viterbi decoder must agree on it, otherwise the loss can go
//! negative.

pub mod forward;
pub mod loss;
pub mod model;
pub mod ops;
pub mod score;
pub mod transitions;
pub mod viterbi;

#[cfg(test)]
pub(crate) mod testing;

use candle_core::{Device, Tensor};

use crate::error::Result;
use crate::labels::LabelAlphabet;

pub use forward::log_partition;
pub use loss::neg_log_likelihood;
pub use model::{BertEncoder, CrfTagger, Encoder};
pub use ops::IMPOSSIBLE;
pub use score::gold_score;
pub use transitions::{TransitionInit, TransitionModel};
pub use viterbi::{ConfidenceKind, DecodedPath, ViterbiDecoder};

/// Transition model plus decoder for one label alphabet.
#[derive(Debug, Clone)]
pub struct Crf {
    transitions: TransitionModel,
    decoder: ViterbiDecoder,
    start: usize,
}

impl Crf {
    pub fn new(
        alphabet: &LabelAlphabet,
        init: TransitionInit,
        confidence: ConfidenceKind,
        device: &Device,
    ) -> Result<Self> {
        Ok(Self::from_parts(
            TransitionModel::new(alphabet, init, device)?,
            alphabet.start_id(),
            confidence,
        ))
    }

    pub fn from_parts(
        transitions: TransitionModel,
        start: usize,
        confidence: ConfidenceKind,
    ) -> Self {
        Self {
            transitions,
            decoder: ViterbiDecoder::new(start, confidence),
            start,
        }
    }

    pub fn transitions(&self) -> &TransitionModel {
        &self.transitions
    }

    pub fn decoder(&self) -> &ViterbiDecoder {
        &self.decoder
    }

    /// `log Z(x)` per sequence, `(B,)`.
    pub fn log_partition(&self, emissions: &Tensor) -> Result<Tensor> {
        log_partition(emissions, self.transitions.matrix(), self.start)
    }

    /// Gold path score per sequence, `(B,)`.
    pub fn gold_score(&self, emissions: &Tensor, labels: &Tensor) -> Result<Tensor> {
        gold_score(emissions, self.transitions.matrix(), labels)
    }

    /// Scalar batch loss.
    pub fn neg_log_likelihood(&self, emissions: &Tensor, labels: &Tensor) -> Result<Tensor> {
        neg_log_likelihood(emissions, self.transitions.matrix(), labels, self.start)
    }

    pub fn decode(&self, emissions: &Tensor) -> Result<Vec<DecodedPath>> {
        self.decoder.decode(emissions, self.transitions.matrix())
    }
}
