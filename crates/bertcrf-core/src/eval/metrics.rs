//! Token-level precision, recall and F1.
//!
//! Zero denominators are resolved by a fixed policy instead of an error. F1 is
//! 1 whenever `precision * recall` is 0:
//!
//! | proposed | gold | correct | precision | recall | F1 |
//! | --- | --- | --- | --- | --- | --- |
//! | 0 | 0 | 0 | 1 | 1 | 1 |
//! | 0 | > 0 | 0 | 1 | 0 | 1 |
//! | > 0 | 0 | 0 | 0 | 1 | 1 |
//! | > 0 | > 0 | 0 | 0 | 0 | 1 |
//! | > 0 | > 0 | > 0 | c/p | c/g | harmonic mean |

use serde::Serialize;

use crate::crf::DecodedPath;
use crate::labels::LabelAlphabet;

/// Raw counts behind [`Prf`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenCounts {
    /// Positive predictions.
    pub proposed: usize,
    /// Positive gold labels.
    pub gold: usize,
    /// Positive gold labels predicted exactly.
    pub correct: usize,
}

impl TokenCounts {
    pub fn from_streams<F>(y_true: &[usize], y_pred: &[usize], is_positive: F) -> Self
    where
        F: Fn(usize) -> bool,
    {
        let mut counts = Self::default();
        for (&gold, &pred) in y_true.iter().zip(y_pred) {
            counts.record(gold, pred, &is_positive);
        }
        counts
    }

    fn record<F: Fn(usize) -> bool>(&mut self, gold: usize, pred: usize, is_positive: &F) {
        if is_positive(pred) {
            self.proposed += 1;
        }
        if is_positive(gold) {
            self.gold += 1;
            if pred == gold {
                self.correct += 1;
            }
        }
    }

    pub fn prf(&self) -> Prf {
        let precision = if self.proposed == 0 {
            1.0
        } else {
            self.correct as f64 / self.proposed as f64
        };
        let recall = if self.gold == 0 {
            1.0
        } else {
            self.correct as f64 / self.gold as f64
        };
        let f1 = if precision * recall == 0.0 {
            1.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        Prf {
            precision,
            recall,
            f1,
        }
    }
}

/// Precision, recall and F1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prf {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Precision/recall/F1 of two aligned label streams.
pub fn f1_score<F>(y_true: &[usize], y_pred: &[usize], is_positive: F) -> Prf
where
    F: Fn(usize) -> bool,
{
    TokenCounts::from_streams(y_true, y_pred, is_positive).prf()
}

/// Summary of one evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvaluationReport {
    /// Exact-match rate over every predicted position.
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Number of predicted positions.
    pub tokens: usize,
}

/// Collects masked gold/predicted streams batch by batch.
#[derive(Debug)]
pub struct MetricsAccumulator<'a> {
    alphabet: &'a LabelAlphabet,
    y_true: Vec<usize>,
    y_pred: Vec<usize>,
}

impl<'a> MetricsAccumulator<'a> {
    pub fn new(alphabet: &'a LabelAlphabet) -> Self {
        Self {
            alphabet,
            y_true: Vec::new(),
            y_pred: Vec::new(),
        }
    }

    /// Record the positions of one sequence whose predict mask is set.
    pub fn add(&mut self, gold: &[u32], predict_mask: &[bool], decoded: &DecodedPath) {
        for ((&g, &keep), &p) in gold.iter().zip(predict_mask).zip(&decoded.labels) {
            if keep {
                self.y_true.push(g as usize);
                self.y_pred.push(p);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.y_true.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y_true.is_empty()
    }

    pub fn report(&self) -> EvaluationReport {
        let tokens = self.len();
        let matched = self
            .y_true
            .iter()
            .zip(&self.y_pred)
            .filter(|(g, p)| g == p)
            .count();
        let accuracy = if tokens == 0 {
            0.0
        } else {
            matched as f64 / tokens as f64
        };
        let prf = f1_score(&self.y_true, &self.y_pred, |id| self.alphabet.is_positive(id));
        EvaluationReport {
            accuracy,
            precision: prf.precision,
            recall: prf.recall,
            f1: prf.f1,
            tokens,
        }
    }
}
