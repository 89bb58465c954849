//! Confidence-ranked re-splitting of an evaluation corpus.
//!
//! The least certain examples stay held out for the next evaluation; the rest
//! are promoted into the training corpus.

use tracing::warn;

/// Result of [`ConfidenceRankedCorpus::partition`].
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusSplit<T> {
    /// The K lowest-confidence examples, ascending.
    pub held_out: Vec<T>,
    /// Everything else, ascending.
    pub promoted: Vec<T>,
}

/// Examples paired with the decoder's confidence.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceRankedCorpus<T> {
    entries: Vec<(f32, T)>,
}

impl<T> ConfidenceRankedCorpus<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn from_pairs<I: IntoIterator<Item = (f32, T)>>(pairs: I) -> Self {
        Self {
            entries: pairs.into_iter().collect(),
        }
    }

    pub fn push(&mut self, confidence: f32, example: T) {
        self.entries.push((confidence, example));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stable ascending sort by confidence, then split after `cutoff`
    /// examples. A cutoff past the end holds everything out. NaN of either
    /// sign ranks above every real confidence.
    pub fn partition(mut self, cutoff: usize) -> CorpusSplit<T> {
        let cutoff = if cutoff > self.entries.len() {
            warn!(
                cutoff,
                examples = self.entries.len(),
                "cutoff exceeds corpus size, holding out every example"
            );
            self.entries.len()
        } else {
            cutoff
        };

        self.entries
            .sort_by(|a, b| rank_key(a.0).total_cmp(&rank_key(b.0)));
        let mut examples = self.entries.into_iter().map(|(_, example)| example);
        let held_out = examples.by_ref().take(cutoff).collect();
        let promoted = examples.collect();
        CorpusSplit { held_out, promoted }
    }
}

fn rank_key(confidence: f32) -> f32 {
    if confidence.is_nan() {
        f32::INFINITY
    } else {
        confidence
    }
}

impl<T> FromIterator<(f32, T)> for ConfidenceRankedCorpus<T> {
    fn from_iter<I: IntoIterator<Item = (f32, T)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}
