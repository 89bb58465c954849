//! Training and evaluation datasets.

use std::path::Path;

use anyhow::{Context, Result};
use bertcrf_core::corpus::read_corpus;
use bertcrf_core::{Batch, FeatureBuilder, InputFeatures, Sentence, SubwordTokenizer};
use candle_core::Device;
use oorandom::Rand64;

/// Sentences of one split with their encoder features, index-aligned.
#[derive(Debug, Clone)]
pub struct NerDataset {
    sentences: Vec<Sentence>,
    features: Vec<InputFeatures>,
}

impl NerDataset {
    /// Load a corpus file and build features for every sentence.
    pub fn load<P, T>(path: P, builder: &FeatureBuilder<'_, T>) -> Result<Self>
    where
        P: AsRef<Path>,
        T: SubwordTokenizer,
    {
        let path = path.as_ref();
        let sentences = read_corpus(path)?;
        Self::from_sentences(sentences, builder)
            .with_context(|| format!("building features for {}", path.display()))
    }

    pub fn from_sentences<T: SubwordTokenizer>(
        sentences: Vec<Sentence>,
        builder: &FeatureBuilder<'_, T>,
    ) -> Result<Self> {
        let features = sentences
            .iter()
            .enumerate()
            .map(|(guid, sentence)| builder.build(guid, sentence))
            .collect::<bertcrf_core::Result<Vec<_>>>()?;
        Ok(Self {
            sentences,
            features,
        })
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    /// Indices in file order.
    pub fn sequential_order(&self) -> Vec<usize> {
        (0..self.len()).collect()
    }

    /// Indices in a Fisher-Yates shuffled order.
    pub fn shuffled_order(&self, rng: &mut Rand64) -> Vec<usize> {
        let mut order = self.sequential_order();
        for i in (1..order.len()).rev() {
            let j = rng.rand_range(0..(i as u64 + 1)) as usize;
            order.swap(i, j);
        }
        order
    }

    /// Padded batches following `order`. The last batch may be short.
    pub fn batches<'a>(
        &'a self,
        order: &'a [usize],
        batch_size: usize,
        pad_label: u32,
        device: &'a Device,
    ) -> impl Iterator<Item = bertcrf_core::Result<Batch>> + 'a {
        order.chunks(batch_size.max(1)).map(move |chunk| {
            let group: Vec<InputFeatures> =
                chunk.iter().map(|&i| self.features[i].clone()).collect();
            Batch::collate(&group, pad_label, device)
        })
    }

    /// Number of batches per pass.
    pub fn num_batches(&self, batch_size: usize) -> usize {
        self.len().div_ceil(batch_size.max(1))
    }
}
