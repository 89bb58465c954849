//! # Sub-word Features
//!
//! Turns a labelled sentence into encoder input: `[CLS]`, the word pieces of
//! every word, `[SEP]`. Only the first piece of a word is scored against its
//! label; continuation pieces carry the filler label and a zero predict mask.

use std::path::Path;

use tokenizers::Tokenizer as HfTokenizer;
use tracing::warn;

use crate::corpus::Sentence;
use crate::error::{CrfError, Result};
use crate::labels::LabelAlphabet;

/// The sub-word tokenizer collaborator.
pub trait SubwordTokenizer {
    /// Piece ids of one word; may be empty.
    fn word_pieces(&self, word: &str) -> Result<Vec<u32>>;
    /// Id used when a word yields no pieces.
    fn unknown_id(&self) -> u32;
    /// Id of the leading boundary token.
    fn cls_id(&self) -> u32;
    /// Id of the trailing boundary token.
    fn sep_id(&self) -> u32;
}

/// [`SubwordTokenizer`] backed by a Hugging Face `tokenizer.json`.
pub struct HfSubwordTokenizer {
    inner: HfTokenizer,
    unknown: u32,
    cls: u32,
    sep: u32,
}

impl HfSubwordTokenizer {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let inner =
            HfTokenizer::from_file(path.as_ref()).map_err(|e| CrfError::Tokenizer(e.to_string()))?;
        Self::new(inner)
    }

    /// Wrap a tokenizer whose vocabulary has `[UNK]`, `[CLS]` and `[SEP]`.
    pub fn new(inner: HfTokenizer) -> Result<Self> {
        let id = |token: &str| {
            inner
                .token_to_id(token)
                .ok_or_else(|| CrfError::Tokenizer(format!("vocabulary has no {token} token")))
        };
        Ok(Self {
            unknown: id("[UNK]")?,
            cls: id("[CLS]")?,
            sep: id("[SEP]")?,
            inner,
        })
    }
}

impl SubwordTokenizer for HfSubwordTokenizer {
    fn word_pieces(&self, word: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(word, false)
            .map_err(|e| CrfError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn unknown_id(&self) -> u32 {
        self.unknown
    }

    fn cls_id(&self) -> u32 {
        self.cls
    }

    fn sep_id(&self) -> u32 {
        self.sep
    }
}

/// Encoder input for one sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFeatures {
    pub input_ids: Vec<u32>,
    /// True at the first piece of each word.
    pub predict_mask: Vec<bool>,
    pub label_ids: Vec<u32>,
}

impl InputFeatures {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

/// Builds [`InputFeatures`] with a fixed maximum length.
pub struct FeatureBuilder<'a, T> {
    tokenizer: &'a T,
    alphabet: &'a LabelAlphabet,
    max_seq_length: usize,
}

impl<'a, T: SubwordTokenizer> FeatureBuilder<'a, T> {
    pub fn new(
        tokenizer: &'a T,
        alphabet: &'a LabelAlphabet,
        max_seq_length: usize,
    ) -> Result<Self> {
        if max_seq_length < 2 {
            return Err(CrfError::InvalidConfig(format!(
                "max_seq_length must be at least 2, got {max_seq_length}"
            )));
        }
        Ok(Self {
            tokenizer,
            alphabet,
            max_seq_length,
        })
    }

    /// Convert sentence `guid`. Over-long sentences are truncated with a
    /// warning; unknown labels are an error.
    pub fn build(&self, guid: usize, sentence: &Sentence) -> Result<InputFeatures> {
        let filler = self.alphabet.filler_id() as u32;
        let mut input_ids = vec![self.tokenizer.cls_id()];
        let mut predict_mask = vec![false];
        let mut label_ids = vec![self.alphabet.start_id() as u32];

        for (word, label) in sentence.words.iter().zip(&sentence.labels) {
            let label_id = self
                .alphabet
                .id_of(label)
                .ok_or_else(|| CrfError::UnknownLabel {
                    guid,
                    label: label.clone(),
                })? as u32;

            let mut pieces = self.tokenizer.word_pieces(word)?;
            if pieces.is_empty() {
                pieces.push(self.tokenizer.unknown_id());
            }
            for (j, piece) in pieces.into_iter().enumerate() {
                input_ids.push(piece);
                predict_mask.push(j == 0);
                label_ids.push(if j == 0 { label_id } else { filler });
            }
        }

        let limit = self.max_seq_length - 1;
        if input_ids.len() > limit {
            warn!(
                guid,
                length = input_ids.len(),
                max_seq_length = self.max_seq_length,
                "example too long, truncated"
            );
            input_ids.truncate(limit);
            predict_mask.truncate(limit);
            label_ids.truncate(limit);
        }

        input_ids.push(self.tokenizer.sep_id());
        predict_mask.push(false);
        label_ids.push(self.alphabet.stop_id() as u32);

        Ok(InputFeatures {
            input_ids,
            predict_mask,
            label_ids,
        })
    }
}
