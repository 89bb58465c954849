//! # BERT-CRF Core
//!
//! Batched linear-chain CRF on top of a transformer encoder for named entity
//! recognition: label alphabet and transition model, forward algorithm, gold
//! path scoring, negative log-likelihood, Viterbi decoding with confidence,
//! token metrics and confidence-ranked corpus partitioning.
//!
//! ## Quick Start
//!
//! ```rust
//! use bertcrf_core::eval::ConfidenceRankedCorpus;
//! use bertcrf_core::labels::LabelAlphabet;
//!
//! let alphabet = LabelAlphabet::ner();
//! assert_eq!(alphabet.len(), 16);
//! assert!(!alphabet.is_positive(alphabet.filler_id()));
//!
//! let ranked = ConfidenceRankedCorpus::from_pairs([(0.8, "sure"), (0.1, "unsure")]);
//! let split = ranked.partition(1);
//! assert_eq!(split.held_out, vec!["unsure"]);
//! assert_eq!(split.promoted, vec!["sure"]);
//! ```
pub mod batch;
pub mod corpus;
pub mod crf;
pub mod error;
pub mod eval;
pub mod features;
pub mod labels;

// Re-export primary API
pub use batch::Batch;
pub use corpus::{Sentence, SentenceBoundary};
pub use crf::{
    BertEncoder, ConfidenceKind, Crf, CrfTagger, DecodedPath, Encoder, TransitionInit,
    TransitionModel, ViterbiDecoder,
};
pub use error::{CrfError, Result};
pub use eval::{ConfidenceRankedCorpus, CorpusSplit, EvaluationReport, MetricsAccumulator};
pub use features::{FeatureBuilder, HfSubwordTokenizer, InputFeatures, SubwordTokenizer};
pub use labels::LabelAlphabet;
