//! Command-line configuration of a training run.

use std::path::PathBuf;

use bertcrf_core::{ConfidenceKind, SentenceBoundary};
use clap::{Parser, ValueEnum};
use serde::Serialize;

/// Train a BERT-CRF NER tagger and re-split the corpus by confidence.
#[derive(Debug, Clone, Parser, Serialize)]
#[command(name = "train")]
#[command(about = "Train a BERT-CRF tagger with confidence-ranked corpus re-splitting")]
#[command(version)]
pub struct TrainConfig {
    /// Directory holding train.txt and valid.txt
    #[arg(long)]
    pub data_dir: PathBuf,

    /// Directory with config.json, tokenizer.json and model.safetensors
    #[arg(long)]
    pub bert_model: PathBuf,

    #[arg(long)]
    pub batch_size: usize,

    #[arg(long)]
    pub max_seq_length: usize,

    /// Encoder learning rate
    #[arg(long)]
    pub learning_rate: f64,

    /// Where checkpoints and reports are written
    #[arg(long)]
    pub output_dir: PathBuf,

    #[arg(long, default_value_t = 20)]
    pub epochs: usize,

    /// Learning rate of the label projection and transitions
    #[arg(long, default_value_t = 8e-5)]
    pub crf_learning_rate: f64,

    #[arg(long, default_value_t = 1e-5)]
    pub weight_decay: f64,

    #[arg(long, default_value_t = 5e-6)]
    pub crf_weight_decay: f64,

    /// Fraction of all steps spent warming up the learning rate
    #[arg(long, default_value_t = 0.1)]
    pub warmup: f64,

    #[arg(long, default_value_t = 44)]
    pub seed: u64,

    /// Lowest-confidence examples kept as the next evaluation split
    #[arg(long, default_value_t = 507)]
    pub holdout: usize,

    /// Blank-line policy when rewriting splits
    #[arg(long, value_enum, default_value_t = BoundaryArg::Period)]
    pub boundary: BoundaryArg,

    #[arg(long, value_enum, default_value_t = ConfidenceArg::Margin)]
    pub confidence: ConfidenceArg,

    /// Do not count `O` as a positive label in precision/recall
    #[arg(long)]
    pub ignore_outside: bool,

    /// Re-apply the START/STOP transition constraint after every step
    #[arg(long)]
    pub hard_transitions: bool,

    /// Never use a GPU
    #[arg(long)]
    pub cpu: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryArg {
    Period,
    Example,
}

impl From<BoundaryArg> for SentenceBoundary {
    fn from(arg: BoundaryArg) -> Self {
        match arg {
            BoundaryArg::Period => SentenceBoundary::Period,
            BoundaryArg::Example => SentenceBoundary::Example,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceArg {
    Margin,
    Posterior,
}

impl From<ConfidenceArg> for ConfidenceKind {
    fn from(arg: ConfidenceArg) -> Self {
        match arg {
            ConfidenceArg::Margin => ConfidenceKind::Margin,
            ConfidenceArg::Posterior => ConfidenceKind::PathPosterior,
        }
    }
}

impl TrainConfig {
    pub fn bert_config(&self) -> PathBuf {
        self.bert_model.join("config.json")
    }

    pub fn bert_tokenizer(&self) -> PathBuf {
        self.bert_model.join("tokenizer.json")
    }

    pub fn bert_weights(&self) -> PathBuf {
        self.bert_model.join("model.safetensors")
    }

    /// Reject values that would make the run meaningless.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.batch_size > 0, "--batch-size must be positive");
        anyhow::ensure!(self.max_seq_length >= 2, "--max-seq-length must be at least 2");
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.warmup),
            "--warmup must be within [0, 1], got {}",
            self.warmup
        );
        Ok(())
    }
}
