//! # BERT-CRF Trainer
//!
//! Fine-tunes a BERT-CRF tagger, evaluates it, and re-splits the corpus so
//! that the least confident evaluation examples form the next held-out set
//! while the rest are promoted into training.

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod schedule;
pub mod trainer;

pub use config::TrainConfig;
pub use trainer::{Trainer, run_training};
