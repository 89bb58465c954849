//! # Evaluation
//!
//! Token metrics over decoded paths and the confidence-ranked partitioning
//! used for hard-example mining between training cycles.

pub mod metrics;
pub mod partition;

pub use metrics::{EvaluationReport, MetricsAccumulator, Prf, TokenCounts, f1_score};
pub use partition::{ConfidenceRankedCorpus, CorpusSplit};
