use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during CRF scoring, decoding and corpus handling.
#[derive(Debug, Error)]
pub enum CrfError {
    /// A corpus or checkpoint file could not be read or written.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        /// The file that failed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The label alphabet is malformed (duplicates, missing sentinels).
    #[error("invalid label alphabet: {0}")]
    InvalidAlphabet(String),

    /// A corpus label is not part of the alphabet.
    #[error("unknown label {label:?} in example {guid}")]
    UnknownLabel {
        /// Index of the offending example.
        guid: usize,
        /// The label text.
        label: String,
    },

    /// A label id does not fit the transition matrix.
    #[error("label id {id} out of range for {num_labels} labels")]
    LabelOutOfRange {
        /// The offending id.
        id: u32,
        /// Size of the alphabet.
        num_labels: usize,
    },

    /// Tensor shapes do not line up.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A size or option is out of its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Another process holds the corpus split lock.
    #[error("corpus splits in {0:?} are locked by another writer")]
    SplitsLocked(PathBuf),

    /// A thread panicked while holding the variable map lock.
    #[error("variable map lock poisoned")]
    VarMapPoisoned,

    /// The sub-word tokenizer failed.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// The encoder configuration could not be parsed.
    #[error("failed to load encoder config: {0}")]
    Config(#[from] serde_json::Error),

    /// Candle ML framework error.
    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),
}

impl CrfError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for CRF operations.
pub type Result<T> = std::result::Result<T, CrfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = CrfError::UnknownLabel {
            guid: 3,
            label: "B-misc".into(),
        };
        assert_eq!(err.to_string(), "unknown label \"B-misc\" in example 3");

        let err = CrfError::LabelOutOfRange {
            id: 17,
            num_labels: 16,
        };
        assert!(err.to_string().contains("17"));
    }

    #[test]
    fn io_error_keeps_path() {
        let err = CrfError::io(
            "data/train.txt",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.to_string().contains("data/train.txt"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CrfError>();
    }
}
