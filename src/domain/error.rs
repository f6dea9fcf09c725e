// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Every failure the training core can raise. None of these are
// retried: they bubble up to main() and end the run with a
// non-zero exit status.

use std::path::PathBuf;
use thiserror::Error;

pub type ErcResult<T> = Result<T, ErcError>;

#[derive(Debug, Error)]
pub enum ErcError {
    /// Rejected at startup, before any data is touched
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Token / mask / memory / label fields disagree on batch size
    #[error("batch shape mismatch: {0}")]
    DataShape(String),

    /// Dialogue records could not be read or labelled
    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("non-finite {quantity} at step {step}")]
    NumericInstability { quantity: &'static str, step: usize },

    #[error("checkpoint persistence failed at '{}': {reason}", path.display())]
    Persistence { path: PathBuf, reason: String },

    /// Metric inputs were empty or not index-aligned
    #[error("invalid metric input: {0}")]
    InvalidInput(String),
}

impl ErcError {
    pub fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Persistence { path: path.into(), reason: reason.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistence_message_names_path() {
        let err = ErcError::persistence("/tmp/ckpt/model.bin", "read-only file system");
        let msg = err.to_string();
        assert!(msg.contains("/tmp/ckpt/model.bin"));
        assert!(msg.contains("read-only"));
    }

    #[test]
    fn test_numeric_instability_message() {
        let err = ErcError::NumericInstability { quantity: "loss", step: 7 };
        assert_eq!(err.to_string(), "non-finite loss at step 7");
    }
}
