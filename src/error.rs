//! Error taxonomy shared by the training pipeline and the prediction service.
use thiserror::Error;

/// Errors produced by the library.
#[derive(Debug, Error)]
pub enum DigitError {
    /// A dataset file (or raw image buffer) does not follow the expected layout.
    #[error("data format error: {0}")]
    DataFormat(String),

    /// Two arrays that must agree on a dimension do not.
    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    /// An incoming image payload could not be turned into a feature vector.
    #[error("image preprocessing failed: {0}")]
    Preprocessing(String),

    /// No model bundle was loaded at startup.
    #[error("model not loaded")]
    ModelUnavailable,

    /// A persisted model bundle failed validation.
    #[error("invalid model bundle: {0}")]
    InvalidBundle(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl DigitError {
    pub(crate) fn shape(context: &'static str, expected: usize, actual: usize) -> Self {
        DigitError::ShapeMismatch {
            context,
            expected,
            actual,
        }
    }
}

pub type Result<T> = std::result::Result<T, DigitError>;
