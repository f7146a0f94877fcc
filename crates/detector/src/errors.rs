use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Closed set of failure categories reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidInput,
    InvalidImage,
    ModelUnavailable,
    ProcessingError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::InvalidImage => "INVALID_IMAGE",
            ErrorKind::ModelUnavailable => "MODEL_UNAVAILABLE",
            ErrorKind::ProcessingError => "PROCESSING_ERROR",
        }
    }

    /// Caller-side problems, as opposed to faults inside the engine.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ErrorKind::InvalidInput | ErrorKind::InvalidImage)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Inference failed: {0}")]
    InferenceFailure(String),
}

impl DetectionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DetectionError::InvalidInput(_) => ErrorKind::InvalidInput,
            DetectionError::InvalidImage(_) => ErrorKind::InvalidImage,
            DetectionError::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            DetectionError::InferenceFailure(_) => ErrorKind::ProcessingError,
        }
    }

    /// The message without the kind prefix.
    pub fn reason(&self) -> &str {
        match self {
            DetectionError::InvalidInput(reason)
            | DetectionError::InvalidImage(reason)
            | DetectionError::ModelUnavailable(reason)
            | DetectionError::InferenceFailure(reason) => reason,
        }
    }
}
