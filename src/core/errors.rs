// Error taxonomy for the moderation pipeline
//
// Item-level errors (extraction, normalization) and sub-batch errors (scoring)
// are recorded and degraded; only BatchError fails a whole call.

use serde::Serialize;
use thiserror::Error;

/// OCR collaborator errors
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Failed to launch OCR engine '{binary}': {source}")]
    Launch {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OCR engine exited with status {status}: {stderr}")]
    EngineFailed { status: i32, stderr: String },

    #[error("OCR output was not valid UTF-8")]
    InvalidOutput,

    #[error("{0}")]
    Other(String),
}

/// Per-item extraction failures
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Temporary image file could not be written: {0}")]
    TempFile(#[from] std::io::Error),

    #[error("OCR failed: {0}")]
    Ocr(#[from] OcrError),

    #[error("Extraction task failed: {0}")]
    TaskFailed(String),
}

/// Spell corrector failures; the normalizer degrades to clean-only text
#[derive(Debug, Error)]
pub enum NormalizationError {
    #[error("Spell correction failed: {0}")]
    CorrectorFailed(String),
}

/// Classifier collaborator errors
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Classifier request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Classifier returned status {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("{0}")]
    Other(String),
}

/// Sub-batch scoring failures; every member of the sub-batch scores 0.0
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Classifier failed: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Classifier returned {actual} scores for {expected} texts (signal '{signal}')")]
    LengthMismatch {
        signal: String,
        expected: usize,
        actual: usize,
    },

    #[error("Circuit breaker is open, classifier unavailable")]
    CircuitOpen,
}

/// Whole-call failures
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("No images provided")]
    EmptyBatch,

    #[error("Unreadable submission: {0}")]
    InvalidSubmission(String),

    #[error("Batch did not complete within {0}s")]
    Timeout(u64),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Toxicity threshold must be in [0.0, 1.0], got {0}")]
    InvalidThreshold(f32),

    #[error("{name} must be > 0, got {value}")]
    InvalidPoolSize { name: &'static str, value: usize },

    #[error("Batch size must be > 0, got {0}")]
    InvalidBatchSize(usize),

    #[error("Timeout must be > 0 seconds, got {0}")]
    InvalidTimeout(u64),

    #[error("Invalid spell corrector config: {0}")]
    InvalidSpellConfig(String),

    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Serializable item-level error carried on a verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    pub kind: ItemErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemErrorKind {
    Extraction,
}

impl From<&ExtractionError> for ItemError {
    fn from(err: &ExtractionError) -> Self {
        Self {
            kind: ItemErrorKind::Extraction,
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for ItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

pub type ScoringResult<T> = Result<T, ScoringError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
