pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{
    BatchError, ClassifierError, ConfigError, ExtractionError, ItemError, ItemErrorKind,
    NormalizationError, OcrError, ScoringError,
};
pub use types::{
    BatchResult, ExtractionResult, ImageSource, Item, LegacyVerdict, StageTimings, Verdict,
};
