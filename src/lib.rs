// Library exports for the OCR-based image moderation service

pub mod core;
pub mod middleware;
pub mod orchestration;
pub mod phases;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use core::{
    config::Config,
    errors::{BatchError, ConfigError, ExtractionError, ItemError},
    types::{BatchResult, ExtractionResult, ImageSource, Item, LegacyVerdict, Verdict},
};

pub use middleware::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

pub use orchestration::BatchOrchestrator;

pub use services::{Blocklist, Collaborators, OcrEngine, RewriteMode, SpellCorrector, ToxicityClassifier};

pub use utils::Metrics;
