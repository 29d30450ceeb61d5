// Moderation pipeline phases
//
// extraction: image -> raw OCR text (bounded extraction pool)
// normalization: raw text -> cleaned, segmented, corrected text (bounded normalization pool)
// scoring: all normalized texts -> toxicity scores in sub-batches
// combine: results + scores -> verdicts

pub mod combine;
pub mod extraction;
pub mod normalization;
pub mod scoring;

pub use combine::combine;
pub use extraction::TextExtractor;
pub use normalization::{clean_text, Normalized, TextNormalizer};
pub use scoring::BatchToxicityScorer;
