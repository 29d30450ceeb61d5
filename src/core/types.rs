// Types shared across the moderation pipeline

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::core::errors::ItemError;

/// Where an item's image lives
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Uploaded bytes; written to a scoped temp file for path-based OCR
    Bytes(Arc<Vec<u8>>),
    /// Image already on disk
    Path(PathBuf),
}

/// One submitted image
#[derive(Debug, Clone)]
pub struct Item {
    /// Submission position within the batch
    pub index: usize,
    /// Stable identifier (filename)
    pub id: String,
    pub source: ImageSource,
}

impl Item {
    pub fn from_bytes(index: usize, id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            index,
            id: id.into(),
            source: ImageSource::Bytes(Arc::new(bytes)),
        }
    }

    pub fn from_path(index: usize, path: PathBuf) -> Self {
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            index,
            id,
            source: ImageSource::Path(path),
        }
    }
}

/// Per-item outcome of OCR + normalization + lexical check
///
/// Exactly one per submitted item; a failure fills the slot with `error`.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub index: usize,
    pub item_id: String,
    pub raw_text: String,
    pub normalized_text: String,
    pub lexical_flag: bool,
    pub error: Option<ItemError>,
}

impl ExtractionResult {
    pub fn failed(index: usize, item_id: impl Into<String>, error: ItemError) -> Self {
        Self {
            index,
            item_id: item_id.into(),
            error: Some(error),
            ..Default::default()
        }
    }
}

/// Final per-item output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub index: usize,
    #[serde(rename = "filename")]
    pub item_id: String,
    pub score: f32,
    #[serde(rename = "contains_nsfw_word")]
    pub lexical_flag: bool,
    #[serde(rename = "final_nsfw")]
    pub final_flag: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(rename = "rewritten", skip_serializing_if = "Option::is_none")]
    pub normalized_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
}

/// Single-image legacy response
#[derive(Debug, Clone, Serialize)]
pub struct LegacyVerdict {
    pub filename: String,
    pub final_nsfw: bool,
}

impl From<&Verdict> for LegacyVerdict {
    fn from(verdict: &Verdict) -> Self {
        Self {
            filename: verdict.item_id.clone(),
            final_nsfw: verdict.final_flag,
        }
    }
}

/// Batch processing result
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub total: usize,
    pub flagged: usize,
    pub failed: usize,
    pub processing_time_ms: f64,
    pub predictions: Vec<Verdict>,
}

/// Stage timings for one batch
#[derive(Debug, Clone, Default)]
pub struct StageTimings {
    pub extraction_time: Duration,
    pub scoring_time: Duration,
    pub total_time: Duration,
}
