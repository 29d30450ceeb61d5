// Extraction phase: image -> raw OCR text, bounded by the extraction pool

use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

use crate::core::errors::ExtractionError;
use crate::core::types::{ImageSource, Item};
use crate::services::OcrEngine;
use crate::utils::image_ops::{validate_image_bytes, write_temp_image};

pub struct TextExtractor {
    ocr: Arc<dyn OcrEngine>,
    permits: Arc<Semaphore>,
}

impl TextExtractor {
    pub fn new(ocr: Arc<dyn OcrEngine>, workers: usize) -> Self {
        Self {
            ocr,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Recognize an item's text lines and join them with single spaces.
    ///
    /// At most `workers` OCR calls run at once, counting calls left running
    /// by cancelled batches; the call itself runs on the blocking pool.
    #[instrument(skip(self, item), fields(item = %item.id))]
    pub async fn extract(&self, item: &Item) -> Result<String, ExtractionError> {
        // The permit moves into the blocking job: an aborted item task must
        // not free its slot while OCR is still running.
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| ExtractionError::TaskFailed(e.to_string()))?;

        let ocr = Arc::clone(&self.ocr);
        let source = item.source.clone();
        let lines = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            recognize_source(ocr.as_ref(), &source)
        })
        .await
        .map_err(|e| ExtractionError::TaskFailed(e.to_string()))??;

        debug!("Extracted {} lines", lines.len());
        Ok(lines.join(" ").trim().to_string())
    }
}

/// Run OCR on either source; byte sources go through a temp file that is
/// removed when it drops, on success and failure alike.
fn recognize_source(ocr: &dyn OcrEngine, source: &ImageSource) -> Result<Vec<String>, ExtractionError> {
    match source {
        ImageSource::Path(path) => Ok(ocr.recognize(path)?),
        ImageSource::Bytes(bytes) => {
            let format = validate_image_bytes(bytes)?;
            let tmp = write_temp_image(bytes, format)?;
            Ok(ocr.recognize(tmp.path())?)
        }
    }
}
