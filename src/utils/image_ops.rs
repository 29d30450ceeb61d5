use image::ImageFormat;
use std::io::Write;
use tempfile::NamedTempFile;

use crate::core::errors::ExtractionError;

/// Decode uploaded bytes to make sure they are a readable image.
///
/// Returns the detected format so the temp file gets a matching extension;
/// path-based OCR engines pick their decoder from it.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<ImageFormat, ExtractionError> {
    let format = image::guess_format(bytes)?;
    image::load_from_memory_with_format(bytes, format)?;
    Ok(format)
}

/// Write image bytes to a temp file that is deleted when dropped.
pub fn write_temp_image(bytes: &[u8], format: ImageFormat) -> Result<NamedTempFile, ExtractionError> {
    let suffix = format
        .extensions_str()
        .first()
        .map(|ext| format!(".{ext}"))
        .unwrap_or_else(|| ".img".to_string());

    let mut tmp = tempfile::Builder::new()
        .prefix("nsfw-ocr-")
        .suffix(&suffix)
        .tempfile()?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    Ok(tmp)
}

/// Whether a path looks like an image the directory scanner should pick up
pub fn has_image_extension(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
        .unwrap_or(false)
}
