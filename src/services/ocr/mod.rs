// OCR collaborator: image file -> recognized text lines

use std::path::Path;
use std::process::Command;
use tracing::debug;

use crate::core::config::OcrConfig;
use crate::core::errors::OcrError;

/// Path-based OCR engine.
///
/// Implementations are blocking and are always called from `spawn_blocking`.
pub trait OcrEngine: Send + Sync {
    /// Recognize the text lines in an image, in reading order. Empty when the
    /// image has no text.
    fn recognize(&self, image: &Path) -> Result<Vec<String>, OcrError>;
}

/// Tesseract CLI wrapper (`tesseract <image> stdout -l <lang>`)
pub struct TesseractOcr {
    binary: String,
    languages: String,
}

impl TesseractOcr {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            languages: config.languages.clone(),
        }
    }

    /// Check that the binary can be launched at all
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &Path) -> Result<Vec<String>, OcrError> {
        let output = Command::new(&self.binary)
            .arg(image)
            .arg("stdout")
            .args(["-l", &self.languages])
            .output()
            .map_err(|source| OcrError::Launch {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(OcrError::EngineFailed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8(output.stdout).map_err(|_| OcrError::InvalidOutput)?;
        let lines = split_lines(&text);

        debug!("OCR recognized {} lines from {}", lines.len(), image.display());
        Ok(lines)
    }
}

/// Non-blank, trimmed lines in order
fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_lines_drops_blanks() {
        let lines = split_lines("FREE CASH\n\n  click here  \n\u{c}\n");
        assert_eq!(lines, vec!["FREE CASH", "click here"]);
    }

    #[test]
    fn test_missing_binary_is_launch_error() {
        let ocr = TesseractOcr::new(&OcrConfig {
            binary: "definitely-not-a-real-ocr-binary".to_string(),
            languages: "eng".to_string(),
        });
        assert!(!ocr.is_available());

        let err = ocr.recognize(Path::new("missing.png")).unwrap_err();
        assert!(matches!(err, OcrError::Launch { .. }));
    }
}
