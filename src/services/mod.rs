pub mod blocklist;
pub mod ocr;
pub mod spelling;
pub mod toxicity;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::core::config::Config;

pub use blocklist::Blocklist;
pub use ocr::{OcrEngine, TesseractOcr};
pub use spelling::{RewriteMode, SpellCorrector, SymSpellCorrector, WordSegmenter};
pub use toxicity::{HttpToxicityClassifier, RawPrediction, SignalValue, ToxicityClassifier};

/// Collaborator handles, built once at start-up and shared read-only by every
/// batch.
#[derive(Clone)]
pub struct Collaborators {
    pub ocr: Arc<dyn OcrEngine>,
    pub rewrite: RewriteMode,
    pub classifier: Arc<dyn ToxicityClassifier>,
    pub blocklist: Arc<Blocklist>,
}

impl Collaborators {
    /// Load dictionaries and the blocklist, and connect the classifier.
    ///
    /// Dictionary loading is CPU-heavy; call from a blocking context.
    pub fn from_config(config: &Config, runtime: Handle) -> Result<Self> {
        let ocr = TesseractOcr::new(&config.ocr);
        if !ocr.is_available() {
            warn!(
                "OCR binary '{}' is not runnable; every image will fail extraction",
                config.ocr.binary
            );
        }

        let rewrite = RewriteMode::resolve(&config.spelling).context("Failed to load spelling data")?;
        let blocklist =
            Blocklist::load(Path::new(config.nsfw_word_file())).context("Failed to load blocklist")?;
        let classifier = HttpToxicityClassifier::new(&config.classifier, runtime)
            .context("Failed to create classifier client")?;

        info!(
            "Collaborators ready: ocr={}, rewrite={}, blocklist={} terms, classifier={}",
            config.ocr.binary,
            rewrite.name(),
            blocklist.len(),
            config.classifier.model_url
        );

        Ok(Self {
            ocr: Arc::new(ocr),
            rewrite,
            classifier: Arc::new(classifier),
            blocklist: Arc::new(blocklist),
        })
    }
}
