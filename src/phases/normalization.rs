// Normalization phase: raw OCR text -> cleaned, deglued, corrected text

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::services::RewriteMode;

static DISALLOWED_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[^a-zA-Z0-9\s.,!?:;'"/\-()]"#).expect("static regex is valid")
});
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex is valid"));

/// Keep ASCII alphanumerics, whitespace and basic punctuation; collapse
/// whitespace and trim.
pub fn clean_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let filtered = DISALLOWED_CHARS.replace_all(text, " ");
    WHITESPACE_RUN.replace_all(&filtered, " ").trim().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub text: String,
    /// The corrector failed and the cleaned text was used instead
    pub degraded: bool,
}

impl Normalized {
    fn clean(text: String) -> Self {
        Self {
            text,
            degraded: false,
        }
    }
}

pub struct TextNormalizer {
    mode: RewriteMode,
    permits: Arc<Semaphore>,
}

impl TextNormalizer {
    pub fn new(mode: RewriteMode, workers: usize) -> Self {
        Self {
            mode,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub fn mode(&self) -> &RewriteMode {
        &self.mode
    }

    /// Empty input returns immediately without touching the pool or any
    /// collaborator. Everything else runs on the blocking pool, holding the
    /// normalization permit until the rewrite returns.
    pub async fn normalize(&self, raw_text: &str) -> Normalized {
        if raw_text.trim().is_empty() {
            return Normalized::clean(String::new());
        }

        let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
            return Normalized::clean(clean_text(raw_text));
        };

        let mode = self.mode.clone();
        let raw = raw_text.to_string();
        let job = move || {
            let _permit = permit;
            rewrite(&mode, &raw)
        };
        match tokio::task::spawn_blocking(job).await {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!("Normalization task failed, using cleaned text: {}", e);
                Normalized {
                    text: clean_text(raw_text),
                    degraded: true,
                }
            }
        }
    }
}

fn rewrite(mode: &RewriteMode, raw_text: &str) -> Normalized {
    let cleaned = clean_text(raw_text);
    if cleaned.is_empty() {
        return Normalized::clean(cleaned);
    }

    match mode {
        RewriteMode::CleanOnly => Normalized::clean(cleaned),
        RewriteMode::DeglueOnly(segmenter) => Normalized::clean(segmenter.deglue(&cleaned)),
        RewriteMode::SegmentAndCorrect(corrector) => {
            match corrector.segment_and_correct(&cleaned.to_lowercase()) {
                Ok(corrected) => Normalized::clean(corrected),
                Err(e) => {
                    warn!("Spell correction failed, using cleaned text: {}", e);
                    Normalized {
                        text: cleaned,
                        degraded: true,
                    }
                }
            }
        }
    }
}
