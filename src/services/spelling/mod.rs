// Spelling / segmentation collaborators
//
// The rewrite capability is resolved once at start-up into a RewriteMode;
// the normalizer never probes for libraries at runtime.

pub mod segmenter;
pub mod symspell;

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::config::SpellingConfig;
use crate::core::errors::{ConfigError, NormalizationError};

pub use segmenter::WordSegmenter;
pub use symspell::SymSpellCorrector;

/// Combined segmentation + spell correction.
///
/// Input is lowercased cleaned text; implementations are blocking.
pub trait SpellCorrector: Send + Sync {
    fn segment_and_correct(&self, text: &str) -> Result<String, NormalizationError>;
}

/// How cleaned text gets rewritten
#[derive(Clone)]
pub enum RewriteMode {
    SegmentAndCorrect(Arc<dyn SpellCorrector>),
    DeglueOnly(Arc<WordSegmenter>),
    /// No dictionary available; cleaned text is used as is
    CleanOnly,
}

impl RewriteMode {
    /// Prefer the spell corrector, then the deglue word list
    pub fn resolve(config: &SpellingConfig) -> Result<Self, ConfigError> {
        let dictionary = Path::new(&config.symspell_dictionary);
        if dictionary.exists() {
            let corrector = SymSpellCorrector::load(dictionary, config)?;
            return Ok(Self::SegmentAndCorrect(Arc::new(corrector)));
        }

        let wordlist = Path::new(&config.deglue_wordlist);
        if wordlist.exists() {
            let segmenter = WordSegmenter::load(wordlist)?;
            info!("Spell dictionary not found, using deglue word list ({} words)", segmenter.len());
            return Ok(Self::DeglueOnly(Arc::new(segmenter)));
        }

        warn!(
            "Neither {} nor {} found; text will be cleaned but not rewritten",
            dictionary.display(),
            wordlist.display()
        );
        Ok(Self::CleanOnly)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SegmentAndCorrect(_) => "segment_and_correct",
            Self::DeglueOnly(_) => "deglue_only",
            Self::CleanOnly => "clean_only",
        }
    }
}

impl std::fmt::Debug for RewriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn spelling_config(dictionary: &str, wordlist: &str) -> SpellingConfig {
        SpellingConfig {
            symspell_dictionary: dictionary.to_string(),
            max_edit_distance: 2,
            prefix_length: 7,
            deglue_wordlist: wordlist.to_string(),
        }
    }

    #[test]
    fn test_resolve_prefers_corrector() {
        let mut dict = tempfile::NamedTempFile::new().unwrap();
        writeln!(dict, "cash 100\nfree 200").unwrap();
        let mut words = tempfile::NamedTempFile::new().unwrap();
        writeln!(words, "free\ncash").unwrap();

        let config = spelling_config(
            dict.path().to_str().unwrap(),
            words.path().to_str().unwrap(),
        );
        let mode = RewriteMode::resolve(&config).unwrap();
        assert_eq!(mode.name(), "segment_and_correct");
    }

    #[test]
    fn test_resolve_falls_back_to_deglue() {
        let mut words = tempfile::NamedTempFile::new().unwrap();
        writeln!(words, "free\ncash").unwrap();

        let config = spelling_config("/nonexistent/dictionary.txt", words.path().to_str().unwrap());
        let mode = RewriteMode::resolve(&config).unwrap();
        assert!(matches!(mode, RewriteMode::DeglueOnly(_)));
    }

    #[test]
    fn test_resolve_clean_only_without_files() {
        let config = spelling_config("/nonexistent/a.txt", "/nonexistent/b.txt");
        assert!(matches!(
            RewriteMode::resolve(&config).unwrap(),
            RewriteMode::CleanOnly
        ));
    }
}
