// Lexical blocklist: exact, case-insensitive whole-word matching

use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

use crate::core::errors::ConfigError;

/// Punctuation kept by the text cleaner; stripped from token edges before lookup
const EDGE_PUNCTUATION: &[char] = &['.', ',', '!', '?', ':', ';', '\'', '"', '/', '-', '(', ')'];

/// Read-only set of lowercase terms, shared across batches without locking
#[derive(Debug, Default, Clone)]
pub struct Blocklist {
    words: HashSet<String>,
}

impl Blocklist {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words
                .into_iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    /// Load a newline-delimited word file. A missing file yields an empty list.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!("Blocklist {} not found, lexical matching disabled", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        let blocklist = Self::new(content.lines());
        info!("Loaded {} blocklist terms from {}", blocklist.len(), path.display());
        Ok(blocklist)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.words.contains(term)
    }
}

/// True iff any whitespace token of `text` is a blocklisted term
pub fn matches(text: &str, blocklist: &Blocklist) -> bool {
    if blocklist.is_empty() {
        return false;
    }
    text.split_whitespace().any(|token| {
        let token = token.to_lowercase();
        blocklist.contains(&token) || {
            let stripped = token.trim_matches(EDGE_PUNCTUATION);
            stripped != token && blocklist.contains(stripped)
        }
    })
}
