use crate::core::errors::{ConfigError, ConfigResult};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
    pub max_upload_mb: usize,
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct ModerationConfig {
    /// Inclusive: score >= threshold flags the item
    pub toxic_threshold: f32,
    /// Extraction (OCR) pool size
    pub ocr_workers: usize,
    /// Normalization (rewrite) pool size
    pub rewrite_workers: usize,
    /// Texts per classifier call
    pub toxic_batch_size: usize,
    pub batch_timeout_seconds: u64,
    pub nsfw_word_file: String,
}

/// OCR collaborator configuration
#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub binary: String,
    pub languages: String,
}

/// Spelling / segmentation collaborator configuration
#[derive(Debug, Clone)]
pub struct SpellingConfig {
    pub symspell_dictionary: String,
    pub max_edit_distance: usize,
    pub prefix_length: usize,
    pub deglue_wordlist: String,
}

/// Toxicity classifier configuration
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub model_url: String,
    pub timeout_seconds: u64,
    pub circuit_failure_threshold: usize,
    pub circuit_reset_seconds: u64,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub moderation: ModerationConfig,
    pub ocr: OcrConfig,
    pub spelling: SpellingConfig,
    pub classifier: ClassifierConfig,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl Config {
    pub fn new() -> ConfigResult<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env();
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Self {
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        Self {
            server: ServerConfig {
                port: env_or("SERVER_PORT", 8000),
                host: env_string("SERVER_HOST", "0.0.0.0"),
                log_level,
                max_upload_mb: env_or("MAX_UPLOAD_MB", 200),
            },
            moderation: ModerationConfig {
                toxic_threshold: env_or("TOXIC_THRESHOLD", 0.5),
                ocr_workers: env_or("OCR_WORKERS", 4),
                rewrite_workers: env_or("REWRITE_WORKERS", 4),
                toxic_batch_size: env_or("TOXIC_BATCH_SIZE", 8),
                batch_timeout_seconds: env_or("BATCH_TIMEOUT_SECONDS", 300),
                nsfw_word_file: env_string("NSFW_WORD_FILE", "data/nsfw_list.txt"),
            },
            ocr: OcrConfig {
                binary: env_string("OCR_BINARY", "tesseract"),
                languages: env_string("OCR_LANGUAGES", "eng"),
            },
            spelling: SpellingConfig {
                symspell_dictionary: env_string(
                    "SYMSPELL_DICTIONARY",
                    "data/frequency_dictionary_en_82_765.txt",
                ),
                max_edit_distance: env_or("SYMSPELL_MAX_EDIT", 2),
                prefix_length: env_or("SYMSPELL_PREFIX_LENGTH", 7),
                deglue_wordlist: env_string("DEGLUE_WORDLIST", "data/wordninja_words.txt"),
            },
            classifier: ClassifierConfig {
                model_url: env_string("TOXIC_MODEL_URL", "http://127.0.0.1:8500/predict"),
                timeout_seconds: env_or("TOXIC_TIMEOUT_SECONDS", 30),
                circuit_failure_threshold: env_or("CIRCUIT_FAILURE_THRESHOLD", 5),
                circuit_reset_seconds: env_or("CIRCUIT_RESET_SECONDS", 60),
            },
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let m = &self.moderation;

        if !(0.0..=1.0).contains(&m.toxic_threshold) {
            return Err(ConfigError::InvalidThreshold(m.toxic_threshold));
        }
        if m.ocr_workers == 0 {
            return Err(ConfigError::InvalidPoolSize {
                name: "OCR_WORKERS",
                value: m.ocr_workers,
            });
        }
        if m.rewrite_workers == 0 {
            return Err(ConfigError::InvalidPoolSize {
                name: "REWRITE_WORKERS",
                value: m.rewrite_workers,
            });
        }
        if m.toxic_batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize(m.toxic_batch_size));
        }
        if m.batch_timeout_seconds == 0 {
            return Err(ConfigError::InvalidTimeout(m.batch_timeout_seconds));
        }
        if self.classifier.timeout_seconds == 0 {
            return Err(ConfigError::InvalidTimeout(self.classifier.timeout_seconds));
        }

        // SymSpell needs the prefix to cover at least the edit distance
        let s = &self.spelling;
        if s.prefix_length == 0 || s.prefix_length <= s.max_edit_distance {
            return Err(ConfigError::InvalidSpellConfig(format!(
                "prefix_length ({}) must be greater than max_edit_distance ({})",
                s.prefix_length, s.max_edit_distance
            )));
        }

        Ok(())
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.server.max_upload_mb * 1024 * 1024
    }

    pub fn toxic_threshold(&self) -> f32 {
        self.moderation.toxic_threshold
    }

    pub fn ocr_workers(&self) -> usize {
        self.moderation.ocr_workers
    }

    pub fn rewrite_workers(&self) -> usize {
        self.moderation.rewrite_workers
    }

    pub fn toxic_batch_size(&self) -> usize {
        self.moderation.toxic_batch_size
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.moderation.batch_timeout_seconds)
    }

    pub fn nsfw_word_file(&self) -> &str {
        &self.moderation.nsfw_word_file
    }
}

impl Default for Config {
    /// Built-in defaults without reading the environment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 8000,
                host: "0.0.0.0".to_string(),
                log_level: Level::INFO,
                max_upload_mb: 200,
            },
            moderation: ModerationConfig {
                toxic_threshold: 0.5,
                ocr_workers: 4,
                rewrite_workers: 4,
                toxic_batch_size: 8,
                batch_timeout_seconds: 300,
                nsfw_word_file: "data/nsfw_list.txt".to_string(),
            },
            ocr: OcrConfig {
                binary: "tesseract".to_string(),
                languages: "eng".to_string(),
            },
            spelling: SpellingConfig {
                symspell_dictionary: "data/frequency_dictionary_en_82_765.txt".to_string(),
                max_edit_distance: 2,
                prefix_length: 7,
                deglue_wordlist: "data/wordninja_words.txt".to_string(),
            },
            classifier: ClassifierConfig {
                model_url: "http://127.0.0.1:8500/predict".to_string(),
                timeout_seconds: 30,
                circuit_failure_threshold: 5,
                circuit_reset_seconds: 60,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.toxic_batch_size(), 8);
        assert_eq!(config.ocr_workers(), 4);
        assert_eq!(config.rewrite_workers(), 4);
        assert_eq!(config.batch_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let mut config = Config::default();
        config.moderation.toxic_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_zero_pool_rejected() {
        let mut config = Config::default();
        config.moderation.rewrite_workers = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPoolSize { name: "REWRITE_WORKERS", .. })
        ));

        let mut config = Config::default();
        config.moderation.toxic_batch_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBatchSize(0))
        ));
    }

    #[test]
    fn test_prefix_must_exceed_edit_distance() {
        let mut config = Config::default();
        config.spelling.prefix_length = 2;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSpellConfig(_))
        ));
    }
}
