// Word deglue: split run-together text into the most probable words.
//
// Words are costed with a Zipf model over a frequency-ranked word list
// (rank r costs ln((r + 1) * ln(N))), and the cheapest split is found with
// dynamic programming.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;

use crate::core::errors::ConfigError;

static SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9']+").expect("static regex is valid"));

pub struct WordSegmenter {
    word_cost: HashMap<String, f64>,
    max_word_len: usize,
}

impl WordSegmenter {
    /// Build from words ordered most frequent first
    pub fn from_ranked_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words: Vec<String> = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();

        let ln_n = (words.len().max(2) as f64).ln();
        let mut word_cost = HashMap::with_capacity(words.len());
        let mut max_word_len = 1;
        for (rank, word) in words.into_iter().enumerate() {
            max_word_len = max_word_len.max(word.chars().count());
            // Keep the best (earliest) rank for duplicates
            word_cost
                .entry(word)
                .or_insert_with(|| ((rank + 1) as f64 * ln_n).ln());
        }

        Self {
            word_cost,
            max_word_len,
        }
    }

    /// Load a newline-delimited word list (most frequent first)
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_ranked_words(content.lines()))
    }

    pub fn len(&self) -> usize {
        self.word_cost.len()
    }

    pub fn is_empty(&self) -> bool {
        self.word_cost.is_empty()
    }

    /// Lowercase and deglue, dropping separators other than apostrophes
    pub fn deglue(&self, text: &str) -> String {
        let lower = text.trim().to_lowercase();
        SPLIT_RE
            .split(&lower)
            .filter(|piece| !piece.is_empty())
            .flat_map(|piece| self.split_piece(piece))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn cost_of(&self, chars: &[char]) -> f64 {
        let word: String = chars.iter().collect();
        self.word_cost.get(&word).copied().unwrap_or(f64::INFINITY)
    }

    /// Cheapest last word ending at `i`: (total cost, word length)
    fn best_match(&self, chars: &[char], cost: &[f64], i: usize) -> (f64, usize) {
        let start = i.saturating_sub(self.max_word_len);
        (start..i)
            .rev()
            .map(|j| (cost[j] + self.cost_of(&chars[j..i]), i - j))
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .unwrap_or((f64::INFINITY, 1))
    }

    fn split_piece(&self, piece: &str) -> Vec<String> {
        let chars: Vec<char> = piece.chars().collect();

        let mut cost = Vec::with_capacity(chars.len() + 1);
        cost.push(0.0);
        for i in 1..=chars.len() {
            let (c, _) = self.best_match(&chars, &cost, i);
            cost.push(c);
        }

        let mut out: Vec<String> = Vec::new();
        let mut i = chars.len();
        while i > 0 {
            let (_, k) = self.best_match(&chars, &cost, i);
            let token: String = chars[i - k..i].iter().collect();

            let mut new_token = true;
            // A lone apostrophe never starts a token; re-attach "'s" and digit runs
            if token != "'" {
                if let Some(last) = out.last_mut() {
                    let digit_run = chars[i - 1].is_ascii_digit()
                        && last.chars().next().is_some_and(|c| c.is_ascii_digit());
                    if last.as_str() == "'s" || digit_run {
                        *last = format!("{token}{last}");
                        new_token = false;
                    }
                }
            }
            if new_token {
                out.push(token);
            }
            i -= k;
        }

        out.reverse();
        out
    }
}
