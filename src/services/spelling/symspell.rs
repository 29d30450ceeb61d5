// Symmetric-delete spelling correction with word segmentation.
//
// Every dictionary word's prefix is indexed under all of its deletes up to
// `max_edit_distance`; a lookup generates deletes of the input prefix and
// verifies candidates with optimal string alignment distance (strsim).

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use tracing::info;

use super::SpellCorrector;
use crate::core::config::SpellingConfig;
use crate::core::errors::{ConfigError, NormalizationError};

/// Corpus size used for word probabilities (Google Books n-gram total)
const CORPUS_WORD_COUNT: f64 = 1_024_908_267_229.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub term: String,
    pub distance: usize,
    pub count: u64,
}

pub struct SymSpellCorrector {
    max_edit_distance: usize,
    prefix_length: usize,
    words: Vec<(String, u64)>,
    word_index: HashMap<String, u32>,
    deletes: HashMap<String, Vec<u32>>,
    max_word_len: usize,
}

impl SymSpellCorrector {
    pub fn new(max_edit_distance: usize, prefix_length: usize) -> Self {
        Self {
            max_edit_distance,
            prefix_length,
            words: Vec::new(),
            word_index: HashMap::new(),
            deletes: HashMap::new(),
            max_word_len: 0,
        }
    }

    /// Load a `term count` frequency dictionary
    pub fn load(path: &Path, config: &SpellingConfig) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;

        let mut corrector = Self::new(config.max_edit_distance, config.prefix_length);
        for line in content.lines() {
            let mut parts = line.split_whitespace();
            if let (Some(term), Some(count)) = (parts.next(), parts.next()) {
                if let Ok(count) = count.parse::<u64>() {
                    corrector.add_word(term, count);
                }
            }
        }

        info!(
            "Loaded spelling dictionary: {} words, {} delete entries",
            corrector.words.len(),
            corrector.deletes.len()
        );
        Ok(corrector)
    }

    pub fn add_word(&mut self, term: &str, count: u64) {
        let term = term.to_lowercase();
        if let Some(&idx) = self.word_index.get(&term) {
            let entry = &mut self.words[idx as usize].1;
            *entry = entry.saturating_add(count);
            return;
        }

        let idx = self.words.len() as u32;
        self.max_word_len = self.max_word_len.max(term.chars().count());
        for delete in self.prefix_deletes(&term) {
            self.deletes.entry(delete).or_default().push(idx);
        }
        self.word_index.insert(term.clone(), idx);
        self.words.push((term, count));
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    fn prefix(&self, term: &str) -> String {
        term.chars().take(self.prefix_length).collect()
    }

    /// The prefix plus all its deletes within the edit budget
    fn prefix_deletes(&self, term: &str) -> HashSet<String> {
        let prefix = self.prefix(term);
        let mut out = HashSet::new();
        if term.chars().count() <= self.max_edit_distance {
            out.insert(String::new());
        }
        out.insert(prefix.clone());

        let mut frontier = vec![prefix];
        for _ in 0..self.max_edit_distance {
            let mut next = Vec::new();
            for word in &frontier {
                for delete in single_deletes(word) {
                    if out.insert(delete.clone()) {
                        next.push(delete);
                    }
                }
            }
            frontier = next;
        }
        out
    }

    /// Closest dictionary term, ties broken by frequency
    pub fn lookup(&self, input: &str, max_edit_distance: usize) -> Option<Suggestion> {
        let max_edit_distance = max_edit_distance.min(self.max_edit_distance);
        let input_len = input.chars().count();
        if input_len > self.max_word_len + max_edit_distance {
            return None;
        }

        if let Some(&idx) = self.word_index.get(input) {
            let (term, count) = &self.words[idx as usize];
            return Some(Suggestion {
                term: term.clone(),
                distance: 0,
                count: *count,
            });
        }

        let input_prefix = self.prefix(input);
        let prefix_len = input_prefix.chars().count();
        let mut best: Option<Suggestion> = None;
        let mut seen_candidates = HashSet::new();
        let mut seen_words = HashSet::new();
        let mut queue = VecDeque::from([input_prefix.clone()]);
        seen_candidates.insert(input_prefix);

        while let Some(candidate) = queue.pop_front() {
            let candidate_len = candidate.chars().count();

            if let Some(indices) = self.deletes.get(&candidate) {
                for &idx in indices {
                    if !seen_words.insert(idx) {
                        continue;
                    }
                    let (term, count) = &self.words[idx as usize];
                    if term.chars().count().abs_diff(input_len) > max_edit_distance {
                        continue;
                    }
                    let distance = strsim::osa_distance(input, term);
                    if distance > max_edit_distance {
                        continue;
                    }
                    let better = match &best {
                        None => true,
                        Some(b) => distance < b.distance || (distance == b.distance && *count > b.count),
                    };
                    if better {
                        best = Some(Suggestion {
                            term: term.clone(),
                            distance,
                            count: *count,
                        });
                    }
                }
            }

            if prefix_len - candidate_len < max_edit_distance {
                for delete in single_deletes(&candidate) {
                    if seen_candidates.insert(delete.clone()) {
                        queue.push_back(delete);
                    }
                }
            }
        }

        best
    }

    /// Split `token` into words, correcting each part.
    ///
    /// Compositions minimise total edits (each inserted space counts as one)
    /// and then maximise the summed log10 word probability.
    fn segment_token(&self, token: &str) -> String {
        let chars: Vec<char> = token.chars().collect();
        let n = chars.len();
        let max_len = self.max_word_len.max(1);

        // best[i] = (distance_sum, log_prob_sum, words) for chars[..i]
        let mut best: Vec<Option<(usize, f64, Vec<String>)>> = vec![None; n + 1];
        best[0] = Some((0, 0.0, Vec::new()));

        for end in 1..=n {
            for start in end.saturating_sub(max_len)..end {
                let Some((prev_dist, prev_prob, prev_words)) = &best[start] else {
                    continue;
                };
                let part: String = chars[start..end].iter().collect();
                let part_len = end - start;

                let (word, edits, log_prob) = match self.lookup(&part, self.max_edit_distance) {
                    Some(s) => (s.term, s.distance, (s.count as f64 / CORPUS_WORD_COUNT).log10()),
                    None => (
                        part,
                        part_len,
                        (10.0 / (CORPUS_WORD_COUNT * 10f64.powi(part_len as i32))).log10(),
                    ),
                };

                let separator = usize::from(start > 0);
                let dist = prev_dist + separator + edits;
                let prob = prev_prob + log_prob;

                let replace = match &best[end] {
                    None => true,
                    Some((d, p, _)) => dist < *d || (dist == *d && prob > *p),
                };
                if replace {
                    let mut words = prev_words.clone();
                    words.push(word);
                    best[end] = Some((dist, prob, words));
                }
            }
        }

        best[n]
            .take()
            .map(|(_, _, words)| words.join(" "))
            .unwrap_or_else(|| token.to_string())
    }
}

impl SpellCorrector for SymSpellCorrector {
    fn segment_and_correct(&self, text: &str) -> Result<String, NormalizationError> {
        let mut out = Vec::new();
        for token in text.split_whitespace() {
            let mut rebuilt = String::new();
            for (is_alpha, run) in alpha_runs(token) {
                if is_alpha {
                    rebuilt.push_str(&self.segment_token(&run));
                } else {
                    rebuilt.push_str(&run);
                }
            }
            out.push(rebuilt);
        }
        Ok(out.join(" "))
    }
}

/// Split a token into maximal alphabetic / non-alphabetic runs
fn alpha_runs(token: &str) -> Vec<(bool, String)> {
    let mut runs: Vec<(bool, String)> = Vec::new();
    for c in token.chars() {
        let alpha = c.is_alphabetic();
        match runs.last_mut() {
            Some((kind, run)) if *kind == alpha => run.push(c),
            _ => runs.push((alpha, c.to_string())),
        }
    }
    runs
}

fn single_deletes(word: &str) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    (0..chars.len())
        .map(|skip| {
            chars
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, c)| *c)
                .collect()
        })
        .collect()
}
