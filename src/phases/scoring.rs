// Scoring phase: normalized texts -> one toxicity score per text

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, instrument, warn};

use crate::core::errors::{ScoringError, ScoringResult};
use crate::middleware::CircuitBreaker;
use crate::services::toxicity::{reduce_max, ToxicityClassifier};
use crate::utils::Metrics;

/// Scores a whole batch in fixed-size sub-batches.
///
/// Empty texts never reach the classifier and score 0.0. A sub-batch that
/// fails (transport error, malformed output, open circuit) scores 0.0 for
/// its members and the rest of the batch carries on.
#[derive(Clone)]
pub struct BatchToxicityScorer {
    classifier: Arc<dyn ToxicityClassifier>,
    batch_size: usize,
    breaker: CircuitBreaker,
    metrics: Metrics,
}

impl BatchToxicityScorer {
    pub fn new(
        classifier: Arc<dyn ToxicityClassifier>,
        batch_size: usize,
        breaker: CircuitBreaker,
        metrics: Metrics,
    ) -> Self {
        Self {
            classifier,
            batch_size: batch_size.max(1),
            breaker,
            metrics,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Score `texts` off the async runtime. Output has the same length and
    /// order as the input.
    #[instrument(skip(self, texts), fields(texts = texts.len()))]
    pub async fn score(&self, texts: Vec<String>) -> Vec<f32> {
        let len = texts.len();
        let scorer = self.clone();
        match tokio::task::spawn_blocking(move || scorer.score_blocking(&texts)).await {
            Ok(scores) => scores,
            Err(e) => {
                error!("Scoring task failed, scoring batch as 0.0: {}", e);
                vec![0.0; len]
            }
        }
    }

    /// Synchronous scoring; the classifier may block.
    pub fn score_blocking(&self, texts: &[String]) -> Vec<f32> {
        let mut scores = vec![0.0f32; texts.len()];

        let pending: Vec<usize> = texts
            .iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(i, _)| i)
            .collect();

        if pending.is_empty() {
            debug!("No non-empty texts, skipping classifier");
            return scores;
        }

        for (chunk_idx, chunk) in pending.chunks(self.batch_size).enumerate() {
            let batch: Vec<String> = chunk.iter().map(|&i| texts[i].clone()).collect();
            match self.score_sub_batch(&batch) {
                Ok(sub_scores) => {
                    for (&i, score) in chunk.iter().zip(sub_scores) {
                        scores[i] = score;
                    }
                }
                Err(ScoringError::CircuitOpen) => {
                    debug!("Sub-batch {} skipped: circuit open", chunk_idx);
                }
                Err(e) => {
                    warn!(
                        "Sub-batch {} ({} texts) failed, scoring 0.0: {}",
                        chunk_idx,
                        batch.len(),
                        e
                    );
                }
            }
        }

        scores
    }

    fn score_sub_batch(&self, batch: &[String]) -> ScoringResult<Vec<f32>> {
        if !self.breaker.allow_request() {
            return Err(ScoringError::CircuitOpen);
        }

        let start = Instant::now();
        let result = self
            .classifier
            .predict(batch)
            .map_err(ScoringError::from)
            .and_then(|prediction| reduce_max(&prediction, batch.len()));
        self.metrics
            .record_classifier_call(result.is_ok(), start.elapsed());

        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(_) => {
                if self.breaker.record_failure() {
                    error!("Classifier circuit breaker opened");
                    self.metrics.record_circuit_breaker_trip();
                }
            }
        }
        result
    }
}
