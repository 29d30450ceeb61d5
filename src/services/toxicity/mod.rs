// Toxicity classifier collaborator
//
// The classifier answers with an untyped `signal name -> score(s)` mapping.
// `reduce_max` turns that into one typed score per text at this boundary:
// the maximum over every numeric signal, i.e. the worst category wins.

pub mod http;

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::core::errors::{ClassifierError, ScoringError};

pub use http::HttpToxicityClassifier;

/// One signal's value: a scalar for single-text input, an array for batches
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Scalar(f64),
    Batch(Vec<Option<f64>>),
    /// Non-numeric payloads (labels, metadata) are ignored
    Other(serde_json::Value),
}

pub type RawPrediction = BTreeMap<String, SignalValue>;

/// Batch toxicity model. Blocking; called from `spawn_blocking`.
pub trait ToxicityClassifier: Send + Sync {
    fn predict(&self, texts: &[String]) -> Result<RawPrediction, ClassifierError>;
}

/// Reduce a raw prediction to one score in [0, 1] per input text
pub fn reduce_max(prediction: &RawPrediction, expected: usize) -> Result<Vec<f32>, ScoringError> {
    let mut scores: Vec<Option<f64>> = vec![None; expected];
    let mut numeric_signals = 0;

    for (signal, value) in prediction {
        let values: Vec<Option<f64>> = match value {
            SignalValue::Scalar(v) => vec![Some(*v)],
            SignalValue::Batch(vs) => vs.clone(),
            SignalValue::Other(_) => continue,
        };

        if values.len() != expected {
            return Err(ScoringError::LengthMismatch {
                signal: signal.clone(),
                expected,
                actual: values.len(),
            });
        }
        numeric_signals += 1;

        for (slot, value) in scores.iter_mut().zip(values) {
            if let Some(v) = value.filter(|v| v.is_finite()) {
                *slot = Some(slot.map_or(v, |current| current.max(v)));
            }
        }
    }

    if numeric_signals == 0 && expected > 0 {
        return Err(ScoringError::LengthMismatch {
            signal: "<none>".to_string(),
            expected,
            actual: 0,
        });
    }

    Ok(scores
        .into_iter()
        .map(|s| s.unwrap_or(0.0).clamp(0.0, 1.0) as f32)
        .collect())
}
