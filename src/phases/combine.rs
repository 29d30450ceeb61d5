// Combine phase: extraction results + scores -> verdicts

use crate::core::types::{ExtractionResult, Verdict};

/// Merge per-item results with their scores, position by position.
///
/// `final_flag = (score >= threshold) || lexical_flag`. Items whose text was
/// empty were never scored and cannot cross the threshold. Failed items get
/// score 0.0 and keep their error.
pub fn combine(results: Vec<ExtractionResult>, scores: &[f32], threshold: f32) -> Vec<Verdict> {
    debug_assert_eq!(results.len(), scores.len());

    results
        .into_iter()
        .enumerate()
        .map(|(pos, result)| {
            if let Some(error) = result.error {
                return Verdict {
                    index: result.index,
                    item_id: result.item_id,
                    score: 0.0,
                    lexical_flag: result.lexical_flag,
                    final_flag: result.lexical_flag,
                    raw_text: None,
                    normalized_text: None,
                    error: Some(error),
                };
            }

            let scored = !result.normalized_text.trim().is_empty();
            let score = if scored {
                scores.get(pos).copied().unwrap_or(0.0)
            } else {
                0.0
            };

            Verdict {
                index: result.index,
                item_id: result.item_id,
                score,
                lexical_flag: result.lexical_flag,
                final_flag: (scored && score >= threshold) || result.lexical_flag,
                raw_text: Some(result.raw_text),
                normalized_text: Some(result.normalized_text),
                error: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::{ItemError, ItemErrorKind};

    fn ok(index: usize, text: &str, lexical: bool) -> ExtractionResult {
        ExtractionResult {
            index,
            item_id: format!("{index}.png"),
            raw_text: text.to_string(),
            normalized_text: text.to_string(),
            lexical_flag: lexical,
            error: None,
        }
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let verdicts = combine(vec![ok(0, "a", false), ok(1, "b", false)], &[0.5, 0.49], 0.5);
        assert!(verdicts[0].final_flag);
        assert!(!verdicts[1].final_flag);
    }

    #[test]
    fn test_lexical_flag_overrides_low_score() {
        let verdicts = combine(vec![ok(0, "free cash now", true)], &[0.01], 0.5);
        assert!(verdicts[0].lexical_flag);
        assert!(verdicts[0].final_flag);
        assert_eq!(verdicts[0].score, 0.01);
    }

    #[test]
    fn test_empty_text_never_flags_on_score() {
        let verdicts = combine(vec![ok(0, "", false)], &[0.0], 0.0);
        assert!(!verdicts[0].final_flag);
        assert_eq!(verdicts[0].normalized_text.as_deref(), Some(""));
    }

    #[test]
    fn test_failed_item_keeps_error() {
        let error = ItemError {
            kind: ItemErrorKind::Extraction,
            message: "decode failed".to_string(),
        };
        let failed = ExtractionResult::failed(1, "bad.png", error.clone());

        let verdicts = combine(vec![ok(0, "hello", false), failed], &[0.9, 0.9], 0.5);
        assert_eq!(verdicts.len(), 2);
        assert!(verdicts[0].final_flag);

        let bad = &verdicts[1];
        assert_eq!(bad.item_id, "bad.png");
        assert_eq!(bad.score, 0.0);
        assert!(!bad.final_flag);
        assert_eq!(bad.error.as_ref(), Some(&error));
        assert!(bad.raw_text.is_none());
    }

    #[test]
    fn test_verdict_json_shape() {
        let verdicts = combine(vec![ok(0, "hello", false)], &[0.25], 0.5);
        let json = serde_json::to_value(&verdicts[0]).unwrap();
        assert_eq!(json["filename"], "0.png");
        assert_eq!(json["final_nsfw"], false);
        assert_eq!(json["contains_nsfw_word"], false);
        assert_eq!(json["rewritten"], "hello");
        assert!(json.get("error").is_none());
    }
}
