// Batch Orchestrator: fans items out across the bounded pools, gathers them
// back in submission order, scores the batch and combines verdicts

use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::core::config::Config;
use crate::core::errors::{BatchError, ExtractionError, ItemError};
use crate::core::types::{BatchResult, ExtractionResult, Item, StageTimings};
use crate::middleware::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::phases::{combine, BatchToxicityScorer, TextExtractor, TextNormalizer};
use crate::services::blocklist::{self, Blocklist};
use crate::services::Collaborators;
use crate::utils::Metrics;

/// Per-item work: extract, normalize, lexical check. Shared by every
/// spawned item task.
struct ItemPipeline {
    extractor: TextExtractor,
    normalizer: TextNormalizer,
    blocklist: Arc<Blocklist>,
    metrics: Metrics,
}

impl ItemPipeline {
    async fn process(&self, item: Item) -> ExtractionResult {
        let raw_text = match self.extractor.extract(&item).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Extraction failed for {}: {}", item.id, e);
                self.metrics.record_extraction_failure();
                return ExtractionResult::failed(item.index, item.id, ItemError::from(&e));
            }
        };

        let normalized = self.normalizer.normalize(&raw_text).await;
        if normalized.degraded {
            self.metrics.record_normalization_degraded();
        }

        let lexical_flag = blocklist::matches(&normalized.text, &self.blocklist);
        debug!(
            "{}: {} chars raw, {} chars normalized, lexical={}",
            item.id,
            raw_text.len(),
            normalized.text.len(),
            lexical_flag
        );

        ExtractionResult {
            index: item.index,
            item_id: item.id,
            raw_text,
            normalized_text: normalized.text,
            lexical_flag,
            error: None,
        }
    }
}

/// Main batch orchestrator
pub struct BatchOrchestrator {
    config: Arc<Config>,
    pipeline: Arc<ItemPipeline>,
    scorer: BatchToxicityScorer,
    metrics: Metrics,
}

impl BatchOrchestrator {
    pub fn new(config: Arc<Config>, collaborators: Collaborators, metrics: Metrics) -> Self {
        let extractor = TextExtractor::new(collaborators.ocr, config.ocr_workers());
        let normalizer = TextNormalizer::new(collaborators.rewrite, config.rewrite_workers());
        let breaker = CircuitBreaker::with_config(CircuitBreakerConfig::from(&config.classifier));
        let scorer = BatchToxicityScorer::new(
            collaborators.classifier,
            config.toxic_batch_size(),
            breaker,
            metrics.clone(),
        );

        info!(
            "Orchestrator ready (ocr workers: {}, rewrite workers: {}, rewrite: {}, sub-batch: {}, threshold: {})",
            config.ocr_workers(),
            config.rewrite_workers(),
            normalizer.mode().name(),
            config.toxic_batch_size(),
            config.toxic_threshold()
        );

        Self {
            pipeline: Arc::new(ItemPipeline {
                extractor,
                normalizer,
                blocklist: collaborators.blocklist,
                metrics: metrics.clone(),
            }),
            config,
            scorer,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn rewrite_mode(&self) -> &'static str {
        self.pipeline.normalizer.mode().name()
    }

    pub fn blocklist_size(&self) -> usize {
        self.pipeline.blocklist.len()
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.scorer.breaker().state()
    }

    /// Moderate a batch of images.
    ///
    /// Returns exactly one verdict per item, in submission order. Item-level
    /// failures are carried on their verdicts; only an empty batch or the
    /// batch timeout fail the whole call. On timeout, in-flight item tasks
    /// are aborted and their results discarded; OCR and rewrite calls already
    /// running hold their pool permits until they return.
    #[instrument(skip(self, items), fields(total_images = items.len()))]
    pub async fn process_batch(&self, items: Vec<Item>) -> Result<BatchResult, BatchError> {
        if items.is_empty() {
            self.metrics.record_batch_failure();
            return Err(BatchError::EmptyBatch);
        }

        let timeout = self.config.batch_timeout();
        match tokio::time::timeout(timeout, self.run(items)).await {
            Ok(result) => Ok(result),
            Err(_) => {
                error!("Batch timed out after {}s", timeout.as_secs());
                self.metrics.record_batch_failure();
                Err(BatchError::Timeout(timeout.as_secs()))
            }
        }
    }

    async fn run(&self, items: Vec<Item>) -> BatchResult {
        let start = Instant::now();
        let total = items.len();
        info!("Processing {} images", total);

        let results = self.extract_all(items).await;
        let extraction_time = start.elapsed();
        self.metrics.record_extraction_duration(extraction_time);

        let scoring_start = Instant::now();
        let texts: Vec<String> = results
            .iter()
            .map(|r| {
                if r.error.is_some() {
                    String::new()
                } else {
                    r.normalized_text.clone()
                }
            })
            .collect();
        let scores = self.scorer.score(texts).await;
        let scoring_time = scoring_start.elapsed();
        self.metrics.record_scoring_duration(scoring_time);

        let predictions = combine(results, &scores, self.config.toxic_threshold());
        let flagged = predictions.iter().filter(|v| v.final_flag).count();
        let failed = predictions.iter().filter(|v| v.error.is_some()).count();
        self.metrics.record_batch(total, flagged);

        let timings = StageTimings {
            extraction_time,
            scoring_time,
            total_time: start.elapsed(),
        };
        info!(
            "✓ {} images: {} flagged, {} failed (extract {:.2}s, score {:.2}s, total {:.2}s)",
            total,
            flagged,
            failed,
            timings.extraction_time.as_secs_f64(),
            timings.scoring_time.as_secs_f64(),
            timings.total_time.as_secs_f64()
        );

        BatchResult {
            total,
            flagged,
            failed,
            processing_time_ms: timings.total_time.as_secs_f64() * 1000.0,
            predictions,
        }
    }

    /// Fan out one task per item; fan in by position. Concurrency is bounded
    /// by the extraction and normalization permits, not by task count.
    async fn extract_all(&self, items: Vec<Item>) -> Vec<ExtractionResult> {
        let keys: Vec<(usize, String)> = items.iter().map(|i| (i.index, i.id.clone())).collect();
        let mut slots: Vec<Option<ExtractionResult>> = (0..items.len()).map(|_| None).collect();

        let mut tasks = JoinSet::new();
        for (pos, item) in items.into_iter().enumerate() {
            let pipeline = Arc::clone(&self.pipeline);
            tasks.spawn(async move { (pos, pipeline.process(item).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((pos, result)) => slots[pos] = Some(result),
                Err(e) => error!("Item task failed: {}", e),
            }
        }

        slots
            .into_iter()
            .zip(keys)
            .map(|(slot, (index, id))| {
                slot.unwrap_or_else(|| {
                    self.metrics.record_extraction_failure();
                    let err = ExtractionError::TaskFailed("item task did not complete".to_string());
                    ExtractionResult::failed(index, id, ItemError::from(&err))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::{ClassifierError, NormalizationError, OcrError};
    use crate::services::toxicity::{RawPrediction, SignalValue};
    use crate::services::{OcrEngine, RewriteMode, SpellCorrector, ToxicityClassifier};
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Reads the image it is given; the red channel of the first pixel
    /// selects the scripted text and delay.
    #[derive(Default)]
    struct ScriptedOcr {
        script: HashMap<u8, (String, Duration)>,
        panic_on: Option<u8>,
    }

    impl ScriptedOcr {
        fn texts(texts: &[&str]) -> Self {
            Self {
                script: texts
                    .iter()
                    .enumerate()
                    .map(|(i, t)| (i as u8, (t.to_string(), Duration::ZERO)))
                    .collect(),
                panic_on: None,
            }
        }
    }

    impl OcrEngine for ScriptedOcr {
        fn recognize(&self, image: &Path) -> Result<Vec<String>, OcrError> {
            let img = image::open(image).map_err(|e| OcrError::Other(e.to_string()))?;
            let key = img.to_rgba8().get_pixel(0, 0)[0];
            if self.panic_on == Some(key) {
                panic!("engine crashed on image {key}");
            }

            let (text, delay) = self
                .script
                .get(&key)
                .cloned()
                .unwrap_or_default();
            std::thread::sleep(delay);
            Ok(text.lines().map(str::to_string).collect())
        }
    }

    /// Scores texts from a lookup table and records every call
    #[derive(Default)]
    struct TableClassifier {
        scores: HashMap<String, f64>,
        calls: Mutex<Vec<usize>>,
    }

    impl TableClassifier {
        fn with(scores: &[(&str, f64)]) -> Self {
            Self {
                scores: scores.iter().map(|(t, s)| (t.to_string(), *s)).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl ToxicityClassifier for TableClassifier {
        fn predict(&self, texts: &[String]) -> Result<RawPrediction, ClassifierError> {
            self.calls.lock().push(texts.len());
            let values = texts
                .iter()
                .map(|t| Some(self.scores.get(t).copied().unwrap_or(0.0)))
                .collect();
            let mut prediction = RawPrediction::new();
            prediction.insert("toxicity".to_string(), SignalValue::Batch(values));
            prediction.insert("insult".to_string(), SignalValue::Batch(vec![Some(0.0); texts.len()]));
            Ok(prediction)
        }
    }

    /// Slow OCR that records the most calls seen running at once
    #[derive(Default)]
    struct SlowOcr {
        delay: Duration,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl OcrEngine for SlowOcr {
        fn recognize(&self, _image: &Path) -> Result<Vec<String>, OcrError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(vec!["slow".to_string()])
        }
    }

    #[derive(Default)]
    struct CountingCorrector {
        calls: AtomicUsize,
    }

    impl SpellCorrector for CountingCorrector {
        fn segment_and_correct(&self, text: &str) -> Result<String, NormalizationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.to_string())
        }
    }

    fn png(key: u8) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([key, 0, 0, 255])));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn items(n: usize) -> Vec<Item> {
        (0..n)
            .map(|i| Item::from_bytes(i, format!("{i}.png"), png(i as u8)))
            .collect()
    }

    fn config(customize: impl FnOnce(&mut Config)) -> Arc<Config> {
        let mut config = Config::default();
        customize(&mut config);
        Arc::new(config)
    }

    fn orchestrator(
        config: Arc<Config>,
        ocr: ScriptedOcr,
        rewrite: RewriteMode,
        classifier: Arc<TableClassifier>,
        blocklist: &[&str],
    ) -> BatchOrchestrator {
        let collaborators = Collaborators {
            ocr: Arc::new(ocr),
            rewrite,
            classifier,
            blocklist: Arc::new(Blocklist::new(blocklist.iter().copied())),
        };
        BatchOrchestrator::new(config, collaborators, Metrics::new())
    }

    #[tokio::test]
    async fn test_mixed_batch() {
        let classifier = Arc::new(TableClassifier::with(&[
            ("FREE CASH NOW", 0.9),
            ("hello world", 0.1),
        ]));
        let orch = orchestrator(
            config(|_| {}),
            ScriptedOcr::texts(&["FREE CASH NOW", "hello world", ""]),
            RewriteMode::CleanOnly,
            classifier.clone(),
            &["cash"],
        );

        let result = orch.process_batch(items(3)).await.unwrap();
        let flags: Vec<bool> = result.predictions.iter().map(|v| v.final_flag).collect();
        assert_eq!(flags, vec![true, false, false]);
        let lexical: Vec<bool> = result.predictions.iter().map(|v| v.lexical_flag).collect();
        assert_eq!(lexical, vec![true, false, false]);
        assert!(result.predictions[0].score >= 0.9 - 1e-6);
        assert_eq!(result.total, 3);
        assert_eq!(result.flagged, 1);
        assert_eq!(result.failed, 0);
        assert_eq!(result.predictions[2].score, 0.0);

        // The empty text never reached the classifier
        assert_eq!(*classifier.calls.lock(), vec![2]);

        let snapshot = orch.metrics().snapshot();
        assert_eq!(snapshot.batches_processed, 1);
        assert_eq!(snapshot.images_flagged, 1);
    }

    #[tokio::test]
    async fn test_order_preserved_when_completion_is_reversed() {
        let n = 5;
        let ocr = ScriptedOcr {
            script: (0..n)
                .map(|i| {
                    let delay = Duration::from_millis(40 * (n - i) as u64);
                    (i as u8, (format!("text {i}"), delay))
                })
                .collect(),
            panic_on: None,
        };
        let orch = orchestrator(
            config(|c| c.moderation.ocr_workers = n),
            ocr,
            RewriteMode::CleanOnly,
            Arc::new(TableClassifier::default()),
            &[],
        );

        let result = orch.process_batch(items(n)).await.unwrap();
        assert_eq!(result.predictions.len(), n);
        for (i, verdict) in result.predictions.iter().enumerate() {
            assert_eq!(verdict.index, i);
            assert_eq!(verdict.item_id, format!("{i}.png"));
            assert_eq!(verdict.raw_text.as_deref(), Some(format!("text {i}").as_str()));
        }
    }

    #[tokio::test]
    async fn test_lexical_flag_overrides_low_score() {
        let orch = orchestrator(
            config(|_| {}),
            ScriptedOcr::texts(&["get CASH today", "nothing here"]),
            RewriteMode::CleanOnly,
            Arc::new(TableClassifier::default()),
            &["cash"],
        );

        let result = orch.process_batch(items(2)).await.unwrap();
        assert!(result.predictions[0].lexical_flag);
        assert!(result.predictions[0].final_flag);
        assert_eq!(result.predictions[0].score, 0.0);
        assert!(!result.predictions[1].final_flag);
    }

    #[tokio::test]
    async fn test_threshold_boundary_is_inclusive() {
        let classifier = Arc::new(TableClassifier::with(&[("at", 0.5), ("below", 0.49)]));
        let orch = orchestrator(
            config(|c| c.moderation.toxic_threshold = 0.5),
            ScriptedOcr::texts(&["at", "below"]),
            RewriteMode::CleanOnly,
            classifier,
            &[],
        );

        let result = orch.process_batch(items(2)).await.unwrap();
        assert!(result.predictions[0].final_flag);
        assert!(!result.predictions[1].final_flag);
    }

    #[tokio::test]
    async fn test_corrupt_image_is_isolated() {
        let classifier = Arc::new(TableClassifier::with(&[("bad words", 0.8)]));
        let orch = orchestrator(
            config(|_| {}),
            ScriptedOcr::texts(&["bad words", "", "fine"]),
            RewriteMode::CleanOnly,
            classifier,
            &[],
        );

        let mut batch = items(3);
        batch[1] = Item::from_bytes(1, "corrupt.png", b"not an image".to_vec());

        let result = orch.process_batch(batch).await.unwrap();
        assert_eq!(result.predictions.len(), 3);
        assert_eq!(result.failed, 1);

        assert!(result.predictions[0].final_flag);
        let corrupt = &result.predictions[1];
        assert_eq!(corrupt.item_id, "corrupt.png");
        assert!(corrupt.error.is_some());
        assert!(!corrupt.final_flag);
        assert_eq!(corrupt.score, 0.0);
        assert!(result.predictions[2].error.is_none());

        assert_eq!(orch.metrics().snapshot().extraction_failures, 1);
    }

    #[tokio::test]
    async fn test_ocr_panic_is_isolated() {
        let mut ocr = ScriptedOcr::texts(&["one", "two", "three"]);
        ocr.panic_on = Some(1);
        let orch = orchestrator(
            config(|_| {}),
            ocr,
            RewriteMode::CleanOnly,
            Arc::new(TableClassifier::default()),
            &[],
        );

        let result = orch.process_batch(items(3)).await.unwrap();
        assert_eq!(result.predictions.len(), 3);
        assert!(result.predictions[0].error.is_none());
        assert!(result.predictions[1].error.is_some());
        assert!(result.predictions[2].error.is_none());
    }

    #[tokio::test]
    async fn test_empty_texts_skip_corrector_and_classifier() {
        let corrector = Arc::new(CountingCorrector::default());
        let classifier = Arc::new(TableClassifier::default());
        let orch = orchestrator(
            config(|_| {}),
            ScriptedOcr::texts(&["", "   ", "\n"]),
            RewriteMode::SegmentAndCorrect(corrector.clone()),
            classifier.clone(),
            &[],
        );

        let result = orch.process_batch(items(3)).await.unwrap();
        assert!(result
            .predictions
            .iter()
            .all(|v| v.score == 0.0 && !v.lexical_flag && !v.final_flag));
        assert_eq!(corrector.calls.load(Ordering::SeqCst), 0);
        assert!(classifier.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_classifier_sub_batching() {
        let texts: Vec<String> = (0..20).map(|i| format!("caption {i}")).collect();
        let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let classifier = Arc::new(TableClassifier::default());
        let orch = orchestrator(
            config(|c| c.moderation.toxic_batch_size = 8),
            ScriptedOcr::texts(&text_refs),
            RewriteMode::CleanOnly,
            classifier.clone(),
            &[],
        );

        let result = orch.process_batch(items(20)).await.unwrap();
        assert_eq!(result.predictions.len(), 20);
        assert_eq!(*classifier.calls.lock(), vec![8, 8, 4]);
    }

    #[tokio::test]
    async fn test_batch_timeout() {
        let ocr = ScriptedOcr {
            script: [(0u8, ("slow".to_string(), Duration::from_secs(2)))]
                .into_iter()
                .collect(),
            panic_on: None,
        };
        let orch = orchestrator(
            config(|c| c.moderation.batch_timeout_seconds = 1),
            ocr,
            RewriteMode::CleanOnly,
            Arc::new(TableClassifier::default()),
            &[],
        );

        let err = orch.process_batch(items(1)).await.unwrap_err();
        assert!(matches!(err, BatchError::Timeout(1)));
        assert_eq!(orch.metrics().snapshot().batches_failed, 1);
    }

    #[tokio::test]
    async fn test_timed_out_batch_keeps_extraction_cap() {
        let ocr = Arc::new(SlowOcr {
            delay: Duration::from_millis(1800),
            ..Default::default()
        });
        let collaborators = Collaborators {
            ocr: ocr.clone(),
            rewrite: RewriteMode::CleanOnly,
            classifier: Arc::new(TableClassifier::default()),
            blocklist: Arc::new(Blocklist::default()),
        };
        let config = config(|c| {
            c.moderation.ocr_workers = 1;
            c.moderation.batch_timeout_seconds = 1;
        });
        let orch = BatchOrchestrator::new(config, collaborators, Metrics::new());

        let first = orch.process_batch(items(1)).await;
        assert!(matches!(first, Err(BatchError::Timeout(1))));

        // Submitted while the first batch's OCR call is still running
        let _ = orch.process_batch(items(1)).await;
        assert_eq!(ocr.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let orch = orchestrator(
            config(|_| {}),
            ScriptedOcr::default(),
            RewriteMode::CleanOnly,
            Arc::new(TableClassifier::default()),
            &[],
        );
        assert!(matches!(
            orch.process_batch(Vec::new()).await,
            Err(BatchError::EmptyBatch)
        ));
    }
}
