use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Samples kept for percentiles; averages cover every sample
const RECENT_SAMPLES: usize = 1024;

/// Running sum and count plus a bounded window of recent samples
#[derive(Default)]
struct LatencyStats {
    sum_ms: u64,
    count: u64,
    recent: VecDeque<u64>,
}

impl LatencyStats {
    fn record(&mut self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.sum_ms += ms;
        self.count += 1;
        if self.recent.len() == RECENT_SAMPLES {
            self.recent.pop_front();
        }
        self.recent.push_back(ms);
    }

    fn avg(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.sum_ms / self.count
        }
    }

    /// Percentile over the recent window
    fn percentile(&self, p: f64) -> u64 {
        if self.recent.is_empty() {
            return 0;
        }
        let mut sorted: Vec<u64> = self.recent.iter().copied().collect();
        sorted.sort_unstable();
        let idx = ((sorted.len() as f64 - 1.0) * p) as usize;
        sorted[idx]
    }
}

/// Process-wide moderation metrics.
///
/// Cheap to clone; every clone records into the same counters.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    batches_processed: AtomicUsize,
    batches_failed: AtomicUsize,
    images_processed: AtomicUsize,
    images_flagged: AtomicUsize,

    extraction_failures: AtomicUsize,
    normalization_degraded: AtomicUsize,

    classifier_calls: AtomicUsize,
    classifier_failures: AtomicUsize,
    classifier_latency: RwLock<LatencyStats>,

    extraction_duration: RwLock<LatencyStats>,
    scoring_duration: RwLock<LatencyStats>,

    endpoint_counters: DashMap<String, AtomicUsize>,
    circuit_breaker_trips: AtomicUsize,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                batches_processed: AtomicUsize::new(0),
                batches_failed: AtomicUsize::new(0),
                images_processed: AtomicUsize::new(0),
                images_flagged: AtomicUsize::new(0),
                extraction_failures: AtomicUsize::new(0),
                normalization_degraded: AtomicUsize::new(0),
                classifier_calls: AtomicUsize::new(0),
                classifier_failures: AtomicUsize::new(0),
                classifier_latency: RwLock::new(LatencyStats::default()),
                extraction_duration: RwLock::new(LatencyStats::default()),
                scoring_duration: RwLock::new(LatencyStats::default()),
                endpoint_counters: DashMap::new(),
                circuit_breaker_trips: AtomicUsize::new(0),
                start_time: Instant::now(),
            }),
        }
    }

    pub fn record_batch(&self, images: usize, flagged: usize) {
        self.inner.batches_processed.fetch_add(1, Ordering::Relaxed);
        self.inner.images_processed.fetch_add(images, Ordering::Relaxed);
        self.inner.images_flagged.fetch_add(flagged, Ordering::Relaxed);
    }

    pub fn record_batch_failure(&self) {
        self.inner.batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_extraction_failure(&self) {
        self.inner.extraction_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_normalization_degraded(&self) {
        self.inner.normalization_degraded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classifier_call(&self, success: bool, duration: Duration) {
        self.inner.classifier_calls.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.inner.classifier_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.classifier_latency.write().record(duration);
    }

    pub fn record_extraction_duration(&self, duration: Duration) {
        self.inner.extraction_duration.write().record(duration);
    }

    pub fn record_scoring_duration(&self, duration: Duration) {
        self.inner.scoring_duration.write().record(duration);
    }

    pub fn record_endpoint_request(&self, endpoint: &str) {
        self.inner
            .endpoint_counters
            .entry(endpoint.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_circuit_breaker_trip(&self) {
        self.inner.circuit_breaker_trips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency = self.inner.classifier_latency.read();
        let classifier_latency_avg_ms = latency.avg();
        let classifier_latency_p95_ms = latency.percentile(0.95);
        drop(latency);

        let extraction_avg_ms = self.inner.extraction_duration.read().avg();
        let scoring_avg_ms = self.inner.scoring_duration.read().avg();

        let endpoint_requests = self
            .inner
            .endpoint_counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();

        MetricsSnapshot {
            batches_processed: self.inner.batches_processed.load(Ordering::Relaxed),
            batches_failed: self.inner.batches_failed.load(Ordering::Relaxed),
            images_processed: self.inner.images_processed.load(Ordering::Relaxed),
            images_flagged: self.inner.images_flagged.load(Ordering::Relaxed),
            extraction_failures: self.inner.extraction_failures.load(Ordering::Relaxed),
            normalization_degraded: self.inner.normalization_degraded.load(Ordering::Relaxed),
            classifier_calls: self.inner.classifier_calls.load(Ordering::Relaxed),
            classifier_failures: self.inner.classifier_failures.load(Ordering::Relaxed),
            classifier_latency_avg_ms,
            classifier_latency_p95_ms,
            extraction_avg_ms,
            scoring_avg_ms,
            circuit_breaker_trips: self.inner.circuit_breaker_trips.load(Ordering::Relaxed),
            endpoint_requests,
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Prometheus text exposition
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"# HELP batches_processed_total Batches that produced verdicts
# TYPE batches_processed_total counter
batches_processed_total {}

# HELP batches_failed_total Batches rejected or timed out
# TYPE batches_failed_total counter
batches_failed_total {}

# HELP images_processed_total Images that received a verdict
# TYPE images_processed_total counter
images_processed_total {}

# HELP images_flagged_total Images with final_nsfw=true
# TYPE images_flagged_total counter
images_flagged_total {}

# HELP extraction_failures_total Images whose OCR step failed
# TYPE extraction_failures_total counter
extraction_failures_total {}

# HELP normalization_degraded_total Texts that fell back to clean-only normalization
# TYPE normalization_degraded_total counter
normalization_degraded_total {}

# HELP classifier_calls_total Classifier sub-batch calls
# TYPE classifier_calls_total counter
classifier_calls_total {}

# HELP classifier_failures_total Classifier sub-batch calls that failed
# TYPE classifier_failures_total counter
classifier_failures_total {}

# HELP classifier_latency_avg_ms Average classifier call latency
# TYPE classifier_latency_avg_ms gauge
classifier_latency_avg_ms {}

# HELP stage_avg_duration_ms Average stage duration in milliseconds
# TYPE stage_avg_duration_ms gauge
stage_avg_duration_ms{{stage="extraction"}} {}
stage_avg_duration_ms{{stage="scoring"}} {}

# HELP circuit_breaker_trips_total Classifier circuit breaker trips
# TYPE circuit_breaker_trips_total counter
circuit_breaker_trips_total {}

# HELP uptime_seconds Application uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {}
"#,
            s.batches_processed,
            s.batches_failed,
            s.images_processed,
            s.images_flagged,
            s.extraction_failures,
            s.normalization_degraded,
            s.classifier_calls,
            s.classifier_failures,
            s.classifier_latency_avg_ms,
            s.extraction_avg_ms,
            s.scoring_avg_ms,
            s.circuit_breaker_trips,
            s.uptime_seconds,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub batches_processed: usize,
    pub batches_failed: usize,
    pub images_processed: usize,
    pub images_flagged: usize,
    pub extraction_failures: usize,
    pub normalization_degraded: usize,
    pub classifier_calls: usize,
    pub classifier_failures: usize,
    pub classifier_latency_avg_ms: u64,
    pub classifier_latency_p95_ms: u64,
    pub extraction_avg_ms: u64,
    pub scoring_avg_ms: u64,
    pub circuit_breaker_trips: usize,
    pub endpoint_requests: std::collections::BTreeMap<String, usize>,
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = Metrics::new();

        metrics.record_batch(3, 1);
        metrics.record_extraction_failure();
        metrics.record_classifier_call(true, Duration::from_millis(40));
        metrics.record_classifier_call(false, Duration::from_millis(20));
        metrics.record_endpoint_request("/predict");
        metrics.record_endpoint_request("/predict");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batches_processed, 1);
        assert_eq!(snapshot.images_processed, 3);
        assert_eq!(snapshot.images_flagged, 1);
        assert_eq!(snapshot.extraction_failures, 1);
        assert_eq!(snapshot.classifier_calls, 2);
        assert_eq!(snapshot.classifier_failures, 1);
        assert_eq!(snapshot.classifier_latency_avg_ms, 30);
        assert_eq!(snapshot.endpoint_requests.get("/predict"), Some(&2));
    }

    #[test]
    fn test_latency_window_is_bounded() {
        let mut stats = LatencyStats::default();
        for ms in 0..(RECENT_SAMPLES as u64 + 500) {
            stats.record(Duration::from_millis(ms));
        }

        assert_eq!(stats.recent.len(), RECENT_SAMPLES);
        assert_eq!(stats.count, RECENT_SAMPLES as u64 + 500);
        // Average covers every sample, not just the window
        assert_eq!(stats.avg(), (RECENT_SAMPLES as u64 + 499) / 2);
        // Oldest samples were evicted
        assert_eq!(stats.recent.front(), Some(&500));
        assert!(stats.percentile(0.95) >= 500);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.record_batch(2, 2);

        let prometheus = metrics.to_prometheus();
        assert!(prometheus.contains("images_processed_total 2"));
        assert!(prometheus.contains("images_flagged_total 2"));
        assert!(prometheus.contains("stage_avg_duration_ms{stage=\"scoring\"} 0"));
    }
}
