//! Request and inference statistics for the prediction service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for the prediction service
pub struct ServiceMetrics {
    /// `/predict` requests received
    pub requests: AtomicU64,
    /// Files that produced predictions
    pub files_accepted: AtomicU64,
    /// Files skipped by validation
    pub files_rejected: AtomicU64,
    /// Rows predicted across all files
    pub rows_predicted: AtomicU64,
    /// Share links rendered successfully
    pub shares_served: AtomicU64,
    /// Share links that failed to decode
    pub shares_rejected: AtomicU64,
    /// Rejections by validation reason
    rejections_by_reason: RwLock<HashMap<&'static str, u64>>,
    /// Batch inference times (in microseconds)
    inference_times: RwLock<Vec<u64>>,
    /// Top-1 confidence distribution buckets
    confidence_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            files_accepted: AtomicU64::new(0),
            files_rejected: AtomicU64::new(0),
            rows_predicted: AtomicU64::new(0),
            shares_served: AtomicU64::new(0),
            shares_rejected: AtomicU64::new(0),
            rejections_by_reason: RwLock::new(HashMap::new()),
            inference_times: RwLock::new(Vec::with_capacity(1000)),
            confidence_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a file rejected by validation
    pub fn record_rejection(&self, reason: &'static str) {
        self.files_rejected.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut by_reason) = self.rejections_by_reason.write() {
            *by_reason.entry(reason).or_insert(0) += 1;
        }
    }

    /// Record one file's batch inference
    pub fn record_inference(&self, duration: Duration, confidences: &[f64]) {
        self.files_accepted.fetch_add(1, Ordering::Relaxed);
        self.rows_predicted
            .fetch_add(confidences.len() as u64, Ordering::Relaxed);

        if let Ok(mut times) = self.inference_times.write() {
            times.push(duration.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        if let Ok(mut buckets) = self.confidence_buckets.write() {
            for &confidence in confidences {
                let bucket = (confidence.clamp(0.0, 1.0) * 10.0).min(9.0) as usize;
                buckets[bucket] += 1;
            }
        }
    }

    pub fn record_share(&self, ok: bool) {
        if ok {
            self.shares_served.fetch_add(1, Ordering::Relaxed);
        } else {
            self.shares_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Inference time statistics
    pub fn get_inference_stats(&self) -> InferenceStats {
        let Ok(times) = self.inference_times.read() else {
            return InferenceStats::default();
        };
        if times.is_empty() {
            return InferenceStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        InferenceStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: sorted[count - 1],
        }
    }

    /// Rows predicted per second since start
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.rows_predicted.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_confidence_distribution(&self) -> [u64; 10] {
        self.confidence_buckets
            .read()
            .map(|buckets| *buckets)
            .unwrap_or_default()
    }

    pub fn get_rejections_by_reason(&self) -> HashMap<&'static str, u64> {
        self.rejections_by_reason
            .read()
            .map(|by_reason| by_reason.clone())
            .unwrap_or_default()
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let requests = self.requests.load(Ordering::Relaxed);
        let accepted = self.files_accepted.load(Ordering::Relaxed);
        let rejected = self.files_rejected.load(Ordering::Relaxed);
        let rows = self.rows_predicted.load(Ordering::Relaxed);
        let rejection_rate = if accepted + rejected > 0 {
            (rejected as f64 / (accepted + rejected) as f64) * 100.0
        } else {
            0.0
        };

        let inference = self.get_inference_stats();

        info!(
            requests,
            files_accepted = accepted,
            files_rejected = rejected,
            rejection_rate = format!("{:.1}%", rejection_rate),
            rows_predicted = rows,
            throughput = format!("{:.1} rows/s", self.get_throughput()),
            shares_served = self.shares_served.load(Ordering::Relaxed),
            shares_rejected = self.shares_rejected.load(Ordering::Relaxed),
            "Prediction service summary"
        );
        info!(
            batches = inference.count,
            mean_us = inference.mean_us,
            p50_us = inference.p50_us,
            p95_us = inference.p95_us,
            p99_us = inference.p99_us,
            max_us = inference.max_us,
            "Inference latency"
        );

        for (reason, count) in self.get_rejections_by_reason() {
            info!(reason, count, "Rejected files");
        }

        let distribution = self.get_confidence_distribution();
        let total: u64 = distribution.iter().sum();
        if total > 0 {
            for (i, &count) in distribution.iter().enumerate() {
                let pct = (count as f64 / total as f64) * 100.0;
                let bar: String = "█".repeat(((pct / 5.0) as usize).min(20));
                info!(
                    "confidence {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                    i as f64 / 10.0,
                    (i + 1) as f64 / 10.0,
                    count,
                    pct,
                    bar
                );
            }
        }
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Batch inference time statistics
#[derive(Debug, Default, PartialEq)]
pub struct InferenceStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Logs a metrics summary on a fixed interval
pub struct MetricsReporter {
    metrics: Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
