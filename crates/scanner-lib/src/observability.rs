//! Observability infrastructure for the waste scanner
//!
//! Provides:
//! - Prometheus metrics (resources fetched/flagged/failed, evaluation latency,
//!   price cache effectiveness)
//! - Structured JSON logging with tracing

use crate::engine::RunReport;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder,
    HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for per-resource evaluation latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ScannerMetricsInner> = OnceLock::new();

struct ScannerMetricsInner {
    resources_fetched: IntCounterVec,
    resources_flagged: IntCounterVec,
    resources_excluded: IntCounterVec,
    evaluation_failures: IntCounterVec,
    evaluation_latency_seconds: HistogramVec,
    pipeline_failures: IntCounterVec,
    price_cache_hits: IntCounter,
    price_cache_misses: IntCounter,
}

impl ScannerMetricsInner {
    fn new() -> Self {
        Self {
            resources_fetched: register_int_counter_vec!(
                "waste_scanner_resources_fetched_total",
                "Resources returned by the fetch step",
                &["pipeline"]
            )
            .expect("Failed to register resources_fetched"),

            resources_flagged: register_int_counter_vec!(
                "waste_scanner_resources_flagged_total",
                "Resources included in a report",
                &["pipeline"]
            )
            .expect("Failed to register resources_flagged"),

            resources_excluded: register_int_counter_vec!(
                "waste_scanner_resources_excluded_total",
                "Resources excluded by the classifier",
                &["pipeline"]
            )
            .expect("Failed to register resources_excluded"),

            evaluation_failures: register_int_counter_vec!(
                "waste_scanner_evaluation_failures_total",
                "Resource evaluations that errored, panicked or timed out",
                &["pipeline"]
            )
            .expect("Failed to register evaluation_failures"),

            evaluation_latency_seconds: register_histogram_vec!(
                "waste_scanner_evaluation_latency_seconds",
                "Time spent evaluating a single resource",
                &["pipeline"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register evaluation_latency_seconds"),

            pipeline_failures: register_int_counter_vec!(
                "waste_scanner_pipeline_failures_total",
                "Pipeline runs that ended without a report",
                &["pipeline"]
            )
            .expect("Failed to register pipeline_failures"),

            price_cache_hits: register_int_counter!(
                "waste_scanner_price_cache_hits_total",
                "Price lookups answered from the run cache"
            )
            .expect("Failed to register price_cache_hits"),

            price_cache_misses: register_int_counter!(
                "waste_scanner_price_cache_misses_total",
                "Price lookups that queried a pricing backend"
            )
            .expect("Failed to register price_cache_misses"),
        }
    }
}

/// Scanner metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct ScannerMetrics {
    _private: (),
}

impl Default for ScannerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScannerMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ScannerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ScannerMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn add_fetched(&self, pipeline: &str, count: usize) {
        self.inner()
            .resources_fetched
            .with_label_values(&[pipeline])
            .inc_by(count as u64);
    }

    pub fn add_flagged(&self, pipeline: &str, count: usize) {
        self.inner()
            .resources_flagged
            .with_label_values(&[pipeline])
            .inc_by(count as u64);
    }

    pub fn add_excluded(&self, pipeline: &str, count: usize) {
        self.inner()
            .resources_excluded
            .with_label_values(&[pipeline])
            .inc_by(count as u64);
    }

    pub fn inc_evaluation_failures(&self, pipeline: &str) {
        self.inner()
            .evaluation_failures
            .with_label_values(&[pipeline])
            .inc();
    }

    pub fn observe_evaluation_latency(&self, pipeline: &str, duration_secs: f64) {
        self.inner()
            .evaluation_latency_seconds
            .with_label_values(&[pipeline])
            .observe(duration_secs);
    }

    pub fn inc_pipeline_failures(&self, pipeline: &str) {
        self.inner()
            .pipeline_failures
            .with_label_values(&[pipeline])
            .inc();
    }

    pub fn inc_price_cache_hit(&self) {
        self.inner().price_cache_hits.inc();
    }

    pub fn inc_price_cache_miss(&self) {
        self.inner().price_cache_misses.inc();
    }

    /// Render every registered metric in the Prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Structured logger for scan events
///
/// Provides consistent JSON-formatted logging for pipeline lifecycle and
/// per-resource failures.
#[derive(Clone)]
pub struct StructuredLogger {
    run_id: String,
}

impl StructuredLogger {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Log scanner startup
    pub fn log_run_started(&self, version: &str, pipelines: &[String]) {
        info!(
            event = "run_started",
            run_id = %self.run_id,
            scanner_version = %version,
            pipelines = ?pipelines,
            "Waste scan started"
        );
    }

    pub fn log_pipeline_started(&self, pipeline: &str) {
        info!(
            event = "pipeline_started",
            run_id = %self.run_id,
            pipeline = %pipeline,
            "Starting pipeline"
        );
    }

    pub fn log_pipeline_finished(&self, report: &RunReport) {
        info!(
            event = "pipeline_finished",
            run_id = %self.run_id,
            pipeline = %report.pipeline,
            fetched = report.fetched,
            included = report.included,
            excluded = report.excluded,
            failures = report.failures.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Finished pipeline"
        );
    }

    pub fn log_pipeline_failed(&self, pipeline: &str, error: &str) {
        warn!(
            event = "pipeline_failed",
            run_id = %self.run_id,
            pipeline = %pipeline,
            error = %error,
            "Pipeline failed"
        );
    }

    pub fn log_evaluation_failure(&self, pipeline: &str, resource_id: &str, reason: &str) {
        warn!(
            event = "evaluation_failed",
            run_id = %self.run_id,
            pipeline = %pipeline,
            resource_id = %resource_id,
            reason = %reason,
            "Resource evaluation failed, resource excluded"
        );
    }

    /// Log the end of a scan across all pipelines
    pub fn log_run_finished(&self, succeeded: usize, failed: usize) {
        if failed == 0 {
            info!(
                event = "run_finished",
                run_id = %self.run_id,
                succeeded = succeeded,
                failed = failed,
                "Waste scan finished"
            );
        } else {
            warn!(
                event = "run_finished",
                run_id = %self.run_id,
                succeeded = succeeded,
                failed = failed,
                "Waste scan finished with failed pipelines"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scanner_metrics_creation() {
        let metrics = ScannerMetrics::new();

        metrics.add_fetched("test", 3);
        metrics.add_flagged("test", 1);
        metrics.add_excluded("test", 2);
        metrics.inc_evaluation_failures("test");
        metrics.observe_evaluation_latency("test", 0.02);
        metrics.inc_price_cache_hit();
        metrics.inc_price_cache_miss();

        let text = metrics.render().unwrap();
        assert!(text.contains("waste_scanner_resources_fetched_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("run-1");
        assert_eq!(logger.run_id(), "run-1");
    }
}
