//! Observability infrastructure for the analytics service
//!
//! Provides:
//! - Prometheus metrics (run counts and latency, dropped rows, last validation scores)
//! - Structured JSON logging with tracing

use crate::models::ModelKind;
use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter,
    register_int_counter_vec, register_int_gauge, GaugeVec, HistogramVec, IntCounter,
    IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info};

/// Histogram buckets for train/validate runs (in seconds)
const RUN_DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AnalyticsMetricsInner> = OnceLock::new();

struct AnalyticsMetricsInner {
    runs_total: IntCounterVec,
    run_duration_seconds: HistogramVec,
    rows_dropped_total: IntCounter,
    anomalies_detected: IntGauge,
    validation_score: GaugeVec,
}

impl AnalyticsMetricsInner {
    fn new() -> Self {
        Self {
            runs_total: register_int_counter_vec!(
                "ml_analytics_runs_total",
                "Train and validate runs by model, operation and outcome",
                &["model", "operation", "status"]
            )
            .expect("Failed to register runs_total"),

            run_duration_seconds: register_histogram_vec!(
                "ml_analytics_run_duration_seconds",
                "Wall-clock time of train and validate runs",
                &["model", "operation"],
                RUN_DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register run_duration_seconds"),

            rows_dropped_total: register_int_counter!(
                "ml_analytics_rows_dropped_total",
                "Rows removed during cleaning because a selected value was missing"
            )
            .expect("Failed to register rows_dropped_total"),

            anomalies_detected: register_int_gauge!(
                "ml_analytics_anomalies_detected",
                "Anomalies flagged by the most recent anomaly validation"
            )
            .expect("Failed to register anomalies_detected"),

            validation_score: register_gauge_vec!(
                "ml_analytics_validation_score",
                "Most recent validation metric per model",
                &["model", "metric"]
            )
            .expect("Failed to register validation_score"),
        }
    }
}

/// Lightweight handle to the global analytics metrics.
///
/// Multiple handles share the same underlying metrics.
#[derive(Clone)]
pub struct AnalyticsMetrics {
    _private: (),
}

impl Default for AnalyticsMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyticsMetrics {
    /// Create a handle, registering the metrics on first use
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AnalyticsMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AnalyticsMetricsInner {
        GLOBAL_METRICS.get_or_init(AnalyticsMetricsInner::new)
    }

    /// Record one finished run
    pub fn observe_run(&self, model: ModelKind, operation: &str, success: bool, duration_secs: f64) {
        let status = if success { "success" } else { "error" };
        self.inner()
            .runs_total
            .with_label_values(&[model.as_str(), operation, status])
            .inc();
        self.inner()
            .run_duration_seconds
            .with_label_values(&[model.as_str(), operation])
            .observe(duration_secs);
    }

    pub fn add_rows_dropped(&self, rows: u64) {
        self.inner().rows_dropped_total.inc_by(rows);
    }

    pub fn set_anomalies_detected(&self, count: i64) {
        self.inner().anomalies_detected.set(count);
    }

    /// Publish the latest value of a validation metric
    pub fn set_validation_score(&self, model: ModelKind, metric: &str, value: f64) {
        self.inner()
            .validation_score
            .with_label_values(&[model.as_str(), metric])
            .set(value);
    }
}

/// Structured logger for train/validate lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn log_startup(&self, version: &str, source: &str, artifact_location: &str) {
        info!(
            event = "service_started",
            instance = %self.instance,
            version = %version,
            source = %source,
            artifacts = %artifact_location,
            "ML analytics service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            instance = %self.instance,
            reason = %reason,
            "ML analytics service shutting down"
        );
    }

    pub fn log_training_started(&self, model: ModelKind, records: usize) {
        info!(
            event = "training_started",
            instance = %self.instance,
            model = %model,
            records = records,
            "Training started"
        );
    }

    pub fn log_training_completed(&self, model: ModelKind, duration_ms: u128, message: &str) {
        info!(
            event = "training_completed",
            instance = %self.instance,
            model = %model,
            duration_ms = duration_ms as u64,
            message = %message,
            "Training completed"
        );
    }

    pub fn log_validation_completed(&self, model: ModelKind, duration_ms: u128, message: &str) {
        info!(
            event = "validation_completed",
            instance = %self.instance,
            model = %model,
            duration_ms = duration_ms as u64,
            message = %message,
            "Validation completed"
        );
    }

    /// Log a failed run with the error's full debug representation
    pub fn log_failure<E: std::fmt::Debug + std::fmt::Display>(
        &self,
        model: ModelKind,
        operation: &str,
        kind: &str,
        err: &E,
    ) {
        let event = match operation {
            "train" => "training_failed",
            _ => "validation_failed",
        };
        error!(
            event = event,
            instance = %self.instance,
            model = %model,
            error_kind = %kind,
            error = %err,
            detail = ?err,
            "Pipeline run failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analytics_metrics_creation() {
        // Registration is global; repeated handles must share it
        let metrics = AnalyticsMetrics::new();
        let again = AnalyticsMetrics::new();

        metrics.observe_run(ModelKind::Anomaly, "train", true, 0.25);
        again.observe_run(ModelKind::Anomaly, "validate", false, 0.01);
        metrics.add_rows_dropped(3);
        metrics.set_anomalies_detected(10);
        metrics.set_validation_score(ModelKind::Forecaster, "mae", 0.12);

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "ml_analytics_runs_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("ml-analytics-test");
        assert_eq!(logger.instance(), "ml-analytics-test");
    }
}
