//! Transport-safe results of train/validate calls
//!
//! Every result is a `{status, message, ...}` object. Report fields are
//! flattened next to `status` and `message`; floats are finite and
//! rounded, timestamps are ISO-8601 strings.

use crate::evaluation::ClassificationReport;
use crate::models::TelemetryRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Outcome of one train or validate call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationResult {
    pub status: Status,
    pub message: String,
    #[serde(flatten)]
    pub report: Option<Report>,
}

impl OperationResult {
    pub fn success(message: impl Into<String>, report: impl Into<Report>) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
            report: Some(report.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
            report: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

/// Model-specific payload of a successful result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Report {
    ForecastTraining(ForecastTrainingReport),
    AnomalyTraining(AnomalyTrainingReport),
    RecommenderTraining(RecommenderTrainingReport),
    ForecastValidation(ForecastValidationReport),
    AnomalyValidation(AnomalyValidationReport),
    RecommenderValidation(RecommenderValidationReport),
}

macro_rules! impl_into_report {
    ($($report:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$report> for Report {
                fn from(report: $report) -> Self {
                    Report::$variant(report)
                }
            }
        )*
    };
}

impl_into_report!(
    ForecastTrainingReport => ForecastTraining,
    AnomalyTrainingReport => AnomalyTraining,
    RecommenderTrainingReport => RecommenderTraining,
    ForecastValidationReport => ForecastValidation,
    AnomalyValidationReport => AnomalyValidation,
    RecommenderValidationReport => RecommenderValidation,
);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastTrainingReport {
    pub training_sequences: usize,
    /// Mean squared error on scaled targets after the last epoch
    pub final_loss: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyTrainingReport {
    pub training_records: usize,
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommenderTrainingReport {
    pub training_records: usize,
    /// Class name to encoded index
    pub label_encoding: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastValidationReport {
    pub mae: f64,
    pub rmse: f64,
    pub mape: f64,
    pub info: String,
    pub predictions: Vec<ForecastPoint>,
}

/// One forecast target row in real units
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub timestamp: String,
    pub actual: Option<f64>,
    pub predicted: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyValidationReport {
    pub total_test_records_valid: usize,
    pub anomalies_detected: usize,
    /// Formatted as `"{:.2}%"`
    pub anomaly_percentage: String,
    pub info: String,
    pub anomalies: Vec<AnomalyRow>,
}

/// Flagged record with its raw (unscaled) feature values
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyRow {
    pub timestamp: String,
    pub cpu_usage: Option<f64>,
    pub memory_usage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommenderValidationReport {
    /// Formatted as `"{:.4}"`
    pub accuracy: String,
    pub classification_report: ClassificationReport,
    pub info: String,
}

/// Result of probing the configured data source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceProbe {
    pub status: Status,
    pub message: String,
    pub source: String,
    pub total_records_found: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_record: Option<TelemetryRecord>,
}

/// Round half away from zero to `decimals` places; non-finite input becomes 0
pub fn round_to(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// `count / total` as a percentage string with two decimals
pub fn percentage(count: usize, total: usize) -> String {
    let pct = if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    };
    format!("{:.2}%", pct)
}

pub fn iso8601(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Drop non-finite floats so they serialize as `null`
pub fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}
