//! Outlier detection on CPU and memory utilisation
//!
//! An isolation forest is fit on the cleaned training rows. The decision
//! threshold is the training-score percentile at `1 - contamination`, so
//! roughly that fraction of training rows score above it.

mod isolation_forest;

pub use isolation_forest::{average_path_length, percentile, IsolationForest};

use crate::dataset::FeatureSelector;
use crate::engine::ModelPipeline;
use crate::error::PipelineError;
use crate::models::{field_list, Field, ModelKind, TelemetryRecord};
use crate::response::{
    finite, iso8601, percentage, round_to, AnomalyRow, AnomalyTrainingReport,
    AnomalyValidationReport, OperationResult,
};
use crate::store::{load_artifact, save_artifact, ArtifactKey, ArtifactStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const ANOMALY_FEATURES: [Field; 2] = [Field::CpuUsage, Field::MemoryUsage];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub n_estimators: usize,
    pub max_samples: usize,
    /// Expected share of anomalous records, in (0, 0.5]
    pub contamination: f64,
    pub seed: u64,
    pub min_training_rows: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.05,
            seed: 42,
            min_training_rows: 50,
        }
    }
}

impl AnomalyConfig {
    pub fn with_contamination(mut self, contamination: f64) -> Self {
        self.contamination = contamination;
        self
    }

    pub fn with_n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyArtifact {
    pub features: Vec<Field>,
    pub forest: IsolationForest,
    /// Rows scoring strictly above this are anomalies
    pub threshold: f64,
    pub contamination: f64,
    pub trained_at: DateTime<Utc>,
}

impl AnomalyArtifact {
    pub fn is_anomaly(&self, score: f64) -> bool {
        score > self.threshold
    }
}

pub struct AnomalyDetector {
    config: AnomalyConfig,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(AnomalyConfig::default())
    }
}

impl ModelPipeline for AnomalyDetector {
    fn kind(&self) -> ModelKind {
        ModelKind::Anomaly
    }

    fn train(
        &self,
        train: &[TelemetryRecord],
        store: &dyn ArtifactStore,
    ) -> Result<OperationResult, PipelineError> {
        let contamination = self.config.contamination;
        if !(contamination > 0.0 && contamination <= 0.5) {
            return Err(PipelineError::ModelFit(format!(
                "contamination must be in (0, 0.5], got {}",
                contamination
            )));
        }

        let matrix =
            FeatureSelector::new(&ANOMALY_FEATURES, self.config.min_training_rows).select(train)?;
        info!(rows = matrix.nrows(), "Fitting isolation forest");

        let forest = IsolationForest::fit(
            matrix.values(),
            self.config.n_estimators,
            self.config.max_samples,
            self.config.seed,
        )?;
        let scores = forest.score_samples(matrix.values())?;
        let threshold = percentile(&scores, 1.0 - contamination).ok_or_else(|| {
            PipelineError::ModelFit("no training scores to calibrate threshold".to_string())
        })?;

        let artifact = AnomalyArtifact {
            features: matrix.columns().to_vec(),
            forest,
            threshold,
            contamination,
            trained_at: Utc::now(),
        };
        save_artifact(store, ArtifactKey::Anomaly, &artifact)?;

        let location = store.location(ArtifactKey::Anomaly);
        Ok(OperationResult::success(
            format!(
                "Anomaly detection model trained on {} records and saved to {}",
                matrix.nrows(),
                location
            ),
            AnomalyTrainingReport {
                training_records: matrix.nrows(),
                threshold: finite(round_to(threshold, 6)),
            },
        ))
    }

    fn validate(
        &self,
        test: &[TelemetryRecord],
        store: &dyn ArtifactStore,
    ) -> Result<OperationResult, PipelineError> {
        let artifact: AnomalyArtifact = load_artifact(store, ArtifactKey::Anomaly)?;
        let matrix = FeatureSelector::new(&artifact.features, 1).select(test)?;
        let scores = artifact.forest.score_samples(matrix.values())?;

        let mut anomalies = Vec::new();
        for (row, &score) in scores.iter().enumerate() {
            if !artifact.is_anomaly(score) {
                continue;
            }
            // Raw values come from the source record, not the matrix
            let Some(record) = matrix.source_row(row).and_then(|i| test.get(i)) else {
                return Err(PipelineError::ModelPredict(format!(
                    "flagged row {} has no source record",
                    row
                )));
            };
            anomalies.push(AnomalyRow {
                timestamp: iso8601(&record.timestamp),
                cpu_usage: record.cpu_usage,
                memory_usage: record.memory_usage,
            });
        }

        let total = matrix.nrows();
        info!(
            total = total,
            anomalies = anomalies.len(),
            threshold = artifact.threshold,
            "Anomaly validation complete"
        );

        Ok(OperationResult::success(
            "Anomaly detection model validated successfully.",
            AnomalyValidationReport {
                total_test_records_valid: total,
                anomalies_detected: anomalies.len(),
                anomaly_percentage: percentage(anomalies.len(), total),
                info: format!(
                    "Model predicted anomalies based on features: {}",
                    field_list(&artifact.features)
                ),
                anomalies,
            },
        ))
    }
}
