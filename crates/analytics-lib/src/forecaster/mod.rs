//! Next-step cost forecasting
//!
//! Features are scaled into [0, 1] with a scaler fit on the training
//! partition, cut into windows of `window_length` consecutive rows, and fed
//! to a [`WindowRegressor`] that predicts the scaled cost of the next row.
//! The scaler is stored inside the artifact; validation never re-fits it.

mod regressor;

pub use regressor::WindowRegressor;

use crate::dataset::{FeatureSelector, MinMaxScaler, SequenceWindower, SEQUENCE_LENGTH};
use crate::engine::ModelPipeline;
use crate::error::PipelineError;
use crate::evaluation::RegressionMetrics;
use crate::models::{field_list, Field, ModelKind, TelemetryRecord};
use crate::response::{
    finite, iso8601, round_to, ForecastPoint, ForecastTrainingReport, ForecastValidationReport,
    OperationResult,
};
use crate::store::{load_artifact, save_artifact, ArtifactKey, ArtifactStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Input columns, in window order
pub const FORECAST_FEATURES: [Field; 3] = [Field::Cost, Field::RamGb, Field::PricePerHour];

/// Column being forecast
pub const FORECAST_TARGET: Field = Field::Cost;

/// Forecaster hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub window_length: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Gradient norm ceiling, 0 disables clipping
    pub clip_norm: f64,
    pub seed: u64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            window_length: SEQUENCE_LENGTH,
            epochs: 100,
            batch_size: 32,
            learning_rate: 0.0005,
            clip_norm: 1.0,
            seed: 42,
        }
    }
}

impl ForecastConfig {
    pub fn with_window_length(mut self, window_length: usize) -> Self {
        self.window_length = window_length;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }
}

/// Everything validation needs to reproduce the training-time preparation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastArtifact {
    pub features: Vec<Field>,
    pub target_column: usize,
    pub window_length: usize,
    pub scaler: MinMaxScaler,
    pub regressor: WindowRegressor,
    pub trained_at: DateTime<Utc>,
}

pub struct Forecaster {
    config: ForecastConfig,
}

impl Forecaster {
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    fn target_column(features: &[Field]) -> Result<usize, PipelineError> {
        features
            .iter()
            .position(|&f| f == FORECAST_TARGET)
            .ok_or_else(|| {
                PipelineError::ModelFit(format!(
                    "target {} is not among the features {}",
                    FORECAST_TARGET,
                    field_list(features)
                ))
            })
    }
}

impl Default for Forecaster {
    fn default() -> Self {
        Self::new(ForecastConfig::default())
    }
}

impl ModelPipeline for Forecaster {
    fn kind(&self) -> ModelKind {
        ModelKind::Forecaster
    }

    fn train(
        &self,
        train: &[TelemetryRecord],
        store: &dyn ArtifactStore,
    ) -> Result<OperationResult, PipelineError> {
        let matrix = FeatureSelector::new(&FORECAST_FEATURES, 1).select(train)?;
        let target_column = Self::target_column(matrix.columns())?;

        let scaler = MinMaxScaler::fit(matrix.values())?;
        let scaled = scaler.transform(matrix.values())?;
        let windows =
            SequenceWindower::new(self.config.window_length, target_column).build(&scaled)?;

        info!(
            rows = matrix.nrows(),
            sequences = windows.len(),
            epochs = self.config.epochs,
            "Fitting forecaster"
        );
        let (regressor, loss) = WindowRegressor::fit(&windows.inputs, &windows.targets, &self.config)?;

        let artifact = ForecastArtifact {
            features: matrix.columns().to_vec(),
            target_column,
            window_length: self.config.window_length,
            scaler,
            regressor,
            trained_at: Utc::now(),
        };
        save_artifact(store, ArtifactKey::Forecaster, &artifact)?;

        let location = store.location(ArtifactKey::Forecaster);
        Ok(OperationResult::success(
            format!(
                "Forecasting model trained on {} sequences and saved to {}",
                windows.len(),
                location
            ),
            ForecastTrainingReport {
                training_sequences: windows.len(),
                final_loss: finite(round_to(loss, 6)),
            },
        ))
    }

    fn validate(
        &self,
        test: &[TelemetryRecord],
        store: &dyn ArtifactStore,
    ) -> Result<OperationResult, PipelineError> {
        let artifact: ForecastArtifact = load_artifact(store, ArtifactKey::Forecaster)?;
        let target = artifact.target_column;

        let matrix = FeatureSelector::new(&artifact.features, 1).select(test)?;
        let scaled = artifact.scaler.transform(matrix.values())?;
        let windows = SequenceWindower::new(artifact.window_length, target).build(&scaled)?;
        let predicted_scaled = artifact.regressor.predict(&windows.inputs)?;

        let actual: Vec<f64> = windows
            .targets
            .iter()
            .map(|&v| artifact.scaler.inverse_value(target, v))
            .collect();
        let predicted: Vec<f64> = predicted_scaled
            .iter()
            .map(|&v| artifact.scaler.inverse_value(target, v))
            .collect();
        let metrics = RegressionMetrics::compute(&actual, &predicted);

        let mut predictions = Vec::with_capacity(windows.len());
        for (k, &row) in windows.target_rows.iter().enumerate() {
            let record = matrix
                .source_row(row)
                .and_then(|source| test.get(source))
                .ok_or_else(|| {
                    PipelineError::ModelPredict(format!("window target row {} has no source record", row))
                })?;
            predictions.push(ForecastPoint {
                timestamp: iso8601(&record.timestamp),
                actual: finite(actual[k]),
                predicted: finite(predicted[k]),
            });
        }

        info!(
            sequences = windows.len(),
            valid_points = metrics.valid_points,
            mae = metrics.mae,
            rmse = metrics.rmse,
            "Forecaster validated"
        );

        Ok(OperationResult::success(
            "Multivariate model validated successfully.",
            ForecastValidationReport {
                mae: round_to(metrics.mae, 4),
                rmse: round_to(metrics.rmse, 4),
                mape: round_to(metrics.mape, 4),
                info: format!("Metrics use past {} features.", field_list(&artifact.features)),
                predictions,
            },
        ))
    }
}
