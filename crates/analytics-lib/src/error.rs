//! Error taxonomy for the train/validate pipeline

use crate::source::SourceError;
use crate::store::StoreError;
use thiserror::Error;

/// Every way a single train or validate call can fail.
///
/// None of these are retried; the engine turns them into an error result
/// for the caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No telemetry data found in the data source. Did the importer service run?")]
    EmptyDataset,

    #[error(
        "Not enough valid data after dropping rows with missing values ({count} records). Need at least {threshold}."
    )]
    InsufficientData { count: usize, threshold: usize },

    #[error("Model not found at {location}. Run training first.")]
    ArtifactNotFound { location: String },

    #[error(
        "Not enough rows ({rows}) to build sequences of length {window}; need more than {window}."
    )]
    DegenerateWindow { rows: usize, window: usize },

    #[error("Model fit failed: {0}")]
    ModelFit(String),

    #[error("Prediction failed: {0}")]
    ModelPredict(String),

    #[error("Data source error: {0}")]
    Source(#[from] SourceError),

    #[error("Artifact store error: {0}")]
    Store(#[from] StoreError),

    #[error("Artifact encoding error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Feature matrix shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Pipeline worker failed: {0}")]
    Worker(String),
}

impl PipelineError {
    /// Short machine-readable kind, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::EmptyDataset => "empty_dataset",
            PipelineError::InsufficientData { .. } => "insufficient_data",
            PipelineError::ArtifactNotFound { .. } => "artifact_not_found",
            PipelineError::DegenerateWindow { .. } => "degenerate_window",
            PipelineError::ModelFit(_) => "model_fit",
            PipelineError::ModelPredict(_) => "model_predict",
            PipelineError::Source(_) => "source",
            PipelineError::Store(_) => "store",
            PipelineError::Codec(_) => "codec",
            PipelineError::Shape(_) => "shape",
            PipelineError::Worker(_) => "worker",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_message_carries_counts() {
        let err = PipelineError::InsufficientData {
            count: 42,
            threshold: 50,
        };
        let message = err.to_string();
        assert!(message.contains("42 records"));
        assert!(message.contains("at least 50"));
        assert_eq!(err.kind(), "insufficient_data");
    }

    #[test]
    fn test_artifact_not_found_message() {
        let err = PipelineError::ArtifactNotFound {
            location: "artifacts/anomaly_model.json".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Model not found at artifacts/anomaly_model.json. Run training first."
        );
    }
}
