//! Persistent storage for fitted model artifacts
//!
//! One slot per key; a write replaces the previous artifact entirely and
//! the latest completed write is what validators load.

mod file;
mod memory;

pub use file::FileArtifactStore;
pub use memory::MemoryArtifactStore;

use crate::error::PipelineError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Fixed artifact slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKey {
    Forecaster,
    Anomaly,
    Recommender,
    /// Label encoder side artifact used by the recommender
    RecommenderLabels,
}

impl ArtifactKey {
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKey::Forecaster => "forecasting_model.json",
            ArtifactKey::Anomaly => "anomaly_model.json",
            ArtifactKey::Recommender => "recommender_model.json",
            ArtifactKey::RecommenderLabels => "recommender_label_encoder.json",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKey::Forecaster => "forecaster",
            ArtifactKey::Anomaly => "anomaly",
            ArtifactKey::Recommender => "recommender",
            ArtifactKey::RecommenderLabels => "recommender-labels",
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from the storage backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact at {location} is corrupt: {reason}")]
    Corrupt { location: String, reason: String },
}

/// Blob storage keyed by artifact slot
pub trait ArtifactStore: Send + Sync {
    /// Replace the artifact in `key`
    fn save(&self, key: ArtifactKey, blob: &[u8]) -> Result<(), StoreError>;

    /// Load the artifact in `key`, `None` if nothing was ever saved
    fn load(&self, key: ArtifactKey) -> Result<Option<Vec<u8>>, StoreError>;

    /// Where `key` lives, for messages
    fn location(&self, key: ArtifactKey) -> String;

    fn exists(&self, key: ArtifactKey) -> bool {
        matches!(self.load(key), Ok(Some(_)))
    }
}

/// Serialize and store a typed artifact
pub fn save_artifact<T: Serialize>(
    store: &dyn ArtifactStore,
    key: ArtifactKey,
    artifact: &T,
) -> Result<(), PipelineError> {
    let blob = serde_json::to_vec(artifact)?;
    store.save(key, &blob)?;
    Ok(())
}

/// Load and deserialize a typed artifact; absence is `ArtifactNotFound`
pub fn load_artifact<T: DeserializeOwned>(
    store: &dyn ArtifactStore,
    key: ArtifactKey,
) -> Result<T, PipelineError> {
    match store.load(key)? {
        Some(blob) => Ok(serde_json::from_slice(&blob)?),
        None => Err(PipelineError::ArtifactNotFound {
            location: store.location(key),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Dummy {
        weights: Vec<f64>,
    }

    #[test]
    fn test_typed_round_trip() {
        let store = MemoryArtifactStore::new();
        let artifact = Dummy {
            weights: vec![0.5, -1.25],
        };
        save_artifact(&store, ArtifactKey::Anomaly, &artifact).unwrap();
        let loaded: Dummy = load_artifact(&store, ArtifactKey::Anomaly).unwrap();
        assert_eq!(loaded, artifact);
    }

    #[test]
    fn test_missing_artifact_is_not_found() {
        let store = MemoryArtifactStore::new();
        let result: Result<Dummy, _> = load_artifact(&store, ArtifactKey::Forecaster);
        match result {
            Err(PipelineError::ArtifactNotFound { location }) => {
                assert!(location.contains("forecaster"))
            }
            other => panic!("expected not found, got {:?}", other),
        }
    }

    #[test]
    fn test_key_file_names_are_distinct() {
        let names: std::collections::HashSet<_> = [
            ArtifactKey::Forecaster,
            ArtifactKey::Anomaly,
            ArtifactKey::Recommender,
            ArtifactKey::RecommenderLabels,
        ]
        .iter()
        .map(|k| k.file_name())
        .collect();
        assert_eq!(names.len(), 4);
    }
}
