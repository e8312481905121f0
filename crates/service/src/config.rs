//! Service configuration

use analytics_lib::anomaly::AnomalyConfig;
use analytics_lib::forecaster::ForecastConfig;
use analytics_lib::recommender::RecommenderConfig;
use analytics_lib::source::SourceFormat;
use analytics_lib::PipelineSettings;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file read when `ANALYTICS_CONFIG` is unset
pub const DEFAULT_CONFIG_FILE: &str = "ml-analytics.toml";

/// Service configuration, layered from an optional TOML file and
/// `ANALYTICS_*` environment variables (`__` separates nested keys, e.g.
/// `ANALYTICS_ANOMALY__CONTAMINATION=0.1`).
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// HTTP port for the train/validate API, health and metrics
    #[serde(default = "default_port")]
    pub port: u16,

    /// Telemetry snapshot to read on every call
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    #[serde(default)]
    pub data_format: SourceFormat,

    /// Maximum records imported from a CSV snapshot
    #[serde(default = "default_import_limit")]
    pub import_limit: Option<usize>,

    /// Directory holding the model artifacts
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    #[serde(default)]
    pub forecaster: ForecastConfig,

    #[serde(default)]
    pub anomaly: AnomalyConfig,

    #[serde(default)]
    pub recommender: RecommenderConfig,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "ml-analytics".to_string())
}

fn default_port() -> u16 {
    5001
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data/telemetry.jsonl")
}

fn default_import_limit() -> Option<usize> {
    Some(1000)
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            port: default_port(),
            data_path: default_data_path(),
            data_format: SourceFormat::default(),
            import_limit: default_import_limit(),
            artifact_dir: default_artifact_dir(),
            forecaster: ForecastConfig::default(),
            anomaly: AnomalyConfig::default(),
            recommender: RecommenderConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load from `ANALYTICS_CONFIG` (or the default file) and the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var("ANALYTICS_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load from a specific file; a missing file falls back to defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("ANALYTICS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        config
            .try_deserialize()
            .context("Invalid service configuration")
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            forecaster: self.forecaster.clone(),
            anomaly: self.anomaly.clone(),
            recommender: self.recommender.clone(),
        }
    }
}
