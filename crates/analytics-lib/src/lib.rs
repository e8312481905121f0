//! Analytics library for cloud telemetry models
//!
//! This crate provides the core functionality of the ML analytics service:
//! - Telemetry sources (JSON-lines export, CSV import)
//! - Time-ordered splitting, feature cleaning, scaling and windowing
//! - Cost forecasting, utilisation anomaly detection and scaling recommendations
//! - Checksummed artifact storage
//! - Health tracking and Prometheus metrics

pub mod anomaly;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod forecaster;
pub mod health;
pub mod models;
pub mod observability;
pub mod recommender;
pub mod response;
pub mod source;
pub mod store;

pub use engine::{AnalyticsEngine, ModelPipeline, Operation, PipelineSettings};
pub use error::PipelineError;
pub use models::{ModelKind, TelemetryRecord};
pub use response::{OperationResult, Status};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use observability::{AnalyticsMetrics, StructuredLogger};
