//! Caller-facing train/validate operations
//!
//! The engine fetches the full snapshot, splits it by time and hands the
//! relevant partition to the model pipeline on a blocking worker. Every
//! failure, including a panicked worker, comes back as an error result;
//! nothing escapes to the caller.

use crate::anomaly::{AnomalyConfig, AnomalyDetector};
use crate::dataset::TimeOrderedSplitter;
use crate::error::PipelineError;
use crate::forecaster::{ForecastConfig, Forecaster};
use crate::health::{components, model_component, HealthRegistry};
use crate::models::{ModelKind, TelemetryRecord};
use crate::observability::{AnalyticsMetrics, StructuredLogger};
use crate::recommender::{Recommender, RecommenderConfig};
use crate::response::{OperationResult, Report, SourceProbe, Status};
use crate::source::TelemetrySource;
use crate::store::ArtifactStore;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Fit/persist and load/evaluate one model kind
pub trait ModelPipeline: Send + Sync {
    fn kind(&self) -> ModelKind;

    /// Fit on the training partition and persist the artifact
    fn train(
        &self,
        train: &[TelemetryRecord],
        store: &dyn ArtifactStore,
    ) -> Result<OperationResult, PipelineError>;

    /// Evaluate the persisted artifact on the test partition
    fn validate(
        &self,
        test: &[TelemetryRecord],
        store: &dyn ArtifactStore,
    ) -> Result<OperationResult, PipelineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Train,
    Validate,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Train => "train",
            Operation::Validate => "validate",
        }
    }
}

/// Hyperparameters for all three pipelines
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub forecaster: ForecastConfig,
    pub anomaly: AnomalyConfig,
    pub recommender: RecommenderConfig,
}

/// One pipeline and the lock serialising its training runs
struct Slot {
    pipeline: Arc<dyn ModelPipeline>,
    training: Mutex<()>,
}

impl Slot {
    fn new(pipeline: Arc<dyn ModelPipeline>) -> Self {
        Self {
            pipeline,
            training: Mutex::new(()),
        }
    }
}

pub struct AnalyticsEngine {
    source: Arc<dyn TelemetrySource>,
    store: Arc<dyn ArtifactStore>,
    splitter: TimeOrderedSplitter,
    forecaster: Slot,
    anomaly: Slot,
    recommender: Slot,
    logger: StructuredLogger,
    metrics: AnalyticsMetrics,
    health: Option<HealthRegistry>,
}

impl AnalyticsEngine {
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        store: Arc<dyn ArtifactStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source,
            store,
            splitter: TimeOrderedSplitter::new(),
            forecaster: Slot::new(Arc::new(Forecaster::new(settings.forecaster))),
            anomaly: Slot::new(Arc::new(AnomalyDetector::new(settings.anomaly))),
            recommender: Slot::new(Arc::new(Recommender::new(settings.recommender))),
            logger: StructuredLogger::new("ml-analytics"),
            metrics: AnalyticsMetrics::new(),
            health: None,
        }
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Replace the pipeline registered for `pipeline.kind()`
    pub fn with_pipeline(mut self, pipeline: Arc<dyn ModelPipeline>) -> Self {
        let kind = pipeline.kind();
        *self.slot_mut(kind) = Slot::new(pipeline);
        self
    }

    pub fn source_description(&self) -> String {
        self.source.describe()
    }

    pub fn artifact_location(&self, key: crate::store::ArtifactKey) -> String {
        self.store.location(key)
    }

    fn slot(&self, kind: ModelKind) -> &Slot {
        match kind {
            ModelKind::Forecaster => &self.forecaster,
            ModelKind::Anomaly => &self.anomaly,
            ModelKind::Recommender => &self.recommender,
        }
    }

    fn slot_mut(&mut self, kind: ModelKind) -> &mut Slot {
        match kind {
            ModelKind::Forecaster => &mut self.forecaster,
            ModelKind::Anomaly => &mut self.anomaly,
            ModelKind::Recommender => &mut self.recommender,
        }
    }

    /// Train `kind` on the leading 80% of the snapshot
    pub async fn train(&self, kind: ModelKind) -> OperationResult {
        let _guard = self.slot(kind).training.lock().await;
        self.run(kind, Operation::Train).await
    }

    /// Evaluate the latest `kind` artifact on the trailing 20%
    pub async fn validate(&self, kind: ModelKind) -> OperationResult {
        self.run(kind, Operation::Validate).await
    }

    async fn run(&self, kind: ModelKind, operation: Operation) -> OperationResult {
        let started = Instant::now();
        let outcome = self.execute(kind, operation).await;
        let elapsed = started.elapsed();
        self.metrics
            .observe_run(kind, operation.as_str(), outcome.is_ok(), elapsed.as_secs_f64());

        match outcome {
            Ok(result) => {
                match operation {
                    Operation::Train => {
                        self.logger
                            .log_training_completed(kind, elapsed.as_millis(), &result.message)
                    }
                    Operation::Validate => {
                        self.logger
                            .log_validation_completed(kind, elapsed.as_millis(), &result.message)
                    }
                }
                self.record_report(kind, &result);
                if let Some(health) = &self.health {
                    health.set_healthy(model_component(kind)).await;
                }
                result
            }
            Err(err) => {
                self.logger
                    .log_failure(kind, operation.as_str(), err.kind(), &err);
                self.mark_failure(kind, operation, &err).await;
                OperationResult::error(err.to_string())
            }
        }
    }

    async fn execute(
        &self,
        kind: ModelKind,
        operation: Operation,
    ) -> Result<OperationResult, PipelineError> {
        let records = self.source.fetch_all().await?;
        debug!(model = %kind, records = records.len(), "Fetched telemetry snapshot");

        let split = self.splitter.split(records)?;
        let partition = match operation {
            Operation::Train => split.train,
            Operation::Validate => split.test,
        };
        if operation == Operation::Train {
            self.logger.log_training_started(kind, partition.len());
        }

        let pipeline = Arc::clone(&self.slot(kind).pipeline);
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || match operation {
            Operation::Train => pipeline.train(&partition, store.as_ref()),
            Operation::Validate => pipeline.validate(&partition, store.as_ref()),
        })
        .await
        .map_err(|e| PipelineError::Worker(e.to_string()))?
    }

    fn record_report(&self, kind: ModelKind, result: &OperationResult) {
        match &result.report {
            Some(Report::ForecastValidation(report)) => {
                self.metrics.set_validation_score(kind, "mae", report.mae);
                self.metrics.set_validation_score(kind, "rmse", report.rmse);
                self.metrics.set_validation_score(kind, "mape", report.mape);
            }
            Some(Report::AnomalyValidation(report)) => {
                self.metrics
                    .set_anomalies_detected(report.anomalies_detected as i64);
                let ratio = if report.total_test_records_valid == 0 {
                    0.0
                } else {
                    report.anomalies_detected as f64 / report.total_test_records_valid as f64
                };
                self.metrics.set_validation_score(kind, "anomaly_ratio", ratio);
            }
            Some(Report::RecommenderValidation(report)) => {
                self.metrics.set_validation_score(
                    kind,
                    "accuracy",
                    report.classification_report.accuracy,
                );
            }
            _ => {}
        }
    }

    async fn mark_failure(&self, kind: ModelKind, operation: Operation, err: &PipelineError) {
        let Some(health) = &self.health else {
            return;
        };
        match err {
            PipelineError::Source(_) => {
                health.set_degraded(components::DATA_SOURCE, err.to_string()).await
            }
            PipelineError::Store(_) => {
                health
                    .set_degraded(components::ARTIFACT_STORE, err.to_string())
                    .await
            }
            _ if operation == Operation::Train => {
                health.set_degraded(model_component(kind), err.to_string()).await
            }
            _ => {}
        }
    }

    /// Count the records in the source and return the first one
    pub async fn probe(&self) -> SourceProbe {
        let source = self.source.describe();
        match self.source.fetch_all().await {
            Ok(records) => {
                if let Some(health) = &self.health {
                    health.set_healthy(components::DATA_SOURCE).await;
                }
                let message = if records.is_empty() {
                    "Connected to the data source, but it contains no telemetry records."
                } else {
                    "Successfully connected to the data source."
                };
                SourceProbe {
                    status: Status::Success,
                    message: message.to_string(),
                    source,
                    total_records_found: records.len(),
                    sample_record: records.into_iter().next(),
                }
            }
            Err(err) => {
                error!(source = %source, error = %err, detail = ?err, "Data source probe failed");
                if let Some(health) = &self.health {
                    health
                        .set_degraded(components::DATA_SOURCE, err.to_string())
                        .await;
                }
                SourceProbe {
                    status: Status::Error,
                    message: err.to_string(),
                    source,
                    total_records_found: 0,
                    sample_record: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ComponentStatus;
    use crate::source::InMemorySource;
    use crate::store::MemoryArtifactStore;
    use chrono::{Duration, TimeZone, Utc};

    /// Hourly utilisation with every field the three models need
    fn snapshot(n: usize) -> Vec<TelemetryRecord> {
        let base = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        // Reverse order so the engine has to sort
        (0..n)
            .rev()
            .map(|i| {
                let mut r = TelemetryRecord::at(base + Duration::hours(i as i64));
                let cpu = 20.0 + ((i * 37) % 60) as f64;
                r.cpu_usage = Some(cpu);
                r.memory_usage = Some(30.0 + ((i * 17) % 40) as f64);
                r.v_cpu = Some(if i % 3 == 0 { 2.0 } else { 4.0 });
                r.ram_gb = Some(if i % 2 == 0 { 8.0 } else { 16.0 });
                r.price_per_hour = Some(0.096);
                r.cost = Some(0.1 + 0.02 * ((i % 24) as f64));
                r.target = Some(if cpu > 60.0 { "scale_up" } else { "no_action" }.to_string());
                r
            })
            .collect()
    }

    fn engine(records: Vec<TelemetryRecord>) -> AnalyticsEngine {
        let settings = PipelineSettings {
            forecaster: ForecastConfig::default().with_epochs(3),
            recommender: RecommenderConfig::default().with_n_estimators(10),
            ..PipelineSettings::default()
        };
        AnalyticsEngine::new(
            Arc::new(InMemorySource::new(records)),
            Arc::new(MemoryArtifactStore::new()),
            settings,
        )
    }

    #[tokio::test]
    async fn test_validate_before_train_is_error_result() {
        let engine = engine(snapshot(300));
        for kind in ModelKind::ALL {
            let result = engine.validate(kind).await;
            assert_eq!(result.status, Status::Error);
            assert!(result.message.contains("Run training first"), "{}", result.message);
        }
    }

    #[tokio::test]
    async fn test_empty_source() {
        let engine = engine(Vec::new());
        let result = engine.train(ModelKind::Anomaly).await;
        assert_eq!(result.status, Status::Error);
        assert!(result.message.starts_with("No telemetry data found"));
    }

    #[tokio::test]
    async fn test_anomaly_end_to_end() {
        let engine = engine(snapshot(1000));
        let trained = engine.train(ModelKind::Anomaly).await;
        assert!(trained.is_success(), "{}", trained.message);
        assert!(trained.message.contains("trained on 800 records"));

        let validated = engine.validate(ModelKind::Anomaly).await;
        let Some(Report::AnomalyValidation(report)) = validated.report else {
            panic!("expected anomaly report: {}", validated.message);
        };
        assert_eq!(report.total_test_records_valid, 200);
        // Test rows follow the training distribution, so roughly 5% are flagged
        assert!(
            (5..=20).contains(&report.anomalies_detected),
            "flagged {}",
            report.anomalies_detected
        );
        assert_eq!(report.anomalies.len(), report.anomalies_detected);
    }

    #[tokio::test]
    async fn test_all_models_train_and_validate() {
        let engine = engine(snapshot(400));
        for kind in ModelKind::ALL {
            let trained = engine.train(kind).await;
            assert!(trained.is_success(), "{}: {}", kind, trained.message);
            let validated = engine.validate(kind).await;
            assert!(validated.is_success(), "{}: {}", kind, validated.message);
        }
    }

    #[tokio::test]
    async fn test_failed_training_degrades_model_health() {
        let health = HealthRegistry::new();
        health.register_all().await;
        // 40 records leave 32 for training, under the anomaly minimum
        let engine = engine(snapshot(40)).with_health(health.clone());

        let result = engine.train(ModelKind::Anomaly).await;
        assert_eq!(result.status, Status::Error);
        assert!(result.message.contains("Need at least 50"));

        let status = health.health().await;
        assert_eq!(
            status.components[components::ANOMALY].status,
            ComponentStatus::Degraded
        );
        assert_eq!(
            status.components[components::FORECASTER].status,
            ComponentStatus::Healthy
        );
    }

    struct PanickingPipeline;

    impl ModelPipeline for PanickingPipeline {
        fn kind(&self) -> ModelKind {
            ModelKind::Forecaster
        }

        fn train(
            &self,
            _train: &[TelemetryRecord],
            _store: &dyn ArtifactStore,
        ) -> Result<OperationResult, PipelineError> {
            panic!("fit exploded")
        }

        fn validate(
            &self,
            _test: &[TelemetryRecord],
            _store: &dyn ArtifactStore,
        ) -> Result<OperationResult, PipelineError> {
            Err(PipelineError::ModelPredict("nope".to_string()))
        }
    }

    #[tokio::test]
    async fn test_worker_panic_becomes_error_result() {
        let engine = engine(snapshot(100)).with_pipeline(Arc::new(PanickingPipeline));
        let result = engine.train(ModelKind::Forecaster).await;
        assert_eq!(result.status, Status::Error);
        assert!(result.message.starts_with("Pipeline worker failed"));
    }

    #[tokio::test]
    async fn test_probe_returns_first_record() {
        let records = snapshot(5);
        let first = records[0].clone();
        let probe = engine(records).probe().await;
        assert_eq!(probe.status, Status::Success);
        assert_eq!(probe.total_records_found, 5);
        assert_eq!(probe.sample_record, Some(first));
    }
}
