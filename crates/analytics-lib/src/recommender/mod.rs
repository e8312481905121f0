//! Scaling-action recommendation
//!
//! Classifies each record's `target` action from its utilisation and
//! instance shape. The label encoder is persisted beside the classifier so
//! validation decodes with the training-time class list.

mod boosting;

pub use boosting::{BoostingParams, GradientBoostedClassifier, RegressionTree};

use crate::dataset::{FeatureSelector, LabelEncoder};
use crate::engine::ModelPipeline;
use crate::error::PipelineError;
use crate::evaluation::ClassificationReport;
use crate::models::{field_list, Field, ModelKind, TelemetryRecord};
use crate::response::{OperationResult, RecommenderTrainingReport, RecommenderValidationReport};
use crate::store::{save_artifact, ArtifactKey, ArtifactStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const RECOMMENDER_FEATURES: [Field; 4] =
    [Field::CpuUsage, Field::MemoryUsage, Field::VCpu, Field::RamGb];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommenderConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_training_rows: usize,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 5,
            min_training_rows: 100,
        }
    }
}

impl RecommenderConfig {
    pub fn with_n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    fn boosting(&self) -> BoostingParams {
        BoostingParams {
            n_estimators: self.n_estimators,
            learning_rate: self.learning_rate,
            max_depth: self.max_depth,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommenderArtifact {
    pub features: Vec<Field>,
    /// Class list the classifier was fit against, in encoder order
    pub classes: Vec<String>,
    pub classifier: GradientBoostedClassifier,
    pub trained_at: DateTime<Utc>,
}

pub struct Recommender {
    config: RecommenderConfig,
}

impl Recommender {
    pub fn new(config: RecommenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RecommenderConfig {
        &self.config
    }

    /// Both artifacts or `ArtifactNotFound` naming the two locations
    fn load_artifacts(
        store: &dyn ArtifactStore,
    ) -> Result<(RecommenderArtifact, LabelEncoder), PipelineError> {
        let model = store.load(ArtifactKey::Recommender)?;
        let labels = store.load(ArtifactKey::RecommenderLabels)?;
        match (model, labels) {
            (Some(model), Some(labels)) => Ok((
                serde_json::from_slice(&model)?,
                serde_json::from_slice(&labels)?,
            )),
            _ => Err(PipelineError::ArtifactNotFound {
                location: format!(
                    "{} or {}",
                    store.location(ArtifactKey::Recommender),
                    store.location(ArtifactKey::RecommenderLabels)
                ),
            }),
        }
    }

    /// The two artifacts are written separately; a partial save can pair a
    /// new encoder with an old classifier.
    fn check_pair(
        artifact: &RecommenderArtifact,
        encoder: &LabelEncoder,
    ) -> Result<(), PipelineError> {
        if artifact.classes.as_slice() != encoder.classes()
            || artifact.classifier.n_classes() != encoder.n_classes()
        {
            return Err(PipelineError::ModelPredict(format!(
                "label encoder classes [{}] do not match the classifier's [{}]; retrain the recommender",
                encoder.classes().join(", "),
                artifact.classes.join(", ")
            )));
        }
        Ok(())
    }
}

impl Default for Recommender {
    fn default() -> Self {
        Self::new(RecommenderConfig::default())
    }
}

impl ModelPipeline for Recommender {
    fn kind(&self) -> ModelKind {
        ModelKind::Recommender
    }

    fn train(
        &self,
        train: &[TelemetryRecord],
        store: &dyn ArtifactStore,
    ) -> Result<OperationResult, PipelineError> {
        let labeled = FeatureSelector::new(&RECOMMENDER_FEATURES, self.config.min_training_rows)
            .select_labeled(train)?;
        let encoder = LabelEncoder::fit(&labeled.labels)?;
        let encoded = encoder.transform(&labeled.labels)?;
        info!(
            rows = labeled.features.nrows(),
            classes = encoder.n_classes(),
            "Fitting recommender"
        );

        let classifier = GradientBoostedClassifier::fit(
            labeled.features.values(),
            &encoded,
            encoder.n_classes(),
            self.config.boosting(),
        )?;

        save_artifact(store, ArtifactKey::RecommenderLabels, &encoder)?;
        save_artifact(
            store,
            ArtifactKey::Recommender,
            &RecommenderArtifact {
                features: labeled.features.columns().to_vec(),
                classes: encoder.classes().to_vec(),
                classifier,
                trained_at: Utc::now(),
            },
        )?;

        let records = labeled.features.nrows();
        Ok(OperationResult::success(
            format!(
                "Recommender model trained on {} records and saved to {}",
                records,
                store.location(ArtifactKey::Recommender)
            ),
            RecommenderTrainingReport {
                training_records: records,
                label_encoding: encoder.mapping(),
            },
        ))
    }

    fn validate(
        &self,
        test: &[TelemetryRecord],
        store: &dyn ArtifactStore,
    ) -> Result<OperationResult, PipelineError> {
        let (artifact, encoder) = Self::load_artifacts(store)?;
        Self::check_pair(&artifact, &encoder)?;
        let labeled = FeatureSelector::new(&artifact.features, 1).select_labeled(test)?;
        let actual = encoder.transform(&labeled.labels)?;
        let predicted = artifact.classifier.predict(labeled.features.values())?;

        let report = ClassificationReport::compute(&actual, &predicted, encoder.classes());
        let records = labeled.features.nrows();
        info!(records, accuracy = report.accuracy, "Recommender validated");

        Ok(OperationResult::success(
            "Recommender model validated successfully.",
            RecommenderValidationReport {
                accuracy: format!("{:.4}", report.accuracy),
                info: format!(
                    "Model validated on {} records using features: {}",
                    records,
                    field_list(&artifact.features)
                ),
                classification_report: report,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Report;
    use crate::store::MemoryArtifactStore;
    use chrono::{Duration, TimeZone};

    fn action_for(cpu: f64) -> &'static str {
        if cpu < 30.0 {
            "scale_down"
        } else if cpu < 70.0 {
            "no_action"
        } else {
            "scale_up"
        }
    }

    fn labelled(n: usize, offset: usize) -> Vec<TelemetryRecord> {
        let base = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let t = i + offset;
                let cpu = ((t * 37) % 100) as f64;
                let mut r = TelemetryRecord::at(base + Duration::minutes(t as i64));
                r.cpu_usage = Some(cpu);
                r.memory_usage = Some(((t * 11) % 100) as f64);
                r.v_cpu = Some(if t % 2 == 0 { 2.0 } else { 4.0 });
                r.ram_gb = Some(8.0);
                r.target = Some(action_for(cpu).to_string());
                r
            })
            .collect()
    }

    fn quick() -> Recommender {
        Recommender::new(RecommenderConfig::default().with_n_estimators(20))
    }

    #[test]
    fn test_train_reports_label_encoding() {
        let store = MemoryArtifactStore::new();
        let result = quick().train(&labelled(150, 0), &store).unwrap();

        let Some(Report::RecommenderTraining(report)) = result.report else {
            panic!("expected training report");
        };
        assert_eq!(report.training_records, 150);
        assert_eq!(report.label_encoding["no_action"], 0);
        assert_eq!(report.label_encoding["scale_down"], 1);
        assert_eq!(report.label_encoding["scale_up"], 2);
        assert!(store.exists(ArtifactKey::RecommenderLabels));
    }

    #[test]
    fn test_validate_accuracy_and_report() {
        let store = MemoryArtifactStore::new();
        let recommender = quick();
        recommender.train(&labelled(300, 0), &store).unwrap();

        let result = recommender.validate(&labelled(80, 300), &store).unwrap();
        let Some(Report::RecommenderValidation(report)) = result.report else {
            panic!("expected validation report");
        };
        assert_eq!(report.accuracy, "1.0000");
        assert_eq!(report.classification_report.classes.len(), 3);
        assert!(report.info.starts_with("Model validated on 80 records"));

        let json = serde_json::to_value(&report.classification_report).unwrap();
        assert!(json["scale_up"]["support"].as_u64().unwrap() > 0);
    }

    #[test]
    fn test_unseen_test_label_fails() {
        let store = MemoryArtifactStore::new();
        let recommender = quick();
        recommender.train(&labelled(150, 0), &store).unwrap();

        let mut test = labelled(10, 150);
        test[4].target = Some("migrate".to_string());
        assert!(matches!(
            recommender.validate(&test, &store),
            Err(PipelineError::ModelPredict(_))
        ));
    }

    #[test]
    fn test_missing_encoder_is_not_found() {
        let store = MemoryArtifactStore::new();
        store.save(ArtifactKey::Recommender, b"{}").unwrap();
        match quick().validate(&labelled(10, 0), &store) {
            Err(PipelineError::ArtifactNotFound { location }) => {
                assert!(location.contains(" or "));
                assert!(location.contains("recommender-labels"));
            }
            other => panic!("expected not found, got {:?}", other),
        }
    }

    /// Memory store whose classifier writes fail once armed
    struct FailingModelStore {
        inner: MemoryArtifactStore,
        fail_model_saves: std::sync::atomic::AtomicBool,
    }

    impl ArtifactStore for FailingModelStore {
        fn save(&self, key: ArtifactKey, blob: &[u8]) -> Result<(), crate::store::StoreError> {
            if key == ArtifactKey::Recommender
                && self.fail_model_saves.load(std::sync::atomic::Ordering::SeqCst)
            {
                return Err(crate::store::StoreError::Io {
                    location: self.location(key),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                });
            }
            self.inner.save(key, blob)
        }

        fn load(&self, key: ArtifactKey) -> Result<Option<Vec<u8>>, crate::store::StoreError> {
            self.inner.load(key)
        }

        fn location(&self, key: ArtifactKey) -> String {
            self.inner.location(key)
        }
    }

    #[test]
    fn test_partial_save_leaves_mismatched_pair_rejected() {
        let store = FailingModelStore {
            inner: MemoryArtifactStore::new(),
            fail_model_saves: std::sync::atomic::AtomicBool::new(false),
        };
        let recommender = quick();

        let mut two_classes = labelled(150, 0);
        for r in two_classes.iter_mut() {
            if r.target.as_deref() == Some("scale_down") {
                r.target = Some("no_action".to_string());
            }
        }
        recommender.train(&two_classes, &store).unwrap();

        store
            .fail_model_saves
            .store(true, std::sync::atomic::Ordering::SeqCst);
        assert!(matches!(
            recommender.train(&labelled(150, 0), &store),
            Err(PipelineError::Store(_))
        ));

        match recommender.validate(&two_classes[..20], &store) {
            Err(PipelineError::ModelPredict(message)) => {
                assert!(message.contains("retrain"));
            }
            other => panic!("expected mismatch error, got {:?}", other),
        }
    }

    #[test]
    fn test_insufficient_labelled_rows() {
        let store = MemoryArtifactStore::new();
        let mut records = labelled(120, 0);
        for r in records.iter_mut().step_by(4) {
            r.target = None;
        }
        assert!(matches!(
            quick().train(&records, &store),
            Err(PipelineError::InsufficientData { count: 90, threshold: 100 })
        ));
    }
}
