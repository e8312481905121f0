//! String label encoding for the scaling-action classifier

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Keys the classification report uses for its summary entries
pub const RESERVED_LABELS: [&str; 3] = ["accuracy", "macro avg", "weighted avg"];

/// Maps class labels to dense indices in sorted label order.
///
/// Persisted as its own artifact next to the classifier so validation
/// decodes with exactly the classes seen during training.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Learn the sorted set of distinct labels
    pub fn fit<S: AsRef<str>>(labels: &[S]) -> Result<Self, PipelineError> {
        let classes: BTreeSet<&str> = labels.iter().map(|label| label.as_ref()).collect();
        if classes.is_empty() {
            return Err(PipelineError::ModelFit(
                "cannot fit label encoder without labels".to_string(),
            ));
        }
        if let Some(reserved) = classes.iter().find(|c| RESERVED_LABELS.contains(c)) {
            return Err(PipelineError::ModelFit(format!(
                "label '{}' collides with a classification report key",
                reserved
            )));
        }
        Ok(Self {
            classes: classes.into_iter().map(str::to_string).collect(),
        })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Encode labels; any label unseen at fit time is an error
    pub fn transform<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>, PipelineError> {
        let mut unseen = BTreeSet::new();
        let encoded: Vec<usize> = labels
            .iter()
            .filter_map(|label| {
                let label = label.as_ref();
                match self.classes.binary_search_by(|c| c.as_str().cmp(label)) {
                    Ok(idx) => Some(idx),
                    Err(_) => {
                        unseen.insert(label.to_string());
                        None
                    }
                }
            })
            .collect();

        if !unseen.is_empty() {
            let unseen: Vec<String> = unseen.into_iter().collect();
            return Err(PipelineError::ModelPredict(format!(
                "y contains previously unseen labels: {:?}",
                unseen
            )));
        }
        Ok(encoded)
    }

    pub fn inverse(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }

    /// `{label: index}` for reporting
    pub fn mapping(&self) -> BTreeMap<String, usize> {
        self.classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes_are_sorted_and_unique() {
        let encoder = LabelEncoder::fit(&["scale_up", "no_action", "scale_down", "scale_up"]).unwrap();
        assert_eq!(encoder.classes(), &["no_action", "scale_down", "scale_up"]);
        assert_eq!(
            encoder.transform(&["scale_up", "no_action"]).unwrap(),
            vec![2, 0]
        );
        assert_eq!(encoder.inverse(1), Some("scale_down"));
        assert_eq!(encoder.mapping().get("scale_up"), Some(&2));
    }

    #[test]
    fn test_unseen_label_rejected() {
        let encoder = LabelEncoder::fit(&["a", "b"]).unwrap();
        let err = encoder.transform(&["a", "c"]).unwrap_err();
        assert!(matches!(err, PipelineError::ModelPredict(_)));
        assert!(err.to_string().contains("\"c\""));
    }

    #[test]
    fn test_report_keys_rejected_as_labels() {
        for reserved in RESERVED_LABELS {
            match LabelEncoder::fit(&["scale_up", reserved]) {
                Err(PipelineError::ModelFit(message)) => assert!(message.contains(reserved)),
                other => panic!("expected fit error, got {:?}", other),
            }
        }
        assert!(LabelEncoder::fit(&["Accuracy"]).is_ok());
    }

    #[test]
    fn test_empty_fit_rejected() {
        let empty: [&str; 0] = [];
        assert!(LabelEncoder::fit(&empty).is_err());
    }
}
