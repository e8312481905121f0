//! Validation metrics
//!
//! Regression metrics skip pairs where either side is non-finite; an empty
//! set of valid pairs yields zero rather than NaN.

use serde::Serialize;
use std::collections::BTreeMap;

/// Error metrics of a regression over real-valued targets
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegressionMetrics {
    pub mae: f64,
    pub rmse: f64,
    /// Mean absolute percentage error in percent, zero actuals excluded
    pub mape: f64,
    /// Pairs that contributed to `mae` and `rmse`
    pub valid_points: usize,
}

impl RegressionMetrics {
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Self {
        let pairs: Vec<(f64, f64)> = actual
            .iter()
            .zip(predicted)
            .map(|(&a, &p)| (a, p))
            .filter(|(a, p)| a.is_finite() && p.is_finite())
            .collect();

        Self {
            mae: mean(pairs.iter().map(|(a, p)| (a - p).abs())),
            rmse: mean(pairs.iter().map(|(a, p)| (a - p).powi(2))).sqrt(),
            mape: mean(
                pairs
                    .iter()
                    .filter(|(a, _)| *a != 0.0)
                    .map(|(a, p)| ((a - p) / a).abs() * 100.0),
            ),
            valid_points: pairs.len(),
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    RegressionMetrics::compute(actual, predicted).mae
}

pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    RegressionMetrics::compute(actual, predicted).rmse
}

/// Fraction of positions where the encoded labels agree
pub fn accuracy(actual: &[usize], predicted: &[usize]) -> f64 {
    let total = actual.len().min(predicted.len());
    if total == 0 {
        return 0.0;
    }
    let correct = actual.iter().zip(predicted).filter(|(a, p)| a == p).count();
    correct as f64 / total as f64
}

/// Precision, recall and F1 for one class (or an average over classes)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    #[serde(rename = "f1-score")]
    pub f1_score: f64,
    pub support: usize,
}

/// Per-class report laid out like scikit-learn's dictionary output:
/// one entry per class name, then `accuracy`, `macro avg` and
/// `weighted avg`. Undefined ratios (zero division) are reported as 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    #[serde(flatten)]
    pub classes: BTreeMap<String, ClassMetrics>,
    pub accuracy: f64,
    #[serde(rename = "macro avg")]
    pub macro_avg: ClassMetrics,
    #[serde(rename = "weighted avg")]
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    /// Build the report for encoded labels; `class_names[i]` names index `i`
    pub fn compute(actual: &[usize], predicted: &[usize], class_names: &[String]) -> Self {
        let n_classes = class_names.len();
        let mut true_positive = vec![0usize; n_classes];
        let mut predicted_count = vec![0usize; n_classes];
        let mut support = vec![0usize; n_classes];

        for (&a, &p) in actual.iter().zip(predicted) {
            if a < n_classes {
                support[a] += 1;
            }
            if p < n_classes {
                predicted_count[p] += 1;
            }
            if a == p && a < n_classes {
                true_positive[a] += 1;
            }
        }

        let per_class: Vec<ClassMetrics> = (0..n_classes)
            .map(|k| {
                let precision = ratio(true_positive[k], predicted_count[k]);
                let recall = ratio(true_positive[k], support[k]);
                let f1_score = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    precision,
                    recall,
                    f1_score,
                    support: support[k],
                }
            })
            .collect();

        let total_support: usize = support.iter().sum();
        let macro_avg = average(&per_class, |_| 1.0, n_classes as f64, total_support);
        let weighted_avg = average(
            &per_class,
            |m| m.support as f64,
            total_support as f64,
            total_support,
        );

        Self {
            classes: class_names.iter().cloned().zip(per_class).collect(),
            accuracy: accuracy(actual, predicted),
            macro_avg,
            weighted_avg,
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn average(
    per_class: &[ClassMetrics],
    weight: impl Fn(&ClassMetrics) -> f64,
    total_weight: f64,
    support: usize,
) -> ClassMetrics {
    if total_weight == 0.0 {
        return ClassMetrics {
            precision: 0.0,
            recall: 0.0,
            f1_score: 0.0,
            support,
        };
    }
    let weighted = |value: fn(&ClassMetrics) -> f64| {
        per_class.iter().map(|m| weight(m) * value(m)).sum::<f64>() / total_weight
    };
    ClassMetrics {
        precision: weighted(|m| m.precision),
        recall: weighted(|m| m.recall),
        f1_score: weighted(|m| m.f1_score),
        support,
    }
}
