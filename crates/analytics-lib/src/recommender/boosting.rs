//! Gradient-boosted trees for multi-class classification
//!
//! Softmax boosting: every round fits one least-squares regression tree per
//! class to the residuals `y_k - p_k` and takes a Newton step in each leaf.

use crate::error::PipelineError;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

const MIN_HESSIAN: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// Regression tree stored as a node arena rooted at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

/// Per-round fitting inputs shared by every node of one tree
struct TreeFit<'a> {
    data: &'a Array2<f64>,
    residuals: &'a [f64],
    hessians: &'a [f64],
    max_depth: usize,
    leaf_scale: f64,
}

impl RegressionTree {
    fn fit(fit: &TreeFit<'_>) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        let rows: Vec<usize> = (0..fit.data.nrows()).collect();
        tree.grow(fit, rows, 0);
        tree
    }

    fn grow(&mut self, fit: &TreeFit<'_>, rows: Vec<usize>, depth: usize) -> usize {
        let id = self.nodes.len();
        self.nodes.push(TreeNode::Leaf {
            value: leaf_value(fit, &rows),
        });

        if depth >= fit.max_depth || rows.len() < 2 {
            return id;
        }
        let Some((feature, threshold)) = best_split(fit, &rows) else {
            return id;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| fit.data[[r, feature]] <= threshold);
        let left = self.grow(fit, left_rows, depth + 1);
        let right = self.grow(fit, right_rows, depth + 1);
        self.nodes[id] = TreeNode::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    pub fn predict(&self, point: ArrayView1<'_, f64>) -> f64 {
        let mut id = 0;
        loop {
            match self.nodes[id] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => id = if point[feature] <= threshold { left } else { right },
                TreeNode::Leaf { value } => return value,
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], id: usize) -> usize {
            match nodes[id] {
                TreeNode::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
                TreeNode::Leaf { .. } => 0,
            }
        }
        walk(&self.nodes, 0)
    }
}

/// One Newton step for the multinomial deviance
fn leaf_value(fit: &TreeFit<'_>, rows: &[usize]) -> f64 {
    let numerator: f64 = rows.iter().map(|&r| fit.residuals[r]).sum();
    let denominator: f64 = rows.iter().map(|&r| fit.hessians[r]).sum();
    if denominator.abs() < MIN_HESSIAN {
        0.0
    } else {
        fit.leaf_scale * numerator / denominator
    }
}

/// Split maximising the reduction in squared error of the residuals
fn best_split(fit: &TreeFit<'_>, rows: &[usize]) -> Option<(usize, f64)> {
    let n = rows.len() as f64;
    let total: f64 = rows.iter().map(|&r| fit.residuals[r]).sum();
    let parent_score = total * total / n;

    let mut best: Option<(usize, f64, f64)> = None;
    let mut sorted = rows.to_vec();

    for feature in 0..fit.data.ncols() {
        sorted.sort_by(|&a, &b| fit.data[[a, feature]].total_cmp(&fit.data[[b, feature]]));

        let mut left_sum = 0.0;
        for i in 0..sorted.len() - 1 {
            left_sum += fit.residuals[sorted[i]];
            let here = fit.data[[sorted[i], feature]];
            let next = fit.data[[sorted[i + 1], feature]];
            if here == next {
                continue;
            }

            let left_n = (i + 1) as f64;
            let right_n = n - left_n;
            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / left_n + right_sum * right_sum / right_n - parent_score;

            if gain > 1e-12 && best.map_or(true, |(_, _, g)| gain > g) {
                best = Some((feature, here + (next - here) / 2.0, gain));
            }
        }
    }

    best.map(|(feature, threshold, _)| (feature, threshold))
}

/// Hyperparameters of the boosted ensemble
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
}

/// Fitted softmax ensemble; `stages[m][k]` is round `m`'s tree for class `k`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedClassifier {
    n_classes: usize,
    n_features: usize,
    learning_rate: f64,
    initial_scores: Vec<f64>,
    stages: Vec<Vec<RegressionTree>>,
}

impl GradientBoostedClassifier {
    /// Fit on encoded labels in `0..n_classes`
    pub fn fit(
        data: &Array2<f64>,
        labels: &[usize],
        n_classes: usize,
        params: BoostingParams,
    ) -> Result<Self, PipelineError> {
        let n = data.nrows();
        if n == 0 || n != labels.len() {
            return Err(PipelineError::ModelFit(format!(
                "classifier needs matching non-empty features and labels, got {} and {}",
                n,
                labels.len()
            )));
        }
        if n_classes == 0 || labels.iter().any(|&y| y >= n_classes) {
            return Err(PipelineError::ModelFit(format!(
                "labels must be encoded in 0..{}",
                n_classes
            )));
        }

        let mut counts = vec![0usize; n_classes];
        for &y in labels {
            counts[y] += 1;
        }
        let initial_scores: Vec<f64> = counts
            .iter()
            .map(|&c| ((c.max(1)) as f64 / n as f64).ln())
            .collect();

        let mut model = Self {
            n_classes,
            n_features: data.ncols(),
            learning_rate: params.learning_rate,
            initial_scores,
            stages: Vec::with_capacity(params.n_estimators),
        };

        // A single class needs no trees
        if n_classes == 1 {
            return Ok(model);
        }

        let mut raw = Array2::<f64>::zeros((n, n_classes));
        for mut row in raw.rows_mut() {
            row.iter_mut()
                .zip(&model.initial_scores)
                .for_each(|(r, &s)| *r = s);
        }

        let leaf_scale = (n_classes - 1) as f64 / n_classes as f64;
        let mut residuals = vec![0.0; n];
        let mut hessians = vec![0.0; n];

        for _ in 0..params.n_estimators {
            let probabilities = softmax_rows(&raw);
            let mut stage = Vec::with_capacity(n_classes);

            for k in 0..n_classes {
                for i in 0..n {
                    let p = probabilities[[i, k]];
                    let y = if labels[i] == k { 1.0 } else { 0.0 };
                    residuals[i] = y - p;
                    hessians[i] = p * (1.0 - p);
                }

                let tree = RegressionTree::fit(&TreeFit {
                    data,
                    residuals: &residuals,
                    hessians: &hessians,
                    max_depth: params.max_depth,
                    leaf_scale,
                });
                for (i, point) in data.rows().into_iter().enumerate() {
                    raw[[i, k]] += params.learning_rate * tree.predict(point);
                }
                stage.push(tree);
            }
            model.stages.push(stage);
        }

        Ok(model)
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn predict_proba(&self, data: &Array2<f64>) -> Result<Array2<f64>, PipelineError> {
        if data.ncols() != self.n_features {
            return Err(PipelineError::ModelPredict(format!(
                "classifier fit on {} features, got {}",
                self.n_features,
                data.ncols()
            )));
        }

        let mut raw = Array2::<f64>::zeros((data.nrows(), self.n_classes));
        for (i, point) in data.rows().into_iter().enumerate() {
            for k in 0..self.n_classes {
                raw[[i, k]] = self.initial_scores[k]
                    + self
                        .stages
                        .iter()
                        .map(|stage| self.learning_rate * stage[k].predict(point))
                        .sum::<f64>();
            }
        }
        Ok(softmax_rows(&raw))
    }

    /// Most probable class per row
    pub fn predict(&self, data: &Array2<f64>) -> Result<Vec<usize>, PipelineError> {
        let probabilities = self.predict_proba(data)?;
        Ok(probabilities
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |(best, best_p), (k, &p)| {
                        if p > best_p {
                            (k, p)
                        } else {
                            (best, best_p)
                        }
                    })
                    .0
            })
            .collect())
    }
}

fn softmax_rows(raw: &Array2<f64>) -> Array2<f64> {
    let mut out = raw.clone();
    for mut row in out.rows_mut() {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn params() -> BoostingParams {
        BoostingParams {
            n_estimators: 30,
            learning_rate: 0.1,
            max_depth: 3,
        }
    }

    /// Class is decided by which band the first feature falls in
    fn banded(n: usize) -> (Array2<f64>, Vec<usize>) {
        let data = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 {
                (i % 90) as f64
            } else {
                ((i * 13) % 7) as f64
            }
        });
        let labels = (0..n).map(|i| (i % 90) / 30).collect();
        (data, labels)
    }

    #[test]
    fn test_learns_separable_classes() {
        let (data, labels) = banded(270);
        let model = GradientBoostedClassifier::fit(&data, &labels, 3, params()).unwrap();
        assert_eq!(model.n_stages(), 30);

        let predicted = model.predict(&data).unwrap();
        assert_eq!(predicted, labels);

        let unseen = model.predict(&array![[5.0, 1.0], [45.0, 2.0], [88.0, 0.0]]).unwrap();
        assert_eq!(unseen, vec![0, 1, 2]);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (data, labels) = banded(90);
        let model = GradientBoostedClassifier::fit(&data, &labels, 3, params()).unwrap();
        let proba = model.predict_proba(&data).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_single_class_predicts_it() {
        let data = array![[1.0, 2.0], [3.0, 4.0]];
        let model = GradientBoostedClassifier::fit(&data, &[0, 0], 1, params()).unwrap();
        assert_eq!(model.predict(&data).unwrap(), vec![0, 0]);
        assert_eq!(model.n_stages(), 0);
    }

    #[test]
    fn test_tree_depth_is_bounded() {
        let (data, labels) = banded(270);
        let model = GradientBoostedClassifier::fit(&data, &labels, 3, params()).unwrap();
        assert!(model
            .stages
            .iter()
            .flatten()
            .all(|tree| tree.depth() <= 3));
    }

    #[test]
    fn test_rejects_out_of_range_labels() {
        let data = array![[1.0], [2.0]];
        assert!(GradientBoostedClassifier::fit(&data, &[0, 2], 2, params()).is_err());
    }
}
