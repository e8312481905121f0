//! Isolation forest outlier scoring
//!
//! Each tree isolates a random subsample by splitting on a random feature
//! at a random threshold. Points that isolate in few splits score close to
//! 1; typical points score around 0.5 or below.

use crate::error::PipelineError;
use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Expected path length of an unsuccessful BST search over `n` points
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

/// One isolation tree stored as a node arena; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn grow(data: &Array2<f64>, rows: Vec<usize>, height_limit: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow_node(data, rows, 0, height_limit, rng);
        tree
    }

    fn grow_node(
        &mut self,
        data: &Array2<f64>,
        rows: Vec<usize>,
        depth: usize,
        height_limit: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: rows.len() });
        if depth >= height_limit || rows.len() <= 1 {
            return id;
        }

        // Only features that still vary can separate the rows
        let candidates: Vec<(usize, f64, f64)> = (0..data.ncols())
            .filter_map(|feature| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                    let v = data[[r, feature]];
                    (lo.min(v), hi.max(v))
                });
                (hi > lo).then_some((feature, lo, hi))
            })
            .collect();
        if candidates.is_empty() {
            return id;
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = rng.gen_range(lo..hi);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| data[[r, feature]] < threshold);

        let left = self.grow_node(data, left_rows, depth + 1, height_limit, rng);
        let right = self.grow_node(data, right_rows, depth + 1, height_limit, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    /// Splits traversed plus the expected remaining depth of the leaf
    fn path_length(&self, point: ArrayView1<'_, f64>) -> f64 {
        let mut id = 0;
        let mut depth = 0.0;
        loop {
            match self.nodes[id] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if point[feature] < threshold { left } else { right };
                    depth += 1.0;
                }
                Node::Leaf { size } => return depth + average_path_length(size),
            }
        }
    }
}

/// Fitted ensemble of isolation trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    n_features: usize,
}

impl IsolationForest {
    /// Grow `n_estimators` trees, each on `min(max_samples, n)` rows drawn
    /// without replacement
    pub fn fit(
        data: &Array2<f64>,
        n_estimators: usize,
        max_samples: usize,
        seed: u64,
    ) -> Result<Self, PipelineError> {
        let n = data.nrows();
        if n == 0 {
            return Err(PipelineError::ModelFit(
                "isolation forest needs at least one row".to_string(),
            ));
        }
        if n_estimators == 0 || max_samples == 0 {
            return Err(PipelineError::ModelFit(
                "n_estimators and max_samples must be positive".to_string(),
            ));
        }

        let sample_size = max_samples.min(n);
        let height_limit = (sample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(seed);

        let trees = (0..n_estimators)
            .map(|_| {
                let rows = sample(&mut rng, n, sample_size).into_vec();
                IsolationTree::grow(data, rows, height_limit, &mut rng)
            })
            .collect();

        Ok(Self {
            trees,
            sample_size,
            n_features: data.ncols(),
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Anomaly score `2^(-E[h(x)] / c(sample_size))` in (0, 1]
    pub fn score(&self, point: ArrayView1<'_, f64>) -> f64 {
        let normaliser = average_path_length(self.sample_size);
        if normaliser <= 0.0 || self.trees.is_empty() {
            return 0.5;
        }
        let mean_path = self.trees.iter().map(|t| t.path_length(point)).sum::<f64>()
            / self.trees.len() as f64;
        2f64.powf(-mean_path / normaliser)
    }

    pub fn score_samples(&self, data: &Array2<f64>) -> Result<Vec<f64>, PipelineError> {
        if data.ncols() != self.n_features {
            return Err(PipelineError::ModelPredict(format!(
                "forest fit on {} features, got {}",
                self.n_features,
                data.ncols()
            )));
        }
        Ok(data.rows().into_iter().map(|row| self.score(row)).collect())
    }
}

/// Linear-interpolated percentile of `values`, `q` in [0, 1]
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}
