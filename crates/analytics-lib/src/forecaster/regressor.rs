//! Linear next-step regressor over flattened input windows

use super::ForecastConfig;
use crate::error::PipelineError;
use ndarray::{s, Array1, Array2, Axis, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-7;

/// `y = w . x + b` where `x` is one flattened window of scaled rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowRegressor {
    weights: Array1<f64>,
    bias: f64,
}

impl WindowRegressor {
    /// Minimise mean squared error with Adam over shuffled minibatches.
    ///
    /// Returns the model and its loss over all windows after the last epoch.
    pub fn fit(
        inputs: &Array2<f64>,
        targets: &Array1<f64>,
        config: &ForecastConfig,
    ) -> Result<(Self, f64), PipelineError> {
        let (n, d) = inputs.dim();
        if n == 0 || n != targets.len() {
            return Err(PipelineError::ModelFit(format!(
                "regressor needs matching non-empty inputs and targets, got {} and {}",
                n,
                targets.len()
            )));
        }
        if config.batch_size == 0 {
            return Err(PipelineError::ModelFit("batch size must be positive".to_string()));
        }

        // Trailing slot holds the bias
        let mut params = Array1::<f64>::zeros(d + 1);
        params[d] = targets.mean().unwrap_or(0.0);

        let mut optimizer = Adam::new(d + 1, config.learning_rate, config.clip_norm);
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut order: Vec<usize> = (0..n).collect();

        for epoch in 0..config.epochs {
            order.shuffle(&mut rng);
            for batch in order.chunks(config.batch_size) {
                let x = inputs.select(Axis(0), batch);
                let y = targets.select(Axis(0), batch);
                let residual = x.dot(&params.slice(s![..d])) + params[d] - &y;

                let scale = 2.0 / batch.len() as f64;
                let mut grad = Array1::<f64>::zeros(d + 1);
                grad.slice_mut(s![..d]).assign(&(x.t().dot(&residual) * scale));
                grad[d] = residual.sum() * scale;

                optimizer.step(&mut params, grad);
            }

            if epoch % 10 == 0 {
                debug!(epoch, loss = mse(inputs, targets, &params), "Forecaster epoch");
            }
        }

        let loss = mse(inputs, targets, &params);
        if !loss.is_finite() {
            return Err(PipelineError::ModelFit(
                "forecaster training diverged".to_string(),
            ));
        }

        Ok((
            Self {
                weights: params.slice(s![..d]).to_owned(),
                bias: params[d],
            },
            loss,
        ))
    }

    pub fn input_width(&self) -> usize {
        self.weights.len()
    }

    pub fn predict(&self, inputs: &Array2<f64>) -> Result<Array1<f64>, PipelineError> {
        if inputs.ncols() != self.input_width() {
            return Err(PipelineError::ModelPredict(format!(
                "regressor expects windows of width {}, got {}",
                self.input_width(),
                inputs.ncols()
            )));
        }
        Ok(inputs.dot(&self.weights) + self.bias)
    }
}

fn mse(inputs: &Array2<f64>, targets: &Array1<f64>, params: &Array1<f64>) -> f64 {
    let d = inputs.ncols();
    let residual = inputs.dot(&params.slice(s![..d])) + params[d] - targets;
    residual.mapv(|r| r * r).mean().unwrap_or(0.0)
}

/// Adam with global gradient-norm clipping
struct Adam {
    learning_rate: f64,
    clip_norm: f64,
    m: Array1<f64>,
    v: Array1<f64>,
    t: i32,
}

impl Adam {
    fn new(size: usize, learning_rate: f64, clip_norm: f64) -> Self {
        Self {
            learning_rate,
            clip_norm,
            m: Array1::zeros(size),
            v: Array1::zeros(size),
            t: 0,
        }
    }

    fn step(&mut self, params: &mut Array1<f64>, mut grad: Array1<f64>) {
        let norm = grad.dot(&grad).sqrt();
        if self.clip_norm > 0.0 && norm > self.clip_norm {
            let factor = self.clip_norm / norm;
            grad.mapv_inplace(|g| g * factor);
        }

        self.t += 1;
        self.m
            .zip_mut_with(&grad, |m, &g| *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g);
        self.v
            .zip_mut_with(&grad, |v, &g| *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g);

        let m_correction = 1.0 - ADAM_BETA1.powi(self.t);
        let v_correction = 1.0 - ADAM_BETA2.powi(self.t);
        let lr = self.learning_rate;
        Zip::from(params)
            .and(&self.m)
            .and(&self.v)
            .for_each(|p, &m, &v| {
                *p -= lr * (m / m_correction) / ((v / v_correction).sqrt() + ADAM_EPSILON);
            });
    }
}
