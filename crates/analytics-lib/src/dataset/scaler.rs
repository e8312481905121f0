//! Per-column min-max scaling into [0, 1]

use crate::error::PipelineError;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Min-max scaler fit once on the training partition.
///
/// The fitted bounds travel with the forecaster artifact so validation
/// scales test data with training statistics only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: Vec<f64>,
    /// `max - min`, with zero ranges replaced by 1
    range: Vec<f64>,
}

impl MinMaxScaler {
    /// Learn per-column bounds
    pub fn fit(data: &Array2<f64>) -> Result<Self, PipelineError> {
        if data.nrows() == 0 {
            return Err(PipelineError::ModelFit(
                "cannot fit scaler on an empty matrix".to_string(),
            ));
        }

        let mut min = Vec::with_capacity(data.ncols());
        let mut range = Vec::with_capacity(data.ncols());
        for column in data.axis_iter(Axis(1)) {
            let lo = column.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let span = hi - lo;
            min.push(lo);
            range.push(if span > 0.0 { span } else { 1.0 });
        }

        Ok(Self { min, range })
    }

    pub fn n_features(&self) -> usize {
        self.min.len()
    }

    /// Scale a matrix with the fitted bounds
    pub fn transform(&self, data: &Array2<f64>) -> Result<Array2<f64>, PipelineError> {
        if data.ncols() != self.n_features() {
            return Err(PipelineError::ModelPredict(format!(
                "scaler fit on {} features, got {}",
                self.n_features(),
                data.ncols()
            )));
        }

        let mut scaled = data.clone();
        for (j, mut column) in scaled.axis_iter_mut(Axis(1)).enumerate() {
            let (lo, span) = (self.min[j], self.range[j]);
            column.mapv_inplace(|x| (x - lo) / span);
        }
        Ok(scaled)
    }

    pub fn transform_value(&self, column: usize, value: f64) -> f64 {
        (value - self.min[column]) / self.range[column]
    }

    /// Map a scaled value of one column back to its real value
    pub fn inverse_value(&self, column: usize, scaled: f64) -> f64 {
        scaled * self.range[column] + self.min[column]
    }
}
