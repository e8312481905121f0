//! Sliding windows over scaled feature rows for sequence forecasting

use crate::error::PipelineError;
use ndarray::{s, Array1, Array2};

/// Number of past rows fed to the forecaster for each prediction
pub const SEQUENCE_LENGTH: usize = 24;

/// Flattened input windows and their next-step targets
#[derive(Debug, Clone)]
pub struct Windows {
    /// One row per window: `window * n_features` values, oldest row first
    pub inputs: Array2<f64>,
    pub targets: Array1<f64>,
    /// Matrix row whose target value each window predicts
    pub target_rows: Vec<usize>,
}

impl Windows {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Builds overlapping fixed-length windows
#[derive(Debug, Clone, Copy)]
pub struct SequenceWindower {
    window: usize,
    target_column: usize,
}

impl SequenceWindower {
    pub fn new(window: usize, target_column: usize) -> Self {
        Self {
            window,
            target_column,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// For each `i` in `[window, n)`, input is rows `[i - window, i)` and the
    /// target is the target column at row `i`.
    ///
    /// `n <= window` is an error rather than an empty result.
    pub fn build(&self, scaled: &Array2<f64>) -> Result<Windows, PipelineError> {
        let n = scaled.nrows();
        let n_features = scaled.ncols();

        if self.window == 0 {
            return Err(PipelineError::ModelFit(
                "window length must be positive".to_string(),
            ));
        }
        if self.target_column >= n_features {
            return Err(PipelineError::ModelFit(format!(
                "target column {} out of range for {} features",
                self.target_column, n_features
            )));
        }
        if n <= self.window {
            return Err(PipelineError::DegenerateWindow {
                rows: n,
                window: self.window,
            });
        }

        let count = n - self.window;
        let mut flat = Vec::with_capacity(count * self.window * n_features);
        let mut targets = Vec::with_capacity(count);
        let mut target_rows = Vec::with_capacity(count);

        for i in self.window..n {
            for row in scaled.slice(s![i - self.window..i, ..]).rows() {
                flat.extend(row.iter().copied());
            }
            targets.push(scaled[[i, self.target_column]]);
            target_rows.push(i);
        }

        Ok(Windows {
            inputs: Array2::from_shape_vec((count, self.window * n_features), flat)?,
            targets: Array1::from(targets),
            target_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize, features: usize) -> Array2<f64> {
        Array2::from_shape_fn((n, features), |(i, j)| (i * 10 + j) as f64)
    }

    #[test]
    fn test_window_count_is_n_minus_l() {
        let windower = SequenceWindower::new(24, 0);
        for n in [25, 26, 50, 200] {
            let windows = windower.build(&ramp(n, 3)).unwrap();
            assert_eq!(windows.len(), n - 24);
            assert_eq!(windows.inputs.dim(), (n - 24, 24 * 3));
        }
    }

    #[test]
    fn test_degenerate_when_rows_do_not_exceed_window() {
        let windower = SequenceWindower::new(24, 0);
        for n in [0, 1, 23, 24] {
            match windower.build(&ramp(n, 3)) {
                Err(PipelineError::DegenerateWindow { rows, window }) => {
                    assert_eq!(rows, n);
                    assert_eq!(window, 24);
                }
                other => panic!("expected degenerate window, got {:?}", other.map(|w| w.len())),
            }
        }
    }

    #[test]
    fn test_window_contents_and_target() {
        let data = ramp(6, 2);
        let windows = SequenceWindower::new(3, 1).build(&data).unwrap();

        assert_eq!(windows.len(), 3);
        // First window: rows 0..3, target = row 3 column 1
        assert_eq!(
            windows.inputs.row(0).to_vec(),
            vec![0.0, 1.0, 10.0, 11.0, 20.0, 21.0]
        );
        assert_eq!(windows.targets[0], 31.0);
        assert_eq!(windows.target_rows, vec![3, 4, 5]);
        assert_eq!(windows.targets[2], 51.0);
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(SequenceWindower::new(0, 0).build(&ramp(5, 1)).is_err());
        assert!(SequenceWindower::new(2, 4).build(&ramp(5, 1)).is_err());
    }
}
