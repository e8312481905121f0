//! Feature selection and missing-value cleaning

use crate::error::PipelineError;
use crate::models::{field_list, Field, TelemetryRecord};
use crate::observability::AnalyticsMetrics;
use ndarray::{Array2, ArrayView1};
use tracing::warn;

/// Cleaned feature rows with a map back to the records they came from
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    columns: Vec<Field>,
    values: Array2<f64>,
    row_index: Vec<usize>,
    dropped: usize,
}

impl FeatureMatrix {
    pub fn columns(&self) -> &[Field] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Position of each cleaned row in the input partition
    pub fn row_index(&self) -> &[usize] {
        &self.row_index
    }

    /// Input-partition position of cleaned row `row`
    pub fn source_row(&self, row: usize) -> Option<usize> {
        self.row_index.get(row).copied()
    }

    pub fn row(&self, row: usize) -> ArrayView1<'_, f64> {
        self.values.row(row)
    }

    pub fn column_position(&self, field: Field) -> Option<usize> {
        self.columns.iter().position(|&c| c == field)
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.row_index.is_empty()
    }

    /// Rows removed because a selected value was missing
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

/// Feature matrix plus the jointly cleaned label column
#[derive(Debug, Clone)]
pub struct LabeledMatrix {
    pub features: FeatureMatrix,
    pub labels: Vec<String>,
}

/// Selects named numeric columns and drops incomplete rows.
///
/// A row is dropped when any selected column is missing; there is no
/// per-field imputation.
#[derive(Debug, Clone)]
pub struct FeatureSelector {
    fields: Vec<Field>,
    min_rows: usize,
}

impl FeatureSelector {
    pub fn new(fields: &[Field], min_rows: usize) -> Self {
        Self {
            fields: fields.to_vec(),
            min_rows,
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Clean over the selected feature columns
    pub fn select(&self, records: &[TelemetryRecord]) -> Result<FeatureMatrix, PipelineError> {
        let rows = records
            .iter()
            .enumerate()
            .filter_map(|(i, record)| self.feature_row(record).map(|row| (i, row)));
        let (matrix, _) = self.assemble(records.len(), rows.map(|(i, row)| (i, row, ())))?;
        Ok(matrix)
    }

    /// Clean over the feature columns together with the label column.
    ///
    /// A row missing either a feature or its label is dropped.
    pub fn select_labeled(
        &self,
        records: &[TelemetryRecord],
    ) -> Result<LabeledMatrix, PipelineError> {
        let rows = records.iter().enumerate().filter_map(|(i, record)| {
            let label = record.label()?;
            self.feature_row(record)
                .map(|row| (i, row, label.to_string()))
        });
        let (features, labels) = self.assemble(records.len(), rows)?;
        Ok(LabeledMatrix { features, labels })
    }

    fn feature_row(&self, record: &TelemetryRecord) -> Option<Vec<f64>> {
        self.fields
            .iter()
            .map(|&field| record.numeric(field))
            .collect()
    }

    fn assemble<T>(
        &self,
        initial_count: usize,
        rows: impl Iterator<Item = (usize, Vec<f64>, T)>,
    ) -> Result<(FeatureMatrix, Vec<T>), PipelineError> {
        let mut flat = Vec::with_capacity(initial_count * self.fields.len());
        let mut row_index = Vec::with_capacity(initial_count);
        let mut extras = Vec::with_capacity(initial_count);

        for (i, row, extra) in rows {
            flat.extend(row);
            row_index.push(i);
            extras.push(extra);
        }

        let final_count = row_index.len();
        let dropped = initial_count - final_count;
        if dropped > 0 {
            warn!(
                event = "rows_dropped",
                dropped = dropped,
                initial_count = initial_count,
                final_count = final_count,
                fields = %field_list(&self.fields),
                "Dropped rows with missing values"
            );
            AnalyticsMetrics::new().add_rows_dropped(dropped as u64);
        }

        if final_count < self.min_rows {
            return Err(PipelineError::InsufficientData {
                count: final_count,
                threshold: self.min_rows,
            });
        }

        let values = Array2::from_shape_vec((final_count, self.fields.len()), flat)?;
        Ok((
            FeatureMatrix {
                columns: self.fields.clone(),
                values,
                row_index,
                dropped,
            },
            extras,
        ))
    }
}
