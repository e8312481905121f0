//! Time-ordered train/test split

use crate::error::PipelineError;
use crate::models::TelemetryRecord;
use tracing::debug;

/// Share of the sorted dataset used for training
pub const TRAIN_FRACTION: f64 = 0.8;

/// Leading training segment and trailing test segment of one snapshot
#[derive(Debug, Clone)]
pub struct Split {
    pub train: Vec<TelemetryRecord>,
    pub test: Vec<TelemetryRecord>,
}

/// Sorts records by timestamp and cuts them at a single index.
///
/// No shuffling: every training record is at or before every test record.
#[derive(Debug, Clone, Copy)]
pub struct TimeOrderedSplitter {
    train_fraction: f64,
}

impl TimeOrderedSplitter {
    pub fn new() -> Self {
        Self {
            train_fraction: TRAIN_FRACTION,
        }
    }

    pub fn with_fraction(train_fraction: f64) -> Self {
        Self {
            train_fraction: train_fraction.clamp(0.0, 1.0),
        }
    }

    /// `floor(fraction * n)`
    pub fn split_index(&self, n: usize) -> usize {
        ((n as f64 * self.train_fraction).floor() as usize).min(n)
    }

    /// Sort (stable on equal timestamps) and partition the snapshot
    pub fn split(&self, mut records: Vec<TelemetryRecord>) -> Result<Split, PipelineError> {
        if records.is_empty() {
            return Err(PipelineError::EmptyDataset);
        }

        records.sort_by_key(|r| r.timestamp);
        let split_index = self.split_index(records.len());
        let test = records.split_off(split_index);

        debug!(
            train = records.len(),
            test = test.len(),
            "Data split into training and test records"
        );

        Ok(Split {
            train: records,
            test,
        })
    }
}

impl Default for TimeOrderedSplitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    fn records(n: usize) -> Vec<TelemetryRecord> {
        let base = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let mut r = TelemetryRecord::at(base + Duration::minutes(i as i64));
                r.cost = Some(i as f64);
                r
            })
            .collect()
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let splitter = TimeOrderedSplitter::new();
        assert!(matches!(
            splitter.split(Vec::new()),
            Err(PipelineError::EmptyDataset)
        ));
    }

    #[test]
    fn test_split_sizes_and_ordering() {
        let splitter = TimeOrderedSplitter::new();
        let mut rng = StdRng::seed_from_u64(7);

        for n in 1..=250 {
            let mut shuffled = records(n);
            shuffled.shuffle(&mut rng);

            let split = splitter.split(shuffled).unwrap();
            assert_eq!(split.train.len() + split.test.len(), n);
            assert_eq!(split.train.len(), n * 4 / 5, "n = {}", n);

            let train_max = split.train.iter().map(|r| r.timestamp).max();
            let test_min = split.test.iter().map(|r| r.timestamp).min();
            if let (Some(train_max), Some(test_min)) = (train_max, test_min) {
                assert!(train_max <= test_min);
            }
            assert!(split
                .train
                .iter()
                .chain(split.test.iter())
                .collect::<Vec<_>>()
                .windows(2)
                .all(|w| w[0].timestamp <= w[1].timestamp));
        }
    }

    #[test]
    fn test_equal_timestamps_keep_retrieval_order() {
        let ts = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let input: Vec<TelemetryRecord> = (0..10)
            .map(|i| {
                let mut r = TelemetryRecord::at(ts);
                r.cost = Some(i as f64);
                r
            })
            .collect();

        let split = TimeOrderedSplitter::new().split(input).unwrap();
        let costs: Vec<f64> = split
            .train
            .iter()
            .chain(split.test.iter())
            .filter_map(|r| r.cost)
            .collect();
        assert_eq!(costs, (0..10).map(|i| i as f64).collect::<Vec<_>>());
        assert_eq!(split.train.len(), 8);
    }

    #[test]
    fn test_single_record_goes_to_test() {
        let split = TimeOrderedSplitter::new().split(records(1)).unwrap();
        assert!(split.train.is_empty());
        assert_eq!(split.test.len(), 1);
    }
}
