//! Data preparation shared by every model
//!
//! The stages run in a fixed order for each train/validate call:
//! time-ordered split, feature selection with missing-value cleaning, and
//! then model-specific preparation (min-max scaling and sequence windowing
//! for the forecaster, label encoding for the recommender).

mod encoder;
mod features;
mod scaler;
mod split;
mod window;

pub use encoder::LabelEncoder;
pub use features::{FeatureMatrix, FeatureSelector, LabeledMatrix};
pub use scaler::MinMaxScaler;
pub use split::{Split, TimeOrderedSplitter, TRAIN_FRACTION};
pub use window::{SequenceWindower, Windows, SEQUENCE_LENGTH};
