//! Evaluation reports: classification scores, confusion matrix and the
//! persisted run record.

pub mod classification;
pub mod run;

pub use classification::{ClassScores, ClassificationReport, ConfusionMatrix};
pub use run::{sample_predictions, RunReport, SamplePrediction, SAMPLE_PREDICTIONS};
