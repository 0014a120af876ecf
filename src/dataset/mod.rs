//! Trial discovery and merging across the three sensor modalities.
//!
//! Each modality lives in its own directory tree with identical
//! `<activity>/<trial>.csv` layout. A trial is only usable when all three
//! trees carry the same relative path.

pub mod merge;

pub use merge::{
    load_trial, merge_modalities, DatasetError, LabelSource, MergeSummary, MergedTable, Modality,
    Trial, TrialSpan,
};
