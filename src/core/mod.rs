//! Core preprocessing for Synheart Activity.
//!
//! This module contains:
//! - Windowing of merged trials into fixed-length samples
//! - Per-feature z-score normalization
//! - Activity label encoding
//! - Stratified train/test splitting

pub mod encoding;
pub mod normalize;
pub mod split;
pub mod windowing;

// Re-export commonly used types
pub use encoding::{EncodingError, LabelEncoder};
pub use normalize::FeatureScaler;
pub use split::{stratified_split, SplitError, SplitIndices};
pub use windowing::{window_table, WindowConfig, WindowError, WindowOrigin, WindowSet};
