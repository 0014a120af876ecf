//! Training and evaluation of the activity classifier.
//!
//! - Batch assembly on a loader thread
//! - The epoch loop with Adam and gradient clipping
//! - Loss/accuracy bookkeeping per epoch

pub mod batcher;
pub mod clipping;
pub mod metrics;
pub mod trainer;

pub use batcher::{BatchLoader, BatchStream, DatasetShapeError, HostBatch, WindowDataset};
pub use clipping::{clip_global_norm, global_grad_norm};
pub use metrics::{EpochMetrics, PassAccumulator, PassMetrics, TrainingHistory};
pub use trainer::{TrainError, Trainer, TrainerConfig, TrainingOutcome};
