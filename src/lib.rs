//! Synheart Activity - human activity recognition from phone motion sensors.
//!
//! This library merges per-trial recordings from three sensor modalities
//! (device motion, accelerometer, gyroscope), cuts them into fixed-length
//! windows and trains a convolutional + recurrent classifier on them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Synheart Activity                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Dataset   │──▶│  Windowing  │──▶│ Normalize + │       │
//! │  │   (merge)   │   │ (W rows, S) │   │   Encode    │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │                                             │               │
//! │                                             ▼               │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Report    │◀──│   Trainer   │◀──│ Stratified  │       │
//! │  │ (F1, conf.) │   │ (CNN+LSTM)  │   │   Split     │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use burn::backend::{Autodiff, NdArray};
//! use synheart_activity::{Config, Pipeline};
//!
//! let pipeline = Pipeline::new(Config::default()).expect("invalid config");
//! let data = pipeline.prepare().expect("failed to prepare data");
//! let report = pipeline
//!     .train::<Autodiff<NdArray>, _>(&data, Default::default(), None, |m| println!("{m}"))
//!     .expect("training failed");
//! println!("{}", report.report.render());
//! ```

pub mod config;
pub mod core;
pub mod dataset;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod training;

// Re-export key types at crate root for convenience
pub use config::{Config, DeviceKind, SourceConfig};
pub use core::{FeatureScaler, LabelEncoder, WindowConfig, WindowSet};
pub use dataset::{merge_modalities, LabelSource, MergeSummary, MergedTable, Modality};
pub use model::{ActivityNet, ActivityNetConfig};
pub use pipeline::{Pipeline, PipelineError, PreparedData};
pub use report::{ClassificationReport, ConfusionMatrix, RunReport};
pub use training::{EpochMetrics, Trainer, TrainerConfig, TrainingHistory, WindowDataset};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
