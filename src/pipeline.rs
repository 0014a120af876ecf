//! End-to-end pipeline: merge -> window -> encode -> normalize -> split ->
//! train -> report.
//!
//! Every stage takes the previous stage's artifact and the shared [`Config`];
//! nothing is kept between runs.

use crate::config::{Config, ConfigError};
use crate::core::{
    stratified_split, window_table, EncodingError, FeatureScaler, LabelEncoder, SplitError,
    WindowConfig, WindowError, WindowSet,
};
use crate::dataset::{merge_modalities, DatasetError, MergeSummary, MergedTable};
use crate::model::ActivityNetConfig;
use crate::report::{
    sample_predictions, ClassificationReport, ConfusionMatrix, RunReport, SAMPLE_PREDICTIONS,
};
use crate::training::{
    DatasetShapeError, EpochMetrics, TrainError, Trainer, TrainerConfig, WindowDataset,
};
use burn::module::{AutodiffModule, Module};
use burn::tensor::backend::AutodiffBackend;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Encoded, normalized and split windows ready for training.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub merge: MergeSummary,
    pub feature_names: Vec<String>,
    pub encoder: LabelEncoder,
    pub scaler: FeatureScaler,
    /// Windows per activity before splitting
    pub class_counts: BTreeMap<String, usize>,
    pub train: Arc<WindowDataset>,
    pub test: Arc<WindowDataset>,
}

impl PreparedData {
    /// Total windows across both splits.
    pub fn window_count(&self) -> usize {
        self.train.len() + self.test.len()
    }
}

/// Ordered stages driven by one configuration.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    /// Create a pipeline after validating the configuration.
    pub fn new(config: Config) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Return a reference to the active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Merge the three modality trees.
    pub fn load(&self) -> Result<(MergedTable, MergeSummary), PipelineError> {
        Ok(merge_modalities(&self.config.sources)?)
    }

    /// Cut the merged table into windows.
    pub fn window(&self, table: &MergedTable) -> Result<WindowSet, PipelineError> {
        let set = window_table(
            table,
            WindowConfig::new(self.config.window_size, self.config.stride),
        )?;
        if set.is_empty() {
            return Err(PipelineError::NoWindows {
                window_size: self.config.window_size,
            });
        }
        Ok(set)
    }

    /// Encode labels and normalize features over the full set, then split.
    pub fn prepare_windows(
        &self,
        set: WindowSet,
        merge: MergeSummary,
        feature_names: Vec<String>,
    ) -> Result<PreparedData, PipelineError> {
        let class_counts = set.class_counts();
        let WindowSet {
            mut windows,
            labels,
            ..
        } = set;

        let encoder = LabelEncoder::fit(&labels);
        let encoded = encoder.encode_all(&labels)?;
        let scaler = FeatureScaler::fit_transform(&mut windows);

        let split = stratified_split(&encoded, self.config.test_ratio, self.config.seed)?;
        let all = WindowDataset::new(windows, encoded)?;
        let train = Arc::new(all.select(&split.train));
        let test = Arc::new(all.select(&split.test));

        tracing::info!(
            classes = encoder.len(),
            train = train.len(),
            test = test.len(),
            "prepared datasets"
        );

        Ok(PreparedData {
            merge,
            feature_names,
            encoder,
            scaler,
            class_counts,
            train,
            test,
        })
    }

    /// Run every stage up to training.
    pub fn prepare(&self) -> Result<PreparedData, PipelineError> {
        let (table, merge) = self.load()?;
        let set = self.window(&table)?;
        let feature_names = table.columns().to_vec();
        drop(table);
        self.prepare_windows(set, merge, feature_names)
    }

    /// Train a fresh model on prepared data and evaluate it on the test split.
    pub fn train<B, F>(
        &self,
        data: &PreparedData,
        device: B::Device,
        stop: Option<Arc<AtomicBool>>,
        on_epoch: F,
    ) -> Result<RunReport, PipelineError>
    where
        B: AutodiffBackend,
        F: FnMut(&EpochMetrics),
    {
        let started_at = Utc::now();
        B::seed(self.config.seed);

        let model = ActivityNetConfig::new(data.train.feature_count(), data.encoder.len())
            .init::<B>(&device);
        tracing::info!(params = model.num_params(), "initialized model");

        let mut trainer = Trainer::<B>::new(TrainerConfig::from(&self.config), device);
        if let Some(flag) = stop {
            trainer = trainer.with_stop_flag(flag);
        }

        let outcome =
            trainer.fit_with(model, data.train.clone(), data.test.clone(), on_epoch)?;
        let predicted = trainer.predict(&outcome.model.valid(), data.test.clone())?;
        let truth = data.test.labels();

        let classes = data.encoder.classes().to_vec();
        let confusion = ConfusionMatrix::from_predictions(&classes, truth, &predicted);
        let report = ClassificationReport::from_confusion(&confusion);
        let samples = sample_predictions(&classes, truth, &predicted, SAMPLE_PREDICTIONS);

        Ok(RunReport {
            run_id: RunReport::new_run_id(),
            host: RunReport::host_name(),
            started_at,
            finished_at: Utc::now(),
            config: self.config.clone(),
            merge: data.merge.clone(),
            classes,
            scaler: data.scaler.clone(),
            train_windows: data.train.len(),
            test_windows: data.test.len(),
            history: outcome.history,
            report,
            confusion,
            samples,
        })
    }
}

/// Errors from any pipeline stage.
#[derive(Debug)]
pub enum PipelineError {
    Config(ConfigError),
    Dataset(DatasetError),
    Window(WindowError),
    /// Every trial was shorter than one window
    NoWindows { window_size: usize },
    Encoding(EncodingError),
    Split(SplitError),
    Shape(DatasetShapeError),
    Train(TrainError),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Config(e) => write!(f, "{e}"),
            PipelineError::Dataset(e) => write!(f, "{e}"),
            PipelineError::Window(e) => write!(f, "{e}"),
            PipelineError::NoWindows { window_size } => {
                write!(f, "No windows: every trial is shorter than {window_size} rows")
            }
            PipelineError::Encoding(e) => write!(f, "{e}"),
            PipelineError::Split(e) => write!(f, "{e}"),
            PipelineError::Shape(e) => write!(f, "{e}"),
            PipelineError::Train(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Config(e) => Some(e),
            PipelineError::Dataset(e) => Some(e),
            PipelineError::Window(e) => Some(e),
            PipelineError::NoWindows { .. } => None,
            PipelineError::Encoding(e) => Some(e),
            PipelineError::Split(e) => Some(e),
            PipelineError::Shape(e) => Some(e),
            PipelineError::Train(e) => Some(e),
        }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(e: ConfigError) -> Self {
        PipelineError::Config(e)
    }
}

impl From<DatasetError> for PipelineError {
    fn from(e: DatasetError) -> Self {
        PipelineError::Dataset(e)
    }
}

impl From<WindowError> for PipelineError {
    fn from(e: WindowError) -> Self {
        PipelineError::Window(e)
    }
}

impl From<EncodingError> for PipelineError {
    fn from(e: EncodingError) -> Self {
        PipelineError::Encoding(e)
    }
}

impl From<SplitError> for PipelineError {
    fn from(e: SplitError) -> Self {
        PipelineError::Split(e)
    }
}

impl From<DatasetShapeError> for PipelineError {
    fn from(e: DatasetShapeError) -> Self {
        PipelineError::Shape(e)
    }
}

impl From<TrainError> for PipelineError {
    fn from(e: TrainError) -> Self {
        PipelineError::Train(e)
    }
}
