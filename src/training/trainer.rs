//! Epoch loop: one optimization pass then one evaluation pass per epoch.
//!
//! Each optimization step is forward, cross-entropy, backward, clipping of the
//! joint gradient norm and an Adam update. Evaluation runs on the non-autodiff
//! view of the model, so it can never touch the parameters.

use crate::config::Config;
use crate::model::ActivityNet;
use crate::training::batcher::{BatchLoader, WindowDataset};
use crate::training::clipping::clip_global_norm;
use crate::training::metrics::{EpochMetrics, PassAccumulator, PassMetrics, TrainingHistory};
use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Optimization settings of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub grad_clip_norm: f32,
    /// Seeds the per-epoch shuffle
    pub seed: u64,
    pub prefetch_batches: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for TrainerConfig {
    fn from(config: &Config) -> Self {
        Self {
            epochs: config.epochs,
            batch_size: config.batch_size,
            learning_rate: config.learning_rate,
            grad_clip_norm: config.grad_clip_norm,
            seed: config.seed,
            prefetch_batches: config.prefetch_batches,
        }
    }
}

/// Trained model and its epoch history.
pub struct TrainingOutcome<B: AutodiffBackend> {
    pub model: ActivityNet<B>,
    pub history: TrainingHistory,
}

/// Runs the fixed-length epoch loop on one device.
pub struct Trainer<B: AutodiffBackend> {
    config: TrainerConfig,
    device: B::Device,
    stop: Option<Arc<AtomicBool>>,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Create a trainer bound to `device`.
    pub fn new(config: TrainerConfig, device: B::Device) -> Self {
        Self {
            config,
            device,
            stop: None,
        }
    }

    /// Stop between epochs once `flag` is set.
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    /// Train for the configured number of epochs.
    pub fn fit(
        &self,
        model: ActivityNet<B>,
        train: Arc<WindowDataset>,
        test: Arc<WindowDataset>,
    ) -> Result<TrainingOutcome<B>, TrainError> {
        self.fit_with(model, train, test, |_| {})
    }

    /// Train, calling `on_epoch` after every completed epoch.
    pub fn fit_with<F>(
        &self,
        mut model: ActivityNet<B>,
        train: Arc<WindowDataset>,
        test: Arc<WindowDataset>,
        mut on_epoch: F,
    ) -> Result<TrainingOutcome<B>, TrainError>
    where
        F: FnMut(&EpochMetrics),
    {
        if train.is_empty() {
            return Err(TrainError::EmptyDataset("train"));
        }
        if test.is_empty() {
            return Err(TrainError::EmptyDataset("test"));
        }

        let train_loader =
            BatchLoader::new(train, self.config.batch_size, self.config.prefetch_batches);
        let test_loader =
            BatchLoader::new(test, self.config.batch_size, self.config.prefetch_batches);

        let mut optim = AdamConfig::new().init::<B, ActivityNet<B>>();
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut history = TrainingHistory::default();

        tracing::info!(
            epochs = self.config.epochs,
            train_batches = train_loader.num_batches(),
            test_batches = test_loader.num_batches(),
            "starting training"
        );

        for epoch in 1..=self.config.epochs {
            if self.stop_requested() {
                tracing::warn!(epoch, "stop requested, ending training early");
                history.interrupted = true;
                break;
            }

            let (next, train_metrics) =
                self.train_epoch(model, &mut optim, &train_loader, &mut rng)?;
            model = next;
            let test_metrics = self.evaluate(&model.valid(), &test_loader)?;

            let metrics = EpochMetrics {
                epoch,
                train: train_metrics,
                test: test_metrics,
            };
            tracing::debug!(%metrics, "epoch complete");
            on_epoch(&metrics);
            history.push(metrics);
        }

        Ok(TrainingOutcome { model, history })
    }

    /// One optimization pass over shuffled training batches.
    pub fn train_epoch<O>(
        &self,
        mut model: ActivityNet<B>,
        optim: &mut O,
        loader: &BatchLoader,
        rng: &mut StdRng,
    ) -> Result<(ActivityNet<B>, PassMetrics), TrainError>
    where
        O: Optimizer<ActivityNet<B>, B>,
    {
        let loss_fn = CrossEntropyLossConfig::new().init::<B>(&self.device);
        let mut acc = PassAccumulator::new();

        for batch in loader.shuffled(rng) {
            let size = batch.len();
            let (inputs, targets) = batch.into_tensors::<B>(&self.device);

            let logits = model.forward(inputs);
            let loss = loss_fn.forward(logits.clone(), targets.clone());
            let batch_loss = loss.clone().into_scalar().elem::<f64>();
            let correct = count_correct(logits, targets);

            let mut grads = GradientsParams::from_grads(loss.backward(), &model);
            let norm =
                clip_global_norm::<B, _>(&model, &mut grads, self.config.grad_clip_norm as f64);
            tracing::trace!(grad_norm = norm, batch_loss, "optimizer step");
            model = optim.step(self.config.learning_rate, model, grads);

            acc.record(batch_loss, correct, size);
        }

        Ok((model, acc.finish()))
    }

    /// One pass over batches in dataset order, without any optimizer step.
    pub fn evaluate(
        &self,
        model: &ActivityNet<B::InnerBackend>,
        loader: &BatchLoader,
    ) -> Result<PassMetrics, TrainError> {
        let loss_fn = CrossEntropyLossConfig::new().init::<B::InnerBackend>(&self.device);
        let mut acc = PassAccumulator::new();

        for batch in loader.sequential() {
            let size = batch.len();
            let (inputs, targets) = batch.into_tensors::<B::InnerBackend>(&self.device);

            let logits = model.forward(inputs);
            let loss = loss_fn.forward(logits.clone(), targets.clone());
            acc.record(loss.into_scalar().elem::<f64>(), count_correct(logits, targets), size);
        }

        Ok(acc.finish())
    }

    /// Predicted class index of every window, in dataset order.
    pub fn predict(
        &self,
        model: &ActivityNet<B::InnerBackend>,
        data: Arc<WindowDataset>,
    ) -> Result<Vec<usize>, TrainError> {
        let loader = BatchLoader::new(data, self.config.batch_size, self.config.prefetch_batches);
        let mut predictions = Vec::with_capacity(loader.dataset().len());

        for batch in loader.sequential() {
            let (inputs, _) = batch.into_tensors::<B::InnerBackend>(&self.device);
            let classes = model
                .forward(inputs)
                .argmax(1)
                .squeeze::<1>(1)
                .into_data()
                .convert::<i64>()
                .to_vec::<i64>()
                .map_err(|e| TrainError::Tensor(format!("{e:?}")))?;
            predictions.extend(classes.into_iter().map(|c| c as usize));
        }

        Ok(predictions)
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

/// Number of rows whose argmax matches the target.
fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predicted = logits.argmax(1).squeeze::<1>(1);
    predicted
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

/// Training errors.
#[derive(Debug)]
pub enum TrainError {
    EmptyDataset(&'static str),
    Tensor(String),
}

impl std::fmt::Display for TrainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrainError::EmptyDataset(split) => write!(f, "The {split} split has no windows"),
            TrainError::Tensor(e) => write!(f, "Tensor error: {e}"),
        }
    }
}

impl std::error::Error for TrainError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ActivityNetConfig;
    use burn::backend::{Autodiff, NdArray};
    use burn::module::{ModuleVisitor, ParamId};
    use ndarray::Array3;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn toy_dataset(n: usize) -> Arc<WindowDataset> {
        // Class 1 windows are shifted upwards
        let windows = Array3::from_shape_fn((n, 3, 8), |(i, f, t)| {
            let class = (i % 2) as f32;
            class * 2.0 - 1.0 + 0.1 * ((f + t) as f32).sin()
        });
        let labels = (0..n).map(|i| i % 2).collect();
        Arc::new(WindowDataset::new(windows, labels).unwrap())
    }

    fn small_model(device: &<TestBackend as Backend>::Device) -> ActivityNet<TestBackend> {
        ActivityNetConfig::new(3, 2)
            .with_conv1_channels(4)
            .with_conv2_channels(4)
            .with_hidden_size(4)
            .init(device)
    }

    fn trainer(epochs: usize) -> Trainer<TestBackend> {
        let config = TrainerConfig {
            epochs,
            batch_size: 4,
            learning_rate: 1e-3,
            grad_clip_norm: 1.0,
            seed: 1,
            prefetch_batches: 2,
        };
        Trainer::new(config, Default::default())
    }

    #[test]
    fn test_fit_records_every_epoch() {
        let device = Default::default();
        let trainer = trainer(2);
        let mut seen = Vec::new();

        let outcome = trainer
            .fit_with(small_model(&device), toy_dataset(10), toy_dataset(6), |m| {
                seen.push(m.epoch)
            })
            .unwrap();

        assert_eq!(seen, vec![1, 2]);
        assert_eq!(outcome.history.epochs.len(), 2);
        let last = outcome.history.last().unwrap();
        assert_eq!(last.train.samples, 10);
        assert_eq!(last.test.samples, 6);
        assert!(last.train.loss.is_finite());
        assert!((0.0..=1.0).contains(&last.test.accuracy));
        assert!(!outcome.history.interrupted);
    }

    /// Every float tensor of a module, including batch-norm running stats.
    #[derive(Default)]
    struct ParamSnapshot(Vec<Vec<f32>>);

    impl<B: Backend> ModuleVisitor<B> for ParamSnapshot {
        fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
            let values = tensor.to_data().convert::<f32>().to_vec::<f32>().unwrap();
            self.0.push(values);
        }
    }

    fn snapshot<M: Module<TestBackend>>(model: &M) -> Vec<Vec<f32>> {
        let mut visitor = ParamSnapshot::default();
        model.visit(&mut visitor);
        visitor.0
    }

    #[test]
    fn test_evaluation_leaves_parameters_unchanged() {
        let device = Default::default();
        let trainer = trainer(1);
        let model = small_model(&device);
        let loader = BatchLoader::new(toy_dataset(8), 4, 1);

        let before = snapshot(&model);
        assert!(!before.is_empty());

        trainer.evaluate(&model.valid(), &loader).unwrap();
        trainer.evaluate(&model.valid(), &loader).unwrap();
        assert_eq!(snapshot(&model), before);

        // A training pass over the same batches does move them
        let mut optim = AdamConfig::new().init::<TestBackend, ActivityNet<TestBackend>>();
        let mut rng = StdRng::seed_from_u64(0);
        let (trained, _) = trainer
            .train_epoch(model, &mut optim, &loader, &mut rng)
            .unwrap();
        assert_ne!(snapshot(&trained), before);
    }

    #[test]
    fn test_stop_flag_ends_before_first_epoch() {
        let device = Default::default();
        let flag = Arc::new(AtomicBool::new(true));
        let trainer = trainer(5).with_stop_flag(flag);

        let outcome = trainer
            .fit(small_model(&device), toy_dataset(4), toy_dataset(4))
            .unwrap();
        assert!(outcome.history.epochs.is_empty());
        assert!(outcome.history.interrupted);
    }

    #[test]
    fn test_empty_split_is_an_error() {
        let device = Default::default();
        let empty = Arc::new(WindowDataset::new(Array3::zeros((0, 3, 8)), Vec::new()).unwrap());
        let result = trainer(1).fit(small_model(&device), toy_dataset(4), empty);
        assert!(matches!(result, Err(TrainError::EmptyDataset("test"))));
    }

    #[test]
    fn test_predict_returns_one_class_per_window() {
        let device = Default::default();
        let trainer = trainer(1);
        let predictions = trainer
            .predict(&small_model(&device).valid(), toy_dataset(7))
            .unwrap();
        assert_eq!(predictions.len(), 7);
        assert!(predictions.iter().all(|&c| c < 2));
    }
}
