//! Mini-batch assembly on a background thread.
//!
//! A loader thread gathers windows into host-side batches and hands them to
//! the trainer over a bounded channel. Batches arrive in exactly the order
//! requested; tensors are only created on the consuming thread.

use burn::prelude::*;
use crossbeam_channel::{bounded, Receiver};
use ndarray::{Array3, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Encoded windows with their class indices.
#[derive(Debug, Clone)]
pub struct WindowDataset {
    windows: Array3<f32>,
    labels: Vec<usize>,
}

impl WindowDataset {
    /// Pair `(N, features, timesteps)` windows with `N` class indices.
    pub fn new(windows: Array3<f32>, labels: Vec<usize>) -> Result<Self, DatasetShapeError> {
        if windows.len_of(Axis(0)) != labels.len() {
            return Err(DatasetShapeError {
                windows: windows.len_of(Axis(0)),
                labels: labels.len(),
            });
        }
        Ok(Self { windows, labels })
    }

    /// Take a subset of windows, in the given order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            windows: self.windows.select(Axis(0), indices),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    /// Number of windows.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check if the dataset has no windows.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Feature channels per window.
    pub fn feature_count(&self) -> usize {
        self.windows.len_of(Axis(1))
    }

    /// Timesteps per window.
    pub fn window_size(&self) -> usize {
        self.windows.len_of(Axis(2))
    }

    /// Class index per window.
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Window data.
    pub fn windows(&self) -> &Array3<f32> {
        &self.windows
    }

    /// Gather the given windows into one host batch.
    pub fn batch(&self, indices: &[usize]) -> HostBatch {
        let features = self.feature_count();
        let steps = self.window_size();
        let mut inputs = Vec::with_capacity(indices.len() * features * steps);
        let mut targets = Vec::with_capacity(indices.len());

        for &i in indices {
            inputs.extend(self.windows.index_axis(Axis(0), i).iter().copied());
            targets.push(self.labels[i] as i64);
        }

        HostBatch {
            inputs,
            shape: [indices.len(), features, steps],
            targets,
        }
    }
}

/// Window count and label count disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetShapeError {
    pub windows: usize,
    pub labels: usize,
}

impl std::fmt::Display for DatasetShapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Dataset has {} windows but {} labels",
            self.windows, self.labels
        )
    }
}

impl std::error::Error for DatasetShapeError {}

/// A batch gathered on the host, not yet on a device.
#[derive(Debug, Clone)]
pub struct HostBatch {
    /// Row-major `(batch, features, timesteps)` values
    pub inputs: Vec<f32>,
    pub shape: [usize; 3],
    pub targets: Vec<i64>,
}

impl HostBatch {
    /// Number of samples in the batch.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Move the batch onto `device`.
    pub fn into_tensors<B: Backend>(self, device: &B::Device) -> (Tensor<B, 3>, Tensor<B, 1, Int>) {
        let n = self.targets.len();
        let inputs = TensorData::new(self.inputs, self.shape).convert::<B::FloatElem>();
        let targets = TensorData::new(self.targets, [n]).convert::<B::IntElem>();
        (
            Tensor::from_data(inputs, device),
            Tensor::from_data(targets, device),
        )
    }
}

/// Produces batches of a shared dataset on a loader thread.
#[derive(Debug, Clone)]
pub struct BatchLoader {
    dataset: Arc<WindowDataset>,
    batch_size: usize,
    prefetch: usize,
}

impl BatchLoader {
    /// Create a loader; at most `prefetch` batches are buffered ahead.
    pub fn new(dataset: Arc<WindowDataset>, batch_size: usize, prefetch: usize) -> Self {
        Self {
            dataset,
            batch_size: batch_size.max(1),
            prefetch: prefetch.max(1),
        }
    }

    /// The underlying dataset.
    pub fn dataset(&self) -> &WindowDataset {
        &self.dataset
    }

    /// Number of batches in one pass.
    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Batches in dataset order.
    pub fn sequential(&self) -> BatchStream {
        self.stream((0..self.dataset.len()).collect())
    }

    /// Batches in a freshly shuffled order.
    pub fn shuffled(&self, rng: &mut StdRng) -> BatchStream {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        order.shuffle(rng);
        self.stream(order)
    }

    /// Batches following an explicit index order.
    pub fn stream(&self, order: Vec<usize>) -> BatchStream {
        let (sender, receiver) = bounded(self.prefetch);
        let dataset = Arc::clone(&self.dataset);
        let batch_size = self.batch_size;

        let worker = std::thread::spawn(move || {
            for chunk in order.chunks(batch_size) {
                // Receiver gone: the consumer stopped early
                if sender.send(dataset.batch(chunk)).is_err() {
                    break;
                }
            }
        });

        BatchStream {
            receiver: Some(receiver),
            worker: Some(worker),
        }
    }
}

/// Iterator over batches coming from a loader thread.
pub struct BatchStream {
    receiver: Option<Receiver<HostBatch>>,
    worker: Option<JoinHandle<()>>,
}

impl Iterator for BatchStream {
    type Item = HostBatch;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.as_ref()?.recv().ok()
    }
}

impl Drop for BatchStream {
    fn drop(&mut self) {
        // Dropping the receiver unblocks a worker waiting on a full channel
        self.receiver.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("batch loader thread panicked");
            }
        }
    }
}
