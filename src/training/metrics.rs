//! Per-epoch loss and accuracy bookkeeping.

use serde::{Deserialize, Serialize};

/// Running sums over one pass, normalized by sample count at the end.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassAccumulator {
    loss_sum: f64,
    correct: usize,
    samples: usize,
}

impl PassAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one batch: its mean loss, correct predictions and size.
    pub fn record(&mut self, mean_loss: f64, correct: usize, batch_size: usize) {
        self.loss_sum += mean_loss * batch_size as f64;
        self.correct += correct;
        self.samples += batch_size;
    }

    /// Sample-weighted mean loss and exact-match accuracy.
    pub fn finish(&self) -> PassMetrics {
        if self.samples == 0 {
            return PassMetrics::default();
        }
        let n = self.samples as f64;
        PassMetrics {
            loss: self.loss_sum / n,
            accuracy: self.correct as f64 / n,
            samples: self.samples,
        }
    }
}

/// Loss and accuracy of one pass over a split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PassMetrics {
    pub loss: f64,
    pub accuracy: f64,
    pub samples: usize,
}

/// Train and test metrics of one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch number
    pub epoch: usize,
    pub train: PassMetrics,
    pub test: PassMetrics,
}

impl std::fmt::Display for EpochMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Epoch {:>3} | train loss {:.4} acc {:.4} | test loss {:.4} acc {:.4}",
            self.epoch, self.train.loss, self.train.accuracy, self.test.loss, self.test.accuracy
        )
    }
}

/// Metrics of every completed epoch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
    /// Set when the run was interrupted before the configured epoch count
    pub interrupted: bool,
}

impl TrainingHistory {
    /// Append an epoch.
    pub fn push(&mut self, metrics: EpochMetrics) {
        self.epochs.push(metrics);
    }

    /// Metrics of the last completed epoch.
    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    /// Epoch with the highest test accuracy.
    pub fn best_test_epoch(&self) -> Option<&EpochMetrics> {
        self.epochs
            .iter()
            .max_by(|a, b| a.test.accuracy.total_cmp(&b.test.accuracy))
    }

    /// Accuracy and loss curves as a text table.
    pub fn render_curves(&self) -> String {
        let mut out = String::from("epoch  train_loss  test_loss  train_acc  test_acc\n");
        for m in &self.epochs {
            out.push_str(&format!(
                "{:>5}  {:>10.4}  {:>9.4}  {:>9.4}  {:>8.4}  {}\n",
                m.epoch,
                m.train.loss,
                m.test.loss,
                m.train.accuracy,
                m.test.accuracy,
                bar(m.test.accuracy, 20)
            ));
        }
        out
    }
}

fn bar(fraction: f64, width: usize) -> String {
    let filled = (fraction.clamp(0.0, 1.0) * width as f64).round() as usize;
    format!("{}{}", "#".repeat(filled), ".".repeat(width - filled))
}
