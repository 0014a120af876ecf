//! JSON record of a finished training run.

use crate::config::Config;
use crate::core::FeatureScaler;
use crate::dataset::MergeSummary;
use crate::report::classification::{ClassificationReport, ConfusionMatrix};
use crate::training::TrainingHistory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Number of literal predictions printed and stored per run.
pub const SAMPLE_PREDICTIONS: usize = 10;

/// One test window's true and predicted activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplePrediction {
    pub truth: String,
    pub predicted: String,
}

/// Everything a run produced except the model itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub host: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub config: Config,
    pub merge: MergeSummary,
    pub classes: Vec<String>,
    pub scaler: FeatureScaler,
    pub train_windows: usize,
    pub test_windows: usize,
    pub history: TrainingHistory,
    pub report: ClassificationReport,
    pub confusion: ConfusionMatrix,
    pub samples: Vec<SamplePrediction>,
}

impl RunReport {
    /// Generate a fresh run identifier.
    pub fn new_run_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Name of the machine the run executed on.
    pub fn host_name() -> String {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Write the report as pretty JSON into `dir`, returning the file path.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, std::io::Error> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "run_{}_{}.json",
            self.finished_at.format("%Y%m%d_%H%M%S"),
            &self.run_id[..8.min(self.run_id.len())]
        ));
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    /// Render the sample predictions as `true -> predicted` lines.
    pub fn render_samples(&self) -> String {
        let mut out = String::new();
        for (i, s) in self.samples.iter().enumerate() {
            let mark = if s.truth == s.predicted { ' ' } else { '✗' };
            out.push_str(&format!(
                "{:>2}. true: {:<16} predicted: {:<16} {mark}\n",
                i + 1,
                s.truth,
                s.predicted
            ));
        }
        out
    }
}

/// Pair the first `limit` truths with their predictions.
pub fn sample_predictions(
    classes: &[String],
    truth: &[usize],
    predicted: &[usize],
    limit: usize,
) -> Vec<SamplePrediction> {
    let name = |c: usize| classes.get(c).cloned().unwrap_or_else(|| c.to_string());
    truth
        .iter()
        .zip(predicted)
        .take(limit)
        .map(|(&t, &p)| SamplePrediction {
            truth: name(t),
            predicted: name(p),
        })
        .collect()
}
