//! Fixed-length, fixed-stride windowing over trial rows.
//!
//! Windows are cut per trial, so no window ever spans two trials. Each
//! window is stored transposed as `(features, timesteps)` and labelled with
//! the activity at its midpoint row.

use crate::dataset::MergedTable;
use ndarray::{Array3, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Window length and stride, in rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    pub window_size: usize,
    pub stride: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_size: 100,
            stride: 50,
        }
    }
}

impl WindowConfig {
    /// Create a new window configuration.
    pub fn new(window_size: usize, stride: usize) -> Self {
        Self {
            window_size,
            stride,
        }
    }

    /// Start offsets of the windows cut from a trial of `len` rows.
    ///
    /// Starts run `0, S, 2S, ...` strictly below `len - W`, so a trial no
    /// longer than one window yields nothing.
    pub fn offsets(&self, len: usize) -> impl Iterator<Item = usize> {
        let limit = len.saturating_sub(self.window_size);
        (0..limit).step_by(self.stride.max(1))
    }

    /// Number of windows cut from a trial of `len` rows.
    pub fn window_count(&self, len: usize) -> usize {
        let limit = len.saturating_sub(self.window_size);
        limit.div_ceil(self.stride.max(1))
    }

    fn validate(&self) -> Result<(), WindowError> {
        if self.window_size == 0 || self.stride == 0 {
            return Err(WindowError::InvalidParameters {
                window_size: self.window_size,
                stride: self.stride,
            });
        }
        Ok(())
    }
}

/// Where a window was cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowOrigin {
    /// Index into [`MergedTable::trials`]
    pub trial: usize,
    /// First row of the window, relative to the trial
    pub start: usize,
}

/// All windows of a table with their labels.
#[derive(Debug, Clone)]
pub struct WindowSet {
    /// Shape `(windows, features, timesteps)`
    pub windows: Array3<f32>,
    /// Midpoint activity label per window
    pub labels: Vec<String>,
    pub origins: Vec<WindowOrigin>,
    pub config: WindowConfig,
}

impl WindowSet {
    /// Number of windows.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check if no window was produced.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of feature channels.
    pub fn feature_count(&self) -> usize {
        self.windows.len_of(Axis(1))
    }

    /// Number of distinct trials that produced at least one window.
    pub fn trials_covered(&self) -> usize {
        let mut covered = 0;
        let mut last = None;
        for origin in &self.origins {
            if last != Some(origin.trial) {
                covered += 1;
                last = Some(origin.trial);
            }
        }
        covered
    }

    /// Windows per label, sorted by label.
    pub fn class_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for label in &self.labels {
            *counts.entry(label.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Cut every trial of the table into windows.
pub fn window_table(table: &MergedTable, config: WindowConfig) -> Result<WindowSet, WindowError> {
    config.validate()?;

    let features = table.feature_count();
    let w = config.window_size;
    let total: usize = table
        .trials()
        .iter()
        .map(|t| config.window_count(t.len))
        .sum();

    let mut windows = Array3::<f32>::zeros((total, features, w));
    let mut labels = Vec::with_capacity(total);
    let mut origins = Vec::with_capacity(total);

    let mut n = 0;
    for (trial_idx, span) in table.trials().iter().enumerate() {
        for offset in config.offsets(span.len) {
            let mut block = windows.index_axis_mut(Axis(0), n);
            for t in 0..w {
                let row = table.row(span.start + offset + t);
                for (f, value) in row.iter().enumerate() {
                    block[[f, t]] = *value as f32;
                }
            }

            let mid = span.start + offset + w / 2;
            let label = table
                .label_at(mid)
                .unwrap_or(span.activity.as_str())
                .to_string();
            labels.push(label);
            origins.push(WindowOrigin {
                trial: trial_idx,
                start: offset,
            });
            n += 1;
        }
    }

    tracing::debug!(windows = n, features, window_size = w, "windowed trials");

    Ok(WindowSet {
        windows,
        labels,
        origins,
        config,
    })
}

/// Windowing errors.
#[derive(Debug)]
pub enum WindowError {
    InvalidParameters { window_size: usize, stride: usize },
}

impl std::fmt::Display for WindowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowError::InvalidParameters {
                window_size,
                stride,
            } => write!(
                f,
                "Invalid window parameters: window_size={window_size}, stride={stride}"
            ),
        }
    }
}

impl std::error::Error for WindowError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Trial;

    fn trial(activity: &str, rows: usize, features: usize) -> Trial {
        let mut values = Vec::with_capacity(rows * features);
        for r in 0..rows {
            for f in 0..features {
                values.push((r * 10 + f) as f64);
            }
        }
        Trial {
            activity: activity.to_string(),
            relative_path: format!("{activity}/sub_1.csv").into(),
            columns: (0..features).map(|f| format!("c{f}")).collect(),
            values,
        }
    }

    #[test]
    fn test_window_offsets() {
        let config = WindowConfig::new(100, 50);
        assert_eq!(config.offsets(250).collect::<Vec<_>>(), vec![0, 50, 100]);
        assert_eq!(config.window_count(250), 3);
        assert_eq!(config.window_count(100), 0);
        assert_eq!(config.window_count(99), 0);
        assert_eq!(config.window_count(101), 1);
        assert_eq!(config.window_count(201), 3);
    }

    #[test]
    fn test_window_count_matches_offsets() {
        for (w, s) in [(10, 3), (7, 7), (5, 1), (4, 9)] {
            let config = WindowConfig::new(w, s);
            for len in 0..60 {
                assert_eq!(config.offsets(len).count(), config.window_count(len));
            }
        }
    }

    #[test]
    fn test_windows_are_transposed_slices() {
        let table = MergedTable::from_trials(vec![trial("walking", 30, 2)]).unwrap();
        let set = window_table(&table, WindowConfig::new(10, 5)).unwrap();

        assert_eq!(set.windows.dim(), (4, 2, 10));
        // Window 1 starts at row 5; feature 1 at step 3 is row 8
        assert_eq!(set.windows[[1, 1, 3]], 81.0);
        assert_eq!(set.origins[1], WindowOrigin { trial: 0, start: 5 });
    }

    #[test]
    fn test_windows_never_cross_trials() {
        let table =
            MergedTable::from_trials(vec![trial("walking", 25, 1), trial("jogging", 25, 1)])
                .unwrap();
        let set = window_table(&table, WindowConfig::new(10, 5)).unwrap();

        // Each 25-row trial yields offsets 0, 5, 10
        assert_eq!(set.len(), 6);
        assert_eq!(&set.labels[..3], &["walking", "walking", "walking"]);
        assert_eq!(&set.labels[3..], &["jogging", "jogging", "jogging"]);
        // First jogging window starts at its own row 0
        assert_eq!(set.windows[[3, 0, 0]], 0.0);
        assert_eq!(set.origins[3], WindowOrigin { trial: 1, start: 0 });
    }

    #[test]
    fn test_short_trial_yields_nothing() {
        let table =
            MergedTable::from_trials(vec![trial("walking", 8, 1), trial("jogging", 30, 1)])
                .unwrap();
        let set = window_table(&table, WindowConfig::new(10, 10)).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.labels.iter().all(|l| l == "jogging"));
        assert_eq!(set.class_counts().get("jogging"), Some(&2));
        assert_eq!(set.trials_covered(), 1);
        assert!(set.origins.iter().all(|o| o.trial == 1));
    }

    #[test]
    fn test_invalid_parameters() {
        let table = MergedTable::from_trials(vec![trial("walking", 8, 1)]).unwrap();
        assert!(window_table(&table, WindowConfig::new(0, 1)).is_err());
        assert!(window_table(&table, WindowConfig::new(4, 0)).is_err());
    }
}
