//! Per-feature z-score normalization over windows.
//!
//! Statistics for each feature channel are taken over every window and
//! timestep, as if the windows were flattened to `(N * W, features)`.

use ndarray::{Array3, Axis};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Fitted per-feature mean and standard deviation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub means: Vec<f64>,
    /// Population standard deviation; constant features use 1
    pub stds: Vec<f64>,
}

impl FeatureScaler {
    /// Fit statistics on `(windows, features, timesteps)` data.
    ///
    /// Non-finite entries count as zero.
    pub fn fit(windows: &Array3<f32>) -> Self {
        let mut means = Vec::with_capacity(windows.len_of(Axis(1)));
        let mut stds = Vec::with_capacity(windows.len_of(Axis(1)));

        for channel in windows.axis_iter(Axis(1)) {
            let mean = channel.iter().map(|&v| finite_or_zero(v) as f64).mean();
            let std = channel
                .iter()
                .map(|&v| finite_or_zero(v) as f64)
                .population_std_dev();

            means.push(if mean.is_finite() { mean } else { 0.0 });
            stds.push(if std.is_finite() && std > 0.0 { std } else { 1.0 });
        }

        Self { means, stds }
    }

    /// Number of features the scaler was fit on.
    pub fn feature_count(&self) -> usize {
        self.means.len()
    }

    /// Normalize in place, zeroing non-finite values before and after.
    pub fn transform(&self, windows: &mut Array3<f32>) {
        for (f, mut channel) in windows.axis_iter_mut(Axis(1)).enumerate() {
            let mean = self.means[f];
            let std = self.stds[f];
            channel.mapv_inplace(|v| {
                let scaled = ((finite_or_zero(v) as f64 - mean) / std) as f32;
                finite_or_zero(scaled)
            });
        }
    }

    /// Fit on the data, then normalize it in place.
    pub fn fit_transform(windows: &mut Array3<f32>) -> Self {
        let scaler = Self::fit(windows);
        scaler.transform(windows);
        scaler
    }
}

fn finite_or_zero(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_stats(windows: &Array3<f32>, f: usize) -> (f64, f64) {
        let values: Vec<f64> = windows
            .index_axis(Axis(1), f)
            .iter()
            .map(|&v| v as f64)
            .collect();
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        (mean, var.sqrt())
    }

    #[test]
    fn test_zero_mean_unit_std() {
        let mut windows = Array3::<f32>::from_shape_fn((4, 3, 5), |(n, f, t)| {
            (n * 7 + t * 3) as f32 * (f as f32 + 1.0) + 100.0 * f as f32
        });
        let scaler = FeatureScaler::fit_transform(&mut windows);
        assert_eq!(scaler.feature_count(), 3);

        for f in 0..3 {
            let (mean, std) = channel_stats(&windows, f);
            assert!(mean.abs() < 1e-5, "feature {f} mean {mean}");
            assert!((std - 1.0).abs() < 1e-4, "feature {f} std {std}");
        }
    }

    #[test]
    fn test_non_finite_values_become_zero() {
        let mut windows = Array3::<f32>::from_shape_fn((2, 2, 4), |(n, _, t)| (n + t) as f32);
        windows[[0, 0, 0]] = f32::NAN;
        windows[[1, 1, 2]] = f32::INFINITY;
        windows[[1, 0, 3]] = f32::NEG_INFINITY;

        FeatureScaler::fit_transform(&mut windows);
        assert!(windows.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_constant_feature_uses_unit_std() {
        let mut windows = Array3::<f32>::from_elem((3, 1, 4), 5.0);
        let scaler = FeatureScaler::fit_transform(&mut windows);
        assert_eq!(scaler.stds[0], 1.0);
        assert!(windows.iter().all(|&v| v == 0.0));
    }
}
