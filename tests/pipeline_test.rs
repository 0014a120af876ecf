//! Integration tests for the merge -> window -> split -> train pipeline

use burn::backend::{Autodiff, NdArray};
use std::path::Path;
use synheart_activity::config::{Config, SourceConfig};
use synheart_activity::core::SplitError;
use synheart_activity::{Pipeline, PipelineError};
use tempfile::TempDir;

type TestBackend = Autodiff<NdArray<f32>>;

/// Write one modality file: an unnamed index column plus three signals.
fn write_modality(root: &Path, rel: &str, rows: usize, phase: f64) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut content = String::from(",x,y,z\n");
    for r in 0..rows {
        let t = r as f64 * 0.1 + phase;
        content.push_str(&format!("{r},{},{},{}\n", t.sin(), t.cos(), (2.0 * t).sin()));
    }
    std::fs::write(path, content).unwrap();
}

fn write_trial(dir: &TempDir, rel: &str, rows: usize, phase: f64) {
    for modality in ["motion", "accel", "gyro"] {
        write_modality(&dir.path().join(modality), rel, rows, phase);
    }
}

fn config(dir: &TempDir) -> Config {
    Config {
        sources: SourceConfig::new(
            dir.path().join("motion"),
            dir.path().join("accel"),
            dir.path().join("gyro"),
        ),
        output_path: dir.path().join("runs"),
        window_size: 100,
        stride: 50,
        test_ratio: 0.2,
        batch_size: 2,
        epochs: 1,
        prefetch_batches: 1,
        ..Config::default()
    }
}

#[test]
fn test_two_activities_window_and_split() {
    let dir = TempDir::new().unwrap();
    write_trial(&dir, "walking/sub_1.csv", 250, 0.0);
    write_trial(&dir, "jogging/sub_1.csv", 250, 1.0);

    let pipeline = Pipeline::new(config(&dir)).unwrap();
    let data = pipeline.prepare().unwrap();

    assert_eq!(data.merge.accepted_trials, 2);
    assert_eq!(data.merge.columns, 9);
    assert_eq!(data.feature_names.len(), 9);
    assert_eq!(data.window_count(), 6);
    assert_eq!(data.class_counts.get("walking"), Some(&3));
    assert_eq!(data.class_counts.get("jogging"), Some(&3));
    assert_eq!(data.encoder.classes(), &["jogging", "walking"]);

    assert_eq!(data.train.len(), 4);
    assert_eq!(data.test.len(), 2);
    for class in 0..2 {
        assert!(data.train.labels().contains(&class));
        assert!(data.test.labels().contains(&class));
    }

    assert_eq!(data.train.window_size(), 100);
    assert_eq!(data.train.feature_count(), 9);
    assert!(data.train.windows().iter().all(|v| v.is_finite()));
}

#[test]
fn test_partial_trial_is_skipped() {
    let dir = TempDir::new().unwrap();
    write_trial(&dir, "walking/sub_1.csv", 250, 0.0);
    write_trial(&dir, "jogging/sub_1.csv", 250, 1.0);
    // Missing from the gyroscope tree
    write_modality(&dir.path().join("motion"), "jogging/sub_2.csv", 250, 2.0);
    write_modality(&dir.path().join("accel"), "jogging/sub_2.csv", 250, 2.0);

    let pipeline = Pipeline::new(config(&dir)).unwrap();
    let data = pipeline.prepare().unwrap();

    assert_eq!(data.merge.accepted_trials, 2);
    assert_eq!(data.merge.skipped_trials, 1);
    assert_eq!(data.window_count(), 6);
}

#[test]
fn test_single_window_class_fails_split() {
    let dir = TempDir::new().unwrap();
    write_trial(&dir, "walking/sub_1.csv", 250, 0.0);
    write_trial(&dir, "sitting/sub_1.csv", 150, 1.0);

    let pipeline = Pipeline::new(config(&dir)).unwrap();
    let err = pipeline.prepare().unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Split(SplitError::ClassTooSmall { count: 1, .. })
    ));
}

#[test]
fn test_trials_shorter_than_window() {
    let dir = TempDir::new().unwrap();
    write_trial(&dir, "walking/sub_1.csv", 80, 0.0);

    let pipeline = Pipeline::new(config(&dir)).unwrap();
    let err = pipeline.prepare().unwrap_err();
    assert!(matches!(err, PipelineError::NoWindows { window_size: 100 }));
}

#[test]
fn test_empty_tree_is_an_error() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("motion")).unwrap();

    let pipeline = Pipeline::new(config(&dir)).unwrap();
    assert!(matches!(
        pipeline.prepare().unwrap_err(),
        PipelineError::Dataset(_)
    ));
}

#[test]
fn test_invalid_config_rejected() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(&dir);
    cfg.stride = 0;
    assert!(matches!(
        Pipeline::new(cfg).unwrap_err(),
        PipelineError::Config(_)
    ));
}

#[test]
fn test_end_to_end_training_run() {
    let dir = TempDir::new().unwrap();
    write_trial(&dir, "walking/sub_1.csv", 250, 0.0);
    write_trial(&dir, "jogging/sub_1.csv", 250, 1.0);

    let pipeline = Pipeline::new(config(&dir)).unwrap();
    let data = pipeline.prepare().unwrap();

    let mut seen = Vec::new();
    let report = pipeline
        .train::<TestBackend, _>(&data, Default::default(), None, |m| seen.push(m.epoch))
        .unwrap();

    assert_eq!(seen, vec![1]);
    assert_eq!(report.history.epochs.len(), 1);
    assert!(!report.history.interrupted);
    assert_eq!(report.train_windows, 4);
    assert_eq!(report.test_windows, 2);
    assert_eq!(report.confusion.total(), 2);
    assert_eq!(report.samples.len(), 2);
    assert!((0.0..=1.0).contains(&report.report.accuracy));

    let path = report.save(&pipeline.config().output_path).unwrap();
    assert!(path.exists());
}
