//! Merge mirrored per-modality CSV trees into one wide, long table.

use crate::config::SourceConfig;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// One sensor type contributing a block of columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    DeviceMotion,
    Accelerometer,
    Gyroscope,
}

impl Modality {
    /// All modalities in column order.
    pub const ALL: [Modality; 3] = [
        Modality::DeviceMotion,
        Modality::Accelerometer,
        Modality::Gyroscope,
    ];

    /// Column prefix for this modality.
    pub fn prefix(&self) -> &'static str {
        match self {
            Modality::DeviceMotion => "devicemotion",
            Modality::Accelerometer => "accelerometer",
            Modality::Gyroscope => "gyroscope",
        }
    }

    fn root<'a>(&self, sources: &'a SourceConfig) -> &'a Path {
        match self {
            Modality::DeviceMotion => &sources.device_motion,
            Modality::Accelerometer => &sources.accelerometer,
            Modality::Gyroscope => &sources.gyroscope,
        }
    }
}

/// How an activity label is derived from its folder name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    /// The folder name as-is (`walking`)
    #[default]
    FolderName,
    /// The folder name without a trailing `_<digits>` suffix (`wlk_7` -> `wlk`)
    FolderPrefix,
}

impl LabelSource {
    /// Derive the activity label for a folder.
    pub fn label_for(&self, folder: &str) -> String {
        match self {
            LabelSource::FolderName => folder.to_string(),
            LabelSource::FolderPrefix => match folder.rsplit_once('_') {
                Some((head, tail))
                    if !head.is_empty()
                        && !tail.is_empty()
                        && tail.chars().all(|c| c.is_ascii_digit()) =>
                {
                    head.to_string()
                }
                _ => folder.to_string(),
            },
        }
    }
}

/// One recorded activity session with all modality columns side by side.
#[derive(Debug, Clone)]
pub struct Trial {
    /// Activity label for every row of the trial
    pub activity: String,
    /// `<activity folder>/<file>` shared by the three trees
    pub relative_path: PathBuf,
    /// Modality-prefixed column names
    pub columns: Vec<String>,
    /// Row-major values, `columns.len()` per row
    pub values: Vec<f64>,
}

impl Trial {
    /// Number of rows.
    pub fn len(&self) -> usize {
        if self.columns.is_empty() {
            0
        } else {
            self.values.len() / self.columns.len()
        }
    }

    /// Check if the trial has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a single row.
    pub fn row(&self, index: usize) -> &[f64] {
        let width = self.columns.len();
        &self.values[index * width..(index + 1) * width]
    }
}

/// Location of one trial inside a [`MergedTable`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialSpan {
    pub activity: String,
    pub relative_path: PathBuf,
    /// First row of the trial in the merged table
    pub start: usize,
    /// Number of rows
    pub len: usize,
}

impl TrialSpan {
    /// One past the last row.
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// All accepted trials stacked row-wise over a shared column set.
#[derive(Debug, Clone)]
pub struct MergedTable {
    columns: Vec<String>,
    values: Vec<f64>,
    spans: Vec<TrialSpan>,
}

impl MergedTable {
    /// Stack trials into one table, aligning columns by name.
    ///
    /// Columns missing from a trial are NaN for its rows.
    pub fn from_trials(trials: Vec<Trial>) -> Result<Self, DatasetError> {
        if trials.is_empty() {
            return Err(DatasetError::NoData);
        }

        let mut columns: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for trial in &trials {
            for name in &trial.columns {
                if !index.contains_key(name) {
                    index.insert(name.clone(), columns.len());
                    columns.push(name.clone());
                }
            }
        }

        let width = columns.len();
        let total_rows: usize = trials.iter().map(Trial::len).sum();
        let mut values = vec![f64::NAN; total_rows * width];
        let mut spans = Vec::with_capacity(trials.len());
        let mut start = 0;

        for trial in trials {
            let mapping: Vec<usize> = trial.columns.iter().map(|c| index[c]).collect();
            let len = trial.len();
            for r in 0..len {
                let dst = (start + r) * width;
                for (src_col, &dst_col) in trial.row(r).iter().zip(&mapping) {
                    values[dst + dst_col] = *src_col;
                }
            }
            spans.push(TrialSpan {
                activity: trial.activity,
                relative_path: trial.relative_path,
                start,
                len,
            });
            start += len;
        }

        Ok(Self {
            columns,
            values,
            spans,
        })
    }

    /// Feature column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of feature columns.
    pub fn feature_count(&self) -> usize {
        self.columns.len()
    }

    /// Total number of rows across all trials.
    pub fn row_count(&self) -> usize {
        self.spans.iter().map(|s| s.len).sum()
    }

    /// Trial boundaries in row order.
    pub fn trials(&self) -> &[TrialSpan] {
        &self.spans
    }

    /// Get a single row.
    pub fn row(&self, index: usize) -> &[f64] {
        let width = self.columns.len();
        &self.values[index * width..(index + 1) * width]
    }

    /// Activity label of a row.
    pub fn label_at(&self, row: usize) -> Option<&str> {
        let pos = self.spans.partition_point(|s| s.end() <= row);
        self.spans
            .get(pos)
            .filter(|s| row >= s.start && row < s.end())
            .map(|s| s.activity.as_str())
    }
}

/// Outcome counters of a merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeSummary {
    pub accepted_trials: usize,
    /// Trials missing from at least one modality tree
    pub skipped_trials: usize,
    pub rows: usize,
    pub columns: usize,
}

/// Walk the three trees and merge every fully mirrored trial.
///
/// A trial present in some but not all trees is skipped without error.
pub fn merge_modalities(
    sources: &SourceConfig,
) -> Result<(MergedTable, MergeSummary), DatasetError> {
    let candidates = list_trials(&sources.device_motion)?;
    let mut trials = Vec::new();
    let mut skipped = 0;

    for (folder, relative_path) in candidates {
        let mirrored = Modality::ALL
            .iter()
            .all(|m| m.root(sources).join(&relative_path).is_file());
        if !mirrored {
            tracing::debug!(path = %relative_path.display(), "trial not present in all modalities, skipping");
            skipped += 1;
            continue;
        }

        let activity = sources.label_source.label_for(&folder);
        trials.push(load_trial(sources, &relative_path, activity)?);
    }

    let table = MergedTable::from_trials(trials)?;
    let summary = MergeSummary {
        accepted_trials: table.trials().len(),
        skipped_trials: skipped,
        rows: table.row_count(),
        columns: table.feature_count(),
    };

    tracing::info!(
        trials = summary.accepted_trials,
        skipped = summary.skipped_trials,
        rows = summary.rows,
        columns = summary.columns,
        "merged modality trees"
    );

    Ok((table, summary))
}

/// Load one trial from all three trees and join its columns.
///
/// Shorter modality files are NaN-padded to the longest one.
pub fn load_trial(
    sources: &SourceConfig,
    relative_path: &Path,
    activity: String,
) -> Result<Trial, DatasetError> {
    let mut blocks = Vec::with_capacity(Modality::ALL.len());
    for modality in Modality::ALL {
        let path = modality.root(sources).join(relative_path);
        blocks.push(read_modality_csv(&path, modality)?);
    }

    let columns: Vec<String> = blocks.iter().flat_map(|b| b.columns.clone()).collect();
    let width = columns.len();
    let len = blocks.iter().map(CsvBlock::len).max().unwrap_or(0);
    let mut values = vec![f64::NAN; len * width];

    let mut offset = 0;
    for block in &blocks {
        let block_width = block.columns.len();
        for r in 0..block.len() {
            let src = &block.values[r * block_width..(r + 1) * block_width];
            let dst = r * width + offset;
            values[dst..dst + block_width].copy_from_slice(src);
        }
        offset += block_width;
    }

    Ok(Trial {
        activity,
        relative_path: relative_path.to_path_buf(),
        columns,
        values,
    })
}

/// Parsed columns of one modality file.
struct CsvBlock {
    columns: Vec<String>,
    values: Vec<f64>,
}

impl CsvBlock {
    fn len(&self) -> usize {
        if self.columns.is_empty() {
            0
        } else {
            self.values.len() / self.columns.len()
        }
    }
}

fn read_modality_csv(path: &Path, modality: Modality) -> Result<CsvBlock, DatasetError> {
    let csv_err = |source| DatasetError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    // Unnamed header cells are a row index, not a measurement
    let headers = reader.headers().map_err(csv_err)?.clone();
    let mut seen = HashSet::new();
    let kept: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(_, name)| !name.trim().is_empty())
        .map(|(i, name)| {
            let name = unique_name(name.trim(), &mut seen);
            (i, format!("{}_{}", modality.prefix(), name))
        })
        .collect();

    let mut values = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        for (i, _) in &kept {
            let value = record
                .get(*i)
                .and_then(|cell| cell.trim().parse::<f64>().ok())
                .unwrap_or(f64::NAN);
            values.push(value);
        }
    }

    Ok(CsvBlock {
        columns: kept.into_iter().map(|(_, name)| name).collect(),
        values,
    })
}

/// Suffix repeated header names with `.1`, `.2`, ... so no column is lost.
fn unique_name(base: &str, seen: &mut HashSet<String>) -> String {
    let mut name = base.to_string();
    let mut k = 0;
    while !seen.insert(name.clone()) {
        k += 1;
        name = format!("{base}.{k}");
    }
    name
}

/// List `(activity folder, relative path)` for every CSV under a root.
fn list_trials(root: &Path) -> Result<Vec<(String, PathBuf)>, DatasetError> {
    let mut trials = Vec::new();

    for activity_dir in sorted_entries(root)? {
        if !activity_dir.is_dir() {
            continue;
        }
        let Some(folder) = activity_dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let folder = folder.to_string();

        for file in sorted_entries(&activity_dir)? {
            let is_csv = file
                .extension()
                .map(|e| e.eq_ignore_ascii_case("csv"))
                .unwrap_or(false);
            if !file.is_file() || !is_csv {
                continue;
            }
            if let Some(name) = file.file_name() {
                trials.push((folder.clone(), Path::new(&folder).join(name)));
            }
        }
    }

    Ok(trials)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let io_err = |source| DatasetError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = std::fs::read_dir(dir)
        .map_err(io_err)?
        .map(|e| e.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    entries.sort();
    Ok(entries)
}

/// Dataset loading errors.
#[derive(Debug)]
pub enum DatasetError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Csv {
        path: PathBuf,
        source: csv::Error,
    },
    /// No trial was present in all three modality trees
    NoData,
}

impl std::fmt::Display for DatasetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetError::Io { path, source } => {
                write!(f, "IO error reading {}: {source}", path.display())
            }
            DatasetError::Csv { path, source } => {
                write!(f, "CSV error in {}: {source}", path.display())
            }
            DatasetError::NoData => write!(f, "No data: no trial found in all three modalities"),
        }
    }
}

impl std::error::Error for DatasetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DatasetError::Io { source, .. } => Some(source),
            DatasetError::Csv { source, .. } => Some(source),
            DatasetError::NoData => None,
        }
    }
}
