//! Stratified train/test split of encoded windows.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Window indices of each split, ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Split class indices so every class lands in both splits.
///
/// Each class of size `c` sends `round(c * test_ratio)` members to the test
/// split, clamped to `[1, c - 1]`. Members are shuffled with `seed` first.
pub fn stratified_split(
    labels: &[usize],
    test_ratio: f64,
    seed: u64,
) -> Result<SplitIndices, SplitError> {
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(SplitError::InvalidRatio(test_ratio));
    }

    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &class) in labels.iter().enumerate() {
        by_class.entry(class).or_default().push(i);
    }

    if let Some((&class, members)) = by_class.iter().find(|(_, m)| m.len() < 2) {
        return Err(SplitError::ClassTooSmall {
            class,
            count: members.len(),
        });
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut split = SplitIndices::default();

    for members in by_class.values_mut() {
        members.shuffle(&mut rng);
        let c = members.len();
        let n_test = ((c as f64 * test_ratio).round() as usize).clamp(1, c - 1);
        split.test.extend_from_slice(&members[..n_test]);
        split.train.extend_from_slice(&members[n_test..]);
    }

    split.train.sort_unstable();
    split.test.sort_unstable();
    Ok(split)
}

/// Split errors.
#[derive(Debug, Clone, PartialEq)]
pub enum SplitError {
    InvalidRatio(f64),
    /// Stratification needs at least two members per class
    ClassTooSmall { class: usize, count: usize },
}

impl std::fmt::Display for SplitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SplitError::InvalidRatio(r) => write!(f, "Test ratio must be in (0, 1), got {r}"),
            SplitError::ClassTooSmall { class, count } => write!(
                f,
                "Class {class} has {count} sample(s); at least 2 are needed to stratify"
            ),
        }
    }
}

impl std::error::Error for SplitError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_class_in_both_splits() {
        let labels = vec![0, 0, 0, 1, 1, 1];
        let split = stratified_split(&labels, 0.2, 42).unwrap();

        assert_eq!(split.train.len(), 4);
        assert_eq!(split.test.len(), 2);
        for class in [0, 1] {
            assert!(split.train.iter().any(|&i| labels[i] == class));
            assert!(split.test.iter().any(|&i| labels[i] == class));
        }
    }

    #[test]
    fn test_split_is_a_partition() {
        let labels: Vec<usize> = (0..103).map(|i| i % 4).collect();
        let split = stratified_split(&labels, 0.2, 7).unwrap();

        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..103).collect::<Vec<_>>());
        assert!(split.test.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_same_seed_same_split() {
        let labels: Vec<usize> = (0..50).map(|i| i % 3).collect();
        assert_eq!(
            stratified_split(&labels, 0.3, 1).unwrap(),
            stratified_split(&labels, 0.3, 1).unwrap()
        );
    }

    #[test]
    fn test_singleton_class_is_rejected() {
        let labels = vec![0, 0, 0, 1];
        assert_eq!(
            stratified_split(&labels, 0.2, 42),
            Err(SplitError::ClassTooSmall { class: 1, count: 1 })
        );
    }

    #[test]
    fn test_invalid_ratio() {
        assert!(matches!(
            stratified_split(&[0, 0], 0.0, 1),
            Err(SplitError::InvalidRatio(_))
        ));
    }
}
