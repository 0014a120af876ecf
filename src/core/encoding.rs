//! Activity label encoding.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Bijection between activity strings and contiguous class indices.
///
/// Classes are ordered lexicographically, so each label maps to its rank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fit on every observed label.
    pub fn fit<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let classes: Vec<String> = labels
            .into_iter()
            .map(|l| l.as_ref().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Self { classes }
    }

    /// Class index of a label.
    pub fn encode(&self, label: &str) -> Result<usize, EncodingError> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .map_err(|_| EncodingError::UnknownLabel(label.to_string()))
    }

    /// Encode a whole label list.
    pub fn encode_all<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>, EncodingError> {
        labels.iter().map(|l| self.encode(l.as_ref())).collect()
    }

    /// Label of a class index.
    pub fn decode(&self, class: usize) -> Option<&str> {
        self.classes.get(class).map(String::as_str)
    }

    /// All classes in index order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Check if no label was seen.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Label encoding errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    UnknownLabel(String),
}

impl std::fmt::Display for EncodingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodingError::UnknownLabel(label) => write!(f, "Unknown label: {label}"),
        }
    }
}

impl std::error::Error for EncodingError {}
