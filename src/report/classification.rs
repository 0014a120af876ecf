//! Confusion matrix and per-class precision/recall/F1.

use serde::{Deserialize, Serialize};

/// Counts of (true class, predicted class) pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub classes: Vec<String>,
    /// `counts[truth][predicted]`
    pub counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Tally predictions against ground truth.
    ///
    /// Pairs whose class index is out of range are ignored.
    pub fn from_predictions(classes: &[String], truth: &[usize], predicted: &[usize]) -> Self {
        let k = classes.len();
        let mut counts = vec![vec![0; k]; k];
        for (&t, &p) in truth.iter().zip(predicted) {
            if t < k && p < k {
                counts[t][p] += 1;
            }
        }
        Self {
            classes: classes.to_vec(),
            counts,
        }
    }

    /// Total number of tallied samples.
    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    /// Fraction of samples on the diagonal.
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let correct: usize = (0..self.classes.len()).map(|i| self.counts[i][i]).sum();
        correct as f64 / total as f64
    }

    /// Samples whose true class is `class`.
    pub fn support(&self, class: usize) -> usize {
        self.counts[class].iter().sum()
    }

    /// Samples predicted as `class`.
    pub fn predicted_count(&self, class: usize) -> usize {
        self.counts.iter().map(|row| row[class]).sum()
    }

    /// Text heatmap: counts with a shade per cell relative to its row.
    pub fn render(&self) -> String {
        const SHADES: [char; 5] = [' ', '░', '▒', '▓', '█'];

        let label_width = self
            .classes
            .iter()
            .map(String::len)
            .max()
            .unwrap_or(0)
            .max("true\\pred".len());
        let cell_width = self
            .counts
            .iter()
            .flatten()
            .map(|c| c.to_string().len())
            .max()
            .unwrap_or(1)
            .max(self.classes.iter().map(String::len).max().unwrap_or(0))
            + 2;

        let mut out = format!("{:>label_width$} ", "true\\pred");
        for class in &self.classes {
            out.push_str(&format!("{class:>cell_width$}"));
        }
        out.push('\n');

        for (i, row) in self.counts.iter().enumerate() {
            let support = self.support(i).max(1) as f64;
            out.push_str(&format!("{:>label_width$} ", self.classes[i]));
            for &count in row {
                let level = ((count as f64 / support) * (SHADES.len() - 1) as f64).round() as usize;
                let cell = format!("{}{count}", SHADES[level.min(SHADES.len() - 1)]);
                out.push_str(&format!("{cell:>cell_width$}"));
            }
            out.push('\n');
        }
        out
    }
}

/// Scores of one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScores {
    pub class: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class scores plus accuracy and averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub per_class: Vec<ClassScores>,
    pub accuracy: f64,
    pub macro_avg: ClassScores,
    pub weighted_avg: ClassScores,
}

impl ClassificationReport {
    /// Derive scores from a confusion matrix; undefined ratios count as zero.
    pub fn from_confusion(matrix: &ConfusionMatrix) -> Self {
        let per_class: Vec<ClassScores> = matrix
            .classes
            .iter()
            .enumerate()
            .map(|(i, class)| {
                let tp = matrix.counts[i][i] as f64;
                let support = matrix.support(i);
                let precision = ratio(tp, matrix.predicted_count(i) as f64);
                let recall = ratio(tp, support as f64);
                let f1 = ratio(2.0 * precision * recall, precision + recall);
                ClassScores {
                    class: class.clone(),
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect();

        let total = matrix.total();
        let k = per_class.len().max(1) as f64;
        let macro_avg = ClassScores {
            class: "macro avg".to_string(),
            precision: per_class.iter().map(|s| s.precision).sum::<f64>() / k,
            recall: per_class.iter().map(|s| s.recall).sum::<f64>() / k,
            f1: per_class.iter().map(|s| s.f1).sum::<f64>() / k,
            support: total,
        };

        let weight = |f: fn(&ClassScores) -> f64| {
            ratio(
                per_class.iter().map(|s| f(s) * s.support as f64).sum(),
                total as f64,
            )
        };
        let weighted_avg = ClassScores {
            class: "weighted avg".to_string(),
            precision: weight(|s| s.precision),
            recall: weight(|s| s.recall),
            f1: weight(|s| s.f1),
            support: total,
        };

        Self {
            per_class,
            accuracy: matrix.accuracy(),
            macro_avg,
            weighted_avg,
        }
    }

    /// Tabular text report.
    pub fn render(&self) -> String {
        let width = self
            .per_class
            .iter()
            .map(|s| s.class.len())
            .chain(["weighted avg".len()])
            .max()
            .unwrap_or(12);

        let mut out = format!(
            "{:>width$}  {:>9}  {:>9}  {:>9}  {:>9}\n\n",
            "", "precision", "recall", "f1-score", "support"
        );
        for s in &self.per_class {
            out.push_str(&score_line(s, width));
        }
        out.push('\n');
        out.push_str(&format!(
            "{:>width$}  {:>9}  {:>9}  {:>9.2}  {:>9}\n",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        ));
        out.push_str(&score_line(&self.macro_avg, width));
        out.push_str(&score_line(&self.weighted_avg, width));
        out
    }
}

fn score_line(s: &ClassScores, width: usize) -> String {
    format!(
        "{:>width$}  {:>9.2}  {:>9.2}  {:>9.2}  {:>9}\n",
        s.class, s.precision, s.recall, s.f1, s.support
    )
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes() -> Vec<String> {
        vec!["jogging".to_string(), "walking".to_string()]
    }

    #[test]
    fn test_confusion_counts() {
        let matrix = ConfusionMatrix::from_predictions(&classes(), &[0, 0, 1, 1, 1], &[0, 1, 1, 1, 0]);
        assert_eq!(matrix.counts, vec![vec![1, 1], vec![1, 2]]);
        assert_eq!(matrix.total(), 5);
        assert!((matrix.accuracy() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_report_scores() {
        let matrix = ConfusionMatrix::from_predictions(&classes(), &[0, 0, 1, 1, 1], &[0, 1, 1, 1, 0]);
        let report = ClassificationReport::from_confusion(&matrix);

        let jog = &report.per_class[0];
        assert!((jog.precision - 0.5).abs() < 1e-12);
        assert!((jog.recall - 0.5).abs() < 1e-12);
        assert_eq!(jog.support, 2);

        let walk = &report.per_class[1];
        assert!((walk.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((walk.recall - 2.0 / 3.0).abs() < 1e-12);

        assert!((report.macro_avg.recall - (0.5 + 2.0 / 3.0) / 2.0).abs() < 1e-12);
        assert!((report.weighted_avg.recall - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_unpredicted_class_scores_zero() {
        let matrix = ConfusionMatrix::from_predictions(&classes(), &[0, 1], &[1, 1]);
        let report = ClassificationReport::from_confusion(&matrix);
        assert_eq!(report.per_class[0].precision, 0.0);
        assert_eq!(report.per_class[0].f1, 0.0);
    }

    #[test]
    fn test_render_mentions_every_class() {
        let matrix = ConfusionMatrix::from_predictions(&classes(), &[0, 1], &[0, 1]);
        let report = ClassificationReport::from_confusion(&matrix).render();
        assert!(report.contains("jogging"));
        assert!(report.contains("weighted avg"));

        let heatmap = matrix.render();
        assert_eq!(heatmap.lines().count(), 3);
        assert!(heatmap.contains('█'));
    }
}
