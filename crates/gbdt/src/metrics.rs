//! Holdout classification metrics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Precision / recall / F1 for one class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Per-class report for a binary classifier, with accuracy and averages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// Indexed by class label (0, 1)
    pub classes: [ClassMetrics; 2],
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
    pub confusion_matrix: [[usize; 2]; 2],
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

impl ClassificationReport {
    /// Build a report from true and predicted 0/1 labels.
    ///
    /// Undefined ratios (zero denominators) are reported as 0.
    pub fn from_predictions(y_true: &[u8], y_pred: &[u8]) -> Self {
        // confusion_matrix[actual][predicted]
        let mut confusion_matrix = [[0usize; 2]; 2];
        for (&actual, &predicted) in y_true.iter().zip(y_pred) {
            confusion_matrix[usize::from(actual.min(1))][usize::from(predicted.min(1))] += 1;
        }

        let total: usize = confusion_matrix.iter().flatten().sum();
        let mut classes = [ClassMetrics::default(); 2];

        for (class, metrics) in classes.iter_mut().enumerate() {
            let tp = confusion_matrix[class][class];
            let predicted = confusion_matrix[0][class] + confusion_matrix[1][class];
            let support = confusion_matrix[class][0] + confusion_matrix[class][1];

            let precision = ratio(tp, predicted);
            let recall = ratio(tp, support);
            *metrics = ClassMetrics {
                precision,
                recall,
                f1_score: f1(precision, recall),
                support,
            };
        }

        let macro_avg = ClassMetrics {
            precision: (classes[0].precision + classes[1].precision) / 2.0,
            recall: (classes[0].recall + classes[1].recall) / 2.0,
            f1_score: (classes[0].f1_score + classes[1].f1_score) / 2.0,
            support: total,
        };

        let weighted = |pick: fn(&ClassMetrics) -> f64| {
            if total == 0 {
                0.0
            } else {
                classes
                    .iter()
                    .map(|c| pick(c) * c.support as f64)
                    .sum::<f64>()
                    / total as f64
            }
        };
        let weighted_avg = ClassMetrics {
            precision: weighted(|c| c.precision),
            recall: weighted(|c| c.recall),
            f1_score: weighted(|c| c.f1_score),
            support: total,
        };

        Self {
            classes,
            accuracy: ratio(confusion_matrix[0][0] + confusion_matrix[1][1], total),
            macro_avg,
            weighted_avg,
            confusion_matrix,
        }
    }

    pub fn support(&self) -> usize {
        self.macro_avg.support
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>14} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        fn row(f: &mut fmt::Formatter<'_>, label: &str, m: &ClassMetrics) -> fmt::Result {
            writeln!(
                f,
                "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                label, m.precision, m.recall, m.f1_score, m.support
            )
        }

        row(f, "0", &self.classes[0])?;
        row(f, "1", &self.classes[1])?;
        writeln!(
            f,
            "{:>14} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.support()
        )?;
        row(f, "macro avg", &self.macro_avg)?;
        row(f, "weighted avg", &self.weighted_avg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_values() {
        let y_true = [1, 1, 1, 0, 0];
        let y_pred = [1, 1, 0, 0, 1];
        let report = ClassificationReport::from_predictions(&y_true, &y_pred);

        assert_eq!(report.confusion_matrix, [[1, 1], [1, 2]]);
        assert!((report.classes[1].precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((report.classes[1].recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((report.classes[0].precision - 0.5).abs() < 1e-12);
        assert_eq!(report.classes[0].support, 2);
        assert_eq!(report.classes[1].support, 3);
        assert!((report.accuracy - 0.6).abs() < 1e-12);
        assert_eq!(report.support(), 5);
    }

    #[test]
    fn test_zero_division_is_zero() {
        let report = ClassificationReport::from_predictions(&[0, 0], &[0, 0]);
        assert_eq!(report.classes[1].precision, 0.0);
        assert_eq!(report.classes[1].recall, 0.0);
        assert_eq!(report.classes[1].f1_score, 0.0);
        assert_eq!(report.accuracy, 1.0);

        let empty = ClassificationReport::from_predictions(&[], &[]);
        assert_eq!(empty.accuracy, 0.0);
        assert_eq!(empty.weighted_avg.f1_score, 0.0);
    }

    #[test]
    fn test_display_lists_both_classes() {
        let text = ClassificationReport::from_predictions(&[0, 1], &[0, 1]).to_string();
        assert!(text.contains("precision"));
        assert!(text.contains("macro avg"));
        assert!(text.contains("weighted avg"));
    }
}
