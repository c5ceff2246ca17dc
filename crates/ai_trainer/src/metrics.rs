//! Evaluation metrics for binary pronunciation classifiers.

use serde::Serialize;

use crate::errors::TrainerError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// Confusion matrix for a `K`-class classifier.
pub struct ConfusionMatrix {
    /// Number of classes.
    pub n_classes: usize,
    /// Row-major `KxK` counts (`truth * K + predicted`).
    pub counts: Vec<u32>,
}

impl ConfusionMatrix {
    /// Create an empty `KxK` confusion matrix.
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            counts: vec![0; n_classes * n_classes],
        }
    }

    pub fn add(&mut self, truth: usize, predicted: usize) {
        if truth >= self.n_classes || predicted >= self.n_classes {
            return;
        }
        let idx = truth * self.n_classes + predicted;
        self.counts[idx] = self.counts[idx].saturating_add(1);
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u32 {
        self.counts[truth * self.n_classes + predicted]
    }

    /// Number of true examples of `class`
    pub fn support(&self, class: usize) -> u32 {
        (0..self.n_classes).map(|p| self.get(class, p)).sum()
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    /// Rows of the matrix, truth-major
    pub fn rows(&self) -> Vec<Vec<u32>> {
        self.counts
            .chunks(self.n_classes.max(1))
            .map(<[u32]>::to_vec)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
/// Precision/recall statistics for a single class.
pub struct ClassMetrics {
    /// `TP / (TP + FP)`.
    pub precision: f64,
    /// `TP / (TP + FN)`.
    pub recall: f64,
    pub f1: f64,
    /// Total number of true examples for the class.
    pub support: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AveragedMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: u32,
}

/// Test-split evaluation of a classifier
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    /// Fraction of correct predictions in `[0, 1]`
    pub accuracy: f64,
    pub per_class: Vec<ClassMetrics>,
    pub macro_avg: AveragedMetrics,
    pub weighted_avg: AveragedMetrics,
    pub confusion: ConfusionMatrix,
}

impl Evaluation {
    /// Score `predicted` against `truth`
    pub fn compute(
        truth: &[usize],
        predicted: &[usize],
        n_classes: usize,
    ) -> Result<Self, TrainerError> {
        if truth.len() != predicted.len() {
            return Err(TrainerError::Training(format!(
                "{} labels but {} predictions",
                truth.len(),
                predicted.len()
            )));
        }
        if truth.is_empty() {
            return Err(TrainerError::EmptyDataset(
                "nothing to evaluate".to_string(),
            ));
        }

        let mut confusion = ConfusionMatrix::new(n_classes);
        for (&t, &p) in truth.iter().zip(predicted) {
            confusion.add(t, p);
        }

        let per_class = per_class_metrics(&confusion);
        let macro_avg = average(&per_class, false);
        let weighted_avg = average(&per_class, true);

        Ok(Self {
            accuracy: accuracy(&confusion),
            per_class,
            macro_avg,
            weighted_avg,
            confusion,
        })
    }

    /// Accuracy as a percentage in `[0, 100]`
    pub fn accuracy_percent(&self) -> f64 {
        self.accuracy * 100.0
    }

    /// Share of each class's true examples predicted correctly, in percent
    pub fn per_class_accuracy(&self) -> Vec<f64> {
        self.per_class.iter().map(|m| m.recall * 100.0).collect()
    }
}

/// Compute per-class precision, recall and F1 from a confusion matrix.
pub fn per_class_metrics(cm: &ConfusionMatrix) -> Vec<ClassMetrics> {
    let k = cm.n_classes;
    let mut stats = Vec::with_capacity(k);
    for class_idx in 0..k {
        let tp = f64::from(cm.get(class_idx, class_idx));
        let mut fp = 0f64;
        let mut fn_ = 0f64;
        for j in 0..k {
            if j != class_idx {
                fn_ += f64::from(cm.get(class_idx, j));
                fp += f64::from(cm.get(j, class_idx));
            }
        }
        let precision = if tp + fp == 0.0 { 0.0 } else { tp / (tp + fp) };
        let recall = if tp + fn_ == 0.0 { 0.0 } else { tp / (tp + fn_) };
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        stats.push(ClassMetrics {
            precision,
            recall,
            f1,
            support: cm.support(class_idx),
        });
    }
    stats
}

fn average(per_class: &[ClassMetrics], weighted: bool) -> AveragedMetrics {
    let support: u32 = per_class.iter().map(|m| m.support).sum();
    let weight = |m: &ClassMetrics| {
        if weighted {
            f64::from(m.support)
        } else {
            1.0
        }
    };
    let denom: f64 = per_class.iter().map(weight).sum();
    let mean = |f: fn(&ClassMetrics) -> f64| {
        if denom == 0.0 {
            0.0
        } else {
            per_class.iter().map(|m| f(m) * weight(m)).sum::<f64>() / denom
        }
    };

    AveragedMetrics {
        precision: mean(|m| m.precision),
        recall: mean(|m| m.recall),
        f1: mean(|m| m.f1),
        support,
    }
}

/// Compute overall accuracy from a confusion matrix.
pub fn accuracy(cm: &ConfusionMatrix) -> f64 {
    let total = cm.total();
    if total == 0 {
        return 0.0;
    }
    let correct: u32 = (0..cm.n_classes).map(|c| cm.get(c, c)).sum();
    f64::from(correct) / f64::from(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_report() {
        // TN=3 FP=1 FN=2 TP=4
        let truth = vec![0, 0, 0, 0, 1, 1, 1, 1, 1, 1];
        let predicted = vec![0, 0, 0, 1, 0, 0, 1, 1, 1, 1];
        let eval = Evaluation::compute(&truth, &predicted, 2).unwrap();

        assert_eq!(eval.confusion.rows(), vec![vec![3, 1], vec![2, 4]]);
        assert!((eval.accuracy - 0.7).abs() < 1e-12);
        assert!((eval.accuracy_percent() - 70.0).abs() < 1e-9);

        let mis = eval.per_class[0];
        assert!((mis.precision - 0.6).abs() < 1e-12);
        assert!((mis.recall - 0.75).abs() < 1e-12);
        assert_eq!(mis.support, 4);

        let cor = eval.per_class[1];
        assert!((cor.precision - 0.8).abs() < 1e-12);
        assert!((cor.recall - 4.0 / 6.0).abs() < 1e-12);

        let per_class_acc = eval.per_class_accuracy();
        assert!((per_class_acc[0] - 75.0).abs() < 1e-9);
        assert_eq!(eval.weighted_avg.support, 10);
        assert!((eval.macro_avg.precision - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_missing_predictions_for_class() {
        let eval = Evaluation::compute(&[0, 1, 1], &[1, 1, 1], 2).unwrap();
        assert_eq!(eval.per_class[0].precision, 0.0);
        assert_eq!(eval.per_class[0].f1, 0.0);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(Evaluation::compute(&[0, 1], &[0], 2).is_err());
        assert!(Evaluation::compute(&[], &[], 2).is_err());
    }
}
