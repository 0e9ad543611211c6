//! Metrics Module for binary classification
//!
//! Confusion matrix and per-class precision/recall/F1/support, indexed by
//! [`Label::class_index`].

use serde::{Deserialize, Serialize};

use crate::dataset::Label;

/// 2x2 confusion matrix, `matrix[true][predicted]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryConfusionMatrix {
    pub matrix: [[usize; 2]; 2],
}

impl BinaryConfusionMatrix {
    pub fn from_predictions(predictions: &[Label], ground_truth: &[Label]) -> Self {
        let mut cm = Self::default();
        for (&pred, &truth) in predictions.iter().zip(ground_truth.iter()) {
            cm.add(truth, pred);
        }
        cm
    }

    pub fn add(&mut self, truth: Label, predicted: Label) {
        self.matrix[truth.class_index()][predicted.class_index()] += 1;
    }

    pub fn get(&self, truth: Label, predicted: Label) -> usize {
        self.matrix[truth.class_index()][predicted.class_index()]
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }

    pub fn correct(&self) -> usize {
        self.matrix[0][0] + self.matrix[1][1]
    }

    /// Number of samples whose true label is `label`
    pub fn support(&self, label: Label) -> usize {
        self.matrix[label.class_index()].iter().sum()
    }

    pub fn predicted_count(&self, label: Label) -> usize {
        let c = label.class_index();
        self.matrix[0][c] + self.matrix[1][c]
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.correct() as f64 / total as f64
        }
    }
}

/// Metrics for one class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    #[serde(alias = "f1-score")]
    pub f1: f64,
    pub support: usize,
}

impl ClassMetrics {
    /// Undefined ratios (zero denominator) are reported as 0.0
    pub fn from_confusion_matrix(cm: &BinaryConfusionMatrix, label: Label) -> Self {
        let tp = cm.get(label, label);
        let predicted = cm.predicted_count(label);
        let support = cm.support(label);

        let precision = ratio(tp, predicted);
        let recall = ratio(tp, support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            precision,
            recall,
            f1,
            support,
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
