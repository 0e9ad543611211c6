//! Evaluation report artifact
//!
//! Serialized as pretty JSON. The `classification_report` section uses the
//! familiar layout of one row per class name plus `accuracy`, `macro avg`
//! and `weighted avg`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::{Label, LabelScheme};
use crate::model::ModelKind;
use crate::utils::error::{PipelineError, Result, ResultExt};
use crate::utils::metrics::{BinaryConfusionMatrix, ClassMetrics};
use crate::utils::write_atomic;

/// Per-class and aggregate metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    #[serde(flatten)]
    pub classes: BTreeMap<String, ClassMetrics>,
    pub accuracy: f64,
    #[serde(rename = "macro avg")]
    pub macro_avg: ClassMetrics,
    #[serde(rename = "weighted avg")]
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    pub fn from_confusion_matrix(cm: &BinaryConfusionMatrix, labels: &LabelScheme) -> Self {
        let per_label: Vec<(Label, ClassMetrics)> = Label::ALL
            .iter()
            .map(|&label| (label, ClassMetrics::from_confusion_matrix(cm, label)))
            .collect();

        let total = cm.total();
        let n = per_label.len() as f64;
        let macro_avg = ClassMetrics {
            precision: per_label.iter().map(|(_, m)| m.precision).sum::<f64>() / n,
            recall: per_label.iter().map(|(_, m)| m.recall).sum::<f64>() / n,
            f1: per_label.iter().map(|(_, m)| m.f1).sum::<f64>() / n,
            support: total,
        };
        let weighted = |f: fn(&ClassMetrics) -> f64| -> f64 {
            if total == 0 {
                return 0.0;
            }
            per_label
                .iter()
                .map(|(_, m)| f(m) * m.support as f64)
                .sum::<f64>()
                / total as f64
        };
        let weighted_avg = ClassMetrics {
            precision: weighted(|m| m.precision),
            recall: weighted(|m| m.recall),
            f1: weighted(|m| m.f1),
            support: total,
        };

        Self {
            classes: per_label
                .into_iter()
                .map(|(label, m)| (labels.dir_name(label).to_string(), m))
                .collect(),
            accuracy: cm.accuracy(),
            macro_avg,
            weighted_avg,
        }
    }

    /// Row for a class name
    pub fn class(&self, name: &str) -> Option<&ClassMetrics> {
        self.classes.get(name)
    }
}

/// Raw score and decision for one test sample, in evaluation order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePrediction {
    pub path: PathBuf,
    pub label: Label,
    pub score: f32,
    pub predicted: Label,
}

/// Outcome of evaluating one checkpoint at one threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub model_path: String,
    pub model_name: ModelKind,
    pub threshold: f64,
    pub labels: LabelScheme,
    pub classification_report: ClassificationReport,
    pub confusion_matrix: BinaryConfusionMatrix,
    pub num_samples: usize,
    /// Test samples that failed to decode
    pub skipped_samples: usize,
    pub evaluated_at: String,
    pub predictions: Vec<SamplePrediction>,
}

impl EvaluationReport {
    /// Binarize `scores` (aligned with `samples`) and compute every metric
    pub fn from_scores(
        model_path: &Path,
        model_name: ModelKind,
        threshold: f64,
        labels: &LabelScheme,
        samples: Vec<(PathBuf, Label)>,
        scores: &[f32],
        skipped_samples: usize,
    ) -> Self {
        let mut confusion_matrix = BinaryConfusionMatrix::default();
        let predictions: Vec<SamplePrediction> = samples
            .into_iter()
            .zip(scores.iter().copied())
            .map(|((path, label), score)| {
                let predicted = Label::from_score(score, threshold);
                confusion_matrix.add(label, predicted);
                SamplePrediction {
                    path,
                    label,
                    score,
                    predicted,
                }
            })
            .collect();

        Self {
            model_path: model_path.display().to_string(),
            model_name,
            threshold,
            labels: labels.clone(),
            classification_report: ClassificationReport::from_confusion_matrix(
                &confusion_matrix,
                labels,
            ),
            num_samples: predictions.len(),
            confusion_matrix,
            skipped_samples,
            evaluated_at: Utc::now().to_rfc3339(),
            predictions,
        }
    }

    /// Metrics of the positive class
    pub fn positive(&self) -> ClassMetrics {
        ClassMetrics::from_confusion_matrix(&self.confusion_matrix, Label::Positive)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())?;
        info!("Evaluation report saved to {:?}", path);
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).at_path(path)?;
        serde_json::from_str(&json).map_err(|e| {
            PipelineError::Serialization(format!("Failed to read report {:?}: {}", path, e))
        })
    }

    /// Print a human-readable summary to stdout
    pub fn print_summary(&self) {
        println!("{}", self);
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Model: {} ({}), threshold {:.3}, {} samples ({} skipped)",
            self.model_path, self.model_name, self.threshold, self.num_samples, self.skipped_samples
        )?;
        writeln!(
            f,
            "{:>16} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1", "support"
        )?;
        for label in Label::ALL {
            let name = self.labels.dir_name(label);
            if let Some(m) = self.classification_report.class(name) {
                writeln!(
                    f,
                    "{:>16} {:>10.4} {:>10.4} {:>10.4} {:>10}",
                    name, m.precision, m.recall, m.f1, m.support
                )?;
            }
        }
        writeln!(f, "{:>16} {:>43.4}", "accuracy", self.classification_report.accuracy)?;
        for (name, m) in [
            ("macro avg", &self.classification_report.macro_avg),
            ("weighted avg", &self.classification_report.weighted_avg),
        ] {
            writeln!(
                f,
                "{:>16} {:>10.4} {:>10.4} {:>10.4} {:>10}",
                name, m.precision, m.recall, m.f1, m.support
            )?;
        }
        let cm = &self.confusion_matrix;
        write!(
            f,
            "Confusion matrix [true x predicted]: [[{}, {}], [{}, {}]]",
            cm.matrix[0][0], cm.matrix[0][1], cm.matrix[1][0], cm.matrix[1][1]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Label::{Negative as N, Positive as P};

    fn report(truth: &[Label], scores: &[f32], threshold: f64) -> EvaluationReport {
        let samples = truth
            .iter()
            .enumerate()
            .map(|(i, &l)| (PathBuf::from(format!("{i}.png")), l))
            .collect();
        EvaluationReport::from_scores(
            Path::new("models/baseline.bin"),
            ModelKind::Baseline,
            threshold,
            &LabelScheme::default(),
            samples,
            scores,
            0,
        )
    }

    #[test]
    fn test_report_layout() {
        let r = report(&[P, P, N, N], &[0.9, 0.2, 0.7, 0.1], 0.5);
        let json: serde_json::Value = serde_json::to_value(&r).unwrap();
        let cr = &json["classification_report"];

        assert_eq!(cr["Cancer"]["support"], 2);
        assert_eq!(cr["Non-Cancer"]["recall"], 0.5);
        assert_eq!(cr["accuracy"], 0.5);
        assert_eq!(cr["macro avg"]["support"], 4);
        assert!(cr["weighted avg"]["f1"].is_number());
        assert_eq!(json["threshold"], 0.5);
        assert_eq!(json["model_path"], "models/baseline.bin");
    }

    #[test]
    fn test_threshold_is_strict() {
        let r = report(&[P, N], &[0.5, 0.5], 0.5);
        assert_eq!(r.predictions[0].predicted, N);
        assert_eq!(r.positive().recall, 0.0);
        assert_eq!(r.positive().precision, 0.0);
    }

    #[test]
    fn test_predictions_keep_input_order() {
        let r = report(&[N, P, N], &[0.1, 0.8, 0.3], 0.5);
        let paths: Vec<_> = r.predictions.iter().map(|p| p.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("0.png"),
                PathBuf::from("1.png"),
                PathBuf::from("2.png")
            ]
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/eval.json");
        let r = report(&[P, N, P], &[0.9, 0.4, 0.6], 0.3);
        r.save(&path).unwrap();

        let loaded = EvaluationReport::load(&path).unwrap();
        assert_eq!(loaded.model_name, ModelKind::Baseline);
        assert_eq!(loaded.threshold, 0.3);
        assert_eq!(loaded.confusion_matrix, r.confusion_matrix);
        assert_eq!(loaded.predictions.len(), 3);
        assert_eq!(loaded.classification_report.classes.len(), 2);
        assert!((loaded.classification_report.accuracy - r.classification_report.accuracy).abs() < 1e-12);
    }

    #[test]
    fn test_display_mentions_threshold() {
        let r = report(&[P, N], &[0.9, 0.1], 0.25);
        assert!(r.to_string().contains("threshold 0.250"));
    }
}
