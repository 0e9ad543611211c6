//! Class weighting for imbalanced training data

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::Label;
use crate::utils::error::{PipelineError, Result};

/// Per-label loss weights, `total / (num_classes * count)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassWeightTable {
    weights: BTreeMap<Label, f64>,
    counts: BTreeMap<Label, usize>,
}

impl ClassWeightTable {
    pub fn weight(&self, label: Label) -> f64 {
        self.weights.get(&label).copied().unwrap_or(1.0)
    }

    pub fn count(&self, label: Label) -> usize {
        self.counts.get(&label).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &BTreeMap<Label, usize> {
        &self.counts
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn weights(&self) -> &BTreeMap<Label, f64> {
        &self.weights
    }
}

pub struct ClassBalancer;

impl ClassBalancer {
    /// Count labels and derive balanced weights.
    ///
    /// Fails with `DegenerateDataset` when either class is absent.
    pub fn compute_weights(labels: &[Label]) -> Result<ClassWeightTable> {
        let mut counts: BTreeMap<Label, usize> = Label::ALL.iter().map(|&l| (l, 0)).collect();
        for &label in labels {
            *counts.entry(label).or_insert(0) += 1;
        }

        if let Some((label, _)) = counts.iter().find(|(_, &c)| c == 0) {
            return Err(PipelineError::DegenerateDataset(format!(
                "no {:?} samples among {} training labels",
                label,
                labels.len()
            )));
        }

        let total = labels.len() as f64;
        let num_classes = counts.len() as f64;
        let weights: BTreeMap<Label, f64> = counts
            .iter()
            .map(|(&label, &count)| (label, total / (num_classes * count as f64)))
            .collect();

        info!(
            "Class weights: negative={:.4} (n={}), positive={:.4} (n={})",
            weights[&Label::Negative],
            counts[&Label::Negative],
            weights[&Label::Positive],
            counts[&Label::Positive]
        );
        Ok(ClassWeightTable { weights, counts })
    }
}
