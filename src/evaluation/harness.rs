//! Evaluation harness
//!
//! Rebuilds the architecture named by the caller, loads checkpoint weights,
//! scores the test partition in its stored order and binarizes the scores
//! at an explicit threshold.

use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::report::EvaluationReport;
use crate::config::validate_threshold;
use crate::dataset::{ImageItem, ImageLoader, ImageSet, Label, LabelScheme, Partition};
use crate::model::{ModelKind, ModelRegistry, Predictor, PredictorFactory};
use crate::training::CheckpointMetadata;
use crate::utils::error::{PipelineError, Result};

/// One checkpoint to evaluate
#[derive(Debug, Clone, Copy)]
pub struct EvaluationRequest<'a> {
    pub model: ModelKind,
    pub checkpoint_path: &'a Path,
    pub test: &'a Partition,
    pub threshold: f64,
}

/// Single-image prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction: String,
    /// Positive-class probability
    pub confidence_score: f32,
    pub model_name: ModelKind,
    pub model_threshold: f64,
}

pub struct EvaluationHarness<'r> {
    registry: &'r ModelRegistry,
    loader: ImageLoader,
    labels: LabelScheme,
}

impl<'r> EvaluationHarness<'r> {
    pub fn new(registry: &'r ModelRegistry, loader: ImageLoader) -> Self {
        Self {
            registry,
            loader,
            labels: LabelScheme::default(),
        }
    }

    /// Class names used in reports and predictions
    pub fn with_labels(mut self, labels: LabelScheme) -> Self {
        self.labels = labels;
        self
    }

    /// Rebuild `model` and load the weights at `checkpoint_path`.
    ///
    /// The checkpoint sidecar, when present, is checked before any weights are read.
    pub fn restore(
        &self,
        model: ModelKind,
        checkpoint_path: &Path,
    ) -> Result<(Arc<dyn PredictorFactory>, Box<dyn Predictor>)> {
        let factory = self.registry.resolve(model)?;
        if !checkpoint_path.is_file() {
            return Err(PipelineError::PathNotFound(checkpoint_path.to_path_buf()));
        }

        let shape = self.loader.shape();
        let metadata = CheckpointMetadata::load_for(checkpoint_path)?;
        match &metadata {
            Some(meta) => {
                meta.ensure_compatible(model, shape)?;
                if meta.normalization != factory.normalization() {
                    return Err(PipelineError::ArchitectureMismatch(format!(
                        "checkpoint was trained with {:?} normalization, '{}' uses {:?}",
                        meta.normalization,
                        model,
                        factory.normalization()
                    )));
                }
            }
            None => warn!(
                "No metadata next to {:?}; relying on weight decoding to detect mismatches",
                checkpoint_path
            ),
        }

        let mut predictor = factory.build(shape)?;
        if let Some(meta) = &metadata {
            if meta.num_parameters != predictor.num_parameters() {
                return Err(PipelineError::ArchitectureMismatch(format!(
                    "checkpoint has {} parameters, '{}' has {}",
                    meta.num_parameters,
                    model,
                    predictor.num_parameters()
                )));
            }
        }
        predictor.load_weights(checkpoint_path)?;
        Ok((factory, predictor))
    }

    /// Evaluate one checkpoint on its test partition
    pub fn evaluate(&self, request: &EvaluationRequest<'_>) -> Result<EvaluationReport> {
        validate_threshold(request.threshold)?;
        if request.test.is_empty() {
            return Err(PipelineError::DegenerateDataset(
                "test partition is empty".to_string(),
            ));
        }

        let (factory, predictor) = self.restore(request.model, request.checkpoint_path)?;
        let data = self
            .loader
            .load(&request.test.samples, factory.normalization(), "test");
        if data.is_empty() {
            return Err(PipelineError::DegenerateDataset(
                "no test image could be decoded".to_string(),
            ));
        }

        let scores = predictor.predict(&data)?;
        if scores.len() != data.len() {
            return Err(PipelineError::Model(format!(
                "predictor returned {} scores for {} images",
                scores.len(),
                data.len()
            )));
        }

        let samples = data.items.iter().map(|i| (i.path.clone(), i.label)).collect();
        let report = EvaluationReport::from_scores(
            request.checkpoint_path,
            request.model,
            request.threshold,
            &self.labels,
            samples,
            &scores,
            data.skipped,
        );

        let positive = report.positive();
        info!(
            "{} @ {:.3}: accuracy {:.4}, positive recall {:.4}, precision {:.4}",
            request.model,
            request.threshold,
            report.classification_report.accuracy,
            positive.recall,
            positive.precision
        );
        Ok(report)
    }

    /// Evaluate independent checkpoints in parallel; results follow request order
    pub fn evaluate_many(&self, requests: &[EvaluationRequest<'_>]) -> Vec<Result<EvaluationReport>> {
        requests.par_iter().map(|request| self.evaluate(request)).collect()
    }

    /// Score a single image
    pub fn predict_image(
        &self,
        model: ModelKind,
        checkpoint_path: &Path,
        image: &Path,
        threshold: f64,
    ) -> Result<Prediction> {
        validate_threshold(threshold)?;
        let (factory, predictor) = self.restore(model, checkpoint_path)?;
        let pixels = self.loader.load_pixels(image, factory.normalization())?;

        // the label of a single unlabeled image is not used by `predict`
        let data = ImageSet::new(
            self.loader.shape(),
            vec![ImageItem {
                pixels,
                label: Label::Negative,
                path: image.to_path_buf(),
            }],
        );
        let score = predictor
            .predict(&data)?
            .first()
            .copied()
            .ok_or_else(|| PipelineError::Model("predictor returned no score".to_string()))?;

        Ok(Prediction {
            prediction: self
                .labels
                .dir_name(Label::from_score(score, threshold))
                .to_string(),
            confidence_score: score,
            model_name: model,
            model_threshold: threshold,
        })
    }
}
