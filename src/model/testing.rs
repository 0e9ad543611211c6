//! Lightweight predictor double for orchestration tests.
//!
//! Scores an image by its mean pixel value, so tests control predictions
//! through the brightness of the images they generate.

use serde::{Deserialize, Serialize};

use super::normalize::Normalization;
use super::predictor::{
    EpochReport, FitOptions, FitSummary, InputShape, Predictor, TrainingObserver,
};
use super::registry::{ModelKind, PredictorFactory};
use crate::dataset::ImageSet;
use crate::training::ClassWeightTable;
use crate::utils::error::{PipelineError, Result};

pub struct MockFactory {
    pub kind: ModelKind,
    pub normalization: Normalization,
}

impl MockFactory {
    pub fn new(kind: ModelKind, normalization: Normalization) -> Self {
        Self { kind, normalization }
    }
}

impl PredictorFactory for MockFactory {
    fn kind(&self) -> ModelKind {
        self.kind
    }

    fn normalization(&self) -> Normalization {
        self.normalization
    }

    fn build(&self, shape: InputShape) -> Result<Box<dyn Predictor>> {
        Ok(Box::new(MockPredictor {
            shape,
            state: MockState {
                kind: self.kind,
                max_pixel: 0.0,
                positive_weight: 1.0,
            },
        }))
    }
}

/// What the mock "learns": the largest pixel value seen and the positive weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockState {
    pub kind: ModelKind,
    pub max_pixel: f32,
    pub positive_weight: f64,
}

pub struct MockPredictor {
    shape: InputShape,
    state: MockState,
}

impl Predictor for MockPredictor {
    fn kind(&self) -> ModelKind {
        self.state.kind
    }

    fn input_shape(&self) -> InputShape {
        self.shape
    }

    fn fit(
        &mut self,
        train: &ImageSet,
        _val: &ImageSet,
        weights: &ClassWeightTable,
        options: &FitOptions,
        observer: &mut dyn TrainingObserver,
    ) -> Result<FitSummary> {
        observer.on_fit_start(options.epochs);
        let mut history = Vec::new();
        for epoch in 1..=options.epochs {
            if options.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled {
                    epochs_completed: epoch - 1,
                });
            }
            let report = EpochReport {
                epoch,
                total_epochs: options.epochs,
                train_loss: 1.0 / epoch as f64,
                val_loss: 1.0 / epoch as f64,
                val_accuracy: 0.5,
                best_val_loss: 1.0 / epoch as f64,
                improved: true,
            };
            observer.on_epoch_end(&report);
            history.push(report);
        }

        self.state.max_pixel = train
            .items
            .iter()
            .flat_map(|i| i.pixels.iter().copied())
            .fold(f32::MIN, f32::max);
        self.state.positive_weight = weights.weight(crate::dataset::Label::Positive);

        let summary = FitSummary {
            epochs_run: options.epochs,
            best_epoch: options.epochs,
            best_val_loss: 1.0 / options.epochs as f64,
            stopped_early: false,
            history,
        };
        observer.on_fit_end(&summary);
        Ok(summary)
    }

    fn predict(&self, data: &ImageSet) -> Result<Vec<f32>> {
        Ok(data
            .items
            .iter()
            .map(|item| {
                let mean = item.pixels.iter().sum::<f32>() / item.pixels.len().max(1) as f32;
                mean.clamp(0.0, 1.0)
            })
            .collect())
    }

    fn num_parameters(&self) -> usize {
        1
    }

    fn weights_to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.state)?)
    }

    fn load_weights_from_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let state: MockState = serde_json::from_slice(bytes)
            .map_err(|e| PipelineError::ArchitectureMismatch(e.to_string()))?;
        if state.kind != self.state.kind {
            return Err(PipelineError::ArchitectureMismatch(format!(
                "weights belong to '{}'",
                state.kind
            )));
        }
        self.state = state;
        Ok(())
    }
}
