//! Trainable predictor contract
//!
//! The orchestration layer only talks to models through [`Predictor`]; the
//! Burn architectures in this crate are one implementation of it.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::registry::ModelKind;
use crate::dataset::ImageSet;
use crate::training::ClassWeightTable;
use crate::utils::error::{PipelineError, Result, ResultExt};
use crate::utils::write_atomic;

/// Model input shape (height, width, channels)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct InputShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl InputShape {
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// 224x224 RGB
    pub fn standard() -> Self {
        Self::new(224, 224, 3)
    }

    /// Number of values in one CHW image
    pub fn len(&self) -> usize {
        self.height * self.width * self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels != 3 {
            return Err(PipelineError::Configuration(format!(
                "only RGB input is supported, got {} channels",
                self.channels
            )));
        }
        if self.height == 0 || self.width == 0 {
            return Err(PipelineError::Configuration(format!(
                "input shape {} has a zero dimension",
                self
            )));
        }
        Ok(())
    }
}

impl Default for InputShape {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Display for InputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.height, self.width, self.channels)
    }
}

/// Shared flag checked by the fit loop between epochs
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Hyperparameters for one `fit` call
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Epochs without validation-loss improvement before stopping
    pub patience: usize,
    /// Minimum decrease in validation loss that counts as improvement
    pub min_delta: f64,
    pub seed: u64,
    /// Randomly flip training images as batches are assembled
    pub augment: bool,
    pub cancel: CancellationToken,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            epochs: 25,
            batch_size: 32,
            learning_rate: 1e-5,
            patience: 5,
            min_delta: 0.0,
            seed: 42,
            augment: false,
            cancel: CancellationToken::new(),
        }
    }
}

/// Snapshot handed to observers after every epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    /// One-based epoch number
    pub epoch: usize,
    pub total_epochs: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
    pub best_val_loss: f64,
    pub improved: bool,
}

/// Outcome of a completed `fit` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    pub epochs_run: usize,
    /// One-based epoch whose weights were kept
    pub best_epoch: usize,
    pub best_val_loss: f64,
    pub stopped_early: bool,
    pub history: Vec<EpochReport>,
}

/// Receives read-only progress from a running fit
pub trait TrainingObserver {
    fn on_fit_start(&mut self, _total_epochs: usize) {}
    fn on_epoch_end(&mut self, _report: &EpochReport) {}
    fn on_fit_end(&mut self, _summary: &FitSummary) {}
}

/// Observer that ignores everything
pub struct NoopObserver;

impl TrainingObserver for NoopObserver {}

/// A model that can be trained, scored and persisted.
///
/// Scores are probabilities of [`Label::Positive`](crate::dataset::Label).
pub trait Predictor: Send {
    fn kind(&self) -> ModelKind;

    fn input_shape(&self) -> InputShape;

    /// Train in place; on return the predictor holds the best-observed weights
    fn fit(
        &mut self,
        train: &ImageSet,
        val: &ImageSet,
        weights: &ClassWeightTable,
        options: &FitOptions,
        observer: &mut dyn TrainingObserver,
    ) -> Result<FitSummary>;

    /// One score in [0, 1] per item, in input order
    fn predict(&self, data: &ImageSet) -> Result<Vec<f32>>;

    fn num_parameters(&self) -> usize;

    /// Serialized weights
    fn weights_to_bytes(&self) -> Result<Vec<u8>>;

    /// Replace weights; bytes from another architecture fail with `ArchitectureMismatch`
    fn load_weights_from_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    fn save_weights(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.weights_to_bytes()?)
    }

    fn load_weights(&mut self, path: &Path) -> Result<()> {
        let bytes = std::fs::read(path).at_path(path)?;
        self.load_weights_from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_shape() {
        let shape = InputShape::standard();
        assert_eq!(shape.len(), 224 * 224 * 3);
        assert_eq!(shape.to_string(), "224x224x3");
        assert!(shape.validate().is_ok());
        assert!(InputShape::new(224, 224, 1).validate().is_err());
        assert!(InputShape::new(0, 224, 3).validate().is_err());
    }

    #[test]
    fn test_cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
