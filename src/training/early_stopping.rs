//! Early stopping on validation loss

use serde::{Deserialize, Serialize};

/// Tracks the best validation loss and the epochs since it last improved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarlyStopping {
    patience: usize,
    min_delta: f64,
    best_loss: f64,
    /// One-based epoch of `best_loss`, 0 before the first update
    best_epoch: usize,
    patience_counter: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize, min_delta: f64) -> Self {
        Self {
            patience,
            min_delta: min_delta.max(0.0),
            best_loss: f64::INFINITY,
            best_epoch: 0,
            patience_counter: 0,
        }
    }

    /// Record an epoch's validation loss; returns true when it is a new best
    pub fn update(&mut self, epoch: usize, val_loss: f64) -> bool {
        if val_loss.is_finite() && val_loss < self.best_loss - self.min_delta {
            self.best_loss = val_loss;
            self.best_epoch = epoch;
            self.patience_counter = 0;
            true
        } else {
            self.patience_counter += 1;
            false
        }
    }

    pub fn should_stop(&self) -> bool {
        self.patience_counter >= self.patience
    }

    pub fn best_loss(&self) -> f64 {
        self.best_loss
    }

    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }

    pub fn epochs_without_improvement(&self) -> usize {
        self.patience_counter
    }
}
