//! Checkpoint persistence
//!
//! A checkpoint is the weights file written by the predictor plus a JSON
//! sidecar (`<weights>.meta.json`) recording which architecture and input
//! shape produced it. Both files are staged and renamed into place only once
//! training has finished.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::balancer::ClassWeightTable;
use crate::model::{EpochReport, FitSummary, InputShape, ModelKind, Normalization, Predictor};
use crate::utils::error::{PipelineError, Result, ResultExt};
use crate::utils::staging_path;

/// Sidecar metadata describing a weights file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub model: ModelKind,
    pub input_shape: InputShape,
    pub normalization: Normalization,
    pub num_parameters: usize,
    pub class_weights: ClassWeightTable,
    pub training_samples: usize,
    pub validation_samples: usize,
    pub epochs_run: usize,
    pub best_epoch: usize,
    pub best_val_loss: f64,
    pub stopped_early: bool,
    pub history: Vec<EpochReport>,
    pub created_at: String,
}

impl CheckpointMetadata {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: ModelKind,
        input_shape: InputShape,
        normalization: Normalization,
        num_parameters: usize,
        class_weights: ClassWeightTable,
        training_samples: usize,
        validation_samples: usize,
        summary: FitSummary,
    ) -> Self {
        Self {
            model,
            input_shape,
            normalization,
            num_parameters,
            class_weights,
            training_samples,
            validation_samples,
            epochs_run: summary.epochs_run,
            best_epoch: summary.best_epoch,
            best_val_loss: summary.best_val_loss,
            stopped_early: summary.stopped_early,
            history: summary.history,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    /// Sidecar location for a weights file
    pub fn path_for(weights_path: &Path) -> PathBuf {
        let mut name = weights_path.as_os_str().to_owned();
        name.push(".meta.json");
        PathBuf::from(name)
    }

    /// Load the sidecar of `weights_path`, `None` when it does not exist
    pub fn load_for(weights_path: &Path) -> Result<Option<Self>> {
        let path = Self::path_for(weights_path);
        if !path.is_file() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&path).at_path(&path)?;
        let metadata = serde_json::from_str(&json).map_err(|e| {
            PipelineError::Serialization(format!("Failed to read checkpoint metadata {:?}: {}", path, e))
        })?;
        Ok(Some(metadata))
    }

    /// Fail with `ArchitectureMismatch` unless this checkpoint was produced by `model` at `shape`
    pub fn ensure_compatible(&self, model: ModelKind, shape: InputShape) -> Result<()> {
        if self.model != model {
            return Err(PipelineError::ArchitectureMismatch(format!(
                "checkpoint was trained as '{}' but is being loaded as '{}'",
                self.model, model
            )));
        }
        if self.input_shape != shape {
            return Err(PipelineError::ArchitectureMismatch(format!(
                "checkpoint expects {} input, pipeline is configured for {}",
                self.input_shape, shape
            )));
        }
        Ok(())
    }
}

/// A finalized checkpoint on disk
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub weights_path: PathBuf,
    pub metadata_path: PathBuf,
    pub metadata: CheckpointMetadata,
}

impl Checkpoint {
    /// Write weights and metadata, replacing any previous checkpoint at `path`.
    ///
    /// Nothing at `path` changes unless both files were staged successfully.
    /// The previous sidecar is removed before the new weights land, so new
    /// weights never sit next to stale metadata.
    pub fn commit(predictor: &dyn Predictor, metadata: CheckpointMetadata, path: &Path) -> Result<Self> {
        let metadata_path = CheckpointMetadata::path_for(path);
        let weights = predictor.weights_to_bytes()?;
        let json = serde_json::to_string_pretty(&metadata)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let staged_weights = staging_path(path);
        let staged_metadata = staging_path(&metadata_path);
        let staged = std::fs::write(&staged_weights, &weights)
            .and_then(|_| std::fs::write(&staged_metadata, json.as_bytes()));
        if let Err(e) = staged {
            let _ = std::fs::remove_file(&staged_weights);
            let _ = std::fs::remove_file(&staged_metadata);
            return Err(e.into());
        }

        // the old sidecar goes before the weights it describes
        let replaced = retire_sidecar(&metadata_path).and_then(|_| std::fs::rename(&staged_weights, path));
        if let Err(e) = replaced {
            let _ = std::fs::remove_file(&staged_weights);
            let _ = std::fs::remove_file(&staged_metadata);
            return Err(e.into());
        }
        if let Err(e) = std::fs::rename(&staged_metadata, &metadata_path) {
            let _ = std::fs::remove_file(&staged_metadata);
            warn!("Weights at {:?} were written without their metadata: {}", path, e);
            return Err(e.into());
        }

        info!(
            "Checkpoint saved to {:?} ({} parameters, best epoch {})",
            path, metadata.num_parameters, metadata.best_epoch
        );
        Ok(Self {
            weights_path: path.to_path_buf(),
            metadata_path,
            metadata,
        })
    }

    /// Read back the metadata of an existing checkpoint
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(PipelineError::PathNotFound(path.to_path_buf()));
        }
        let metadata = CheckpointMetadata::load_for(path)?
            .ok_or_else(|| PipelineError::PathNotFound(CheckpointMetadata::path_for(path)))?;
        Ok(Self {
            weights_path: path.to_path_buf(),
            metadata_path: CheckpointMetadata::path_for(path),
            metadata,
        })
    }
}

fn retire_sidecar(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
