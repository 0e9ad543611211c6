//! Pipeline configuration
//!
//! One explicit structure, read from TOML and passed to every stage. Missing
//! sections and fields take their defaults.
//!
//! ```toml
//! [paths]
//! raw_dir = "data/raw"
//! processed_dir = "data/processed"
//!
//! [split]
//! test_fraction = 0.15
//! val_fraction = 0.15
//! seed = 42
//!
//! [training]
//! epochs = 25
//! learning_rate = 1e-5
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::dataset::{LabelScheme, SplitConfig};
use crate::model::{FitOptions, InputShape};
use crate::utils::error::{PipelineError, Result};

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub labels: LabelScheme,
    pub split: SplitConfig,
    pub image: InputShape,
    pub training: TrainingConfig,
    pub transfer: TransferConfig,
    pub evaluation: EvaluationConfig,
}

impl PipelineConfig {
    /// Read and validate a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = load_toml_config(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.labels.validate()?;
        self.split.validate()?;
        self.image.validate()?;
        self.training.validate()?;
        self.transfer.validate()?;
        validate_threshold(self.evaluation.threshold)
    }
}

/// Deserialize any TOML file
pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path).map_err(|e| {
        PipelineError::Configuration(format!("Failed to read config {}: {e}", path.display()))
    })?;

    toml::from_str(&content).map_err(|e| {
        PipelineError::Configuration(format!("Failed to parse config {}: {e}", path.display()))
    })
}

/// Decision thresholds must lie strictly inside (0, 1)
pub fn validate_threshold(threshold: f64) -> Result<()> {
    if threshold > 0.0 && threshold < 1.0 {
        Ok(())
    } else {
        Err(PipelineError::Configuration(format!(
            "threshold must lie in (0, 1), got {}",
            threshold
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub report_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
            checkpoint_dir: PathBuf::from("models"),
            report_dir: PathBuf::from("reports"),
        }
    }
}

/// Training hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Epochs without validation-loss improvement before stopping
    pub early_stopping_patience: usize,
    pub min_delta: f64,
    pub seed: u64,
    /// Random horizontal flips on training batches
    pub augment: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 25,
            batch_size: 32,
            learning_rate: 1e-5,
            early_stopping_patience: 5,
            min_delta: 0.0,
            seed: 42,
            augment: false,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(PipelineError::Configuration("epochs must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::Configuration("batch_size must be positive".into()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(PipelineError::Configuration(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.early_stopping_patience == 0 {
            return Err(PipelineError::Configuration(
                "early_stopping_patience must be at least 1".into(),
            ));
        }
        if self.min_delta < 0.0 {
            return Err(PipelineError::Configuration("min_delta must not be negative".into()));
        }
        Ok(())
    }

    pub fn fit_options(&self) -> FitOptions {
        FitOptions {
            epochs: self.epochs,
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
            patience: self.early_stopping_patience,
            min_delta: self.min_delta,
            seed: self.seed,
            augment: self.augment,
            ..FitOptions::default()
        }
    }
}

/// Options for the transfer architecture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub dropout: f64,
    /// Pretrained backbone weights
    pub backbone_weights: Option<PathBuf>,
    /// Only honored together with `backbone_weights`
    pub freeze_backbone: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            dropout: 0.5,
            backbone_weights: None,
            freeze_backbone: true,
        }
    }
}

impl TransferConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(PipelineError::Configuration(format!(
                "dropout must lie in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub threshold: f64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}
