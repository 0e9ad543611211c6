//! Error Handling Module
//!
//! Defines the error taxonomy for the mammoscan pipeline.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid fractions, thresholds, hyperparameters or missing arguments
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Model name with no registered architecture
    #[error("Unknown model '{0}' (expected one of: baseline, transfer)")]
    UnknownModel(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// A class or partition with no samples reached a stage that needs it
    #[error("Degenerate dataset: {0}")]
    DegenerateDataset(String),

    /// Checkpoint weights do not belong to the reconstructed architecture
    #[error("Architecture mismatch: {0}")]
    ArchitectureMismatch(String),

    /// A single image could not be decoded; callers skip the sample
    #[error("Failed to decode image at '{0}': {1}")]
    ImageDecode(PathBuf, String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error raised by the model backend
    #[error("Model error: {0}")]
    Model(String),

    /// Training was interrupted between epochs
    #[error("Training cancelled after {epochs_completed} completed epoch(s)")]
    Cancelled { epochs_completed: usize },
}

impl PipelineError {
    /// Per-sample decode failures are the only errors recovered locally.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PipelineError::ImageDecode(..))
    }

    /// Process exit status for a fatal error.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Configuration(_) | PipelineError::UnknownModel(_) => 2,
            PipelineError::Io(_) | PipelineError::PathNotFound(_) => 3,
            PipelineError::DegenerateDataset(_) => 4,
            PipelineError::ArchitectureMismatch(_) => 5,
            PipelineError::Cancelled { .. } => 130,
            PipelineError::ImageDecode(..)
            | PipelineError::Serialization(_)
            | PipelineError::Model(_) => 1,
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for PipelineError {
    fn from(err: toml::de::Error) -> Self {
        PipelineError::Configuration(format!("invalid TOML: {}", err))
    }
}

impl From<image::ImageError> for PipelineError {
    fn from(err: image::ImageError) -> Self {
        PipelineError::ImageDecode(PathBuf::new(), err.to_string())
    }
}

/// Convenience Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for attaching a path to IO failures
pub trait ResultExt<T> {
    /// Turn a missing file into `PathNotFound`, keep other IO errors as they are
    fn at_path(self, path: &std::path::Path) -> Result<T>;
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn at_path(self, path: &std::path::Path) -> Result<T> {
        self.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::PathNotFound(path.to_path_buf())
            } else {
                PipelineError::Io(std::io::Error::new(
                    e.kind(),
                    format!("{}: {}", path.display(), e),
                ))
            }
        })
    }
}
