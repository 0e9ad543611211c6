//! Model registry
//!
//! Training and evaluation both resolve architectures through the same
//! [`ModelKind`] key, so a checkpoint is always reloaded into the architecture
//! that produced it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::burn_predictor::{BaselineFactory, TransferFactory};
use super::normalize::Normalization;
use super::predictor::{InputShape, Predictor};
use crate::config::TransferConfig;
use crate::utils::error::{PipelineError, Result};

/// The finite set of supported architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Small CNN trained from scratch
    Baseline,
    /// Convolutional backbone with a fresh classification head
    Transfer,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Baseline, ModelKind::Transfer];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::Baseline => "baseline",
            ModelKind::Transfer => "transfer",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "baseline" => Ok(ModelKind::Baseline),
            "transfer" => Ok(ModelKind::Transfer),
            _ => Err(PipelineError::UnknownModel(s.to_string())),
        }
    }
}

/// Builds untrained predictors of one architecture
pub trait PredictorFactory: Send + Sync {
    fn kind(&self) -> ModelKind;

    /// Pixel normalization this architecture expects, for training and evaluation alike
    fn normalization(&self) -> Normalization;

    fn build(&self, shape: InputShape) -> Result<Box<dyn Predictor>>;
}

/// Maps each [`ModelKind`] to its factory
#[derive(Clone, Default)]
pub struct ModelRegistry {
    factories: BTreeMap<ModelKind, Arc<dyn PredictorFactory>>,
}

impl ModelRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Burn-backed baseline and transfer architectures
    pub fn standard(transfer: &TransferConfig) -> Self {
        Self::empty()
            .with_factory(Arc::new(BaselineFactory::default()))
            .with_factory(Arc::new(TransferFactory::new(transfer.clone())))
    }

    /// Register or replace the factory for `factory.kind()`
    pub fn with_factory(mut self, factory: Arc<dyn PredictorFactory>) -> Self {
        self.factories.insert(factory.kind(), factory);
        self
    }

    pub fn resolve(&self, kind: ModelKind) -> Result<Arc<dyn PredictorFactory>> {
        self.factories
            .get(&kind)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownModel(kind.to_string()))
    }

    /// Parse a model name and resolve it
    pub fn resolve_name(&self, name: &str) -> Result<Arc<dyn PredictorFactory>> {
        self.resolve(name.parse()?)
    }

    pub fn kinds(&self) -> Vec<ModelKind> {
        self.factories.keys().copied().collect()
    }
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
