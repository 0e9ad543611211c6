//! Model module
//!
//! The predictor contract, the registry that maps model names to factories,
//! and the two Burn architectures behind it.

pub mod baseline;
pub mod burn_predictor;
pub mod normalize;
pub mod predictor;
pub mod registry;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testing;

pub use baseline::{BaselineCnn, BaselineCnnConfig};
pub use burn_predictor::{BaselineFactory, BinaryClassifier, BurnPredictor, TransferFactory};
pub use normalize::Normalization;
pub use predictor::{
    CancellationToken, EpochReport, FitOptions, FitSummary, InputShape, NoopObserver, Predictor,
    TrainingObserver,
};
pub use registry::{ModelKind, ModelRegistry, PredictorFactory};
pub use transfer::{Backbone, TransferClassifier, TransferClassifierConfig};
