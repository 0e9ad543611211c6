//! # mammoscan
//!
//! Binary image classification pipeline for imbalanced medical image sets.
//!
//! ## Pipeline
//!
//! raw directory → [`ImageCatalog`] → [`DatasetPartitioner`] → {[`ClassBalancer`],
//! [`TrainingOrchestrator`]} → checkpoint → [`EvaluationHarness`] → report
//!
//! ## Modules
//!
//! - `dataset`: scanning, leakage-free partitioning, processed layout, image loading
//! - `model`: predictor contract, model registry and the Burn architectures
//! - `training`: class weights, early stopping, orchestration and checkpoints
//! - `evaluation`: threshold-calibrated reports and champion selection
//! - `config`: TOML pipeline configuration
//! - `utils`: errors, logging and metrics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mammoscan::{DatasetPartitioner, ImageCatalog, LabelScheme, SplitConfig};
//!
//! let catalog = ImageCatalog::new(LabelScheme::default()).scan("data/raw".as_ref())?;
//! let partitions = DatasetPartitioner::new(SplitConfig::default())?.partition(&catalog)?;
//! println!("{}", partitions.stats());
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod evaluation;
pub mod model;
pub mod training;
pub mod utils;

pub use config::PipelineConfig;
pub use dataset::{
    Catalog, DatasetPartitioner, ImageCatalog, ImageLoader, Label, LabelScheme, Partition,
    PartitionWriter, Partitions, ProcessedDataset, Provenance, Sample, SplitConfig, SplitName,
};
pub use evaluation::{select_champion, EvaluationHarness, EvaluationReport, EvaluationRequest};
pub use model::{
    CancellationToken, InputShape, ModelKind, ModelRegistry, Normalization, Predictor,
    PredictorFactory, TrainingObserver,
};
pub use training::{
    Checkpoint, CheckpointMetadata, ClassBalancer, ClassWeightTable, TrainingOrchestrator,
    TrainingRun,
};
pub use utils::error::{PipelineError, Result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
