//! Training: class balancing, early stopping, orchestration and checkpoints

pub mod balancer;
pub mod checkpoint;
pub mod early_stopping;
pub mod orchestrator;

pub use balancer::{ClassBalancer, ClassWeightTable};
pub use checkpoint::{Checkpoint, CheckpointMetadata};
pub use early_stopping::EarlyStopping;
pub use orchestrator::{EpochProgress, TrainingOrchestrator, TrainingRun};
