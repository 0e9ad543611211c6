//! Training orchestration
//!
//! Wires a registry-selected predictor, the partitions and the class weights
//! into one fit call, then finalizes the checkpoint. The checkpoint is only
//! written once `fit` has returned; a cancelled or failed run leaves whatever
//! was at the checkpoint path untouched.

use std::path::Path;
use std::time::Instant;

use indicatif::ProgressBar;
use tracing::{info, warn};

use super::balancer::ClassBalancer;
use super::checkpoint::{Checkpoint, CheckpointMetadata};
use crate::config::TrainingConfig;
use crate::dataset::{ImageLoader, Partition};
use crate::model::{
    CancellationToken, EpochReport, FitSummary, ModelKind, ModelRegistry, TrainingObserver,
};
use crate::utils::error::{PipelineError, Result};
use crate::utils::format_duration;
use crate::utils::logging::progress_bar;

/// One training invocation
#[derive(Debug, Clone, Copy)]
pub struct TrainingRun<'a> {
    pub model: ModelKind,
    pub train: &'a Partition,
    pub val: &'a Partition,
    pub config: &'a TrainingConfig,
    pub checkpoint_path: &'a Path,
}

pub struct TrainingOrchestrator<'r> {
    registry: &'r ModelRegistry,
    loader: ImageLoader,
}

impl<'r> TrainingOrchestrator<'r> {
    pub fn new(registry: &'r ModelRegistry, loader: ImageLoader) -> Self {
        Self { registry, loader }
    }

    /// Train `run.model` and write its checkpoint
    pub fn run(
        &self,
        run: TrainingRun<'_>,
        observer: &mut dyn TrainingObserver,
        cancel: CancellationToken,
    ) -> Result<Checkpoint> {
        run.config.validate()?;
        let factory = self.registry.resolve(run.model)?;
        let shape = self.loader.shape();

        if run.val.is_empty() {
            return Err(PipelineError::DegenerateDataset(
                "validation partition is empty".to_string(),
            ));
        }
        // Fail before decoding anything when a class is missing outright
        ClassBalancer::compute_weights(&run.train.labels())?;

        let mut predictor = factory.build(shape)?;
        info!(
            "Training '{}' ({} parameters) at {}",
            run.model,
            predictor.num_parameters(),
            shape
        );

        let normalization = factory.normalization();
        let train = self.loader.load(&run.train.samples, normalization, "train");
        let val = self.loader.load(&run.val.samples, normalization, "val");
        if val.is_empty() {
            return Err(PipelineError::DegenerateDataset(
                "no validation image could be decoded".to_string(),
            ));
        }

        let class_weights = ClassBalancer::compute_weights(&train.labels())?;

        let mut options = run.config.fit_options();
        options.cancel = cancel;

        let start = Instant::now();
        let summary = match predictor.fit(&train, &val, &class_weights, &options, observer) {
            Ok(summary) => summary,
            Err(PipelineError::Cancelled { epochs_completed }) => {
                warn!(
                    "Training cancelled after {} epoch(s); {:?} left untouched",
                    epochs_completed, run.checkpoint_path
                );
                return Err(PipelineError::Cancelled { epochs_completed });
            }
            Err(e) => return Err(e),
        };
        info!(
            "Fit finished in {} (best epoch {}, val loss {:.4})",
            format_duration(start.elapsed().as_secs_f64()),
            summary.best_epoch,
            summary.best_val_loss
        );

        let metadata = CheckpointMetadata::new(
            run.model,
            shape,
            normalization,
            predictor.num_parameters(),
            class_weights,
            train.len(),
            val.len(),
            summary,
        );
        Checkpoint::commit(predictor.as_ref(), metadata, run.checkpoint_path)
    }
}

/// Observer that drives a progress bar over epochs
pub struct EpochProgress {
    bar: Option<ProgressBar>,
}

impl EpochProgress {
    pub fn new() -> Self {
        Self { bar: None }
    }
}

impl Default for EpochProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingObserver for EpochProgress {
    fn on_fit_start(&mut self, total_epochs: usize) {
        self.bar = Some(progress_bar(total_epochs, "epochs"));
    }

    fn on_epoch_end(&mut self, report: &EpochReport) {
        if let Some(bar) = &self.bar {
            bar.set_position(report.epoch as u64);
            bar.set_message(format!(
                "val_loss {:.4} (best {:.4})",
                report.val_loss, report.best_val_loss
            ));
        }
    }

    fn on_fit_end(&mut self, _summary: &FitSummary) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}
