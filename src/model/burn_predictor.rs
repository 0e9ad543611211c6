//! Burn implementation of the [`Predictor`] contract
//!
//! [`BurnPredictor`] drives any [`BinaryClassifier`] module with a custom
//! training loop: Adam, class-weighted binary cross-entropy on logits, seeded
//! per-epoch shuffling and early stopping that restores the best weights.

use std::path::Path;

use burn::{
    module::{AutodiffModule, Module},
    optim::{AdamConfig, GradientsParams, Optimizer},
    record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder},
    tensor::{
        activation::log_sigmoid,
        backend::{AutodiffBackend, Backend},
        ElementConversion, Tensor, TensorData,
    },
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use super::baseline::BaselineCnnConfig;
use super::normalize::Normalization;
use super::predictor::{
    EpochReport, FitOptions, FitSummary, InputShape, Predictor, TrainingObserver,
};
use super::registry::{ModelKind, PredictorFactory};
use super::transfer::{Backbone, TransferClassifier, TransferClassifierConfig, MIN_TRANSFER_INPUT};
use crate::backend::{default_device, TrainingBackend};
use crate::config::TransferConfig;
use crate::dataset::{Augmenter, ImageSet};
use crate::training::{ClassWeightTable, EarlyStopping};
use crate::utils::error::{PipelineError, Result, ResultExt};
use crate::utils::logging::TrainingLogger;
use crate::utils::write_atomic;

type WeightRecorder = NamedMpkBytesRecorder<FullPrecisionSettings>;

/// Batch size used for scoring
const INFERENCE_BATCH: usize = 64;

/// A Burn module producing one positive-class logit per image, shape `[N, 1]`
pub trait BinaryClassifier<B: Backend>: Module<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2>;
}

pub struct BurnPredictor<B, M>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + BinaryClassifier<B>,
    M::InnerModule: BinaryClassifier<B::InnerBackend>,
{
    kind: ModelKind,
    shape: InputShape,
    model: M,
    device: B::Device,
}

impl<B, M> BurnPredictor<B, M>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + BinaryClassifier<B>,
    M::InnerModule: BinaryClassifier<B::InnerBackend>,
{
    pub fn new(kind: ModelKind, shape: InputShape, model: M, device: B::Device) -> Self {
        Self {
            kind,
            shape,
            model,
            device,
        }
    }

    fn check_input(&self, data: &ImageSet) -> Result<()> {
        let expected = self.shape.len();
        if data.shape != self.shape || data.items.iter().any(|i| i.pixels.len() != expected) {
            return Err(PipelineError::Configuration(format!(
                "images are {} but the {} model expects {}",
                data.shape, self.kind, self.shape
            )));
        }
        Ok(())
    }
}

impl<B, M> Predictor for BurnPredictor<B, M>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + BinaryClassifier<B>,
    M::InnerModule: BinaryClassifier<B::InnerBackend>,
{
    fn kind(&self) -> ModelKind {
        self.kind
    }

    fn input_shape(&self) -> InputShape {
        self.shape
    }

    fn fit(
        &mut self,
        train: &ImageSet,
        val: &ImageSet,
        weights: &ClassWeightTable,
        options: &FitOptions,
        observer: &mut dyn TrainingObserver,
    ) -> Result<FitSummary> {
        if options.epochs == 0 || options.batch_size == 0 {
            return Err(PipelineError::Configuration(
                "epochs and batch size must be positive".to_string(),
            ));
        }
        if train.is_empty() || val.is_empty() {
            return Err(PipelineError::DegenerateDataset(format!(
                "cannot fit on {} training and {} validation images",
                train.len(),
                val.len()
            )));
        }
        self.check_input(train)?;
        self.check_input(val)?;

        info!(
            "Training {} ({} parameters) on {} images, validating on {}",
            self.kind,
            self.model.num_params(),
            train.len(),
            val.len()
        );

        let mut model = self.model.clone();
        let mut best_model = model.clone();
        let mut optim = AdamConfig::new().init::<B, M>();
        let mut rng = ChaCha8Rng::seed_from_u64(options.seed);
        let mut stopper = EarlyStopping::new(options.patience.max(1), options.min_delta);
        let mut logger = TrainingLogger::new(options.epochs);
        let mut history = Vec::new();
        let mut stopped_early = false;

        let sample_weights: Vec<f32> = train
            .items
            .iter()
            .map(|i| weights.weight(i.label) as f32)
            .collect();
        let val_targets: Vec<f32> = val.items.iter().map(|i| i.label.target()).collect();
        let mut indices: Vec<usize> = (0..train.len()).collect();
        let augmenter = options.augment.then(|| Augmenter::new(self.shape));

        observer.on_fit_start(options.epochs);

        for epoch in 1..=options.epochs {
            if options.cancel.is_cancelled() {
                info!("Cancellation requested, stopping before epoch {}", epoch);
                return Err(PipelineError::Cancelled {
                    epochs_completed: epoch - 1,
                });
            }
            logger.start_epoch(epoch - 1);
            indices.shuffle(&mut rng);

            let mut loss_sum = 0.0;
            let mut num_batches = 0usize;
            for chunk in indices.chunks(options.batch_size) {
                let mut pixels = batch_pixels(train, chunk);
                if let Some(augmenter) = &augmenter {
                    augmenter.apply(&mut pixels, &mut rng);
                }
                let images = batch_tensor::<B>(pixels, chunk.len(), train.shape, &self.device);
                let targets = column::<B>(
                    chunk.iter().map(|&i| train.items[i].label.target()).collect(),
                    &self.device,
                );
                let batch_weights =
                    column::<B>(chunk.iter().map(|&i| sample_weights[i]).collect(), &self.device);

                let logits = model.forward(images);
                let loss = (bce_with_logits(logits, targets) * batch_weights).mean();

                let loss_value: f64 = loss.clone().into_scalar().elem();
                loss_sum += loss_value;
                num_batches += 1;

                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = optim.step(options.learning_rate, model, grads);
            }
            let train_loss = loss_sum / num_batches.max(1) as f64;

            let val_logits = collect_logits(&model.valid(), val, &self.device)?;
            let val_loss = mean_bce(&val_logits, &val_targets);
            let val_accuracy = accuracy(&val_logits, &val_targets);

            let improved = stopper.update(epoch, val_loss);
            if improved {
                best_model = model.clone();
                logger.log_new_best(val_loss);
            }
            logger.end_epoch(train_loss, val_loss, val_accuracy);

            let report = EpochReport {
                epoch,
                total_epochs: options.epochs,
                train_loss,
                val_loss,
                val_accuracy,
                best_val_loss: stopper.best_loss(),
                improved,
            };
            observer.on_epoch_end(&report);
            history.push(report);

            if stopper.should_stop() && epoch < options.epochs {
                logger.log_early_stop(stopper.epochs_without_improvement());
                stopped_early = true;
                break;
            }
        }

        if stopper.best_epoch() == 0 {
            return Err(PipelineError::Model(
                "validation loss was never finite; training diverged".to_string(),
            ));
        }

        self.model = best_model;
        let summary = FitSummary {
            epochs_run: history.len(),
            best_epoch: stopper.best_epoch(),
            best_val_loss: stopper.best_loss(),
            stopped_early,
            history,
        };
        logger.log_complete(summary.epochs_run, summary.best_val_loss);
        debug!("Restored weights from epoch {}", summary.best_epoch);
        observer.on_fit_end(&summary);
        Ok(summary)
    }

    fn predict(&self, data: &ImageSet) -> Result<Vec<f32>> {
        self.check_input(data)?;
        let logits = collect_logits(&self.model.valid(), data, &self.device)?;
        Ok(logits.into_iter().map(sigmoid).collect())
    }

    fn num_parameters(&self) -> usize {
        self.model.num_params()
    }

    fn weights_to_bytes(&self) -> Result<Vec<u8>> {
        let recorder = WeightRecorder::new();
        Recorder::<B>::record(&recorder, self.model.clone().into_record(), ())
            .map_err(|e| PipelineError::Model(format!("failed to encode {} weights: {:?}", self.kind, e)))
    }

    fn load_weights_from_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let recorder = WeightRecorder::new();
        let record: M::Record = Recorder::<B>::load(&recorder, bytes.to_vec(), &self.device)
            .map_err(|e| {
                PipelineError::ArchitectureMismatch(format!(
                    "weights do not decode as a {} model: {:?}",
                    self.kind, e
                ))
            })?;

        let expected = self.model.num_params();
        let loaded = self.model.clone().load_record(record);
        if loaded.num_params() != expected {
            return Err(PipelineError::ArchitectureMismatch(format!(
                "{} model at {} has {} parameters, weights carry {}",
                self.kind,
                self.shape,
                expected,
                loaded.num_params()
            )));
        }
        self.model = loaded;
        Ok(())
    }
}

fn batch_pixels(data: &ImageSet, indices: &[usize]) -> Vec<f32> {
    let mut buffer = Vec::with_capacity(indices.len() * data.shape.len());
    for &i in indices {
        buffer.extend_from_slice(&data.items[i].pixels);
    }
    buffer
}

fn batch_tensor<BK: Backend>(
    buffer: Vec<f32>,
    batch_size: usize,
    shape: InputShape,
    device: &BK::Device,
) -> Tensor<BK, 4> {
    let tensor_data = TensorData::new(
        buffer,
        [batch_size, shape.channels, shape.height, shape.width],
    );
    Tensor::from_data(tensor_data, device)
}

fn images_tensor<BK: Backend>(data: &ImageSet, indices: &[usize], device: &BK::Device) -> Tensor<BK, 4> {
    batch_tensor::<BK>(batch_pixels(data, indices), indices.len(), data.shape, device)
}

fn column<BK: Backend>(values: Vec<f32>, device: &BK::Device) -> Tensor<BK, 2> {
    let n = values.len();
    Tensor::from_data(TensorData::new(values, [n, 1]), device)
}

/// Per-sample `-(y log s(z) + (1 - y) log s(-z))`, shape `[N, 1]`
fn bce_with_logits<BK: Backend>(logits: Tensor<BK, 2>, targets: Tensor<BK, 2>) -> Tensor<BK, 2> {
    let log_p = log_sigmoid(logits.clone());
    let log_not_p = log_sigmoid(logits.neg());
    let not_targets = targets.clone().neg().add_scalar(1.0);
    (targets * log_p + not_targets * log_not_p).neg()
}

/// Logits for every item in input order
fn collect_logits<BK: Backend, C: BinaryClassifier<BK>>(
    model: &C,
    data: &ImageSet,
    device: &BK::Device,
) -> Result<Vec<f32>> {
    let indices: Vec<usize> = (0..data.len()).collect();
    let mut logits = Vec::with_capacity(data.len());
    for chunk in indices.chunks(INFERENCE_BATCH) {
        let output = model.forward(images_tensor::<BK>(data, chunk, device));
        let values = output
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| PipelineError::Model(format!("failed to read model output: {:?}", e)))?;
        logits.extend(values);
    }
    Ok(logits)
}

fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

/// Unweighted mean binary cross-entropy, computed stably from logits
fn mean_bce(logits: &[f32], targets: &[f32]) -> f64 {
    if logits.is_empty() {
        return f64::NAN;
    }
    let total: f64 = logits
        .iter()
        .zip(targets)
        .map(|(&z, &y)| {
            let (z, y) = (z as f64, y as f64);
            z.max(0.0) - z * y + (-z.abs()).exp().ln_1p()
        })
        .sum();
    total / logits.len() as f64
}

fn accuracy(logits: &[f32], targets: &[f32]) -> f64 {
    if logits.is_empty() {
        return 0.0;
    }
    let correct = logits
        .iter()
        .zip(targets)
        .filter(|(&z, &y)| (z > 0.0) == (y > 0.5))
        .count();
    correct as f64 / logits.len() as f64
}

/// Factory for the from-scratch baseline CNN
#[derive(Debug, Clone, Default)]
pub struct BaselineFactory;

impl PredictorFactory for BaselineFactory {
    fn kind(&self) -> ModelKind {
        ModelKind::Baseline
    }

    fn normalization(&self) -> Normalization {
        Normalization::UnitScale
    }

    fn build(&self, shape: InputShape) -> Result<Box<dyn Predictor>> {
        shape.validate()?;
        if shape.height < 4 || shape.width < 4 {
            return Err(PipelineError::Configuration(format!(
                "baseline model needs at least 4x4 input, got {}",
                shape
            )));
        }
        let device = default_device();
        let model = BaselineCnnConfig::new(shape.height, shape.width)
            .with_in_channels(shape.channels)
            .init::<TrainingBackend>(&device);
        Ok(Box::new(BurnPredictor::<TrainingBackend, _>::new(
            ModelKind::Baseline,
            shape,
            model,
            device,
        )))
    }
}

/// Factory for the backbone + head transfer model
#[derive(Debug, Clone, Default)]
pub struct TransferFactory {
    config: TransferConfig,
}

impl TransferFactory {
    pub fn new(config: TransferConfig) -> Self {
        Self { config }
    }

    /// A backbone is only frozen when it starts from stored weights
    fn freezes_backbone(&self) -> bool {
        if self.config.freeze_backbone && self.config.backbone_weights.is_none() {
            warn!("No backbone_weights configured, training the randomly initialized backbone");
            return false;
        }
        self.config.freeze_backbone
    }

    fn build_model(
        &self,
        shape: InputShape,
        device: &<TrainingBackend as Backend>::Device,
    ) -> Result<TransferClassifier<TrainingBackend>> {
        let mut model = TransferClassifierConfig::new()
            .with_in_channels(shape.channels)
            .with_dropout(self.config.dropout)
            .with_freeze_backbone(self.freezes_backbone())
            .init::<TrainingBackend>(device);

        if let Some(path) = &self.config.backbone_weights {
            model.backbone = load_backbone(model.backbone, path, device)?;
            info!("Initialized transfer backbone from {:?}", path);
        }
        Ok(model)
    }
}

impl PredictorFactory for TransferFactory {
    fn kind(&self) -> ModelKind {
        ModelKind::Transfer
    }

    fn normalization(&self) -> Normalization {
        Normalization::ImageNet
    }

    fn build(&self, shape: InputShape) -> Result<Box<dyn Predictor>> {
        shape.validate()?;
        if shape.height < MIN_TRANSFER_INPUT || shape.width < MIN_TRANSFER_INPUT {
            return Err(PipelineError::Configuration(format!(
                "transfer model needs at least {}x{} input, got {}",
                MIN_TRANSFER_INPUT, MIN_TRANSFER_INPUT, shape
            )));
        }
        let device = default_device();
        let model = self.build_model(shape, &device)?;
        Ok(Box::new(BurnPredictor::<TrainingBackend, _>::new(
            ModelKind::Transfer,
            shape,
            model,
            device,
        )))
    }
}

/// Store backbone weights for reuse as a pretrained initialization
pub fn save_backbone<B: Backend>(backbone: &Backbone<B>, path: &Path) -> Result<()> {
    let recorder = WeightRecorder::new();
    let bytes = Recorder::<B>::record(&recorder, backbone.clone().into_record(), ())
        .map_err(|e| PipelineError::Model(format!("failed to encode backbone: {:?}", e)))?;
    write_atomic(path, &bytes)
}

/// Load stored weights into `backbone`
pub fn load_backbone<B: Backend>(
    backbone: Backbone<B>,
    path: &Path,
    device: &B::Device,
) -> Result<Backbone<B>> {
    let bytes = std::fs::read(path).at_path(path)?;
    let recorder = WeightRecorder::new();
    let record = Recorder::<B>::load(&recorder, bytes, device).map_err(|e| {
        PipelineError::ArchitectureMismatch(format!(
            "{} does not hold backbone weights: {:?}",
            path.display(),
            e
        ))
    })?;
    Ok(backbone.load_record(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use crate::dataset::{ImageItem, Label};
    use crate::model::predictor::{CancellationToken, NoopObserver};
    use crate::training::ClassBalancer;

    fn synthetic(shape: InputShape, n_pos: usize, n_neg: usize) -> ImageSet {
        shaded(shape, n_pos, n_neg, 0.9, 0.1)
    }

    fn shaded(shape: InputShape, n_pos: usize, n_neg: usize, pos_level: f32, neg_level: f32) -> ImageSet {
        let mut items = Vec::new();
        for i in 0..(n_pos + n_neg) {
            let label = if i < n_pos { Label::Positive } else { Label::Negative };
            let level = if label == Label::Positive { pos_level } else { neg_level };
            items.push(ImageItem {
                pixels: vec![level; shape.len()],
                label,
                path: PathBuf::from(format!("img_{}.png", i)),
            });
        }
        ImageSet::new(shape, items)
    }

    fn options(epochs: usize, lr: f64, patience: usize) -> FitOptions {
        FitOptions {
            epochs,
            batch_size: 4,
            learning_rate: lr,
            patience,
            min_delta: 0.0,
            seed: 7,
            augment: false,
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn test_fit_and_predict_baseline() {
        let shape = InputShape::new(8, 8, 3);
        let mut predictor = BaselineFactory.build(shape).unwrap();
        let train = synthetic(shape, 6, 10);
        let val = synthetic(shape, 2, 2);
        let weights = ClassBalancer::compute_weights(&train.labels()).unwrap();

        let summary = predictor
            .fit(&train, &val, &weights, &options(2, 1e-3, 5), &mut NoopObserver)
            .unwrap();
        assert_eq!(summary.epochs_run, 2);
        assert_eq!(summary.history.len(), 2);
        assert!(summary.best_epoch >= 1 && summary.best_epoch <= 2);

        let scores = predictor.predict(&val).unwrap();
        assert_eq!(scores.len(), 4);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn test_fit_with_augmentation() {
        let shape = InputShape::new(8, 8, 3);
        let mut predictor = BaselineFactory.build(shape).unwrap();
        let train = synthetic(shape, 6, 6);
        let val = synthetic(shape, 2, 2);
        let weights = ClassBalancer::compute_weights(&train.labels()).unwrap();

        let opts = FitOptions {
            augment: true,
            ..options(2, 1e-3, 5)
        };
        let summary = predictor
            .fit(&train, &val, &weights, &opts, &mut NoopObserver)
            .unwrap();
        assert_eq!(summary.epochs_run, 2);
        assert!(summary.history.iter().all(|r| r.train_loss.is_finite()));
        // training images are flipped per batch, never in place
        assert_eq!(train.items[0].pixels, vec![0.9; shape.len()]);
    }

    #[test]
    fn test_early_stopping_without_learning() {
        let shape = InputShape::new(8, 8, 3);
        let mut predictor = BaselineFactory.build(shape).unwrap();
        let train = synthetic(shape, 4, 4);
        let val = synthetic(shape, 2, 2);
        let weights = ClassBalancer::compute_weights(&train.labels()).unwrap();

        // a zero learning rate never improves on the first validation loss
        let summary = predictor
            .fit(&train, &val, &weights, &options(10, 0.0, 2), &mut NoopObserver)
            .unwrap();
        assert!(summary.stopped_early);
        assert_eq!(summary.epochs_run, 3);
        assert_eq!(summary.best_epoch, 1);
    }

    #[test]
    fn test_best_epoch_weights_are_restored() {
        let shape = InputShape::new(8, 8, 3);
        let mut predictor = BaselineFactory.build(shape).unwrap();
        // validation inverts the brightness-to-label mapping, so learning
        // the training set makes validation loss worse every epoch
        let train = shaded(shape, 8, 8, 0.9, 0.1);
        let val = shaded(shape, 4, 4, 0.1, 0.9);
        let weights = ClassBalancer::compute_weights(&train.labels()).unwrap();

        let summary = predictor
            .fit(&train, &val, &weights, &options(6, 1e-2, 6), &mut NoopObserver)
            .unwrap();
        assert_eq!(summary.epochs_run, 6);
        assert!(summary.best_epoch < summary.epochs_run);
        let last = summary.history.last().unwrap().val_loss;
        assert!(last > summary.best_val_loss);

        let targets: Vec<f64> = val.items.iter().map(|i| i.label.target() as f64).collect();
        let scores = predictor.predict(&val).unwrap();
        let after_fit = scores
            .iter()
            .zip(&targets)
            .map(|(&p, &y)| {
                let p = (p as f64).clamp(1e-7, 1.0 - 1e-7);
                -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
            })
            .sum::<f64>()
            / scores.len() as f64;
        assert!(
            (after_fit - summary.best_val_loss).abs() <= 1e-3 * summary.best_val_loss.max(1.0),
            "after fit {} best {} last {}",
            after_fit,
            summary.best_val_loss,
            last
        );
    }

    #[test]
    fn test_cancelled_before_first_epoch() {
        let shape = InputShape::new(8, 8, 3);
        let mut predictor = BaselineFactory.build(shape).unwrap();
        let train = synthetic(shape, 4, 4);
        let weights = ClassBalancer::compute_weights(&train.labels()).unwrap();

        let opts = options(3, 1e-3, 2);
        opts.cancel.cancel();
        let err = predictor
            .fit(&train, &train, &weights, &opts, &mut NoopObserver)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { epochs_completed: 0 }));
    }

    #[test]
    fn test_weights_round_trip() {
        let shape = InputShape::new(8, 8, 3);
        let source = BaselineFactory.build(shape).unwrap();
        let mut target = BaselineFactory.build(shape).unwrap();
        let data = synthetic(shape, 2, 2);

        target
            .load_weights_from_bytes(&source.weights_to_bytes().unwrap())
            .unwrap();
        assert_eq!(source.predict(&data).unwrap(), target.predict(&data).unwrap());
    }

    #[test]
    fn test_cross_architecture_load_is_mismatch() {
        let baseline = BaselineFactory.build(InputShape::new(16, 16, 3)).unwrap();
        let mut transfer = TransferFactory::default()
            .build(InputShape::new(16, 16, 3))
            .unwrap();

        let err = transfer
            .load_weights_from_bytes(&baseline.weights_to_bytes().unwrap())
            .unwrap_err();
        assert!(matches!(err, PipelineError::ArchitectureMismatch(_)));
    }

    #[test]
    fn test_wrong_input_shape_rejected() {
        let predictor = BaselineFactory.build(InputShape::new(8, 8, 3)).unwrap();
        let data = synthetic(InputShape::new(12, 12, 3), 1, 1);
        assert!(matches!(
            predictor.predict(&data),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_transfer_minimum_input() {
        assert!(TransferFactory::default()
            .build(InputShape::new(8, 8, 3))
            .is_err());
    }

    #[test]
    fn test_pretrained_backbone_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backbone.mpk");
        let device = default_device();
        let donor = TransferClassifierConfig::new().init::<TrainingBackend>(&device);
        save_backbone(&donor.backbone, &path).unwrap();

        let x = Tensor::<TrainingBackend, 4>::ones([1, 3, 16, 16], &device);
        let features = |b: &Backbone<TrainingBackend>| {
            b.forward(x.clone())
                .into_data()
                .convert::<f32>()
                .to_vec::<f32>()
                .unwrap()
        };

        let reloaded =
            load_backbone(Backbone::<TrainingBackend>::new(3, &device), &path, &device).unwrap();
        assert_eq!(features(&reloaded), features(&donor.backbone));

        let config = TransferConfig {
            backbone_weights: Some(path),
            ..TransferConfig::default()
        };
        let factory = TransferFactory::new(config);
        let model = factory.build_model(InputShape::new(16, 16, 3), &device).unwrap();
        assert!(model.is_backbone_frozen());
        assert!(factory.build(InputShape::new(16, 16, 3)).is_ok());
    }

    #[test]
    fn test_random_backbone_is_trained() {
        let device = default_device();
        let shape = InputShape::new(16, 16, 3);
        let model = TransferFactory::default().build_model(shape, &device).unwrap();
        assert!(!model.is_backbone_frozen());

        let unfrozen = TransferFactory::new(TransferConfig {
            freeze_backbone: false,
            ..TransferConfig::default()
        });
        assert!(!unfrozen.build_model(shape, &device).unwrap().is_backbone_frozen());
    }

    #[test]
    fn test_mean_bce_matches_closed_form() {
        let loss = mean_bce(&[0.0, 0.0], &[1.0, 0.0]);
        assert!((loss - std::f64::consts::LN_2).abs() < 1e-9);
        assert!(mean_bce(&[20.0], &[1.0]) < 1e-6);
        assert_eq!(accuracy(&[1.0, -1.0, 2.0], &[1.0, 0.0, 0.0]), 2.0 / 3.0);
    }
}
