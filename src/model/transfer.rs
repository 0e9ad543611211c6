//! Transfer classifier: reusable convolutional backbone plus a fresh binary head
//!
//! The backbone can be initialized from separately stored weights and frozen,
//! in which case only the head is trained.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::burn_predictor::BinaryClassifier;

/// Conv + ReLU + MaxPool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            relu: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.pool.forward(self.relu.forward(self.conv.forward(x)))
    }
}

/// Four conv blocks (32 -> 64 -> 128 -> 256) and global average pooling
#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    pub block1: ConvBlock<B>,
    pub block2: ConvBlock<B>,
    pub block3: ConvBlock<B>,
    pub block4: ConvBlock<B>,
    pub global_pool: AdaptiveAvgPool2d,
}

/// Channels produced by the backbone
pub const BACKBONE_FEATURES: usize = 256;

/// Smallest spatial size that survives four 2x2 pools
pub const MIN_TRANSFER_INPUT: usize = 16;

impl<B: Backend> Backbone<B> {
    pub fn new(in_channels: usize, device: &B::Device) -> Self {
        Self {
            block1: ConvBlock::new(in_channels, 32, device),
            block2: ConvBlock::new(32, 64, device),
            block3: ConvBlock::new(64, 128, device),
            block4: ConvBlock::new(128, BACKBONE_FEATURES, device),
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
        }
    }

    /// [B, C, H, W] -> [B, 256]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.block1.forward(x);
        let x = self.block2.forward(x);
        let x = self.block3.forward(x);
        let x = self.block4.forward(x);
        let x = self.global_pool.forward(x);

        let [batch_size, channels, _, _] = x.dims();
        x.reshape([batch_size, channels])
    }
}

#[derive(Config, Debug)]
pub struct TransferClassifierConfig {
    #[config(default = "3")]
    pub in_channels: usize,

    #[config(default = "0.5")]
    pub dropout: f64,

    /// Stop gradients at the backbone output
    #[config(default = "true")]
    pub freeze_backbone: bool,
}

impl TransferClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TransferClassifier<B> {
        TransferClassifier {
            backbone: Backbone::new(self.in_channels, device),
            dropout: DropoutConfig::new(self.dropout).init(),
            head: LinearConfig::new(BACKBONE_FEATURES, 1).init(device),
            freeze_backbone: self.freeze_backbone,
        }
    }
}

#[derive(Module, Debug)]
pub struct TransferClassifier<B: Backend> {
    pub backbone: Backbone<B>,
    pub dropout: Dropout,
    pub head: Linear<B>,
    freeze_backbone: bool,
}

impl<B: Backend> TransferClassifier<B> {
    pub fn is_backbone_frozen(&self) -> bool {
        self.freeze_backbone
    }
}

impl<B: Backend> BinaryClassifier<B> for TransferClassifier<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(x);
        let features = if self.freeze_backbone {
            features.detach()
        } else {
            features
        };
        self.head.forward(self.dropout.forward(features))
    }
}
