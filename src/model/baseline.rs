//! Baseline CNN trained from scratch
//!
//! Architecture:
//! - Conv 3x3 (32) + ReLU, MaxPool 2x2
//! - Conv 3x3 (64) + ReLU, MaxPool 2x2
//! - Flatten, Dense 128 + ReLU
//! - Dense 1 (positive-class logit)

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::burn_predictor::BinaryClassifier;

#[derive(Config, Debug)]
pub struct BaselineCnnConfig {
    pub input_height: usize,
    pub input_width: usize,

    #[config(default = "3")]
    pub in_channels: usize,

    #[config(default = "128")]
    pub hidden_units: usize,
}

impl BaselineCnnConfig {
    /// Spatial size after the two pooling stages
    pub fn pooled_dims(&self) -> (usize, usize) {
        (self.input_height / 4, self.input_width / 4)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> BaselineCnn<B> {
        let (h, w) = self.pooled_dims();
        let flat = 64 * h * w;

        BaselineCnn {
            conv1: Conv2dConfig::new([self.in_channels, 32], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            conv2: Conv2dConfig::new([32, 64], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            fc1: LinearConfig::new(flat, self.hidden_units).init(device),
            fc2: LinearConfig::new(self.hidden_units, 1).init(device),
            relu: Relu::new(),
        }
    }
}

#[derive(Module, Debug)]
pub struct BaselineCnn<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pub pool: MaxPool2d,
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
    pub relu: Relu,
}

impl<B: Backend> BinaryClassifier<B> for BaselineCnn<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(self.relu.forward(self.conv1.forward(x)));
        let x = self.pool.forward(self.relu.forward(self.conv2.forward(x)));

        // [B, C, H, W] -> [B, C*H*W]
        let [batch_size, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = self.relu.forward(self.fc1.forward(x));
        self.fc2.forward(x)
    }
}
