//! Convolutional/recurrent activity classifier.
//!
//! ```text
//! (batch, features, timesteps)
//!   -> Conv1d(k3, pad1) -> BatchNorm -> ReLU      64 channels
//!   -> Conv1d(k3, pad1) -> BatchNorm -> ReLU      128 channels
//!   -> (batch, timesteps, channels)
//!   -> LSTM -> Dropout(0.3) -> LSTM               hidden 64
//!   -> last hidden state -> Dropout(0.5) -> Linear
//! (batch, classes)
//! ```

use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::{
    BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, Lstm, LstmConfig,
    PaddingConfig1d,
};
use burn::prelude::*;
use burn::tensor::activation::relu;

/// Hyperparameters of [`ActivityNet`].
#[derive(Config, Debug)]
pub struct ActivityNetConfig {
    /// Input feature channels
    pub n_features: usize,
    /// Output classes
    pub n_classes: usize,
    #[config(default = 64)]
    pub conv1_channels: usize,
    #[config(default = 128)]
    pub conv2_channels: usize,
    #[config(default = 3)]
    pub kernel_size: usize,
    #[config(default = 64)]
    pub hidden_size: usize,
    /// Dropout between the two recurrent layers
    #[config(default = 0.3)]
    pub lstm_dropout: f64,
    /// Dropout on the final hidden state
    #[config(default = 0.5)]
    pub head_dropout: f64,
}

impl ActivityNetConfig {
    /// Initialize a model with fresh parameters on `device`.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ActivityNet<B> {
        let padding = PaddingConfig1d::Explicit(self.kernel_size / 2);

        ActivityNet {
            conv1: Conv1dConfig::new(self.n_features, self.conv1_channels, self.kernel_size)
                .with_padding(padding.clone())
                .init(device),
            norm1: BatchNormConfig::new(self.conv1_channels).init(device),
            conv2: Conv1dConfig::new(self.conv1_channels, self.conv2_channels, self.kernel_size)
                .with_padding(padding)
                .init(device),
            norm2: BatchNormConfig::new(self.conv2_channels).init(device),
            lstm1: LstmConfig::new(self.conv2_channels, self.hidden_size, true).init(device),
            lstm2: LstmConfig::new(self.hidden_size, self.hidden_size, true).init(device),
            lstm_dropout: DropoutConfig::new(self.lstm_dropout).init(),
            head_dropout: DropoutConfig::new(self.head_dropout).init(),
            head: LinearConfig::new(self.hidden_size, self.n_classes).init(device),
        }
    }
}

/// Two conv stages feeding a two-layer LSTM and a linear head.
///
/// Dropout and batch statistics are only active on an autodiff backend;
/// evaluate on `model.valid()`.
#[derive(Module, Debug)]
pub struct ActivityNet<B: Backend> {
    conv1: Conv1d<B>,
    norm1: BatchNorm<B, 1>,
    conv2: Conv1d<B>,
    norm2: BatchNorm<B, 1>,
    lstm1: Lstm<B>,
    lstm2: Lstm<B>,
    lstm_dropout: Dropout,
    head_dropout: Dropout,
    head: Linear<B>,
}

impl<B: Backend> ActivityNet<B> {
    /// Map `(batch, features, timesteps)` to `(batch, classes)` logits.
    pub fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 2> {
        let x = relu(self.norm1.forward(self.conv1.forward(input)));
        let x = relu(self.norm2.forward(self.conv2.forward(x)));

        let x = x.swap_dims(1, 2);
        let (x, _) = self.lstm1.forward(x, None);
        let x = self.lstm_dropout.forward(x);
        let (_, state) = self.lstm2.forward(x, None);

        let x = self.head_dropout.forward(state.hidden);
        self.head.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let model = ActivityNetConfig::new(9, 4).init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 3>::ones([2, 9, 20], &device);
        let logits = model.forward(input);
        assert_eq!(logits.dims(), [2, 4]);
    }

    #[test]
    fn test_forward_is_deterministic_without_autodiff() {
        let device = Default::default();
        let model = ActivityNetConfig::new(3, 2)
            .with_hidden_size(8)
            .init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 3>::random(
            [3, 3, 12],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let a = model.forward(input.clone()).into_data();
        let b = model.forward(input).into_data();
        a.assert_approx_eq(&b, 6);
    }

    #[test]
    fn test_default_hyperparameters() {
        let config = ActivityNetConfig::new(9, 6);
        assert_eq!(config.conv1_channels, 64);
        assert_eq!(config.conv2_channels, 128);
        assert_eq!(config.hidden_size, 64);
        assert_eq!(config.lstm_dropout, 0.3);
        assert_eq!(config.head_dropout, 0.5);
    }
}
