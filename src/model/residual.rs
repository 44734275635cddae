use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::{Gelu, LayerNorm, LayerNormConfig, PaddingConfig1d};
use burn::prelude::{Backend, Tensor};

#[derive(Config, Debug)]
pub struct ResidualBlockConfig {
    channels: usize,
    #[config(default = 3)]
    kernel_size: usize,
}

impl ResidualBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResidualBlock<B> {
        let conv = || {
            Conv1dConfig::new(self.channels, self.channels, self.kernel_size)
                .with_padding(PaddingConfig1d::Explicit(self.kernel_size / 2))
                .init(device)
        };

        ResidualBlock {
            conv_in: conv(),
            norm_in: LayerNormConfig::new(self.channels).init(device),
            conv_out: conv(),
            norm_out: LayerNormConfig::new(self.channels).init(device),
            activation: Gelu::new(),
        }
    }
}

/// Two length-preserving convolutions with a skip connection around them.
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    conv_in: Conv1d<B>,
    norm_in: LayerNorm<B>,
    conv_out: Conv1d<B>,
    norm_out: LayerNorm<B>,
    activation: Gelu,
}

fn channel_norm<B: Backend>(norm: &LayerNorm<B>, hidden: Tensor<B, 3>) -> Tensor<B, 3> {
    norm.forward(hidden.swap_dims(1, 2)).swap_dims(1, 2)
}

impl<B: Backend> ResidualBlock<B> {
    // hidden: batch x channels x frames
    pub fn forward(&self, hidden: Tensor<B, 3>) -> Tensor<B, 3> {
        let residual = hidden.clone();

        let hidden = self.conv_in.forward(hidden);
        let hidden = channel_norm(&self.norm_in, hidden);
        let hidden = self.activation.forward(hidden);

        let hidden = self.conv_out.forward(hidden);
        let hidden = channel_norm(&self.norm_out, hidden);

        self.activation.forward(hidden + residual)
    }
}

#[test]
fn test_residual_block_preserves_shape() {
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    let device = NdArrayDevice::Cpu;
    let block = ResidualBlockConfig::new(8).init::<NdArray>(&device);

    let hidden = Tensor::<NdArray, 3>::random([2, 8, 13], Distribution::Default, &device);

    assert_eq!(block.forward(hidden).dims(), [2, 8, 13]);
}
