use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::{Gelu, LayerNorm, LayerNormConfig};
use burn::prelude::{Backend, Tensor};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Strided Conv1d followed by a per-frame channel LayerNorm and GELU.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv1d<B>,
    norm: LayerNorm<B>,
    activation: Gelu,
}

impl<B: Backend> ConvBlock<B> {
    fn new(channels_in: usize, layer: &ConvLayer, device: &B::Device) -> Self {
        Self {
            conv: Conv1dConfig::new(channels_in, layer.channels, layer.kernel)
                .with_stride(layer.stride)
                .init(device),
            norm: LayerNormConfig::new(layer.channels).init(device),
            activation: Gelu::new(),
        }
    }

    // batch x channels x frames
    pub fn forward(&self, hidden: Tensor<B, 3>) -> Tensor<B, 3> {
        let hidden = self.conv.forward(hidden);
        let hidden = self.norm.forward(hidden.swap_dims(1, 2)).swap_dims(1, 2);

        self.activation.forward(hidden)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvLayer {
    pub channels: usize,
    pub kernel: usize,
    pub stride: usize,
}

impl ConvLayer {
    /// Frames left after this layer, zero when the input is shorter than the
    /// kernel.
    pub fn frames(&self, input_frames: usize) -> usize {
        input_frames
            .checked_sub(self.kernel)
            .map_or(0, |valid| valid / self.stride + 1)
    }
}

/// Convolutional front end mapping raw mono waveforms to frame features.
#[derive(Config, Debug)]
pub struct FrontEndConfig {
    pub layers: Vec<ConvLayer>,
}

impl FrontEndConfig {
    /// Builds the config from parallel lists of channels, kernels and strides.
    pub fn from_layers(channels: &[usize], kernels: &[usize], strides: &[usize]) -> Self {
        Self {
            layers: itertools::izip!(channels, kernels, strides)
                .map(|(&channels, &kernel, &stride)| ConvLayer {
                    channels,
                    kernel,
                    stride,
                })
                .collect_vec(),
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> FrontEnd<B> {
        let channels_in = std::iter::once(1).chain(self.layers.iter().map(|l| l.channels));

        FrontEnd {
            blocks: channels_in
                .zip(&self.layers)
                .map(|(channels_in, layer)| ConvBlock::new(channels_in, layer, device))
                .collect_vec(),
        }
    }

    pub fn output_channels(&self) -> usize {
        self.layers.last().map_or(1, |layer| layer.channels)
    }

    /// Number of frames produced for `samples` input samples.
    pub fn output_frames(&self, samples: usize) -> usize {
        self.layers
            .iter()
            .fold(samples, |frames, layer| layer.frames(frames))
    }

    /// Input samples per output frame.
    pub fn hop_length(&self) -> usize {
        self.layers.iter().map(|layer| layer.stride).product()
    }
}

#[derive(Module, Debug)]
pub struct FrontEnd<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
}

impl<B: Backend> FrontEnd<B> {
    /// batch x samples -> batch x channels x frames
    pub fn forward(&self, waveforms: Tensor<B, 2>) -> Tensor<B, 3> {
        self.blocks
            .iter()
            .fold(waveforms.unsqueeze_dim(1), |hidden, block| block.forward(hidden))
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    use super::*;

    #[test]
    fn frame_arithmetic() {
        let config = FrontEndConfig::from_layers(&[4, 6], &[10, 3], &[5, 2]);

        // (100 - 10) / 5 + 1 = 19, (19 - 3) / 2 + 1 = 9
        assert_eq!(config.output_frames(100), 9);
        // (20 - 10) / 5 + 1 = 3, (3 - 3) / 2 + 1 = 1
        assert_eq!(config.output_frames(20), 1);
        // a single first-layer frame is shorter than the second kernel
        assert_eq!(config.output_frames(10), 0);
        assert_eq!(config.output_frames(5), 0);
        assert_eq!(config.hop_length(), 10);
    }

    #[test]
    fn forward_matches_predicted_frames() {
        let device = NdArrayDevice::Cpu;
        let config = FrontEndConfig::from_layers(&[4, 6], &[4, 3], &[2, 2]);
        let front_end = config.init::<NdArray>(&device);

        let input = Tensor::<NdArray, 2>::random([2, 64], Distribution::Default, &device);

        assert_eq!(
            front_end.forward(input).dims(),
            [2, config.output_channels(), config.output_frames(64)]
        );
    }
}
