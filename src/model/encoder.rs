use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};
use itertools::Itertools;

use crate::model::frontend::{FrontEnd, FrontEndConfig};
use crate::model::residual::{ResidualBlock, ResidualBlockConfig};

#[derive(Config, Debug)]
pub struct WaveEncoderConfig {
    pub front_end: FrontEndConfig,
    #[config(default = 0)]
    pub num_residual_blocks: usize,
}

impl WaveEncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> WaveEncoder<B> {
        let channels = self.hidden_size();

        WaveEncoder {
            front_end: self.front_end.init(device),
            residual_blocks: (0..self.num_residual_blocks)
                .map(|_| ResidualBlockConfig::new(channels).init(device))
                .collect_vec(),
        }
    }

    pub fn hidden_size(&self) -> usize {
        self.front_end.output_channels()
    }

    pub fn output_len(&self, input_len: usize) -> usize {
        self.front_end.output_frames(input_len)
    }
}

/// Waveform encoder: convolutional front end, then optional residual blocks.
#[derive(Module, Debug)]
pub struct WaveEncoder<B: Backend> {
    front_end: FrontEnd<B>,
    residual_blocks: Vec<ResidualBlock<B>>,
}

impl<B: Backend> WaveEncoder<B> {
    /// batch x time -> batch x frames x hidden
    pub fn forward(&self, waveforms: Tensor<B, 2>) -> Tensor<B, 3> {
        let mut hidden = self.front_end.forward(waveforms);

        for block in &self.residual_blocks {
            hidden = block.forward(hidden);
        }

        hidden.swap_dims(1, 2)
    }

    /// Time-averaged representation, batch x hidden.
    pub fn represent(&self, waveforms: Tensor<B, 2>) -> Tensor<B, 2> {
        mean_over_time(self.forward(waveforms))
    }
}

pub fn mean_over_time<B: Backend>(hidden: Tensor<B, 3>) -> Tensor<B, 2> {
    hidden.mean_dim(1).squeeze(1)
}
