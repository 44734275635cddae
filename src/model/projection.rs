use burn::config::Config;
use burn::module::Module;
use burn::nn::{Gelu, LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::prelude::Backend;
use burn::tensor::Tensor;

/// Two-layer MLP used for the BYOL projector and predictor heads.
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    linear: Linear<B>,
    norm: LayerNorm<B>,
    activation: Gelu,
    projection: Linear<B>,
}

#[derive(Config, Debug)]
pub struct MlpConfig {
    pub input_size: usize,
    pub hidden_size: usize,
    pub output_size: usize,
}

impl MlpConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Mlp<B> {
        Mlp {
            linear: LinearConfig::new(self.input_size, self.hidden_size).init(device),
            norm: LayerNormConfig::new(self.hidden_size).init(device),
            activation: Gelu::new(),
            projection: LinearConfig::new(self.hidden_size, self.output_size).init(device),
        }
    }
}

impl<B: Backend> Mlp<B> {
    pub fn forward(&self, hidden: Tensor<B, 2>) -> Tensor<B, 2> {
        let hidden = self.linear.forward(hidden);
        let hidden = self.norm.forward(hidden);
        let hidden = self.activation.forward(hidden);
        self.projection.forward(hidden)
    }
}
