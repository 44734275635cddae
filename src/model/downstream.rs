use burn::config::Config;
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Gelu, Linear, LinearConfig};
use burn::prelude::{Backend, Tensor};

use crate::model::encoder::mean_over_time;

#[derive(Config, Debug)]
pub struct DownstreamClassifierConfig {
    pub input_size: usize,
    pub num_classes: usize,
    /// Width of the per-frame layer applied before pooling; `None` gives a
    /// linear classifier on the pooled features.
    pub pooling_dim: Option<usize>,
    #[config(default = 0.1)]
    pub dropout: f64,
}

impl DownstreamClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DownstreamClassifier<B> {
        let (frame_linear, output_input) = match self.pooling_dim {
            Some(dim) => (
                Some(LinearConfig::new(self.input_size, dim).init(device)),
                dim,
            ),
            None => (None, self.input_size),
        };

        DownstreamClassifier {
            frame_linear,
            activation: Gelu::new(),
            dropout: DropoutConfig::new(self.dropout).init(),
            projection: LinearConfig::new(output_input, self.num_classes).init(device),
        }
    }
}

/// Classification head over frozen pretext features.
#[derive(Module, Debug)]
pub struct DownstreamClassifier<B: Backend> {
    frame_linear: Option<Linear<B>>,
    activation: Gelu,
    dropout: Dropout,
    projection: Linear<B>,
}

impl<B: Backend> DownstreamClassifier<B> {
    /// features: batch x frames x hidden, returns batch x classes logits
    pub fn forward(&self, features: Tensor<B, 3>) -> Tensor<B, 2> {
        let features = self.dropout.forward(features);

        let pooled = match &self.frame_linear {
            Some(linear) => {
                let pooled = mean_over_time(linear.forward(features));
                self.activation.forward(pooled)
            }
            None => mean_over_time(features),
        };

        self.projection.forward(pooled)
    }
}
