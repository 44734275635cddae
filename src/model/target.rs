use burn::module::{AutodiffModule, Module};
use burn::prelude::{Backend, Tensor};
use burn::tensor::backend::AutodiffBackend;

use crate::model::encoder::WaveEncoder;
use crate::model::projection::Mlp;
use crate::model::WaveByol;
use crate::ops::ema_update;

/// Slow-moving copy of the online encoder and projector.
///
/// Lives on the inner backend so its outputs never carry gradients; the
/// regression targets of the online predictor come from here.
#[derive(Module, Debug)]
pub struct TargetNetwork<B: Backend> {
    encoder: WaveEncoder<B>,
    projector: Mlp<B>,
}

impl<B: Backend> TargetNetwork<B> {
    pub fn from_online<AB>(online: &WaveByol<AB>) -> Self
    where
        AB: AutodiffBackend<InnerBackend = B>,
    {
        let online = online.valid();

        Self {
            encoder: online.encoder,
            projector: online.projector,
        }
    }

    pub fn project(&self, waveforms: Tensor<B, 2>) -> Tensor<B, 2> {
        self.projector.forward(self.encoder.represent(waveforms))
    }

    /// `target <- decay * target + (1 - decay) * online`
    pub fn update<AB>(self, online: &WaveByol<AB>, decay: f64) -> Self
    where
        AB: AutodiffBackend<InnerBackend = B>,
    {
        let online = online.valid();

        Self {
            encoder: ema_update(self.encoder, &online.encoder, decay),
            projector: ema_update(self.projector, &online.projector, decay),
        }
    }
}
