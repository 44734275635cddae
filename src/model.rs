use std::path::{Path, PathBuf};
use std::str::FromStr;

use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};

use crate::checkpoint::resolve_checkpoint;
use crate::config::presets;
use crate::error::{CheckpointError, ConfigError, Error};
use crate::model::downstream::{DownstreamClassifier, DownstreamClassifierConfig};
use crate::model::encoder::{WaveEncoder, WaveEncoderConfig};
use crate::model::projection::{Mlp, MlpConfig};

pub mod downstream;
pub mod encoder;
pub mod frontend;
pub mod projection;
pub mod residual;
pub mod target;

#[derive(Config, Debug)]
pub struct WaveByolConfig {
    pub encoder: WaveEncoderConfig,
    pub projection_hidden_size: usize,
    pub projection_size: usize,
}

impl WaveByolConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> WaveByol<B> {
        let hidden_size = self.encoder.hidden_size();

        WaveByol {
            encoder: self.encoder.init(device),
            projector: MlpConfig::new(hidden_size, self.projection_hidden_size, self.projection_size)
                .init(device),
            predictor: MlpConfig::new(
                self.projection_size,
                self.projection_hidden_size,
                self.projection_size,
            )
            .init(device),
        }
    }
}

/// Online network of BYOL on raw waveforms.
#[derive(Module, Debug)]
pub struct WaveByol<B: Backend> {
    pub encoder: WaveEncoder<B>,
    pub projector: Mlp<B>,
    pub predictor: Mlp<B>,
}

impl<B: Backend> WaveByol<B> {
    /// Returns the projection and the prediction for a batch of waveforms.
    pub fn forward(&self, waveforms: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let projection = self.projector.forward(self.encoder.represent(waveforms));
        let prediction = self.predictor.forward(projection.clone());

        (projection, prediction)
    }

    /// Frame-level encoder output used by downstream heads.
    pub fn features(&self, waveforms: Tensor<B, 2>) -> Tensor<B, 3> {
        self.encoder.forward(waveforms)
    }
}

/// Pretext architectures selectable through `pretext_model_name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PretextModel {
    WaveByol,
    WaveByolResNet,
    WaveByolTiny,
}

impl FromStr for PretextModel {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "WaveBYOL" => Ok(PretextModel::WaveByol),
            "WaveBYOL-ResNet" | "WaveBYOL-ResNet50" => Ok(PretextModel::WaveByolResNet),
            "WaveBYOL-Tiny" => Ok(PretextModel::WaveByolTiny),
            other => Err(ConfigError::UnknownPretextModel(other.to_string())),
        }
    }
}

impl PretextModel {
    pub fn config(self) -> WaveByolConfig {
        match self {
            PretextModel::WaveByol => presets::wave_byol(),
            PretextModel::WaveByolResNet => presets::wave_byol_resnet(),
            PretextModel::WaveByolTiny => presets::wave_byol_tiny(),
        }
    }
}

/// Downstream heads selectable through `downstream_model_name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownstreamModel {
    Classification,
    Linear,
}

impl FromStr for DownstreamModel {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "DownstreamClassification" => Ok(DownstreamModel::Classification),
            "DownstreamLinear" => Ok(DownstreamModel::Linear),
            other => Err(ConfigError::UnknownDownstreamModel(other.to_string())),
        }
    }
}

impl DownstreamModel {
    pub fn config(self, input_size: usize, num_classes: usize) -> DownstreamClassifierConfig {
        let config = DownstreamClassifierConfig::new(input_size, num_classes);

        match self {
            DownstreamModel::Classification => config.with_pooling_dim(Some(input_size)),
            DownstreamModel::Linear => config.with_dropout(0.0),
        }
    }
}

/// Accepts either a record file (with or without extension) or a checkpoint
/// directory holding `model.mpk`.
fn model_record_path(checkpoint: &Path) -> PathBuf {
    if checkpoint.is_dir() {
        checkpoint.join("model")
    } else {
        checkpoint.to_path_buf()
    }
}

fn load_weights<B: Backend, M: Module<B>>(
    model: M,
    checkpoint: &Path,
    device: &B::Device,
) -> Result<M, CheckpointError> {
    let path = model_record_path(&resolve_checkpoint(checkpoint)?);

    model
        .load_file(
            path.clone(),
            &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
            device,
        )
        .map_err(|e| CheckpointError::Record {
            path,
            reason: e.to_string(),
        })
}

pub fn load_pretext_model<B: Backend>(
    model_name: &str,
    checkpoint: Option<&Path>,
    device: &B::Device,
) -> Result<WaveByol<B>, Error> {
    let model = model_name.parse::<PretextModel>()?.config().init::<B>(device);

    match checkpoint {
        Some(checkpoint) => {
            tracing::info!(checkpoint = %checkpoint.display(), "loading pretext weights");
            Ok(load_weights(model, checkpoint, device)?)
        }
        None => Ok(model),
    }
}

pub fn load_downstream_model<B: Backend>(
    model_name: &str,
    input_size: usize,
    num_classes: usize,
    checkpoint: Option<&Path>,
    device: &B::Device,
) -> Result<DownstreamClassifier<B>, Error> {
    let model = model_name
        .parse::<DownstreamModel>()?
        .config(input_size, num_classes)
        .init::<B>(device);

    match checkpoint {
        Some(checkpoint) => {
            tracing::info!(checkpoint = %checkpoint.display(), "loading downstream weights");
            Ok(load_weights(model, checkpoint, device)?)
        }
        None => Ok(model),
    }
}
