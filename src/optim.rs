use std::path::Path;
use std::str::FromStr;

use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{Adam, AdamConfig, AdamW, AdamWConfig, GradientsParams, Optimizer, Sgd, SgdConfig};
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;
use burn::LearningRate;

use crate::config::RunConfig;
use crate::error::{CheckpointError, ConfigError};
use crate::ops::PolynomialDecay;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    Adam,
    AdamW,
    Sgd,
}

impl FromStr for OptimizerKind {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "Adam" => Ok(OptimizerKind::Adam),
            "AdamW" => Ok(OptimizerKind::AdamW),
            "SGD" => Ok(OptimizerKind::Sgd),
            other => Err(ConfigError::UnknownOptimizer(other.to_string())),
        }
    }
}

/// The optimizer named by the run configuration, over module `M`.
pub enum ModelOptimizer<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    Adam(OptimizerAdaptor<Adam<B::InnerBackend>, M, B>),
    AdamW(OptimizerAdaptor<AdamW<B::InnerBackend>, M, B>),
    Sgd(OptimizerAdaptor<Sgd<B::InnerBackend>, M, B>),
}

impl<M, B> ModelOptimizer<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    pub fn from_config(config: &RunConfig) -> Result<Self, ConfigError> {
        let kind = config.optimizer_name.parse::<OptimizerKind>()?;
        let weight_decay = config.weight_decay.map(WeightDecayConfig::new);

        let optimizer = match kind {
            OptimizerKind::Adam => ModelOptimizer::Adam(
                AdamConfig::new()
                    .with_weight_decay(weight_decay)
                    .init::<B, M>(),
            ),
            OptimizerKind::AdamW => {
                let config = match config.weight_decay {
                    Some(penalty) => AdamWConfig::new().with_weight_decay(penalty as f32),
                    None => AdamWConfig::new(),
                };
                ModelOptimizer::AdamW(config.init::<B, M>())
            }
            OptimizerKind::Sgd => ModelOptimizer::Sgd(
                SgdConfig::new()
                    .with_momentum(Some(MomentumConfig::new().with_momentum(config.momentum)))
                    .with_weight_decay(weight_decay)
                    .init::<B, M>(),
            ),
        };

        Ok(optimizer)
    }

    pub fn kind(&self) -> OptimizerKind {
        match self {
            ModelOptimizer::Adam(_) => OptimizerKind::Adam,
            ModelOptimizer::AdamW(_) => OptimizerKind::AdamW,
            ModelOptimizer::Sgd(_) => OptimizerKind::Sgd,
        }
    }

    pub fn step(&mut self, lr: LearningRate, module: M, grads: GradientsParams) -> M {
        match self {
            ModelOptimizer::Adam(optim) => optim.step(lr, module, grads),
            ModelOptimizer::AdamW(optim) => optim.step(lr, module, grads),
            ModelOptimizer::Sgd(optim) => optim.step(lr, module, grads),
        }
    }

    /// Writes the optimizer state next to the model weights.
    pub fn save_record(&self, path: &Path) -> Result<(), CheckpointError> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let file = path.to_path_buf();

        let result = match self {
            ModelOptimizer::Adam(optim) => recorder.record(optim.to_record(), file),
            ModelOptimizer::AdamW(optim) => recorder.record(optim.to_record(), file),
            ModelOptimizer::Sgd(optim) => recorder.record(optim.to_record(), file),
        };

        result.map_err(|e| CheckpointError::Record {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Learning rate per optimizer step.
#[derive(Debug, Clone)]
pub enum LearningRateSchedule {
    Constant(LearningRate),
    Polynomial(PolynomialDecay),
}

impl LearningRateSchedule {
    /// Polynomial decay to zero when `total_steps` is configured, otherwise a
    /// constant rate.
    pub fn from_config(config: &RunConfig) -> Self {
        match config.total_steps {
            Some(total_steps) => LearningRateSchedule::Polynomial(PolynomialDecay::new(
                config.learning_rate as f32,
                0.0,
                1.0,
                total_steps,
                config.warmup_steps.unwrap_or(0),
            )),
            None => LearningRateSchedule::Constant(config.learning_rate),
        }
    }

    pub fn next_lr(&mut self) -> LearningRate {
        match self {
            LearningRateSchedule::Constant(lr) => *lr,
            LearningRateSchedule::Polynomial(schedule) => schedule.next_lr(),
        }
    }
}
