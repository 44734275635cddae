use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::PretextModel;

pub mod presets;

/// Which half of the pipeline a run trains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainType {
    Pretext,
    Downstream,
}

impl FromStr for TrainType {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.contains("pretext") {
            Ok(TrainType::Pretext)
        } else if value == "downstream" {
            Ok(TrainType::Downstream)
        } else {
            Err(ConfigError::UnknownTrainType(value.to_string()))
        }
    }
}

/// A training run as read from its JSON configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub train_type: String,
    pub pretext_model_name: String,
    #[serde(default)]
    pub downstream_model_name: Option<String>,
    #[serde(default)]
    pub pretext_checkpoint: Option<PathBuf>,
    #[serde(default)]
    pub downstream_checkpoint: Option<PathBuf>,
    pub epoch: usize,
    #[serde(default)]
    pub use_cuda: bool,
    #[serde(default = "default_loss_function")]
    pub loss_function: String,
    pub tensorboard_writer_name: String,

    pub train_dataset: PathBuf,
    pub test_dataset: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    #[serde(default = "default_true")]
    pub dataset_shuffle: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_audio_window")]
    pub audio_window: usize,
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: u32,

    #[serde(default = "default_optimizer_name")]
    pub optimizer_name: String,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default)]
    pub weight_decay: Option<f64>,
    #[serde(default = "default_momentum")]
    pub momentum: f64,
    #[serde(default)]
    pub warmup_steps: Option<usize>,
    #[serde(default)]
    pub total_steps: Option<usize>,
    #[serde(default = "default_ema_decay")]
    pub ema_decay: f64,

    #[serde(default = "default_checkpoint_directory")]
    pub checkpoint_save_directory: PathBuf,
    #[serde(default)]
    pub checkpoint_file_name: Option<String>,
    #[serde(default = "default_metrics_directory")]
    pub metrics_directory: PathBuf,
}

fn default_loss_function() -> String {
    "CrossEntropyLoss".into()
}

fn default_batch_size() -> usize {
    16
}

fn default_num_workers() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_seed() -> u64 {
    42
}

fn default_audio_window() -> usize {
    15_200
}

fn default_sampling_rate() -> u32 {
    16_000
}

fn default_optimizer_name() -> String {
    "Adam".into()
}

fn default_learning_rate() -> f64 {
    1e-4
}

fn default_momentum() -> f64 {
    0.9
}

fn default_ema_decay() -> f64 {
    0.99
}

fn default_checkpoint_directory() -> PathBuf {
    PathBuf::from("checkpoints")
}

fn default_metrics_directory() -> PathBuf {
    PathBuf::from("runs")
}

impl RunConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: RunConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let train_type = self.train_type()?;

        let invalid = |key, reason: &str| ConfigError::Invalid {
            key,
            reason: reason.to_string(),
        };

        if self.epoch == 0 {
            return Err(invalid("epoch", "must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be at least 1"));
        }
        if self.audio_window == 0 {
            return Err(invalid("audio_window", "must be at least 1"));
        }
        let encoder = self.pretext_model_name.parse::<PretextModel>()?.config().encoder;
        if encoder.output_len(self.audio_window) == 0 {
            return Err(ConfigError::Invalid {
                key: "audio_window",
                reason: format!(
                    "{} samples yield no frames for {}",
                    self.audio_window, self.pretext_model_name
                ),
            });
        }
        if self.sampling_rate == 0 {
            return Err(invalid("sampling_rate", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.ema_decay) {
            return Err(invalid("ema_decay", "must lie in [0, 1]"));
        }
        if self.learning_rate <= 0.0 {
            return Err(invalid("learning_rate", "must be positive"));
        }
        if let (Some(warmup), Some(total)) = (self.warmup_steps, self.total_steps) {
            if warmup >= total {
                return Err(invalid("warmup_steps", "must be smaller than total_steps"));
            }
        }

        if train_type == TrainType::Downstream && self.downstream_model_name.is_none() {
            return Err(invalid(
                "downstream_model_name",
                "is required when train_type is downstream",
            ));
        }

        Ok(())
    }

    pub fn train_type(&self) -> Result<TrainType, ConfigError> {
        self.train_type.parse()
    }

    /// Base name of checkpoint directories, falling back to the writer name.
    pub fn checkpoint_name(&self) -> &str {
        self.checkpoint_file_name
            .as_deref()
            .unwrap_or(&self.tensorboard_writer_name)
    }
}
