use crate::error::ConfigError;
use crate::model::encoder::WaveEncoderConfig;
use crate::model::frontend::FrontEndConfig;
use crate::model::{PretextModel, WaveByolConfig};

/// Pretext architecture registered under `name`.
pub fn pretext_preset(name: &str) -> Result<WaveByolConfig, ConfigError> {
    Ok(name.parse::<PretextModel>()?.config())
}

/// 160-sample hop, 10 ms frames at 16 kHz.
fn wave_front_end() -> FrontEndConfig {
    FrontEndConfig::from_layers(&[512; 5], &[10, 8, 4, 4, 4], &[5, 4, 2, 2, 2])
}

pub fn wave_byol() -> WaveByolConfig {
    WaveByolConfig {
        encoder: WaveEncoderConfig {
            front_end: wave_front_end(),
            num_residual_blocks: 0,
        },
        projection_hidden_size: 4096,
        projection_size: 256,
    }
}

pub fn wave_byol_resnet() -> WaveByolConfig {
    WaveByolConfig {
        encoder: WaveEncoderConfig {
            front_end: wave_front_end(),
            num_residual_blocks: 8,
        },
        projection_hidden_size: 4096,
        projection_size: 256,
    }
}

pub fn wave_byol_tiny() -> WaveByolConfig {
    WaveByolConfig {
        encoder: WaveEncoderConfig {
            front_end: FrontEndConfig::from_layers(&[8, 16], &[8, 4], &[4, 2]),
            num_residual_blocks: 1,
        },
        projection_hidden_size: 32,
        projection_size: 16,
    }
}
