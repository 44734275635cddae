use std::path::Path;

use wavebyol::config::{RunConfig, TrainType};
use wavebyol::model::PretextModel;

fn shipped(name: &str) -> RunConfig {
    RunConfig::load(Path::new(env!("CARGO_MANIFEST_DIR")).join("config").join(name)).unwrap()
}

#[test]
fn shipped_pretext_configuration_is_valid() {
    let config = shipped("T10-urbansound-WaveBYOL-ResNet50-Adam-15200.json");

    assert_eq!(config.train_type().unwrap(), TrainType::Pretext);
    assert_eq!(config.audio_window, 15_200);
    assert_eq!(
        config.pretext_model_name.parse::<PretextModel>().unwrap(),
        PretextModel::WaveByolResNet
    );
}

#[test]
fn shipped_downstream_configuration_is_valid() {
    let config = shipped("T10-urbansound-DownstreamClassification-Adam-15200.json");

    assert_eq!(config.train_type().unwrap(), TrainType::Downstream);
    assert_eq!(
        config.downstream_model_name.as_deref(),
        Some("DownstreamClassification")
    );
}
