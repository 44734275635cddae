use std::fs;
use std::path::Path;

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};

use wavebyol::checkpoint::load_meta;
use wavebyol::config::RunConfig;
use wavebyol::io::{write_wav, Audio};
use wavebyol::metric::read_scalars;
use wavebyol::model::{load_downstream_model, PretextModel};
use wavebyol::train::run_on;

type TestBackend = Autodiff<NdArray>;

fn write_tone(path: &Path, frequency: f32, len: usize) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let audio = Audio {
        samples: (0..len)
            .map(|i| (i as f32 * frequency * std::f32::consts::TAU / 8_000.0).sin() * 0.3)
            .collect(),
        sample_rate: 8_000,
        channels: 1,
    };
    write_wav(path, &audio).unwrap();
}

fn write_split(root: &Path, clips_per_class: usize) {
    for i in 0..clips_per_class {
        write_tone(&root.join("low").join(format!("{i}.wav")), 220.0 + i as f32, 900);
        write_tone(&root.join("high").join(format!("{i}.wav")), 1_760.0 + i as f32, 700);
    }
}

fn config(root: &Path, overrides: serde_json::Value) -> RunConfig {
    let mut value = serde_json::json!({
        "train_type": "pretext",
        "pretext_model_name": "WaveBYOL-Tiny",
        "epoch": 2,
        "tensorboard_writer_name": "tiny",
        "train_dataset": root.join("train"),
        "test_dataset": root.join("test"),
        "batch_size": 2,
        "num_workers": 1,
        "audio_window": 400,
        "sampling_rate": 8000,
        "learning_rate": 0.001,
        "checkpoint_save_directory": root.join("checkpoints"),
        "metrics_directory": root.join("runs")
    });
    for (key, v) in overrides.as_object().unwrap() {
        value[key] = v.clone();
    }

    let config: RunConfig = serde_json::from_value(value).unwrap();
    config.validate().unwrap();
    config
}

#[test]
fn pretext_run_writes_metrics_and_checkpoints_on_improvement() {
    let dir = tempfile::tempdir().unwrap();
    write_split(&dir.path().join("train"), 3);
    write_split(&dir.path().join("test"), 1);

    let summary = run_on::<TestBackend>(
        &config(dir.path(), serde_json::json!({})),
        NdArrayDevice::Cpu,
    )
    .unwrap();

    let events = read_scalars(&summary.metrics_dir).unwrap();
    // 6 clips in batches of 2, for 2 epochs
    let train_steps = events
        .iter()
        .filter(|e| e.tag == "Loss/train_pretext")
        .map(|e| e.step)
        .collect::<Vec<_>>();
    assert_eq!(train_steps, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(
        events.iter().filter(|e| e.tag == "Loss/test_pretext_epoch").count(),
        2
    );
    assert!(events
        .iter()
        .filter(|e| e.tag.starts_with("Loss/"))
        .all(|e| (0.0..=8.0).contains(&e.value)));

    // the second epoch saves exactly when it becomes the best one
    let best_epoch = summary.best_epoch.unwrap();
    assert!(best_epoch == 1 || best_epoch == 2);
    assert_eq!(summary.checkpoint_dir.is_some(), best_epoch == 2);
}

#[test]
fn downstream_run_saves_each_improvement_and_reloads() {
    let dir = tempfile::tempdir().unwrap();
    // one window per clip, so training and test crops are identical
    for i in 0..2 {
        let train = dir.path().join("train");
        write_tone(&train.join("low").join(format!("{i}.wav")), 220.0 + 10.0 * i as f32, 400);
        write_tone(&train.join("high").join(format!("{i}.wav")), 1_760.0 + 10.0 * i as f32, 400);
    }

    // full-batch gradient descent on a linear head, tested on its training set
    let config = config(
        dir.path(),
        serde_json::json!({
            "train_type": "downstream",
            "downstream_model_name": "DownstreamLinear",
            "test_dataset": dir.path().join("train"),
            "epoch": 3,
            "batch_size": 4,
            "optimizer_name": "SGD",
            "momentum": 0.0,
            "learning_rate": 0.05,
            "checkpoint_file_name": "linear-head"
        }),
    );
    let summary = run_on::<TestBackend>(&config, NdArrayDevice::Cpu).unwrap();

    assert_eq!(summary.best_epoch, Some(3));
    let checkpoint = summary.checkpoint_dir.unwrap();
    assert!(checkpoint
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("linear-head-best-"));
    assert!(checkpoint.join("model.mpk").exists());
    assert!(checkpoint.join("optimizer.mpk").exists());

    let meta = load_meta(&checkpoint).unwrap();
    assert_eq!(meta.epoch, 3);
    assert_eq!(meta.model_name, "DownstreamLinear");
    assert_eq!(meta.train_type, "downstream");
    assert_eq!(Some(meta.loss), summary.best_loss);

    let losses = read_scalars(&summary.metrics_dir)
        .unwrap()
        .into_iter()
        .filter(|e| e.tag == "Loss/test_downstream_epoch")
        .map(|e| e.value)
        .collect::<Vec<_>>();
    assert_eq!(losses.len(), 3);
    assert!(losses.windows(2).all(|pair| pair[1] < pair[0]));

    let input_size = PretextModel::WaveByolTiny.config().encoder.hidden_size();
    load_downstream_model::<NdArray>(
        "DownstreamLinear",
        input_size,
        2,
        Some(checkpoint.as_path()),
        &NdArrayDevice::Cpu,
    )
    .unwrap();
}

#[test]
fn downstream_run_reports_accuracy() {
    let dir = tempfile::tempdir().unwrap();
    write_split(&dir.path().join("train"), 2);
    write_split(&dir.path().join("test"), 1);

    let summary = run_on::<TestBackend>(
        &config(
            dir.path(),
            serde_json::json!({
                "train_type": "downstream",
                "downstream_model_name": "DownstreamLinear",
                "epoch": 1,
                "optimizer_name": "SGD"
            }),
        ),
        NdArrayDevice::Cpu,
    )
    .unwrap();

    let events = read_scalars(&summary.metrics_dir).unwrap();
    let accuracy = events
        .iter()
        .find(|e| e.tag == "Accuracy/test_downstream_epoch")
        .unwrap();
    assert!((0.0..=1.0).contains(&accuracy.value));

    // a single epoch only sets the reference loss
    assert_eq!(summary.best_epoch, Some(1));
    assert!(summary.checkpoint_dir.is_none());
}

#[test]
fn unknown_test_label_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    write_split(&dir.path().join("train"), 1);
    write_tone(&dir.path().join("test").join("mid").join("0.wav"), 440.0, 500);

    let result = run_on::<TestBackend>(
        &config(dir.path(), serde_json::json!({})),
        NdArrayDevice::Cpu,
    );

    assert!(matches!(
        result,
        Err(wavebyol::Error::Dataset(
            wavebyol::error::DatasetError::UnknownLabel { .. }
        ))
    ));
}
