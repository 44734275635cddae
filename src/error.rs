use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Convert(#[from] ConvertError),
    #[error("metrics writer: {0}")]
    Metrics(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("unknown train_type {0:?}, expected a pretext type or \"downstream\"")]
    UnknownTrainType(String),
    #[error("unknown pretext model {0:?}")]
    UnknownPretextModel(String),
    #[error("unknown downstream model {0:?}")]
    UnknownDownstreamModel(String),
    #[error("unknown optimizer {0:?}")]
    UnknownOptimizer(String),
    #[error("unknown loss function {0:?}")]
    UnknownLoss(String),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("unsupported audio format for {0}")]
    UnsupportedFormat(PathBuf),
    #[error("failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("failed to write {path}: {reason}")]
    Encode { path: PathBuf, reason: String },
    #[error("failed to resample from {from} Hz to {to} Hz: {reason}")]
    Resample { from: u32, to: u32, reason: String },
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read dataset source {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("dataset {0} contains no readable audio")]
    Empty(PathBuf),
    #[error("label {label:?} of {path} is not part of the training labels")]
    UnknownLabel { label: String, path: PathBuf },
    #[error("cannot derive a label for {0}")]
    MissingLabel(PathBuf),
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint i/o at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("checkpoint metadata at {path}: {source}")]
    Meta {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("checkpoint record at {path}: {reason}")]
    Record { path: PathBuf, reason: String },
    #[error("no checkpoint at {0} nor any dated run of it")]
    NotFound(PathBuf),
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("failed to list {path}: {source}")]
    List {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("batch size must be greater than zero")]
    ZeroBatchSize,
}
