use std::fs::{self, File};
use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::error::CheckpointError;
use crate::optim::ModelOptimizer;

/// Outcome of reporting an epoch's test loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// First epoch: the loss becomes the reference, nothing is saved.
    Initialised,
    /// Strictly better than every earlier epoch.
    Improved,
    NotImproved,
}

impl Decision {
    pub fn should_save(self) -> bool {
        self == Decision::Improved
    }
}

/// Lowest test loss seen so far.
#[derive(Debug, Clone, Copy, Default)]
pub struct BestLoss {
    best: Option<(usize, f64)>,
}

impl BestLoss {
    pub fn observe(&mut self, epoch: usize, loss: f64) -> Decision {
        match self.best {
            None => {
                self.best = Some((epoch, loss));
                Decision::Initialised
            }
            Some((_, best)) if loss < best => {
                self.best = Some((epoch, loss));
                Decision::Improved
            }
            Some(_) => Decision::NotImproved,
        }
    }

    pub fn best_loss(&self) -> Option<f64> {
        self.best.map(|(_, loss)| loss)
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best.map(|(epoch, _)| epoch)
    }
}

/// Written as `meta.json` beside the records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch: usize,
    pub loss: f64,
    pub train_type: String,
    pub model_name: String,
}

/// `<checkpoint_save_directory>/<checkpoint name>-<mode>-<date>`
pub fn checkpoint_dir(config: &RunConfig, mode: &str, date: &str) -> PathBuf {
    config
        .checkpoint_save_directory
        .join(format!("{}-{mode}-{date}", config.checkpoint_name()))
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CheckpointError + '_ {
    move |source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn write_meta(dir: &Path, meta: &CheckpointMeta) -> Result<(), CheckpointError> {
    let path = dir.join("meta.json");
    let file = File::create(&path).map_err(io_error(&path))?;

    serde_json::to_writer_pretty(file, meta).map_err(|source| CheckpointError::Meta { path, source })
}

pub fn load_meta(dir: impl AsRef<Path>) -> Result<CheckpointMeta, CheckpointError> {
    let path = dir.as_ref().join("meta.json");
    let file = File::open(&path).map_err(io_error(&path))?;

    serde_json::from_reader(file).map_err(|source| CheckpointError::Meta { path, source })
}

/// `path` itself when it names a directory or record file, otherwise the
/// newest `<path>-<date>` run beside it (by `meta.json` modification time).
pub fn resolve_checkpoint(path: &Path) -> Result<PathBuf, CheckpointError> {
    if path.exists() || path.with_extension("mpk").exists() {
        return Ok(path.to_path_buf());
    }

    let not_found = || CheckpointError::NotFound(path.to_path_buf());
    let prefix = match path.file_name().and_then(|name| name.to_str()) {
        Some(name) => format!("{name}-"),
        None => return Err(not_found()),
    };
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let entries = fs::read_dir(parent).map_err(|_| not_found())?;

    entries
        .filter_map(Result::ok)
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(&prefix))
        })
        .filter_map(|entry| {
            let modified = fs::metadata(entry.path().join("meta.json"))
                .and_then(|meta| meta.modified())
                .ok()?;
            Some((modified, entry.path()))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, dir)| dir)
        .ok_or_else(not_found)
}

/// Saves `model`, the optimizer state and the metadata under one directory,
/// replacing an earlier save of the same run.
pub fn save_checkpoint<B, M>(
    dir: &Path,
    model: &M,
    optimizer: &ModelOptimizer<M, B>,
    meta: &CheckpointMeta,
) -> Result<(), CheckpointError>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    fs::create_dir_all(dir).map_err(io_error(dir))?;

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let model_path = dir.join("model");
    model
        .clone()
        .save_file(&model_path, &recorder)
        .map_err(|e| CheckpointError::Record {
            path: model_path,
            reason: e.to_string(),
        })?;

    optimizer.save_record(&dir.join("optimizer"))?;
    write_meta(dir, meta)?;

    tracing::info!(
        dir = %dir.display(),
        epoch = meta.epoch,
        loss = meta.loss,
        "checkpoint saved"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_epoch_only_initialises() {
        let mut best = BestLoss::default();

        assert_eq!(best.observe(1, 0.5), Decision::Initialised);
        assert!(!Decision::Initialised.should_save());
        assert_eq!(best.best_loss(), Some(0.5));
    }

    #[test]
    fn saves_exactly_on_strict_improvement() {
        let mut best = BestLoss::default();
        let losses = [0.9, 0.8, 0.8, 0.85, 0.7, 0.71];

        let saved = losses
            .iter()
            .enumerate()
            .filter(|(i, loss)| best.observe(i + 1, **loss).should_save())
            .map(|(i, _)| i + 1)
            .collect::<Vec<_>>();

        assert_eq!(saved, vec![2, 5]);
        assert_eq!(best.best_loss(), Some(0.7));
        assert_eq!(best.best_epoch(), Some(5));
    }

    #[test]
    fn meta_round_trips_through_directory() {
        let dir = tempfile::tempdir().unwrap();
        let meta = CheckpointMeta {
            epoch: 3,
            loss: 0.25,
            train_type: "pretext".into(),
            model_name: "WaveBYOL".into(),
        };

        write_meta(dir.path(), &meta).unwrap();

        assert_eq!(load_meta(dir.path()).unwrap(), meta);
        assert!(matches!(
            load_meta(dir.path().join("missing")),
            Err(CheckpointError::Io { .. })
        ));
    }

    fn dated_run(root: &Path, name: &str, seconds: u64) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        let meta = CheckpointMeta {
            epoch: 1,
            loss: 1.0,
            train_type: "pretext".into(),
            model_name: "WaveBYOL".into(),
        };
        write_meta(&dir, &meta).unwrap();
        File::options()
            .write(true)
            .open(dir.join("meta.json"))
            .unwrap()
            .set_modified(std::time::UNIX_EPOCH + std::time::Duration::from_secs(seconds))
            .unwrap();
        dir
    }

    #[test]
    fn undated_name_resolves_to_newest_run() {
        let root = tempfile::tempdir().unwrap();
        dated_run(root.path(), "byol-best-Mar02_10-00-00", 2_000);
        let newest = dated_run(root.path(), "byol-best-Jan05_09-00-00", 3_000);
        dated_run(root.path(), "byol-bestish-Dec31_00-00-00", 9_000);
        fs::create_dir_all(root.path().join("byol-best-empty")).unwrap();

        assert_eq!(resolve_checkpoint(&root.path().join("byol-best")).unwrap(), newest);
        assert!(matches!(
            resolve_checkpoint(&root.path().join("other-best")),
            Err(CheckpointError::NotFound(_))
        ));
    }

    #[test]
    fn existing_paths_resolve_to_themselves() {
        let root = tempfile::tempdir().unwrap();
        let run = dated_run(root.path(), "byol-best-Jan01_00-00-00", 1_000);
        fs::write(root.path().join("head.mpk"), b"").unwrap();

        assert_eq!(resolve_checkpoint(&run).unwrap(), run);
        assert_eq!(
            resolve_checkpoint(&root.path().join("head")).unwrap(),
            root.path().join("head")
        );
    }

    #[test]
    fn directory_name_from_config() {
        let config: RunConfig = serde_json::from_value(serde_json::json!({
            "train_type": "pretext",
            "pretext_model_name": "WaveBYOL",
            "epoch": 1,
            "tensorboard_writer_name": "T10-urbansound",
            "train_dataset": "train",
            "test_dataset": "test",
            "checkpoint_save_directory": "ckpt"
        }))
        .unwrap();

        assert_eq!(
            checkpoint_dir(&config, "best", "Jan01_00-00-00"),
            PathBuf::from("ckpt/T10-urbansound-best-Jan01_00-00-00")
        );
    }
}
