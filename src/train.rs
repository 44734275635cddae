use std::path::PathBuf;

use burn::backend::libtorch::LibTorchDevice;
use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, LibTorch, NdArray};
use burn::module::Module;
use burn::tensor::backend::AutodiffBackend;

use crate::checkpoint::{checkpoint_dir, save_checkpoint, BestLoss, CheckpointMeta, Decision};
use crate::config::{RunConfig, TrainType};
use crate::data::dataset::AudioDataset;
use crate::data::{downstream_loader, load_dataset, pretext_loader, Split};
use crate::error::{ConfigError, Error};
use crate::loss::Criterion;
use crate::metric::{setup_timestamp, MetricsWriter};
use crate::model::{load_downstream_model, load_pretext_model, PretextModel};
use crate::optim::{LearningRateSchedule, ModelOptimizer};
use crate::task::downstream::{test_downstream, DownstreamTrainer};
use crate::task::pretext::{test_pretext, PretextModels, PretextTrainer};
use crate::task::EpochSummary;

/// Checkpoints of a run are stored under this mode name.
const CHECKPOINT_MODE: &str = "best";

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub best_loss: Option<f64>,
    pub best_epoch: Option<usize>,
    pub checkpoint_dir: Option<PathBuf>,
    pub metrics_dir: PathBuf,
}

/// Trains the run described by `config` on the configured device.
pub fn run(config: &RunConfig) -> Result<RunSummary, Error> {
    if config.use_cuda {
        tracing::info!("using libtorch backend on cuda:0");
        run_on::<Autodiff<LibTorch>>(config, LibTorchDevice::Cuda(0))
    } else {
        tracing::info!("using ndarray backend on cpu");
        run_on::<Autodiff<NdArray>>(config, NdArrayDevice::Cpu)
    }
}

/// Everything shared by both run types once data and writer are set up.
struct RunContext<'a> {
    config: &'a RunConfig,
    timestamp: String,
    writer: MetricsWriter,
    best: BestLoss,
    saved: Option<PathBuf>,
}

impl RunContext<'_> {
    fn log_epoch(&mut self, split: &str, task: &str, epoch: usize, summary: EpochSummary) -> Result<(), Error> {
        self.writer
            .add_scalar(&format!("Loss/{split}_{task}_epoch"), summary.loss, epoch)
            .map_err(Error::Metrics)?;
        if let Some(accuracy) = summary.accuracy {
            self.writer
                .add_scalar(&format!("Accuracy/{split}_{task}_epoch"), accuracy, epoch)
                .map_err(Error::Metrics)?;
        }
        self.writer.flush().map_err(Error::Metrics)?;

        tracing::info!(epoch, loss = summary.loss, accuracy = ?summary.accuracy, "{split} {task} epoch done");

        Ok(())
    }

    /// Records the epoch's test loss; returns the directory to save to when
    /// it is a strict improvement.
    fn observe(&mut self, epoch: usize, test_loss: f64) -> Option<PathBuf> {
        let decision = self.best.observe(epoch, test_loss);
        match decision {
            Decision::Initialised => tracing::info!(epoch, loss = test_loss, "initial best loss"),
            Decision::NotImproved => tracing::debug!(epoch, loss = test_loss, "no improvement"),
            Decision::Improved => tracing::info!("save checkpoint at {epoch} epoch"),
        }

        decision.should_save().then(|| {
            let dir = checkpoint_dir(self.config, CHECKPOINT_MODE, &self.timestamp);
            self.saved = Some(dir.clone());
            dir
        })
    }

    fn meta(&self, epoch: usize, loss: f64, model_name: &str) -> CheckpointMeta {
        CheckpointMeta {
            epoch,
            loss,
            train_type: self.config.train_type.clone(),
            model_name: model_name.to_string(),
        }
    }

    fn finish(self) -> Result<RunSummary, Error> {
        let metrics_dir = self.writer.run_dir().to_path_buf();
        self.writer.close().map_err(Error::Metrics)?;

        tracing::info!(
            best_loss = ?self.best.best_loss(),
            best_epoch = ?self.best.best_epoch(),
            "training finished"
        );

        Ok(RunSummary {
            best_loss: self.best.best_loss(),
            best_epoch: self.best.best_epoch(),
            checkpoint_dir: self.saved,
            metrics_dir,
        })
    }
}

pub fn run_on<B: AutodiffBackend>(config: &RunConfig, device: B::Device) -> Result<RunSummary, Error> {
    let train_type = config.train_type()?;
    let timestamp = setup_timestamp();

    let train_dataset = load_dataset(config, Split::Train, None)?;
    let test_dataset = load_dataset(config, Split::Test, Some(&train_dataset.label_dict))?;

    tracing::info!(
        directory = %config.metrics_directory.display(),
        name = %config.tensorboard_writer_name,
        "opening metrics writer"
    );
    let writer = MetricsWriter::create(
        &config.metrics_directory,
        &config.tensorboard_writer_name,
        &timestamp,
    )
    .map_err(Error::Metrics)?;

    let context = RunContext {
        config,
        timestamp,
        writer,
        best: BestLoss::default(),
        saved: None,
    };

    match train_type {
        TrainType::Pretext => run_pretext::<B>(context, train_dataset, test_dataset, device),
        TrainType::Downstream => run_downstream::<B>(context, train_dataset, test_dataset, device),
    }
}

fn run_pretext<B: AutodiffBackend>(
    mut context: RunContext<'_>,
    train_dataset: AudioDataset,
    test_dataset: AudioDataset,
    device: B::Device,
) -> Result<RunSummary, Error> {
    let config = context.config;
    let train_loader = pretext_loader::<B>(config, Split::Train, train_dataset, &device);
    let test_loader = pretext_loader::<B::InnerBackend>(config, Split::Test, test_dataset, &device);

    let online = load_pretext_model::<B>(
        &config.pretext_model_name,
        config.pretext_checkpoint.as_deref(),
        &device,
    )?;
    tracing::info!(
        model = %config.pretext_model_name,
        params = online.num_params(),
        "pretext model loaded"
    );
    let mut models = PretextModels::new(online);

    let mut optimizer = ModelOptimizer::from_config(config)?;
    let mut schedule = LearningRateSchedule::from_config(config);
    tracing::info!(optimizer = ?optimizer.kind(), lr = config.learning_rate, "optimizer ready");

    for epoch in 1..=config.epoch {
        let mut trainer = PretextTrainer {
            optimizer: &mut optimizer,
            schedule: &mut schedule,
            ema_decay: config.ema_decay,
            epochs: config.epoch,
        };
        let (trained, train_summary) =
            trainer.train_pretext(epoch, models, &train_loader, &mut context.writer)?;
        models = trained;
        context.log_epoch("train", "pretext", epoch, train_summary)?;

        let test_summary = test_pretext(epoch, config.epoch, &models, &test_loader, &mut context.writer)?;
        context.log_epoch("test", "pretext", epoch, test_summary)?;

        if let Some(dir) = context.observe(epoch, test_summary.loss) {
            let meta = context.meta(epoch, test_summary.loss, &config.pretext_model_name);
            save_checkpoint(&dir, &models.online, &optimizer, &meta)?;
        }
    }

    context.finish()
}

fn run_downstream<B: AutodiffBackend>(
    mut context: RunContext<'_>,
    train_dataset: AudioDataset,
    test_dataset: AudioDataset,
    device: B::Device,
) -> Result<RunSummary, Error> {
    let config = context.config;
    let downstream_name = config
        .downstream_model_name
        .as_deref()
        .ok_or_else(|| ConfigError::Invalid {
            key: "downstream_model_name",
            reason: "is required when train_type is downstream".into(),
        })?;
    let criterion = config.loss_function.parse::<Criterion>()?;
    let num_classes = train_dataset.num_classes();

    let train_loader = downstream_loader::<B>(config, Split::Train, train_dataset, &device);
    let test_loader = downstream_loader::<B::InnerBackend>(config, Split::Test, test_dataset, &device);

    let pretext = load_pretext_model::<B::InnerBackend>(
        &config.pretext_model_name,
        config.pretext_checkpoint.as_deref(),
        &device,
    )?;
    let input_size = config
        .pretext_model_name
        .parse::<PretextModel>()?
        .config()
        .encoder
        .hidden_size();
    let mut head = load_downstream_model::<B>(
        downstream_name,
        input_size,
        num_classes,
        config.downstream_checkpoint.as_deref(),
        &device,
    )?;
    tracing::info!(
        pretext = %config.pretext_model_name,
        pretext_params = pretext.num_params(),
        downstream = downstream_name,
        downstream_params = head.num_params(),
        num_classes,
        "models loaded"
    );

    let mut optimizer = ModelOptimizer::from_config(config)?;
    let mut schedule = LearningRateSchedule::from_config(config);
    tracing::info!(optimizer = ?optimizer.kind(), lr = config.learning_rate, "optimizer ready");

    for epoch in 1..=config.epoch {
        let mut trainer = DownstreamTrainer {
            optimizer: &mut optimizer,
            schedule: &mut schedule,
            criterion,
            epochs: config.epoch,
        };
        let (trained, train_summary) =
            trainer.train_downstream(epoch, &pretext, head, &train_loader, &mut context.writer)?;
        head = trained;
        context.log_epoch("train", "downstream", epoch, train_summary)?;

        let test_summary = test_downstream(
            epoch,
            config.epoch,
            &pretext,
            &head,
            criterion,
            &test_loader,
            &mut context.writer,
        )?;
        context.log_epoch("test", "downstream", epoch, test_summary)?;

        if let Some(dir) = context.observe(epoch, test_summary.loss) {
            let meta = context.meta(epoch, test_summary.loss, downstream_name);
            save_checkpoint(&dir, &head, &optimizer, &meta)?;
        }
    }

    context.finish()
}
